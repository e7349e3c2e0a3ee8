use serde::Serialize;
use std::sync::{OnceLock, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{BuildOutcome, BuildReport};
use crate::core::Core;
use crate::{Result, TheiaError};

/// Work accepted by the build queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRequest {
    /// Every configured library, in name order
    All,
    Library(String),
}

/// Outcome of a sweep over every library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub built: Vec<String>,
    pub up_to_date: Vec<String>,
    /// Library and error message of each failed build
    pub failed: Vec<(String, String)>,
}

impl SweepSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Reply {
    Library(Result<BuildReport>),
    All(SweepSummary),
}

struct Job {
    request: BuildRequest,
    reply: oneshot::Sender<Reply>,
}

/// Single worker that runs builds one at a time, in submission order
///
/// The worker task is spawned on first use and holds only a weak reference
/// to the core, so it exits once the core is dropped.
pub struct BuildQueue {
    core: Weak<Core>,
    sender: OnceLock<mpsc::UnboundedSender<Job>>,
}

impl BuildQueue {
    pub(crate) fn new(core: Weak<Core>) -> Self {
        Self {
            core,
            sender: OnceLock::new(),
        }
    }

    /// Build one library once every earlier request has finished
    pub async fn build(&self, library: &str) -> Result<BuildReport> {
        match self.submit(BuildRequest::Library(library.to_string())).await? {
            Reply::Library(result) => result,
            Reply::All(_) => Err(queue_closed()),
        }
    }

    /// Build every library; individual failures are collected, never raised
    pub async fn build_all(&self) -> Result<SweepSummary> {
        match self.submit(BuildRequest::All).await? {
            Reply::All(summary) => Ok(summary),
            Reply::Library(_) => Err(queue_closed()),
        }
    }

    async fn submit(&self, request: BuildRequest) -> Result<Reply> {
        let (reply, response) = oneshot::channel();
        self.sender()
            .send(Job { request, reply })
            .map_err(|_| queue_closed())?;
        response.await.map_err(|_| queue_closed())
    }

    fn sender(&self) -> &mpsc::UnboundedSender<Job> {
        self.sender.get_or_init(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            tokio::spawn(worker(self.core.clone(), receiver));
            sender
        })
    }
}

async fn worker(core: Weak<Core>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    debug!("build worker started");
    while let Some(job) = jobs.recv().await {
        let Some(core) = core.upgrade() else {
            break;
        };
        let reply = match job.request {
            BuildRequest::Library(library) => Reply::Library(core.run_build(&library).await),
            BuildRequest::All => Reply::All(sweep(&core).await),
        };
        // The submitter may have given up waiting.
        let _ = job.reply.send(reply);
    }
    debug!("build worker stopped");
}

async fn sweep(core: &Core) -> SweepSummary {
    let mut summary = SweepSummary::default();
    for library in core.config().library_names() {
        match core.run_build(&library).await {
            Ok(report) => match report.outcome {
                BuildOutcome::Built(_) => summary.built.push(library),
                BuildOutcome::UpToDate(_) => summary.up_to_date.push(library),
            },
            Err(err) => {
                warn!(library = %library, "build failed: {err}");
                summary.failed.push((library, err.to_string()));
            }
        }
    }
    info!(
        built = summary.built.len(),
        up_to_date = summary.up_to_date.len(),
        failed = summary.failed.len(),
        "build sweep finished"
    );
    summary
}

fn queue_closed() -> TheiaError {
    TheiaError::Generic(anyhow::anyhow!("build queue is closed"))
}
