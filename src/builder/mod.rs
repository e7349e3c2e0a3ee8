//! Build orchestration
//!
//! A build syncs a library's source to the revision selected for the active
//! environment, runs the toolchain stages, validates and stores the produced
//! artifacts, then appends an entry to the library's build manifest. Builds
//! are serialized through the [`BuildQueue`].

pub mod executor;
mod pipeline;
mod queue;
mod source;
mod toolchain;

pub use pipeline::DefaultBuilder;
pub use queue::{BuildQueue, BuildRequest, SweepSummary};
pub use source::{GitSource, RevisionInfo, SourceControl};
pub use toolchain::{Toolchain, YarnWebpack};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::config::LibraryConfig;
use crate::core::Core;
use crate::manifest::ManifestEntry;
use crate::Result;

/// Execution context a bundle is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildContext {
    Browser,
    Server,
}

impl BuildContext {
    pub const ALL: [BuildContext; 2] = [BuildContext::Browser, BuildContext::Server];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildContext::Browser => "browser",
            BuildContext::Server => "server",
        }
    }

    /// Basename the toolchain writes this context's stats to
    pub fn stats_basename(&self) -> String {
        format!("stats-{}.json", self.as_str())
    }

    /// Basename the stats are stored under for `revision`
    pub fn stored_stats_basename(&self, revision: &str) -> String {
        format!("stats-{}.{revision}.json", self.as_str())
    }
}

impl fmt::Display for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStage {
    pub name: String,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
}

/// Stage timeline of a single build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildLog {
    pub stages: Vec<BuildStage>,
}

impl BuildLog {
    /// Close the running stage, if any, and open `name`
    pub fn start(&mut self, name: impl Into<String>) {
        self.end();
        self.stages.push(BuildStage {
            name: name.into(),
            started: Utc::now(),
            ended: None,
        });
    }

    /// Close the running stage
    pub fn end(&mut self) {
        if let Some(stage) = self.stages.last_mut() {
            if stage.ended.is_none() {
                stage.ended = Some(Utc::now());
            }
        }
    }

    /// Name of the running stage
    pub fn current(&self) -> Option<&str> {
        self.stages
            .last()
            .filter(|stage| stage.ended.is_none())
            .map(|stage| stage.name.as_str())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// A new successful entry was appended
    Built(ManifestEntry),
    /// The latest entry already records this revision
    UpToDate(String),
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub library: String,
    pub outcome: BuildOutcome,
    pub log: BuildLog,
}

impl BuildReport {
    pub fn revision(&self) -> &str {
        match &self.outcome {
            BuildOutcome::Built(entry) => &entry.revision,
            BuildOutcome::UpToDate(revision) => revision,
        }
    }
}

/// Builds one library end to end
///
/// A failure after the revision is known has already been recorded as a
/// failed manifest entry by the time the error is returned.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, core: &Core, library: &str, config: &LibraryConfig) -> Result<BuildReport>;
}
