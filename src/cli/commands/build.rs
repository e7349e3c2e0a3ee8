use async_trait::async_trait;
use std::path::PathBuf;

use super::{load_core, CommandHandler};
use crate::builder::BuildOutcome;
use crate::{Result, TheiaError};

/// Handler for the `build` command
pub struct BuildCommand {
    pub config: PathBuf,
    pub library: Option<String>,
}

impl BuildCommand {
    pub fn new(config: PathBuf, library: Option<String>) -> Self {
        Self { config, library }
    }
}

#[async_trait]
impl CommandHandler for BuildCommand {
    async fn execute(&self) -> Result<()> {
        let core = load_core(&self.config)?;

        let result = match &self.library {
            Some(library) => core.build(library).await.map(|report| {
                match &report.outcome {
                    BuildOutcome::Built(entry) => {
                        println!("{library}: built {}", entry.revision)
                    }
                    BuildOutcome::UpToDate(revision) => {
                        println!("{library}: {revision} is already built")
                    }
                }
            }),
            None => match core.build_all().await {
                Ok(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                    if summary.is_success() {
                        Ok(())
                    } else {
                        Err(TheiaError::Generic(anyhow::anyhow!(
                            "{} of {} libraries failed to build",
                            summary.failed.len(),
                            core.config().libs.len()
                        )))
                    }
                }
                Err(err) => Err(err),
            },
        };

        core.hooks().settle().await;
        result
    }

    fn name(&self) -> &'static str {
        "build"
    }
}
