use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::executor::{Command, ExecutionResult};
use super::BuildContext;
use crate::config::ToolchainSettings;

/// Basename of the stats the runtime build writes
pub const RUNTIME_STATS_BASENAME: &str = "stats-runtime.json";

/// Build tool operations the pipeline runs inside a checked out library
///
/// Every build writes its stats to `<output_dir>/stats-<context>.json`, next
/// to the files it emits.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Install dependencies
    async fn install(&self, working_dir: &Path) -> anyhow::Result<()>;

    /// Whether the project defines a test stage
    async fn has_test(&self, working_dir: &Path) -> anyhow::Result<bool>;

    async fn test(&self, working_dir: &Path) -> anyhow::Result<()>;

    /// Empty the output directory
    async fn clean(&self, working_dir: &Path) -> anyhow::Result<()>;

    /// Build the bundle for one execution context
    async fn build(&self, working_dir: &Path, context: BuildContext, revision: &str) -> anyhow::Result<()>;

    /// Build the shared runtime bundle; `false` when none is configured
    async fn build_runtime(&self, working_dir: &Path, revision: &str) -> anyhow::Result<bool>;

    fn output_dir(&self, working_dir: &Path) -> PathBuf;

    /// Logical names of the runtime artifacts a build must emit
    fn runtime_artifacts(&self) -> Vec<String>;
}

/// `yarn` + `webpack` toolchain driven by configured command lines
#[derive(Debug, Clone)]
pub struct YarnWebpack {
    settings: ToolchainSettings,
}

impl YarnWebpack {
    pub fn new(settings: ToolchainSettings) -> Self {
        Self { settings }
    }

    fn vars(&self, working_dir: &Path, revision: &str) -> HashMap<String, String> {
        HashMap::from([
            (
                "output_dir".to_string(),
                self.output_dir(working_dir).to_string_lossy().into_owned(),
            ),
            ("revision".to_string(), revision.to_string()),
        ])
    }

    async fn run(&self, line: &str, working_dir: &Path, revision: &str) -> anyhow::Result<ExecutionResult> {
        let command = Command::parse(line, &self.vars(working_dir, revision))?
            .in_dir(working_dir)
            .env("NODE_ENV", "production");
        let timeout = self.settings.timeout_secs.map(Duration::from_secs);
        command
            .execute_with(None, timeout)
            .await
            .with_context(|| format!("failed to run {}", command.display()))
    }

    async fn run_checked(&self, line: &str, working_dir: &Path) -> anyhow::Result<()> {
        let result = self.run(line, working_dir, "").await?;
        if !result.success {
            bail!("{}", failure_message(line, &result));
        }
        Ok(())
    }

    /// Run a stats-producing build, keeping the stats even when the tool fails
    async fn run_stats(
        &self,
        line: &str,
        working_dir: &Path,
        revision: &str,
        stats_basename: &str,
    ) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(self.output_dir(working_dir)).await?;
        let result = self.run(line, working_dir, revision).await?;

        if self.settings.stats_from_stdout && !result.stdout.trim().is_empty() {
            let stats_path = self.output_dir(working_dir).join(stats_basename);
            tokio::fs::write(&stats_path, &result.stdout)
                .await
                .with_context(|| format!("failed to write {}", stats_path.display()))?;
        }

        if !result.success {
            bail!("{}", failure_message(line, &result));
        }
        Ok(())
    }
}

#[async_trait]
impl Toolchain for YarnWebpack {
    async fn install(&self, working_dir: &Path) -> anyhow::Result<()> {
        self.run_checked(&self.settings.install, working_dir).await
    }

    async fn has_test(&self, working_dir: &Path) -> anyhow::Result<bool> {
        let package = working_dir.join("package.json");
        if !tokio::fs::try_exists(&package).await? {
            return Ok(false);
        }
        let contents = tokio::fs::read_to_string(&package).await?;
        let package: Value = serde_json::from_str(&contents)
            .with_context(|| format!("invalid {}", package.display()))?;
        Ok(package
            .pointer("/scripts/test")
            .and_then(Value::as_str)
            .is_some_and(|script| !script.trim().is_empty()))
    }

    async fn test(&self, working_dir: &Path) -> anyhow::Result<()> {
        self.run_checked(&self.settings.test, working_dir).await
    }

    async fn clean(&self, working_dir: &Path) -> anyhow::Result<()> {
        let output_dir = self.output_dir(working_dir);
        if tokio::fs::try_exists(&output_dir).await? {
            tokio::fs::remove_dir_all(&output_dir).await?;
        }
        tokio::fs::create_dir_all(&output_dir).await?;
        Ok(())
    }

    async fn build(&self, working_dir: &Path, context: BuildContext, revision: &str) -> anyhow::Result<()> {
        let line = match context {
            BuildContext::Browser => &self.settings.browser,
            BuildContext::Server => &self.settings.server,
        };
        debug!(%context, revision, "building bundle");
        self.run_stats(line, working_dir, revision, &context.stats_basename())
            .await
    }

    async fn build_runtime(&self, working_dir: &Path, revision: &str) -> anyhow::Result<bool> {
        let Some(line) = &self.settings.runtime else {
            return Ok(false);
        };
        self.run_stats(line, working_dir, revision, RUNTIME_STATS_BASENAME)
            .await?;
        Ok(true)
    }

    fn output_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.settings.output_dir)
    }

    fn runtime_artifacts(&self) -> Vec<String> {
        if self.settings.runtime.is_some() {
            self.settings.runtime_artifacts.clone()
        } else {
            Vec::new()
        }
    }
}

fn failure_message(line: &str, result: &ExecutionResult) -> String {
    let stderr = result.stderr.trim();
    if stderr.is_empty() {
        format!("`{line}` exited with code {}", result.exit_code)
    } else {
        format!("`{line}` exited with code {}: {stderr}", result.exit_code)
    }
}
