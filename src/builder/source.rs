use anyhow::{bail, Context};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::executor::Command;
use crate::manifest::Author;

/// Description of a checked out revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionInfo {
    pub summary: String,
    pub author: Author,
}

/// Source control operations the build pipeline relies on
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clone `source` into `working_dir` if absent, then move it to `selector`
    async fn sync(&self, working_dir: &Path, source: &str, selector: &str) -> anyhow::Result<()>;

    /// Revision currently checked out
    async fn head(&self, working_dir: &Path) -> anyhow::Result<String>;

    async fn describe(&self, working_dir: &Path, revision: &str) -> anyhow::Result<RevisionInfo>;
}

/// `git` command line implementation
///
/// A selector naming a remote branch is checked out and pulled; anything else
/// (a tag, a commit) is checked out as is.
#[derive(Debug, Clone)]
pub struct GitSource {
    program: String,
}

impl Default for GitSource {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn git(&self, working_dir: Option<&Path>, args: &[&str]) -> anyhow::Result<String> {
        let mut command = Command {
            program: self.program.clone(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            working_dir: None,
            env_vars: HashMap::from([("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]),
        };
        if let Some(dir) = working_dir {
            command = command.in_dir(dir);
        }

        let result = command
            .execute()
            .await
            .with_context(|| format!("failed to run {}", command.display()))?;
        if !result.success {
            bail!(
                "{} exited with code {}: {}",
                command.display(),
                result.exit_code,
                result.stderr.trim()
            );
        }
        Ok(result.stdout)
    }

    async fn is_remote_branch(&self, working_dir: &Path, selector: &str) -> anyhow::Result<bool> {
        let heads = self
            .git(Some(working_dir), &["ls-remote", "--heads", "origin", selector])
            .await?;
        Ok(!heads.trim().is_empty())
    }
}

#[async_trait]
impl SourceControl for GitSource {
    async fn sync(&self, working_dir: &Path, source: &str, selector: &str) -> anyhow::Result<()> {
        if !tokio::fs::try_exists(working_dir.join(".git")).await? {
            if let Some(parent) = working_dir.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let target = working_dir.to_string_lossy().into_owned();
            info!(source, dir = %target, "cloning");
            self.git(None, &["clone", "--quiet", source, target.as_str()]).await?;
        }

        self.git(Some(working_dir), &["fetch", "--quiet", "--tags", "origin"])
            .await?;

        if self.is_remote_branch(working_dir, selector).await? {
            debug!(selector, "selector is a branch, pulling");
            self.git(Some(working_dir), &["checkout", "--quiet", selector])
                .await?;
            self.git(Some(working_dir), &["pull", "--quiet", "--ff-only", "origin", selector])
                .await?;
        } else {
            debug!(selector, "selector is not a branch, checking out");
            self.git(Some(working_dir), &["checkout", "--quiet", selector])
                .await?;
        }
        Ok(())
    }

    async fn head(&self, working_dir: &Path) -> anyhow::Result<String> {
        let revision = self.git(Some(working_dir), &["rev-parse", "HEAD"]).await?;
        let revision = revision.trim();
        if revision.is_empty() {
            bail!("git rev-parse returned no revision");
        }
        Ok(revision.to_string())
    }

    async fn describe(&self, working_dir: &Path, revision: &str) -> anyhow::Result<RevisionInfo> {
        let output = self
            .git(
                Some(working_dir),
                &["log", "-1", "--pretty=format:%s%x1f%an%x1f%ae", revision],
            )
            .await?;
        Ok(parse_log_line(&output))
    }
}

fn parse_log_line(line: &str) -> RevisionInfo {
    let mut fields = line.trim_end_matches('\n').split('\u{1f}');
    let summary = fields.next().unwrap_or_default().to_string();
    let name = fields.next().unwrap_or_default().to_string();
    let email = fields.next().unwrap_or_default().to_string();
    RevisionInfo {
        summary,
        author: Author { name, email },
    }
}
