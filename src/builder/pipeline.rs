use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::toolchain::RUNTIME_STATS_BASENAME;
use super::{
    BuildContext, BuildLog, BuildOutcome, BuildReport, Builder, SourceControl, Toolchain,
};
use crate::config::{runtime_artifact_pattern, LibraryConfig, TheiaPaths};
use crate::core::Core;
use crate::hooks::{channel, BuildTickEvent};
use crate::manifest::{AssetMap, ManifestEntry};
use crate::{Result, TheiaError};

const NAMESPACE: &str = "theia:builder";
const ERROR_SEPARATOR: &str = "\n====\n";
const UNKNOWN_ERROR: &str = "Unknown error while building";

/// Source control + toolchain build pipeline
pub struct DefaultBuilder {
    source: Arc<dyn SourceControl>,
    toolchain: Arc<dyn Toolchain>,
    git_dir: PathBuf,
}

impl DefaultBuilder {
    pub fn new(
        source: Arc<dyn SourceControl>,
        toolchain: Arc<dyn Toolchain>,
        git_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            toolchain,
            git_dir: git_dir.into(),
        }
    }

    /// Run every stage after the revision is known, returning the files to store
    async fn run_stages(
        &self,
        core: &Core,
        library: &str,
        working_dir: &Path,
        entry: &mut ManifestEntry,
        log: &mut BuildLog,
    ) -> Result<Vec<PathBuf>> {
        let revision = entry.revision.clone();
        let info = self
            .source
            .describe(working_dir, &revision)
            .await
            .map_err(|e| source_error(library, e))?;
        entry.revision_summary = info.summary;
        entry.author = info.author;

        let output_dir = self.toolchain.output_dir(working_dir);
        self.stage(core, library, log, "clean");
        self.toolchain
            .clean(working_dir)
            .await
            .map_err(|e| tool_error(library, e))?;

        self.stage(core, library, log, "install");
        self.toolchain
            .install(working_dir)
            .await
            .map_err(|e| tool_error(library, e))?;

        if self
            .toolchain
            .has_test(working_dir)
            .await
            .map_err(|e| tool_error(library, e))?
        {
            self.stage(core, library, log, "test");
            self.toolchain
                .test(working_dir)
                .await
                .map_err(|e| tool_error(library, e))?;
        }

        let all_stats: Vec<String> = BuildContext::ALL
            .iter()
            .map(BuildContext::stats_basename)
            .chain(std::iter::once(RUNTIME_STATS_BASENAME.to_string()))
            .collect();

        for context in BuildContext::ALL {
            self.stage(core, library, log, &format!("build {context}"));
            if let Err(e) = self.toolchain.build(working_dir, context, &revision).await {
                let errors = collect_stats_errors(&output_dir, &all_stats).await;
                return Err(build_failure(library, errors, e));
            }

            let stats_path = output_dir.join(context.stats_basename());
            if !tokio::fs::try_exists(&stats_path).await? {
                return Err(TheiaError::MissingArtifact {
                    library: library.to_string(),
                    artifact: format!("a {context} stats file"),
                });
            }
            let stats = AssetMap::from_json(&tokio::fs::read_to_string(&stats_path).await?)?;
            let errors = stats.error_messages();
            if !errors.is_empty() {
                return Err(TheiaError::BuildTool {
                    library: library.to_string(),
                    message: errors.join(ERROR_SEPARATOR),
                });
            }
        }

        self.stage(core, library, log, "build runtime");
        match self.toolchain.build_runtime(working_dir, &revision).await {
            Ok(true) => {
                let errors =
                    collect_stats_errors(&output_dir, &[RUNTIME_STATS_BASENAME.to_string()]).await;
                if !errors.is_empty() {
                    return Err(TheiaError::BuildTool {
                        library: library.to_string(),
                        message: errors.join(ERROR_SEPARATOR),
                    });
                }
            }
            Ok(false) => debug!(library, "no runtime bundle configured"),
            Err(e) => {
                let errors =
                    collect_stats_errors(&output_dir, &[RUNTIME_STATS_BASENAME.to_string()]).await;
                return Err(build_failure(library, errors, e));
            }
        }

        let produced = list_files(&output_dir).await?;
        for name in self.toolchain.runtime_artifacts() {
            let pattern = Regex::new(&runtime_artifact_pattern(&name))?;
            let basename = produced
                .iter()
                .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
                .find(|basename| pattern.is_match(basename))
                .ok_or_else(|| TheiaError::MissingArtifact {
                    library: library.to_string(),
                    artifact: format!("the {name} runtime bundle"),
                })?;
            entry.artifacts.runtime.insert(name, basename.to_string());
        }

        for context in BuildContext::ALL {
            let stored = context.stored_stats_basename(&revision);
            tokio::fs::rename(output_dir.join(context.stats_basename()), output_dir.join(&stored))
                .await?;
            match context {
                BuildContext::Browser => entry.artifacts.browser_stats = stored,
                BuildContext::Server => entry.artifacts.server_stats = stored,
            }
        }

        self.stage(core, library, log, "copy assets");
        list_files(&output_dir).await
    }

    fn stage(&self, core: &Core, library: &str, log: &mut BuildLog, name: &str) {
        info!(library, stage = name, "build stage");
        log.start(name);
        tick(core, library, log);
    }
}

#[async_trait]
impl Builder for DefaultBuilder {
    async fn build(&self, core: &Core, library: &str, config: &LibraryConfig) -> Result<BuildReport> {
        let environment = core.environment();
        let selector = config.selector(environment).ok_or_else(|| {
            TheiaError::Config(format!(
                "Library '{library}' has no revision for environment '{environment}'"
            ))
        })?;
        let working_dir = TheiaPaths::checkout(&self.git_dir, library);
        let mut log = BuildLog::default();

        self.stage(core, library, &mut log, "sync source");
        let synced = match self.source.sync(&working_dir, &config.source, selector).await {
            Ok(()) => self.source.head(&working_dir).await,
            Err(e) => Err(e),
        };
        let revision = match synced {
            Ok(revision) => revision,
            Err(e) => {
                let err = source_error(library, e);
                core.report_error(NAMESPACE, &err);
                log.end();
                tick(core, library, &log);
                return Err(err);
            }
        };

        let latest = match core.cache().store_manifest(library).await {
            Ok(latest) => latest,
            Err(err) => {
                core.report_error(NAMESPACE, &err);
                log.end();
                tick(core, library, &log);
                return Err(err);
            }
        };
        if latest
            .as_ref()
            .and_then(|manifest| manifest.latest())
            .is_some_and(|entry| entry.revision == revision)
        {
            info!(library, %revision, "already built, nothing to do");
            log.end();
            tick(core, library, &log);
            return Ok(BuildReport {
                library: library.to_string(),
                outcome: BuildOutcome::UpToDate(revision),
                log,
            });
        }

        info!(library, %revision, selector, "building");
        let mut entry = ManifestEntry::new(revision, "", Default::default());
        let staged = self
            .run_stages(core, library, &working_dir, &mut entry, &mut log)
            .await;

        let result = match staged {
            Ok(files) => {
                entry.success = true;
                let registered = core.register_library(library, &files, entry).await;
                if let Err(err) = &registered {
                    core.report_error(NAMESPACE, err);
                }
                registered
            }
            Err(err) => {
                core.report_error(NAMESPACE, &err);
                // Outputs of a failed build are never stored; unversioned names
                // would overwrite files of the build being served.
                if let Err(record_err) = core.register_library(library, &[], entry).await {
                    warn!(library, "failed to record failed build: {record_err}");
                }
                Err(err)
            }
        };

        log.end();
        tick(core, library, &log);
        let entry = result?;
        info!(library, revision = %entry.revision, "build succeeded");
        Ok(BuildReport {
            library: library.to_string(),
            outcome: BuildOutcome::Built(entry),
            log,
        })
    }
}

fn tick(core: &Core, library: &str, log: &BuildLog) {
    core.hooks()
        .dispatch_detached::<channel::BuildTick>(BuildTickEvent {
            library: library.to_string(),
            log: log.clone(),
        });
}

fn source_error(library: &str, err: anyhow::Error) -> TheiaError {
    TheiaError::SourceSync {
        library: library.to_string(),
        message: format!("{err:#}"),
    }
}

fn tool_error(library: &str, err: anyhow::Error) -> TheiaError {
    TheiaError::BuildTool {
        library: library.to_string(),
        message: format!("{err:#}"),
    }
}

/// Prefer errors the tool reported in its stats over its exit status
fn build_failure(library: &str, stats_errors: Vec<String>, err: anyhow::Error) -> TheiaError {
    let message = if !stats_errors.is_empty() {
        stats_errors.join(ERROR_SEPARATOR)
    } else {
        let message = format!("{err:#}");
        if message.trim().is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            message
        }
    };
    TheiaError::BuildTool {
        library: library.to_string(),
        message,
    }
}

/// Errors reported in whichever of `basenames` exist and parse
async fn collect_stats_errors(output_dir: &Path, basenames: &[String]) -> Vec<String> {
    let mut errors = Vec::new();
    for basename in basenames {
        let Ok(contents) = tokio::fs::read_to_string(output_dir.join(basename)).await else {
            continue;
        };
        match AssetMap::from_json(&contents) {
            Ok(stats) => errors.extend(stats.error_messages()),
            Err(e) => debug!(basename = %basename, "unreadable stats: {e}"),
        }
    }
    errors
}

/// Regular files directly inside `dir`, sorted; empty when `dir` is missing
async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !tokio::fs::try_exists(dir).await? {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_stats_errors_win_over_exit_status() {
        let err = build_failure(
            "widgets",
            vec!["Module not found".to_string(), "Unexpected token".to_string()],
            anyhow::anyhow!("webpack exited with code 2"),
        );
        assert_eq!(
            err.to_string(),
            "Build tool error for widgets: Module not found\n====\nUnexpected token"
        );
    }

    #[test]
    fn test_exit_status_and_generic_fallbacks() {
        let err = build_failure("widgets", vec![], anyhow::anyhow!("webpack exited with code 2"));
        assert!(err.to_string().ends_with("webpack exited with code 2"));

        let err = build_failure("widgets", vec![], anyhow::anyhow!(""));
        assert!(err.to_string().ends_with(UNKNOWN_ERROR));
    }

    #[tokio::test]
    async fn test_collect_stats_errors_skips_missing_and_invalid() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("stats-browser.json"), r#"{"errors": ["bad import"]}"#).unwrap();
        std::fs::write(dir.path().join("stats-server.json"), "not json").unwrap();

        let errors = collect_stats_errors(
            dir.path(),
            &[
                "stats-browser.json".to_string(),
                "stats-server.json".to_string(),
                "stats-runtime.json".to_string(),
            ],
        )
        .await;
        assert_eq!(errors, vec!["bad import"]);
    }

    #[tokio::test]
    async fn test_list_files_ignores_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.js"), "").unwrap();
        std::fs::write(dir.path().join("a.js"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = list_files(dir.path()).await.unwrap();
        assert_eq!(files, vec![dir.path().join("a.js"), dir.path().join("b.js")]);
        assert!(list_files(&dir.path().join("missing")).await.unwrap().is_empty());
    }
}
