use super::paths::TheiaPaths;
use super::types::{CoreConfig, DEFAULT_ENVIRONMENT};
use crate::{Result, TheiaError};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Environment variable consulted when the file does not name an environment
pub const ENVIRONMENT_VAR: &str = "THEIA_ENV";

/// Loads, completes and validates `theia.yaml`
pub struct ConfigLoader {
    /// Environment from the process environment
    environment: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader that honors `THEIA_ENV`
    pub fn new() -> Self {
        Self {
            environment: std::env::var(ENVIRONMENT_VAR)
                .ok()
                .filter(|env| !env.trim().is_empty()),
        }
    }

    /// Use `environment` instead of `THEIA_ENV`
    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    /// Load a configuration file; relative paths resolve against its directory
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<CoreConfig> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TheiaError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.load_str(&contents, base_dir)
            .map_err(|e| match e {
                TheiaError::Config(message) => {
                    TheiaError::Config(format!("{}: {message}", path.display()))
                }
                other => other,
            })
    }

    /// Parse configuration from a string
    pub fn load_str(&self, contents: &str, base_dir: &Path) -> Result<CoreConfig> {
        let mut config: CoreConfig = serde_yaml_ng::from_str(contents)
            .map_err(|e| TheiaError::Config(format!("Failed to parse config: {e}")))?;
        self.complete(&mut config, base_dir);
        self.validate(&config)?;
        Ok(config)
    }

    /// Fill in defaults the file may omit
    fn complete(&self, config: &mut CoreConfig, base_dir: &Path) {
        if config.environment.is_none() {
            config.environment = Some(
                self.environment
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            );
        }

        for library in config.libs.values_mut() {
            library
                .env
                .entry("development".to_string())
                .or_insert_with(|| "dev".to_string());
            library
                .env
                .entry("production".to_string())
                .or_insert_with(|| "master".to_string());
        }

        let defaults = if config.git_dir.is_none() || config.storage_dir.is_none() {
            Some(TheiaPaths::default())
        } else {
            None
        };
        config.git_dir = Some(resolve(
            base_dir,
            config.git_dir.take(),
            defaults.as_ref().map(|paths| &paths.git_dir),
        ));
        config.storage_dir = Some(resolve(
            base_dir,
            config.storage_dir.take(),
            defaults.as_ref().map(|paths| &paths.storage_dir),
        ));
    }

    fn validate(&self, config: &CoreConfig) -> Result<()> {
        let environment = config.environment();

        for (name, library) in &config.libs {
            if name.trim().is_empty() {
                return Err(TheiaError::Config("Library names cannot be empty".to_string()));
            }
            if name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(TheiaError::Config(format!(
                    "Library name '{name}' cannot be used as a directory name"
                )));
            }
            if library.source.trim().is_empty() {
                return Err(TheiaError::Config(format!("Library '{name}' has no source")));
            }
            if library.selector(environment).is_none() {
                return Err(TheiaError::Config(format!(
                    "Library '{name}' has no revision for environment '{environment}'"
                )));
            }
        }

        for artifact in &config.toolchain.runtime_artifacts {
            Regex::new(&runtime_artifact_pattern(artifact))?;
        }

        if config.renderer.command.trim().is_empty() {
            return Err(TheiaError::Config("Renderer command cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Pattern matching the emitted file of runtime artifact `name`
pub fn runtime_artifact_pattern(name: &str) -> String {
    format!(r"^{}\..*\.js$", regex::escape(name))
}

fn resolve(base_dir: &Path, configured: Option<PathBuf>, default: Option<&PathBuf>) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path,
        Some(path) => base_dir.join(path),
        None => default.cloned().unwrap_or_else(|| base_dir.join(".theia")),
    }
}
