use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Environment used when neither the file nor `THEIA_ENV` names one
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Root configuration file structure (`theia.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// Active environment, selects each library's revision
    #[serde(default)]
    pub environment: Option<String>,

    /// Where library sources are checked out
    #[serde(default)]
    pub git_dir: Option<PathBuf>,

    /// Root of the local artifact store
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// Registered component libraries by name
    #[serde(default)]
    pub libs: BTreeMap<String, LibraryConfig>,

    #[serde(default)]
    pub toolchain: ToolchainSettings,

    #[serde(default)]
    pub renderer: RendererSettings,

    #[serde(default)]
    pub plugins: PluginSettings,
}

impl CoreConfig {
    /// The active environment
    pub fn environment(&self) -> &str {
        self.environment.as_deref().unwrap_or(DEFAULT_ENVIRONMENT)
    }

    pub fn library(&self, name: &str) -> Option<&LibraryConfig> {
        self.libs.get(name)
    }

    /// Library names in build order
    pub fn library_names(&self) -> Vec<String> {
        self.libs.keys().cloned().collect()
    }
}

/// A registered component library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    /// Source repository location
    pub source: String,

    /// Revision selector (branch, tag or commit) per environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl LibraryConfig {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_selector(mut self, environment: impl Into<String>, selector: impl Into<String>) -> Self {
        self.env.insert(environment.into(), selector.into());
        self
    }

    /// Revision selector for `environment`
    pub fn selector(&self, environment: &str) -> Option<&str> {
        self.env.get(environment).map(String::as_str)
    }
}

/// Command lines of the build toolchain
///
/// `{{output_dir}}` and `{{revision}}` are substituted in every argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainSettings {
    pub install: String,
    pub test: String,
    /// Output directory relative to the checkout
    pub output_dir: String,
    pub browser: String,
    pub server: String,
    /// Shared runtime bundle, skipped when absent
    pub runtime: Option<String>,
    /// Logical names of the bundles the runtime build must emit
    pub runtime_artifacts: Vec<String>,
    /// Capture each build's stdout as its stats file
    pub stats_from_stdout: bool,
    pub timeout_secs: Option<u64>,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            install: "yarn install --production=false --non-interactive".to_string(),
            test: "yarn test".to_string(),
            output_dir: "dist".to_string(),
            browser: "./node_modules/.bin/webpack --json --output-path {{output_dir}}".to_string(),
            server: "./node_modules/.bin/webpack --json --output-path {{output_dir}} --output-library-target commonjs2 --target node"
                .to_string(),
            runtime: Some(
                "./node_modules/.bin/webpack --json --output-path {{output_dir}} --output-library-target commonjs2 --target node --entry React=react --entry ReactDOMServer=react-dom/server"
                    .to_string(),
            ),
            runtime_artifacts: vec!["React".to_string(), "ReactDOMServer".to_string()],
            stats_from_stdout: true,
            timeout_secs: None,
        }
    }
}

/// External renderer used by the default component loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererSettings {
    pub command: String,
    pub timeout_ms: u64,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            command: "theia-render".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Intervals of the bundled plugins; a plugin is off when its interval is unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginSettings {
    pub rebuild_interval_secs: Option<u64>,
    pub reconcile_interval_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: CoreConfig = serde_yaml_ng::from_str(
            r#"
libs:
  widgets:
    source: git@example.com:acme/widgets.git
"#,
        )
        .unwrap();

        assert_eq!(config.environment(), DEFAULT_ENVIRONMENT);
        assert_eq!(config.library_names(), vec!["widgets"]);
        assert_eq!(config.toolchain, ToolchainSettings::default());
        assert_eq!(config.renderer.timeout_ms, 10_000);
        assert_eq!(config.plugins, PluginSettings::default());
    }

    #[test]
    fn test_selector_per_environment() {
        let lib = LibraryConfig::new("repo").with_selector("production", "v1.2.0");
        assert_eq!(lib.selector("production"), Some("v1.2.0"));
        assert_eq!(lib.selector("development"), None);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: Result<CoreConfig, _> = serde_yaml_ng::from_str("libz: {}\n");
        assert!(result.is_err());

        let result: Result<CoreConfig, _> = serde_yaml_ng::from_str("verbose: true\n");
        assert!(result.is_err());
    }
}
