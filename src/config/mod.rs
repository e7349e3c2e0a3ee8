//! Configuration file loading and types

mod loader;
mod paths;
mod types;

pub use loader::{runtime_artifact_pattern, ConfigLoader, ENVIRONMENT_VAR};
pub use paths::TheiaPaths;
pub use types::{
    CoreConfig, LibraryConfig, PluginSettings, RendererSettings, ToolchainSettings,
    DEFAULT_ENVIRONMENT,
};
