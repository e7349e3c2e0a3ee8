pub mod build;
pub mod manifest;
pub mod render;
pub mod start;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::ConfigLoader;
use crate::core::Core;
use crate::Result;

/// Common trait for all command handlers
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Execute the command
    async fn execute(&self) -> Result<()>;

    /// Get command name for logging
    fn name(&self) -> &'static str;
}

/// Load configuration and wire a core from it
pub(crate) fn load_core(config_path: &Path) -> Result<Arc<Core>> {
    let config = ConfigLoader::new().load(config_path)?;
    Core::from_config(config)
}
