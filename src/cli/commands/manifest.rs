use async_trait::async_trait;
use std::path::PathBuf;

use super::{load_core, CommandHandler};
use crate::Result;

/// Handler for the `manifest` command
pub struct ManifestCommand {
    pub config: PathBuf,
    pub library: String,
}

impl ManifestCommand {
    pub fn new(config: PathBuf, library: String) -> Self {
        Self { config, library }
    }
}

#[async_trait]
impl CommandHandler for ManifestCommand {
    async fn execute(&self) -> Result<()> {
        let core = load_core(&self.config)?;
        let manifest = core.cache().get_manifest(&self.library).await?;
        println!("{}", manifest.to_json()?);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "manifest"
    }
}
