use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use super::{load_core, CommandHandler};
use crate::Result;

/// Handler for the `render` command
pub struct RenderCommand {
    pub config: PathBuf,
    pub library: String,
    pub component: String,
    pub props: String,
}

impl RenderCommand {
    pub fn new(config: PathBuf, library: String, component: String, props: String) -> Self {
        Self {
            config,
            library,
            component,
            props,
        }
    }
}

#[async_trait]
impl CommandHandler for RenderCommand {
    async fn execute(&self) -> Result<()> {
        let input: Value = serde_json::from_str(&self.props)?;
        let core = load_core(&self.config)?;

        let result = core.render(&self.library, &self.component, input).await;
        core.hooks().settle().await;

        println!("{}", serde_json::to_string_pretty(&result?)?);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "render"
    }
}
