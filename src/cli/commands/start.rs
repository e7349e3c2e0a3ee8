use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::{load_core, CommandHandler};
use crate::host::RouteTable;
use crate::Result;

/// Handler for the `start` command
pub struct StartCommand {
    pub config: PathBuf,
}

impl StartCommand {
    pub fn new(config: PathBuf) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CommandHandler for StartCommand {
    async fn execute(&self) -> Result<()> {
        let core = load_core(&self.config)?;

        let routes = RouteTable::new();
        core.integrate_host(routes.clone()).await;
        for (method, path) in routes.routes() {
            info!(%method, %path, "plugin route registered");
        }

        core.start().await;
        info!(environment = core.environment(), "started, press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        core.hooks().settle().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "start"
    }
}
