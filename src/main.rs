use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use theia::cli::commands::{
    build::BuildCommand, manifest::ManifestCommand, render::RenderCommand, start::StartCommand,
    CommandHandler,
};
use theia::cli::{Cli, Commands, LogLevel};

fn initialize_tracing(log_level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    // Logs go to stderr, stdout carries command output
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(cli.log_level, cli.log_json);

    let handler: Box<dyn CommandHandler> = match cli.command {
        Commands::Build { library } => Box::new(BuildCommand::new(cli.config, library)),
        Commands::Render {
            library,
            component,
            props,
        } => Box::new(RenderCommand::new(cli.config, library, component, props)),
        Commands::Manifest { library } => Box::new(ManifestCommand::new(cli.config, library)),
        Commands::Start => Box::new(StartCommand::new(cli.config)),
    };

    debug!(command = handler.name(), "running");
    handler.execute().await?;
    Ok(())
}
