use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Theia: build component libraries and render their components server-side
#[derive(Parser, Debug)]
#[command(name = "theia")]
#[command(version)]
#[command(about = "Build component libraries and render their components server-side")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true, default_value = "theia.yaml")]
    pub config: PathBuf,

    /// Set log level (RUST_LOG takes precedence when set)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build one library, or every configured library
    Build {
        /// Library to build; all libraries when omitted
        library: Option<String>,
    },

    /// Render a component and print the markup and assets as JSON
    Render {
        library: String,
        component: String,

        /// Component input as JSON
        #[arg(long, default_value = "{}")]
        props: String,
    },

    /// Print the stored build manifest of a library
    Manifest { library: String },

    /// Start plugins and run until interrupted
    Start,
}

impl Commands {
    /// Get the command name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Build { .. } => "build",
            Commands::Render { .. } => "render",
            Commands::Manifest { .. } => "manifest",
            Commands::Start => "start",
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults() {
        let cli = Cli::parse_from(["theia", "build"]);

        match cli.command {
            Commands::Build { library } => assert_eq!(library, None),
            _ => panic!("Wrong command parsed"),
        }
        assert_eq!(cli.config, PathBuf::from("theia.yaml"));
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.log_json);
    }

    #[test]
    fn test_render_command() {
        let cli = Cli::parse_from([
            "theia",
            "render",
            "widgets",
            "Greeting",
            "--props",
            r#"{"name":"Theia"}"#,
            "--config",
            "/etc/theia.yaml",
        ]);

        match &cli.command {
            Commands::Render {
                library,
                component,
                props,
            } => {
                assert_eq!(library, "widgets");
                assert_eq!(component, "Greeting");
                assert_eq!(props, r#"{"name":"Theia"}"#);
            }
            _ => panic!("Wrong command parsed"),
        }
        assert_eq!(cli.command.name(), "render");
        assert_eq!(cli.config, PathBuf::from("/etc/theia.yaml"));
    }

    #[test]
    fn test_global_log_flags() {
        let cli = Cli::parse_from(["theia", "start", "--log-level", "debug", "--log-json"]);
        assert!(matches!(cli.command, Commands::Start));
        assert_eq!(cli.log_level.to_filter_directive(), "debug");
        assert!(cli.log_json);
    }
}
