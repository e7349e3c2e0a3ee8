//! Shell-free process execution for build stages
//!
//! Command lines from configuration are split into argv with shell quoting
//! rules, then template variables are substituted per argument. Nothing is
//! ever handed to a shell, so a substituted value can only become a literal
//! argument.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// A single process invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Program to execute (must be in PATH or absolute path)
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Extends the inherited environment
    pub env_vars: HashMap<String, String>,
}

/// Result of running a command to completion
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Invalid command line: {0}")]
    InvalidSpec(String),

    #[error("Process spawn failed for {program}: {message}")]
    ProcessSpawn { program: String, message: String },

    #[error("I/O operation failed: {0}")]
    IoOperation(String),

    #[error("Timeout exceeded after {0:?}")]
    Timeout(Duration),
}

impl Command {
    /// Split a configured command line and substitute `{{name}}` placeholders
    pub fn parse(line: &str, vars: &HashMap<String, String>) -> Result<Self, ExecutionError> {
        let words =
            shell_words::split(line).map_err(|e| ExecutionError::InvalidSpec(format!("{line}: {e}")))?;
        let mut words = words.iter().map(|word| substitute_template(word, vars));

        let program = words
            .next()
            .filter(|program| !program.is_empty())
            .ok_or_else(|| ExecutionError::InvalidSpec("command line cannot be empty".to_string()))?;

        Ok(Self {
            program,
            args: words.collect(),
            working_dir: None,
            env_vars: HashMap::new(),
        })
    }

    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    /// Human readable form for logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, capturing stdout and stderr
    pub async fn execute(&self) -> Result<ExecutionResult, ExecutionError> {
        self.execute_with(None, None).await
    }

    /// Run to completion, optionally feeding `stdin` and bounding the wait
    pub async fn execute_with(
        &self,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecutionError> {
        debug!(command = %self.display(), dir = ?self.working_dir, "spawning");

        let mut process = TokioCommand::new(&self.program);
        process
            .args(&self.args)
            .envs(&self.env_vars)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }

        let mut child = process.spawn().map_err(|e| ExecutionError::ProcessSpawn {
            program: self.program.clone(),
            message: e.to_string(),
        })?;

        // Stdin is fed while output is collected, so a process that writes as
        // it reads cannot fill its stdout pipe and stall the exchange.
        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                pipe.write_all(input).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let exchange = async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            match fed {
                // The process may exit without reading all of its input.
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    Err(ExecutionError::IoOperation(e.to_string()))
                }
                _ => output.map_err(|e| ExecutionError::IoOperation(e.to_string())),
            }
        };

        // Dropping the exchange on timeout kills the child.
        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| ExecutionError::Timeout(limit))??,
            None => exchange.await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            debug!(program = %self.program, "{line}");
        }

        Ok(ExecutionResult {
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
            stdout,
            stderr,
        })
    }
}

/// Replace every `{{key}}` in `template`
fn substitute_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{key}}}}}");
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("output_dir".to_string(), "dist".to_string()),
            ("library".to_string(), "widgets".to_string()),
            ("evil".to_string(), "; rm -rf /".to_string()),
        ])
    }

    #[test]
    fn test_parse_splits_quoted_arguments() {
        let command = Command::parse(
            r#"./node_modules/.bin/webpack --json --output-path "{{output_dir}}/out dir""#,
            &vars(),
        )
        .unwrap();

        assert_eq!(command.program, "./node_modules/.bin/webpack");
        assert_eq!(command.args, vec!["--json", "--output-path", "dist/out dir"]);
        assert_eq!(command.working_dir, None);
    }

    #[test]
    fn test_substituted_values_stay_literal_arguments() {
        let command = Command::parse("echo {{evil}}", &vars()).unwrap();
        assert_eq!(command.args, vec!["; rm -rf /"]);
    }

    #[test]
    fn test_parse_rejects_empty_and_unbalanced_lines() {
        assert!(matches!(
            Command::parse("   ", &vars()),
            Err(ExecutionError::InvalidSpec(_))
        ));
        assert!(matches!(
            Command::parse("echo \"unterminated", &vars()),
            Err(ExecutionError::InvalidSpec(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_output_and_exit_code() {
        let ok = Command::parse("sh -c 'echo built; echo warn >&2'", &vars())
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.stdout.trim(), "built");
        assert_eq!(ok.stderr.trim(), "warn");

        let failed = Command::parse("sh -c 'exit 3'", &vars())
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_feeds_stdin() {
        let result = Command::parse("cat", &vars())
            .unwrap()
            .execute_with(Some(b"{\"props\":{}}"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(result.stdout, "{\"props\":{}}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_stdin_round_trips_through_streaming_process() {
        let input = "x".repeat(2 * 1024 * 1024);
        let result = tokio::time::timeout(
            Duration::from_secs(20),
            Command::parse("cat", &vars())
                .unwrap()
                .execute_with(Some(input.as_bytes()), Some(Duration::from_secs(10))),
        )
        .await
        .expect("exchange should finish within its own timeout")
        .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.len(), input.len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_covers_unread_stdin() {
        let input = vec![b'x'; 1024 * 1024];
        let err = tokio::time::timeout(
            Duration::from_secs(10),
            Command::parse("sleep 5", &vars())
                .unwrap()
                .execute_with(Some(&input), Some(Duration::from_millis(200))),
        )
        .await
        .expect("exchange should finish within its own timeout")
        .unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_times_out() {
        let err = Command::parse("sleep 5", &vars())
            .unwrap()
            .execute_with(None, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = Command::parse("definitely-not-a-real-program-xyz", &vars())
            .unwrap()
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::ProcessSpawn { .. }));
    }
}
