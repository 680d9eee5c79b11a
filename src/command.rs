//! External command execution with a hard timeout

use crate::error::CommandExecutionError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

/// An argv-based command line with extra environment entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    args: Vec<String>,
    env: Vec<(String, String)>,
    redirect_error_stream: bool,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            args: vec![program.into()],
            env: Vec::new(),
            redirect_error_stream: false,
        }
    }

    /// Start from an already split command prefix, e.g. a discovered tool.
    pub fn from_parts(parts: &[String]) -> Self {
        Self {
            args: parts.to_vec(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Merge the error stream into the returned output instead of treating it as failure.
    pub fn redirect_error_stream(mut self, redirect: bool) -> Self {
        self.redirect_error_stream = redirect;
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }

    pub fn environment(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn redirects_error_stream(&self) -> bool {
        self.redirect_error_stream
    }

    pub fn display(&self) -> String {
        self.args.join(" ")
    }
}

/// Runs external commands. Implemented by [`CommandExecutor`]; tests substitute
/// canned output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and return its standard output.
    ///
    /// Fails when the command cannot be started, when it outlives `timeout`
    /// (the process is killed), or when it writes to its error stream without
    /// producing any standard output.
    async fn execute(&self, command: &CommandLine, timeout: Duration) -> Result<String, CommandExecutionError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

#[async_trait]
impl CommandRunner for CommandExecutor {
    async fn execute(&self, command: &CommandLine, timeout: Duration) -> Result<String, CommandExecutionError> {
        let (program, args) = command.argv().split_first().ok_or(CommandExecutionError::EmptyCommand)?;
        let command_line = command.display();
        debug!("Executing: {}", command_line);

        let mut child = Command::new(program)
            .args(args)
            .envs(command.environment().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandExecutionError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both pipes are drained while waiting so a chatty process cannot block on a full pipe.
        let outcome = {
            let collect = async {
                let (out, err, status) = tokio::join!(read_stream(stdout), read_stream(stderr), child.wait());
                Ok::<_, std::io::Error>((out?, err?, status?))
            };
            tokio::time::timeout(timeout, collect).await
        };

        let (stdout, stderr, status) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill timed out command '{}': {}", command_line, e);
                }
                return Err(CommandExecutionError::Timeout {
                    command: command_line,
                    timeout,
                });
            }
        };
        debug!("Command '{}' finished with {}", command_line, status);

        let mut output = String::from_utf8_lossy(&stdout).into_owned();
        let error_output = String::from_utf8_lossy(&stderr).into_owned();

        if command.redirects_error_stream() {
            output.push_str(&error_output);
        } else if !error_output.trim().is_empty() && output.is_empty() {
            return Err(CommandExecutionError::ErrorOutput {
                command: command_line,
                output: error_output,
            });
        }

        Ok(output)
    }
}
