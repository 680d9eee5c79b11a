//! Canned command runner for unit tests.

use crate::command::{CommandLine, CommandRunner};
use crate::error::CommandExecutionError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&CommandLine) -> Option<Result<String, CommandExecutionError>> + Send + Sync>;

/// Answers commands from a list of responders; the first one returning `Some` wins.
/// Unmatched commands fail as if the binary did not exist.
#[derive(Default)]
pub struct StubRunner {
    responders: Vec<Responder>,
    calls: Mutex<Vec<CommandLine>>,
}

impl StubRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `output` to any command whose argv starts with `prefix`.
    pub fn reply(self, prefix: &[&str], output: &str) -> Self {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        let output = output.to_string();
        self.respond(move |command| {
            command.argv().starts_with(&prefix).then(|| Ok(output.clone()))
        })
    }

    pub fn respond(
        mut self,
        responder: impl Fn(&CommandLine) -> Option<Result<String, CommandExecutionError>> + Send + Sync + 'static,
    ) -> Self {
        self.responders.push(Box::new(responder));
        self
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for StubRunner {
    async fn execute(&self, command: &CommandLine, _timeout: Duration) -> Result<String, CommandExecutionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }
        self.responders
            .iter()
            .find_map(|responder| responder(command))
            .unwrap_or_else(|| {
                Err(CommandExecutionError::Spawn {
                    command: command.display(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                })
            })
    }
}
