use std::time::Duration;
use thiserror::Error;

/// Failure while running an external command.
#[derive(Error, Debug)]
pub enum CommandExecutionError {
    #[error("No command given")]
    EmptyCommand,

    #[error("Could not start command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' timed out after {timeout:?} and was killed")]
    Timeout { command: String, timeout: Duration },

    #[error("Command '{command}' reported an error: {output}")]
    ErrorOutput { command: String, output: String },

    #[error("IO error while running command: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while setting up the extraction components. These are not retried.
#[derive(Error, Debug)]
pub enum MediaProcessorError {
    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Error while looking for {tool}: {source}")]
    Discovery {
        tool: String,
        #[source]
        source: CommandExecutionError,
    },

    #[error("Could not prepare color map: {0}")]
    ColorMap(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while extracting one resource.
#[derive(Error, Debug)]
pub enum MediaExtractionError {
    #[error("Command execution failed: {0}")]
    Command(#[from] CommandExecutionError),

    #[error("Content unavailable: {0}")]
    ContentUnavailable(String),

    #[error("{message}; output was: {output}")]
    Parse { message: String, output: String },

    #[error("Unsupported mime type: {0}")]
    UnsupportedMimeType(String),

    #[error("Mime type checking error: {0}")]
    MimeDetection(#[source] std::io::Error),

    #[error("Download failed: {0}")]
    Download(#[source] std::io::Error),

    #[error("Processing failed: {0}")]
    ProcessingError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaExtractionError {
    pub fn parse(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            output: output.into(),
        }
    }
}

/// The single failure type surfaced by [`crate::MediaExtractor`].
#[derive(Error, Debug)]
#[error("Problem while processing {resource_url}: {cause}")]
pub struct ResourceExtractionError {
    pub resource_url: String,
    #[source]
    pub cause: MediaExtractionError,
}

pub type Result<T> = std::result::Result<T, MediaExtractionError>;
