use crate::utils::parser::ParseError;
use latticeflow::engine::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Import or analysis failure reported by the library.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid setting: {0}")]
    Config(String),

    #[error("Cannot use config file '{}': {source}", .path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid frame selection: {0}")]
    FrameSelection(#[from] ParseError),

    #[error("Failed to create log file '{}': {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start the '{task}' worker thread: {source}")]
    Worker {
        task: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write structure report '{}': {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to render column mapping: {0}")]
    MappingExport(#[from] toml::ser::Error),

    #[error("The '{0}' task was canceled")]
    Canceled(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
