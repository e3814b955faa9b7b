use thiserror::Error;

use super::cna::AnalysisState;
use super::config::ConfigError;
use super::task::Cancellation;
use crate::core::io::error::ImportError;
use crate::core::models::collection::IntegrityError;
use crate::core::neighbors::NeighborError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Import failed: {source}")]
    Import {
        #[from]
        source: ImportError,
    },

    #[error("Neighbor search failed: {source}")]
    Neighbor {
        #[from]
        source: NeighborError,
    },

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Algorithmic limit exceeded ({limit}): {message}")]
    AlgorithmicLimit { limit: &'static str, message: String },

    #[error("Invalid analysis state transition from {from:?} to {to:?}")]
    InvalidTransition { from: AnalysisState, to: AnalysisState },

    #[error("Operation canceled")]
    Canceled,

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl From<ConfigError> for EngineError {
    fn from(error: ConfigError) -> Self {
        EngineError::Configuration(error.to_string())
    }
}

impl Cancellation for EngineError {
    fn is_cancellation(&self) -> bool {
        match self {
            EngineError::Canceled => true,
            EngineError::Import { source } => source.is_cancellation(),
            EngineError::Neighbor { source } => source.is_cancellation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_cancellations_are_recognized() {
        assert!(EngineError::from(ImportError::Canceled).is_cancellation());
        assert!(EngineError::from(NeighborError::Canceled).is_cancellation());
        assert!(!EngineError::from(NeighborError::Configuration("x".into())).is_cancellation());
    }

    #[test]
    fn limit_error_names_the_limit() {
        let err = EngineError::AlgorithmicLimit {
            limit: "common neighbors",
            message: "33 exceeds 32".into(),
        };
        assert!(err.to_string().contains("common neighbors"));
    }
}
