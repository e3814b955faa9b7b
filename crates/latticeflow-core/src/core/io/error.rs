use crate::core::models::collection::IntegrityError;
use crate::engine::task::Cancellation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error in line {line} of {context}: {reason}\nOffending line: \"{text}\"")]
    Parse {
        context: String,
        line: u64,
        text: String,
        reason: String,
    },

    #[error("Unexpected end of {context} after line {line}")]
    UnexpectedEof { context: String, line: u64 },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Unrecognized file format: {0}")]
    UnsupportedFormat(String),

    #[error("Operation canceled")]
    Canceled,
}

impl ImportError {
    pub fn parse(context: &str, line: u64, text: &str, reason: impl Into<String>) -> Self {
        ImportError::Parse {
            context: context.to_string(),
            line,
            text: text.trim_end().to_string(),
            reason: reason.into(),
        }
    }

    pub fn eof(context: &str, line: u64) -> Self {
        ImportError::UnexpectedEof {
            context: context.to_string(),
            line,
        }
    }
}

impl Cancellation for ImportError {
    fn is_cancellation(&self) -> bool {
        matches!(self, ImportError::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_line_context_and_text() {
        let err = ImportError::parse("LAMMPS dump file", 7, "1 1 abc 0 0\n", "invalid number");
        let message = err.to_string();
        assert!(message.contains("line 7 of LAMMPS dump file"));
        assert!(message.contains("\"1 1 abc 0 0\""));
    }

    #[test]
    fn only_canceled_counts_as_cancellation() {
        assert!(ImportError::Canceled.is_cancellation());
        assert!(!ImportError::Configuration("x".into()).is_cancellation());
    }
}
