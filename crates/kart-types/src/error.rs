use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidIdentifier {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown build field: {0}")]
    UnknownField(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
