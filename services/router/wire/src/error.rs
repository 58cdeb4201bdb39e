//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
///
/// Every variant is a flavor of "malformed message": callers at the inbound
/// boundary log it at debug level and drop the input.
#[derive(Error, Debug)]
pub enum WireError {
    /// Incomplete frame (need more data)
    #[error("incomplete frame")]
    Incomplete,

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Unknown message type
    #[error("unknown type {0}")]
    UnknownType(String),

    /// A required envelope or header field is missing
    #[error("missing field {0}")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Structurally invalid input (not an object, bad encoding, ...)
    #[error("malformed message: {0}")]
    Malformed(String),

    /// JSON (de)serialization failure
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl WireError {
    /// Shorthand for an [`WireError::InvalidField`]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        WireError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
