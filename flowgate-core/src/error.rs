use thiserror::Error;

/// Every failure the value pipeline can surface.
///
/// The REST boundary maps these to status codes; nothing below it retries.
/// `Authorization` is passed through from the engine verbatim — the
/// pipeline never wraps or reinterprets it.
#[derive(Debug, Error)]
pub enum VariableError {
    /// Variable or its scope does not exist (either projection missing
    /// counts — partial dual reads are never returned).
    #[error("variable not found: {name}")]
    NotFound { name: String },

    /// Unrecognized wire tag, a non-JSON object upload, or a binary
    /// response requested for a non-binary value.
    #[error("unsupported value type: {detail}")]
    UnsupportedType { detail: String },

    /// One or more type names failed the deserialization allowlist.
    /// Carries the complete list, never just the first.
    #[error("deserialization of type(s) [{}] is not allowed", types.join(", "))]
    DeserializationRejected { types: Vec<String> },

    /// Engine-side permission failure, re-thrown unchanged.
    #[error("not authorized: {message}")]
    Authorization { message: String },

    /// Any other engine failure (including optimistic-locking conflicts),
    /// with the original message preserved for diagnostics.
    #[error("engine error: {message}")]
    Engine { message: String },

    /// Failure reading an upload or file content. A *null stored value*
    /// becomes an empty byte array elsewhere; a failed read is always hard.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl VariableError {
    pub fn not_found(name: impl Into<String>) -> Self {
        VariableError::NotFound { name: name.into() }
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        VariableError::UnsupportedType {
            detail: detail.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        VariableError::Engine {
            message: message.into(),
        }
    }
}
