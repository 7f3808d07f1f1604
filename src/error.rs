use thiserror::Error;

use crate::object::ValidationError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Finder options were given as something other than a mapping.
    #[error("Finder options must be a mapping, got {0}")]
    InvalidOptionsType(&'static str),

    #[error("Invalid value for option `{key}`: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("Invalid identifier for `{field}`: {value:?}")]
    InvalidIdentifier { field: String, value: String },

    /// `last` was asked for without any sort to reverse.
    #[error("Cannot resolve the last document without a sort order")]
    AmbiguousOrdering,

    #[error("`{0}` is not a composable scope")]
    NotComposable(String),

    #[error("Document not found in {collection} with criteria {criteria}")]
    DocumentNotFound { collection: String, criteria: String },

    #[error("Document invalid: {0}")]
    DocumentInvalid(ValidationError),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Type mismatch")]
    TypeMismatch,
}

impl Error {
    pub(crate) fn invalid_option(key: &str, reason: impl Into<String>) -> Self {
        Error::InvalidOption {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
