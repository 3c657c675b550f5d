use thiserror::Error;

/// Raised when a codec, model, or union rejects an input during
/// `decode`/`from` (§7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// §4.3 step 3: every union member was tried and none decoded.
    pub fn no_union_member_decoded() -> Self {
        Self::new("Couldn't decode using any of the provided union types.")
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(value: serde_json::Error) -> Self {
        Self::new(value.to_string())
    }
}
