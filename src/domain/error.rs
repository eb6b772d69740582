use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Content that cannot be published as written.
    #[error("invalid content: {message}")]
    Validation { message: String },
    /// A unit that the catalog should never have produced.
    #[error("malformed content unit: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
