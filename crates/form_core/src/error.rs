use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("position {position} out of range for list of length {len}")]
    OutOfRange { position: usize, len: usize },
    #[error("malformed identifier '{identifier}': {reason}")]
    MalformedIdentifier { identifier: String, reason: String },
    #[error("fragment fetch failed: {0}")]
    FetchFailed(String),
    #[error("fragment render failed: {0}")]
    RenderFailed(String),
    #[error("a fragment fetch is already pending for this list")]
    Busy,
    #[error("list is full ({max} items)")]
    Capacity { max: usize },
    #[error("invalid input: {0}")]
    Validation(String),
}

impl ListError {
    pub(crate) fn malformed(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ListError::OutOfRange { .. } => ErrorCode::OutOfRange,
            ListError::MalformedIdentifier { .. } => ErrorCode::MalformedIdentifier,
            ListError::FetchFailed(_) => ErrorCode::FetchFailed,
            ListError::RenderFailed(_) => ErrorCode::RenderFailed,
            ListError::Busy => ErrorCode::Busy,
            ListError::Capacity { .. } => ErrorCode::Capacity,
            ListError::Validation(_) => ErrorCode::Validation,
        }
    }
}

impl From<ListError> for ApiError {
    fn from(value: ListError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

pub type ListResult<T> = Result<T, ListError>;
