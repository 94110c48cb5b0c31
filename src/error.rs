use thiserror::Error;

/// Caller-input errors. Any of these rejects the whole submission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("{0} is a required field")]
    MissingField(&'static str),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),
}

/// Outcome classes surfaced to the HTTP layer and CLI.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Invalid(#[from] SubmitError),

    #[error("Invalid request body: {0}")]
    Malformed(String),

    #[error("Website not found: {0}")]
    NotFound(i64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Storage(e.into())
    }
}

impl ApiError {
    /// True for errors caused by the caller's input rather than infrastructure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ApiError::Invalid(_) | ApiError::Malformed(_) | ApiError::NotFound(_)
        )
    }
}
