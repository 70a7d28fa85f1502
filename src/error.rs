//! Failures raised by the remote resource client and the mutation path.
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No bearer token available, or the backend rejected it.
    #[error("not authenticated")]
    Unauthorized,
    #[error("backend error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to reach backend: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid backend response: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Map a non-success status to a typed failure.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ApiError::Unauthorized
        } else {
            ApiError::Status { status, body }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err)
        }
    }
}

/// A failed local mutation, naming the action the user attempted.
#[derive(Debug, Error)]
#[error("failed to {action}: {source}")]
pub struct MutationError {
    pub action: &'static str,
    #[source]
    pub source: ApiError,
}

impl MutationError {
    pub fn new(action: &'static str, source: ApiError) -> Self {
        Self { action, source }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.source.is_unauthorized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_map_to_unauthorized() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, String::new()).is_unauthorized());
        assert!(ApiError::from_status(StatusCode::FORBIDDEN, String::new()).is_unauthorized());
        let err = ApiError::from_status(StatusCode::NOT_FOUND, "missing".into());
        assert!(matches!(err, ApiError::Status { status, .. } if status == StatusCode::NOT_FOUND));
    }

    #[test]
    fn mutation_error_names_action() {
        let err = MutationError::new("create quote", ApiError::Unauthorized);
        assert_eq!(err.to_string(), "failed to create quote: not authenticated");
        assert!(err.is_unauthorized());
    }
}
