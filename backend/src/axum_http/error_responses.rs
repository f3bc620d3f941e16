use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

/// Implemented by every use-case error so handlers can bubble them with `?`.
pub trait UseCaseError: std::error::Error {
    fn status_code(&self) -> StatusCode;

    fn code(&self) -> Option<&'static str> {
        None
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                code: None,
            },
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.body.code = Some(code);
        self
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl<E> From<E> for ApiError
where
    E: UseCaseError,
{
    fn from(err: E) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            // Don't leak internal error detail to client
            error!(status = status.as_u16(), error = %err, "request failed");
            return Self::new(status, "Internal server error");
        }
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                code: err.code(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum SampleError {
        #[error("Daily limit reached (3/day).")]
        Limited,
        #[error("database exploded")]
        Internal,
    }

    impl UseCaseError for SampleError {
        fn status_code(&self) -> StatusCode {
            match self {
                SampleError::Limited => StatusCode::TOO_MANY_REQUESTS,
                SampleError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }

        fn code(&self) -> Option<&'static str> {
            matches!(self, SampleError::Limited).then_some("DAILY_LIMIT")
        }
    }

    #[test]
    fn client_errors_keep_message_and_code() {
        let api_error = ApiError::from(SampleError::Limited);
        assert_eq!(api_error.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(api_error.body.error, "Daily limit reached (3/day).");
        assert_eq!(api_error.body.code, Some("DAILY_LIMIT"));
    }

    #[test]
    fn server_errors_hide_details() {
        let api_error = ApiError::from(SampleError::Internal);
        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_error.body.error, "Internal server error");
        assert_eq!(api_error.body.code, None);
    }
}
