use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::services::AccountError;

/// Body of every user-facing 4xx/5xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    Account(AccountError),
    /// The request body could not be decoded.
    Unprocessable,
}

/// HTTP error carrying the caller's correlation id.
#[derive(Debug)]
pub struct ApiError {
    kind: ApiErrorKind,
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, request_id: Option<String>) -> Self {
        Self { kind, request_id }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match &self.kind {
            ApiErrorKind::Unprocessable => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable",
                "Request could not be processed".into(),
            ),
            ApiErrorKind::Account(err) => match err {
                AccountError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
                }
                AccountError::Conflict => (
                    StatusCode::CONFLICT,
                    "email_taken",
                    "Email already registered".into(),
                ),
                AccountError::NotFoundOrExpired => (
                    StatusCode::BAD_REQUEST,
                    "invalid_activation_code",
                    "The activation code is invalid".into(),
                ),
                AccountError::InvalidCredentials => (
                    StatusCode::BAD_REQUEST,
                    "invalid_user_or_password",
                    "Invalid user or password".into(),
                ),
                AccountError::Unauthorized => (
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "Unauthorized".into(),
                ),
                AccountError::Internal(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "There was an internal error while processing the request".into(),
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ErrorResponse {
            status: status.as_u16(),
            code,
            message,
            request_id: self.request_id.unwrap_or_default(),
        };
        (status, Json(body)).into_response()
    }
}
