use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::{
    auth::services::AccountError,
    error::{ApiError, ApiErrorKind},
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id echoed back in error bodies.
#[derive(Debug, Clone, Default)]
pub struct RequestId(pub Option<String>);

impl RequestId {
    pub fn fail(&self, err: AccountError) -> ApiError {
        ApiError::new(ApiErrorKind::Account(err), self.0.clone())
    }

    pub fn unprocessable(&self) -> ApiError {
        ApiError::new(ApiErrorKind::Unprocessable, self.0.clone())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Ok(RequestId(id))
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let token = header
            .strip_prefix("Bearer ")
            .filter(|t| !t.is_empty() && !t.contains(' '))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(BearerToken(token.to_owned()))
    }
}
