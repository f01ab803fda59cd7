use serde::Deserialize;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for account activation.
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub email: String,
    pub code: String,
}
