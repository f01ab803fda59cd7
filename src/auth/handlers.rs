use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{ActivateRequest, LoginRequest, RegisterRequest},
        extractors::{BearerToken, RequestId},
        repo_types::PublicUser,
        services::AccountError,
    },
    error::ApiError,
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/activate", post(activate))
        .route("/", get(list_users))
}

pub fn internal_routes() -> Router<AppState> {
    Router::new()
        .route("/authorize", get(authorize))
        .route("/authorize/", get(authorize))
}

fn bearer(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {value}")).ok()
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "unmarshaling register body");
        request_id.unprocessable()
    })?;

    state
        .accounts
        .register(&payload.email, &payload.password)
        .await
        .map_err(|e| request_id.fail(e))?;

    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap), ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "unmarshaling login body");
        request_id.unprocessable()
    })?;

    let token = state
        .accounts
        .login(&payload.email, &payload.password)
        .await
        .map_err(|e| request_id.fail(e))?;

    let value = bearer(&token)
        .ok_or_else(|| request_id.fail(AccountError::Internal("token header".into())))?;
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);

    Ok((StatusCode::NO_CONTENT, headers))
}

#[instrument(skip_all)]
pub async fn activate(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "unmarshaling activate body");
        request_id.unprocessable()
    })?;

    state
        .accounts
        .activate(&payload.email, &payload.code)
        .await
        .map_err(|e| request_id.fail(e))?;

    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    request_id: RequestId,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = state
        .accounts
        .list_users()
        .await
        .map_err(|e| request_id.fail(e))?;
    Ok(Json(users))
}

/// Trusted-network check: 200 with the assertion re-emitted, or a bare 401.
#[instrument(skip_all)]
pub async fn authorize(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<(StatusCode, HeaderMap), StatusCode> {
    let assertion = state
        .accounts
        .authorize(&token)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let value = bearer(&assertion).ok_or(StatusCode::UNAUTHORIZED)?;
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok((StatusCode::OK, headers))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, Response},
        Router,
    };
    use tower::ServiceExt;

    use crate::{app, state::AppState};

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-request-id", "req-42")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_body(res: Response<Body>) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn bearer_of(res: &Response<Body>) -> String {
        res.headers()["authorization"]
            .to_str()
            .unwrap()
            .strip_prefix("Bearer ")
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn full_lifecycle_over_http() {
        let (state, users) = AppState::fake();
        let public = app::public_app(state.clone());
        let internal = app::internal_app(state);

        let res = send(
            &public,
            json_request("/register", r#"{"email":"kim@example.com","password":"pw-kim"}"#),
        )
        .await;
        assert_eq!(res.status(), 204);

        let code = users.get("kim@example.com").unwrap().activation_code;
        let res = send(
            &public,
            json_request(
                "/activate",
                &format!(r#"{{"email":"kim@example.com","code":"{code}"}}"#),
            ),
        )
        .await;
        assert_eq!(res.status(), 204);

        let res = send(
            &public,
            json_request("/login", r#"{"email":"kim@example.com","password":"pw-kim"}"#),
        )
        .await;
        assert_eq!(res.status(), 204);
        let token = bearer_of(&res);

        let req = Request::builder()
            .uri("/authorize")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let res = send(&internal, req).await;
        assert_eq!(res.status(), 200);
        let assertion = bearer_of(&res);
        assert!(!assertion.is_empty());
        assert_ne!(assertion, token);

        let res = send(
            &public,
            Request::builder().uri("/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(res.status(), 200);
        let list = json_body(res).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["email"], "kim@example.com");
        assert_eq!(list[0]["activated"], true);
        assert!(list[0].get("password_hash").is_none());
        assert!(list[0].get("activation_code").is_none());
    }

    #[tokio::test]
    async fn error_bodies_echo_request_id() {
        let (state, _) = AppState::fake();
        let public = app::public_app(state);

        let res = send(
            &public,
            json_request("/login", r#"{"email":"ghost@example.com","password":"x"}"#),
        )
        .await;
        assert_eq!(res.status(), 400);
        let body = json_body(res).await;
        assert_eq!(body["code"], "invalid_user_or_password");
        assert_eq!(body["status"], 400);
        assert_eq!(body["request_id"], "req-42");
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_client_error() {
        let (state, _) = AppState::fake();
        let public = app::public_app(state);
        let body = r#"{"email":"lee@example.com","password":"pw"}"#;

        assert_eq!(send(&public, json_request("/register", body)).await.status(), 204);
        let res = send(&public, json_request("/register", body)).await;
        assert!(res.status().is_client_error());
        assert_eq!(json_body(res).await["code"], "email_taken");
    }

    #[tokio::test]
    async fn bad_activation_code_is_400() {
        let (state, _) = AppState::fake();
        let public = app::public_app(state);
        let res = send(
            &public,
            json_request("/activate", r#"{"email":"x@example.com","code":"ffffffffffffffff"}"#),
        )
        .await;
        assert_eq!(res.status(), 400);
        assert_eq!(json_body(res).await["code"], "invalid_activation_code");
    }

    #[tokio::test]
    async fn malformed_body_is_unprocessable() {
        let (state, _) = AppState::fake();
        let public = app::public_app(state);
        let res = send(&public, json_request("/register", "{not json")).await;
        assert_eq!(res.status(), 422);
        assert_eq!(json_body(res).await["code"], "unprocessable");
    }

    #[tokio::test]
    async fn authorize_requires_bearer_header() {
        let (state, _) = AppState::fake();
        let internal = app::internal_app(state);

        let unknown = format!("Bearer {}", "ab".repeat(24));
        for header in [None, Some("Basic abc"), Some("Bearer "), Some(unknown.as_str())] {
            let mut req = Request::builder().uri("/authorize");
            if let Some(h) = header {
                req = req.header("authorization", h);
            }
            let res = send(&internal, req.body(Body::empty()).unwrap()).await;
            assert_eq!(res.status(), 401, "{header:?}");
        }
    }

    #[tokio::test]
    async fn internal_listener_serves_metrics() {
        let (state, _) = AppState::fake();
        let internal = app::internal_app(state.clone());
        let res = send(
            &internal,
            Request::builder().uri("/metricz").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(res.status(), 200);

        let public = app::public_app(state);
        let res = send(
            &public,
            Request::builder().uri("/metricz").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(res.status(), 404);
    }
}
