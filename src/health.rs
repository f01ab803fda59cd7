use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cache: &'static str,
}

fn label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// GET /healthz - 200 when both store and cache answer within the deadline,
/// 502 otherwise.
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.accounts.probe(state.config.health_timeout).await;
    let status = if report.healthy() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    let body = HealthResponse {
        status: if report.healthy() { "healthy" } else { "unhealthy" },
        database: label(report.database),
        cache: label(report.cache),
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_with_in_memory_collaborators() {
        let (state, _) = AppState::fake();
        let (status, Json(body)) = healthz(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.database, "ok");
        assert_eq!(body.cache, "ok");
    }
}
