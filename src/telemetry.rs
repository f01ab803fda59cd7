//! Prometheus metrics served on the internal listener at `GET /metricz`.

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::{auth::services::AccountError, state::AppState};

pub const ACCOUNT_OPERATIONS: &str = "identity_account_operations_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Installs the global recorder and returns the handle that renders it.
pub fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    // Argon2 dominates register/login, so the upper buckets stay wide.
    let latency_buckets = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    metrics::describe_counter!(
        ACCOUNT_OPERATIONS,
        "Account operations by operation and outcome"
    );
    metrics::describe_histogram!(
        HTTP_REQUEST_DURATION,
        "HTTP request latency in seconds by listener"
    );

    Ok(handle)
}

/// Label for the result of an account operation.
pub fn outcome<T>(result: &Result<T, AccountError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(AccountError::Validation(_)) => "invalid_request",
        Err(AccountError::Conflict) => "conflict",
        Err(AccountError::NotFoundOrExpired) => "invalid_activation_code",
        Err(AccountError::InvalidCredentials) => "invalid_credentials",
        Err(AccountError::Unauthorized) => "unauthorized",
        Err(AccountError::Internal(_)) => "internal_error",
    }
}

pub fn record_operation<T>(operation: &'static str, result: &Result<T, AccountError>) {
    metrics::counter!(ACCOUNT_OPERATIONS, "operation" => operation, "outcome" => outcome(result))
        .increment(1);
}

pub fn metrics_routes() -> Router<AppState> {
    Router::new().route("/metricz", get(metricz))
}

async fn metricz(State(state): State<AppState>) -> String {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_are_counted_by_outcome() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_operation("login", &Ok::<(), AccountError>(()));
            record_operation("login", &Ok::<(), AccountError>(()));
            record_operation::<()>("login", &Err(AccountError::InvalidCredentials));
        });

        let rendered = handle.render();
        let ok_line = rendered
            .lines()
            .find(|l| {
                l.starts_with(ACCOUNT_OPERATIONS)
                    && l.contains(r#"operation="login""#)
                    && l.contains(r#"outcome="ok""#)
            })
            .expect("ok series rendered");
        assert!(ok_line.ends_with(" 2"), "{ok_line}");
        assert!(rendered.contains(r#"outcome="invalid_credentials""#));
    }

    #[test]
    fn internal_details_do_not_leak_into_labels() {
        let result: Result<(), _> = Err(AccountError::Internal("insert user".into()));
        assert_eq!(outcome(&result), "internal_error");
    }
}
