use std::net::SocketAddr;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, health, state::AppState, telemetry};

/// Registration, activation, login and listing.
pub fn public_app(state: AppState) -> Router {
    with_tracing("public", auth::public_router().with_state(state))
        .layer(CorsLayer::permissive())
}

/// Token authorization, health and metrics; meant for the trusted network only.
pub fn internal_app(state: AppState) -> Router {
    with_tracing(
        "internal",
        auth::internal_router()
            .merge(health::health_routes())
            .merge(telemetry::metrics_routes())
            .with_state(state),
    )
}

fn with_tracing(listener: &'static str, router: Router) -> Router {
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
            })
            .on_response(
                move |res: &axum::http::Response<_>,
                      latency: std::time::Duration,
                      span: &tracing::Span| {
                    let status = res.status();
                    metrics::histogram!(telemetry::HTTP_REQUEST_DURATION, "listener" => listener)
                        .record(latency.as_secs_f64());
                    span.record("status", tracing::field::display(status));
                    if status.is_server_error() {
                        tracing::error!(%status, "response");
                    } else {
                        tracing::info!(%status, "response");
                    }
                },
            ),
    )
}

pub async fn serve(name: &'static str, addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    tracing::info!(listener = name, "listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!(listener = name, "stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("terminating");
}
