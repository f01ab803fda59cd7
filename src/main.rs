mod app;
mod auth;
mod config;
mod error;
mod health;
mod state;
mod telemetry;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "identity=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let metrics = telemetry::setup_metrics()?;

    let config = AppConfig::from_env()?;
    tracing::info!("configuration loaded");

    let db = state::connect_db(&config).await?;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&db).await?;

    let public_addr = config.public_addr;
    let internal_addr = config.internal_addr;
    let sessions = state::connect_cache(&config).await?;
    let app_state = AppState::new(config, db, sessions, metrics);

    tokio::try_join!(
        app::serve("public", public_addr, app::public_app(app_state.clone())),
        app::serve("internal", internal_addr, app::internal_app(app_state)),
    )?;

    Ok(())
}
