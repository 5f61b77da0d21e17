mod accounts;
mod app;
mod artifacts;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod state;
mod storage;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "cvhub=debug,axum=info,tower_http=info".to_string());
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

    let config = AppConfig::from_env()?;
    let app_state = AppState::init(config).await?;
    tracing::info!(
        database = %app_state.config.database_url,
        uploads = %app_state.config.upload_dir.display(),
        "storage ready"
    );

    // Nothing is listening yet, so no upload can be caught between its
    // store and pointer steps.
    if app_state.config.sweep_orphans_on_start {
        let removed = accounts::services::sweep_orphans(&app_state).await?;
        tracing::info!(removed, "startup orphan sweep done");
    }

    let host = app_state.config.host.clone();
    let port = app_state.config.port;
    let db = app_state.db.clone();

    app::serve(app::build_app(app_state), &host, port).await?;

    db.close().await;
    Ok(())
}
