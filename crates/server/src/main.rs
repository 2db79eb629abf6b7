mod api;
mod bootstrap;
mod health;
mod sessions;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tabletalk_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tabletalk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Now bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        Arc::clone(&app.schema),
    )
    .await?;

    let api_router = api::router(api::ApiState {
        router: Arc::clone(&app.router),
        sessions: Arc::clone(&app.sessions),
    });

    let address =
        format!("{}:{}", app.config.server.bind_address, app.config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "tabletalk-server accepting queries"
    );

    let drain_budget = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let server = axum::serve(listener, api_router).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!(
            event_name = "server.draining",
            correlation_id = "shutdown",
            "shutdown signal received; draining in-flight requests"
        );
    });

    // In-flight requests get the configured drain window after the signal,
    // then remaining connections are dropped.
    let forced_stop = async {
        let _ = tokio::signal::ctrl_c().await;
        tokio::time::sleep(drain_budget).await;
    };

    tokio::select! {
        served = server => served?,
        _ = forced_stop => {
            tracing::warn!(
                event_name = "server.drain_timeout",
                correlation_id = "shutdown",
                drain_budget_secs = drain_budget.as_secs(),
                "drain window elapsed; closing remaining connections"
            );
        }
    }

    app.db_pool.close().await;
    tracing::info!(
        event_name = "server.stopped",
        correlation_id = "shutdown",
        "tabletalk-server stopped"
    );

    Ok(())
}
