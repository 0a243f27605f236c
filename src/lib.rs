pub mod api;
pub mod config;
pub mod core_state;
pub mod distribution;
pub mod job;
pub mod models;
pub mod pipeline;
pub mod publish;
pub mod store;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = match config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config)) {
        tracing::error!(error = %e, "{} exited with error", config::APP_NAME);
        std::process::exit(1);
    }
}

/// Start the scheduler and HTTP server, then wait for Ctrl-C.
async fn serve(config: config::AppConfig) -> Result<(), String> {
    let cron_expr = config.server.cron_schedule.clone();
    let schedule = cron_expr
        .as_deref()
        .map(job::parse_schedule)
        .transpose()
        .map_err(|e| e.to_string())?;
    let port = config.server.port;

    let core = Arc::new(core_state::CoreState::from_config(config));

    let scheduler = schedule.map(|schedule| {
        tracing::info!(cron = ?cron_expr, "Summary job scheduled");
        job::spawn_scheduler(core.job(), schedule)
    });
    if scheduler.is_none() {
        tracing::info!("CRON_SCHEDULE not set, summary runs on demand only");
    }

    let server = api::start_server(core.clone(), port).await?;
    tracing::info!(addr = %server.addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
    }
    if core.is_running() {
        tracing::warn!("Shutting down while a summary run is in flight");
    }
    tracing::info!("Shutting down");

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    server.shutdown().await;
    Ok(())
}
