use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutordesk::config::Config;
use tutordesk::engine::expiry::spawn_expiry_task;
use tutordesk::gateway::{CashfreeGateway, GatewayError, PaymentGateway, UnconfiguredGateway};
use tutordesk::AppState;

#[derive(Parser, Debug)]
#[command(name = "tutordesk")]
#[command(author, version, about = "Session booking and payment backend for tutoring marketplaces", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tutordesk.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting tutordesk v{}", env!("CARGO_PKG_VERSION"));

    tutordesk::util::ensure_dir(&config.server.data_dir)?;

    let db = tutordesk::db::init(&config.server.data_dir).await?;

    let gateway: Arc<dyn PaymentGateway> = match CashfreeGateway::from_config(&config.payments) {
        Ok(gateway) => Arc::new(gateway),
        Err(GatewayError::NotConfigured) => {
            tracing::warn!(
                "Payment gateway credentials not configured; payment verification will fail"
            );
            Arc::new(UnconfiguredGateway)
        }
        Err(e) => return Err(e.into()),
    };

    let metrics_handle = tutordesk::api::metrics::init_metrics();

    let state = Arc::new(
        AppState::new(config.clone(), db.clone(), gateway).with_metrics(metrics_handle),
    );

    if config.sweeper.enabled {
        spawn_expiry_task(db.clone(), config.sweeper.clone());
    }

    let app = tutordesk::api::create_router(state.clone());

    let api_addr = format!("{}:{}", config.server.host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;

    tracing::info!("API server listening on http://{}", api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    // Confirmation workers stop between retry attempts
    state.shutdown.cancel();
}
