use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lustre::api::rate_limit::spawn_cleanup_task;
use lustre::config::Config;
use lustre::notifications::MemoryMailer;
use lustre::AppState;

#[derive(Parser, Debug)]
#[command(name = "lustre")]
#[command(author, version, about = "Storefront API for a jewelry buy/rent marketplace", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "lustre.toml", env = "LUSTRE_CONFIG")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Use an in-memory database; verification emails are captured instead of sent
    /// unless SMTP is configured
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
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

    tracing::info!("Starting Lustre v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let db = if cli.ephemeral {
        tracing::warn!("Running with an in-memory database; data is lost on exit");
        lustre::db::init_in_memory().await?
    } else {
        lustre::db::init(&config.database).await?
    };

    let purged = lustre::db::purge_expired_sessions(&db).await?;
    if purged > 0 {
        tracing::info!("Removed {} expired sessions", purged);
    }

    // Create app state
    let mut state = AppState::new(config.clone(), db.clone());
    if cli.ephemeral && !config.email.is_configured() {
        state = state.with_mailer(Arc::new(MemoryMailer::new()));
    }
    let state = Arc::new(state);

    if config.rate_limit.enabled {
        spawn_cleanup_task(state.rate_limiter.clone());
    }

    let app = lustre::api::create_router(state);

    // Start API server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "Server error");
    }

    lustre::db::close(db).await;
    tracing::info!("Server stopped");
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
