use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use svenn_core::config::DEFAULT_LOG_FILTER;
use svenn_core::SvennConfig;
use svenn_scheduler::Scheduler;
use svenn_units::UnitContext;
use tracing::{error, info};

mod app;
mod http;

#[derive(Debug, Parser)]
#[command(name = "svenn-gateway", version, about = "Svenn job scheduler and HTTP gateway")]
struct Cli {
    /// Path to svenn.toml (defaults to ~/.svenn/svenn.toml).
    #[arg(long, env = "SVENN_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = SvennConfig::load(cli.config.as_deref());

    let filter = loaded
        .as_ref()
        .map(|c| c.logging.filter.clone())
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    // a broken config file is fatal; a missing one already yields defaults
    let config = loaded.inspect_err(|e| error!("{e}"))?;

    // validate store configuration up front rather than on the first run
    let unit_ctx = UnitContext::new(config.stores.clone())
        .with_batch_size(config.scheduler.default_batch_size);
    unit_ctx.connection_manager()?;
    info!(stores = config.stores.len(), "store configuration ok");

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    svenn_scheduler::db::init_db(&db)?;
    info!("database migrations complete");

    let units = svenn_units::builtin();
    info!(units = units.len(), "processing units registered");

    let scheduler = Scheduler::new(db, units, unit_ctx, config.scheduler.clone())?;
    scheduler.start()?;

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, Arc::clone(&scheduler)));
    let router = app::build_router(state);

    info!("Svenn gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
