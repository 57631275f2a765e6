use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quicktodo_sync::api::router;
use quicktodo_sync::clock::{Clock, SystemClock};
use quicktodo_sync::config::AppConfig;
use quicktodo_sync::cursor::SqliteCursorStore;
use quicktodo_sync::db::{self, SqliteTaskStore};
use quicktodo_sync::remote::HttpRemoteEndpoint;
use quicktodo_sync::session::MemorySession;
use quicktodo_sync::state::AppState;
use quicktodo_sync::sync::{SyncEngine, SyncError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "quicktodo_sync=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;

    let prefs = db::connect(&config.prefs_database_url).await?;
    let cursors = SqliteCursorStore::new(prefs).await?;

    let session = Arc::new(match config.session.clone() {
        Some((owner, token)) => {
            info!("restored session for owner {}", owner);
            MemorySession::signed_in(owner, token)
        }
        None => MemorySession::new(),
    });
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let remote = HttpRemoteEndpoint::new(config.remote.clone())?;

    let engine = Arc::new(SyncEngine::new(
        Arc::new(SqliteTaskStore::new(pool.clone())),
        Arc::new(remote),
        Arc::new(cursors),
        session.clone(),
        clock.clone(),
    ));

    let state = AppState {
        db: pool,
        engine: engine.clone(),
        session,
        clock,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Going to the background is the natural sync point.
    match engine.synchronize().await {
        Ok(report) => info!("final sync: pushed {}, pulled {}", report.pushed, report.pulled),
        Err(SyncError::Unauthenticated) => info!("final sync skipped: not signed in"),
        Err(e) => warn!("final sync failed: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
    }
    info!("shutdown requested");
}
