use std::sync::Arc;

use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::session::MemorySession;
use crate::sync::SyncEngine;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<SyncEngine>,
    pub session: Arc<MemorySession>,
    pub clock: Arc<dyn Clock>,
}
