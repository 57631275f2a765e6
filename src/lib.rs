//! Local-first task store with incremental two-way sync against a remote server.

pub mod api;
pub mod clock;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod session;
pub mod state;
pub mod store;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cursor::{CursorStore, MemoryCursorStore, SqliteCursorStore, SyncCursor};
pub use models::{NewTaskRequest, OwnerId, Priority, Task, TaskId, UpdateTaskRequest};
pub use remote::{HttpRemoteEndpoint, InMemoryRemote, RemoteConfig, RemoteEndpoint, RemoteError};
pub use session::{AuthToken, MemorySession, SessionProvider};
pub use store::{MemoryTaskStore, StoreError, TaskStore};
pub use sync::{ResolvedAction, SyncEngine, SyncError, SyncReport, SyncStatus, resolve};
