pub mod conflict;
pub mod engine;
pub mod error;

pub use conflict::{ResolvedAction, resolve};
pub use engine::{SyncEngine, SyncReport, SyncStatus};
pub use error::SyncError;
