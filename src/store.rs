//! Record store contract consumed by the sync engine.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{OwnerId, Task, TaskId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Durable keyed storage of tasks.
///
/// `insert` and `update` persist `last_modified` exactly as given; a store
/// must never stamp its own time.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Every task of `owner` with `last_modified > since`, tombstones included.
    async fn query_modified_since(
        &self,
        owner: OwnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError>;

    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    async fn insert(&self, task: &Task) -> Result<(), StoreError>;

    async fn update(&self, task: &Task) -> Result<(), StoreError>;

    /// Replaces the stored copy only while it is still older than `task`.
    ///
    /// Check and write happen atomically, so a local edit that lands after
    /// the caller read the record is never clobbered. Returns whether the
    /// write happened.
    async fn overwrite_if_older(&self, task: &Task) -> Result<bool, StoreError>;
}

/// Map-backed store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let store = Self::new();
        {
            let mut map = store.tasks.write().await;
            for task in tasks {
                map.insert(task.id, task);
            }
        }
        store
    }

    pub async fn snapshot(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn query_modified_since(
        &self,
        owner: OwnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut changed: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.owner_id == owner && t.last_modified > since)
            .cloned()
            .collect();
        changed.sort_by_key(|t| t.last_modified);
        Ok(changed)
    }

    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(task.id)),
        }
    }

    async fn overwrite_if_older(&self, task: &Task) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) if existing.last_modified < task.last_modified => {
                *existing = task.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(task.id)),
        }
    }
}
