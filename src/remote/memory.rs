use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{RemoteEndpoint, RemoteError};
use crate::clock::Clock;
use crate::cursor::SyncCursor;
use crate::models::{OwnerId, Task, TaskId};
use crate::session::AuthToken;

#[derive(Debug, Clone)]
struct StoredTask {
    task: Task,
    /// Server time the current version was accepted; pull windows use this.
    accepted_at: DateTime<Utc>,
}

/// In-process sync server.
///
/// Pushes keep whichever version has the later `last_modified`. Failures can
/// be switched on to exercise the engine's abort paths.
pub struct InMemoryRemote {
    clock: Arc<dyn Clock>,
    token: Option<String>,
    tasks: Mutex<HashMap<TaskId, StoredTask>>,
    fail_push: AtomicBool,
    fail_pull: AtomicBool,
    push_calls: AtomicUsize,
    pull_calls: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            token: None,
            tasks: Mutex::new(HashMap::new()),
            fail_push: AtomicBool::new(false),
            fail_pull: AtomicBool::new(false),
            push_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
        }
    }

    /// Only accept requests carrying this bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Places a record on the server as if it had been written at its own `last_modified`.
    pub async fn seed(&self, task: Task) {
        let accepted_at = task.last_modified;
        self.tasks
            .lock()
            .await
            .insert(task.id, StoredTask { task, accepted_at });
    }

    pub async fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().await.get(&id).map(|s| s.task.clone())
    }

    pub async fn tasks_for(&self, owner: OwnerId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .await
            .values()
            .filter(|s| s.task.owner_id == owner)
            .map(|s| s.task.clone())
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::SeqCst);
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    fn authorize(&self, token: &AuthToken) -> Result<(), RemoteError> {
        match &self.token {
            Some(expected) if expected != token.as_str() => {
                Err(RemoteError::Unauthorized("invalid token".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteEndpoint for InMemoryRemote {
    async fn pull(
        &self,
        owner: OwnerId,
        token: &AuthToken,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, RemoteError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize(token)?;
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(RemoteError::Timeout);
        }

        let tasks = self.tasks.lock().await;
        let mut changed: Vec<&StoredTask> = tasks
            .values()
            .filter(|s| s.task.owner_id == owner && s.accepted_at > since)
            .collect();
        changed.sort_by_key(|s| s.accepted_at);
        Ok(changed.into_iter().map(|s| s.task.clone()).collect())
    }

    async fn push(
        &self,
        owner: OwnerId,
        token: &AuthToken,
        changes: &[Task],
    ) -> Result<(), RemoteError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize(token)?;
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected {
                status: 503,
                message: "push disabled".to_string(),
            });
        }
        if let Some(foreign) = changes.iter().find(|t| t.owner_id != owner) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: format!("task {} does not belong to owner {}", foreign.id, owner),
            });
        }

        let now = self.clock.now();
        let mut tasks = self.tasks.lock().await;
        for task in changes {
            let newer = tasks
                .get(&task.id)
                .is_none_or(|stored| task.last_modified > stored.task.last_modified);
            if newer {
                tasks.insert(
                    task.id,
                    StoredTask {
                        task: task.clone(),
                        accepted_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn latest_time(
        &self,
        owner: OwnerId,
        token: &AuthToken,
    ) -> Result<DateTime<Utc>, RemoteError> {
        self.authorize(token)?;
        Ok(self
            .tasks
            .lock()
            .await
            .values()
            .filter(|s| s.task.owner_id == owner)
            .map(|s| s.accepted_at)
            .max()
            .unwrap_or_else(SyncCursor::epoch_minimum))
    }
}
