#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Notify;

use quicktodo_sync::{
    AuthToken, Clock, CursorStore, InMemoryRemote, ManualClock, MemoryCursorStore,
    MemorySession, MemoryTaskStore, NewTaskRequest, OwnerId, Priority, RemoteEndpoint,
    RemoteError, SyncEngine, Task, TaskStore,
};

pub const TOKEN: &str = "device-token";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn token() -> AuthToken {
    AuthToken::new(TOKEN).unwrap()
}

pub fn task(owner: OwnerId, title: &str, modified: DateTime<Utc>) -> Task {
    Task::new(
        owner,
        NewTaskRequest {
            title: title.to_string(),
            description: Some(format!("{} details", title)),
            due_at: t0() + Duration::days(2),
            priority: Some(Priority::Low),
            tag: "errands".to_string(),
        },
        modified,
    )
}

/// One client: its own store and cursor, sharing a server and a clock with others.
pub struct Device {
    pub owner: OwnerId,
    pub store: Arc<MemoryTaskStore>,
    pub cursors: Arc<MemoryCursorStore>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<SyncEngine>,
}

impl Device {
    pub async fn new(
        owner: OwnerId,
        remote: Arc<dyn RemoteEndpoint>,
        clock: Arc<ManualClock>,
        tasks: Vec<Task>,
    ) -> Self {
        let store = Arc::new(MemoryTaskStore::with_tasks(tasks).await);
        let cursors = Arc::new(MemoryCursorStore::new());
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            remote,
            cursors.clone(),
            Arc::new(MemorySession::signed_in(owner, token())),
            clock.clone(),
        ));
        Self {
            owner,
            store,
            cursors,
            clock,
            engine,
        }
    }

    pub async fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursors.get(self.owner).await.unwrap()
    }

    /// Local UI mutation: stamps `last_modified` from the shared clock.
    pub async fn edit(&self, id: quicktodo_sync::TaskId, f: impl FnOnce(&mut Task, DateTime<Utc>)) {
        let mut current = self.store.get_by_id(id).await.unwrap().expect("task exists");
        f(&mut current, self.clock.now());
        self.store.update(&current).await.unwrap();
    }
}

pub fn server(clock: Arc<ManualClock>) -> Arc<InMemoryRemote> {
    Arc::new(InMemoryRemote::new(clock).with_token(TOKEN))
}

/// Pull answers with a fixed list; pushes and pull windows are recorded.
pub struct ScriptedRemote {
    pub pull_result: Vec<Task>,
    pub pushed: Mutex<Vec<Vec<Task>>>,
    pub pulled_since: Mutex<Vec<DateTime<Utc>>>,
}

impl ScriptedRemote {
    pub fn new(pull_result: Vec<Task>) -> Self {
        Self {
            pull_result,
            pushed: Mutex::new(Vec::new()),
            pulled_since: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RemoteEndpoint for ScriptedRemote {
    async fn pull(
        &self,
        _owner: OwnerId,
        _token: &AuthToken,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, RemoteError> {
        self.pulled_since.lock().unwrap().push(since);
        Ok(self.pull_result.clone())
    }

    async fn push(
        &self,
        _owner: OwnerId,
        _token: &AuthToken,
        changes: &[Task],
    ) -> Result<(), RemoteError> {
        self.pushed.lock().unwrap().push(changes.to_vec());
        Ok(())
    }

    async fn latest_time(
        &self,
        _owner: OwnerId,
        _token: &AuthToken,
    ) -> Result<DateTime<Utc>, RemoteError> {
        Ok(t0())
    }
}

/// Holds every pull for `gated_owner` until `release` is notified.
pub struct GatedRemote {
    pub inner: Arc<InMemoryRemote>,
    pub gated_owner: OwnerId,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedRemote {
    pub fn new(inner: Arc<InMemoryRemote>, gated_owner: OwnerId) -> Self {
        Self {
            inner,
            gated_owner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl RemoteEndpoint for GatedRemote {
    async fn pull(
        &self,
        owner: OwnerId,
        token: &AuthToken,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, RemoteError> {
        if owner == self.gated_owner {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.pull(owner, token, since).await
    }

    async fn push(
        &self,
        owner: OwnerId,
        token: &AuthToken,
        changes: &[Task],
    ) -> Result<(), RemoteError> {
        self.inner.push(owner, token, changes).await
    }

    async fn latest_time(
        &self,
        owner: OwnerId,
        token: &AuthToken,
    ) -> Result<DateTime<Utc>, RemoteError> {
        self.inner.latest_time(owner, token).await
    }
}
