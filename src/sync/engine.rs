use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::conflict::{ResolvedAction, resolve};
use super::error::SyncError;
use crate::clock::Clock;
use crate::cursor::{CursorStore, SyncCursor};
use crate::models::{OwnerId, Task};
use crate::remote::RemoteEndpoint;
use crate::session::{AuthToken, SessionProvider};
use crate::store::{StoreError, TaskStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub owner: OwnerId,
    pub pushed: usize,
    pub pulled: usize,
    pub inserted: usize,
    pub overwritten: usize,
    pub discarded: usize,
    pub skipped: usize,
    /// Cursor value persisted by this pass.
    pub cursor: DateTime<Utc>,
}

/// Last known outcome of an owner's most recent pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Succeeded { report: SyncReport },
    Failed { error: String },
}

/// Runs one bidirectional pass per call: push local changes since the cursor,
/// pull remote changes since the same cursor, merge them last-write-wins, and
/// only then advance the cursor.
pub struct SyncEngine {
    store: Arc<dyn TaskStore>,
    remote: Arc<dyn RemoteEndpoint>,
    cursors: Arc<dyn CursorStore>,
    session: Arc<dyn SessionProvider>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashSet<OwnerId>>,
    statuses: Mutex<HashMap<OwnerId, watch::Sender<SyncStatus>>>,
}

struct InFlight<'a> {
    owners: &'a Mutex<HashSet<OwnerId>>,
    owner: OwnerId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.owner);
    }
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn TaskStore>,
        remote: Arc<dyn RemoteEndpoint>,
        cursors: Arc<dyn CursorStore>,
        session: Arc<dyn SessionProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            remote,
            cursors,
            session,
            clock,
            in_flight: Mutex::new(HashSet::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Status of `owner`'s passes. Other owners' passes never show up here.
    pub fn subscribe(&self, owner: OwnerId) -> watch::Receiver<SyncStatus> {
        self.status_sender(owner).subscribe()
    }

    pub fn status(&self, owner: OwnerId) -> SyncStatus {
        self.status_sender(owner).borrow().clone()
    }

    fn status_sender(&self, owner: OwnerId) -> watch::Sender<SyncStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(owner)
            .or_insert_with(|| watch::channel(SyncStatus::Idle).0)
            .clone()
    }

    /// Syncs the signed-in owner. Fails with `Unauthenticated` before touching
    /// the network or the cursor when there is no owner or token.
    pub async fn synchronize(&self) -> Result<SyncReport, SyncError> {
        let (Some(owner), Some(token)) = (
            self.session.current_owner_id().await,
            self.session.auth_token().await,
        ) else {
            warn!("sync requested without a signed-in session");
            return Err(SyncError::Unauthenticated);
        };

        self.synchronize_as(owner, &token).await
    }

    /// One pass for `owner`. A second call for the same owner while one is
    /// running returns `SyncInProgress` without doing anything.
    pub async fn synchronize_as(
        &self,
        owner: OwnerId,
        token: &AuthToken,
    ) -> Result<SyncReport, SyncError> {
        let Some(_guard) = self.begin(owner) else {
            debug!("sync for owner {} already in flight", owner);
            return Err(SyncError::SyncInProgress);
        };

        let status = self.status_sender(owner);
        status.send_replace(SyncStatus::Syncing);
        info!("Starting sync for owner {}", owner);

        let result = self.run_pass(owner, token).await;
        match &result {
            Ok(report) => {
                info!("Sync completed successfully: {:?}", report);
                status.send_replace(SyncStatus::Succeeded {
                    report: report.clone(),
                });
            }
            Err(e) => {
                warn!("Sync for owner {} failed: {}", owner, e);
                status.send_replace(SyncStatus::Failed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// Logout path: forgets the cursor so the next sign-in starts from scratch.
    pub async fn reset(&self, owner: OwnerId) -> Result<(), SyncError> {
        let Some(_guard) = self.begin(owner) else {
            return Err(SyncError::SyncInProgress);
        };
        self.cursors.clear(owner).await.map_err(SyncError::Cursor)?;
        self.status_sender(owner).send_replace(SyncStatus::Idle);
        info!("sync cursor cleared for owner {}", owner);
        Ok(())
    }

    pub async fn last_synced_at(&self, owner: OwnerId) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.cursors.get(owner).await.map_err(SyncError::Cursor)
    }

    /// Server-side latest change time for the signed-in owner.
    pub async fn remote_latest_time(&self) -> Result<DateTime<Utc>, SyncError> {
        let (Some(owner), Some(token)) = (
            self.session.current_owner_id().await,
            self.session.auth_token().await,
        ) else {
            return Err(SyncError::Unauthenticated);
        };
        self.remote
            .latest_time(owner, &token)
            .await
            .map_err(SyncError::PullFailed)
    }

    fn begin(&self, owner: OwnerId) -> Option<InFlight<'_>> {
        let mut owners = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !owners.insert(owner) {
            return None;
        }
        Some(InFlight {
            owners: &self.in_flight,
            owner,
        })
    }

    async fn run_pass(&self, owner: OwnerId, token: &AuthToken) -> Result<SyncReport, SyncError> {
        // Captured first so changes landing mid-pass stay after the new cursor.
        let pass_start = self.clock.now();

        let last_sync = self
            .cursors
            .get(owner)
            .await
            .map_err(SyncError::Cursor)?
            .unwrap_or_else(SyncCursor::epoch_minimum);

        let mut report = SyncReport {
            owner,
            pushed: 0,
            pulled: 0,
            inserted: 0,
            overwritten: 0,
            discarded: 0,
            skipped: 0,
            cursor: last_sync,
        };

        info!("Step 1: Pushing local changes since {}", last_sync.to_rfc3339());
        let local_changes = self.store.query_modified_since(owner, last_sync).await?;
        if !local_changes.is_empty() {
            self.remote
                .push(owner, token, &local_changes)
                .await
                .map_err(SyncError::PushFailed)?;
        }
        report.pushed = local_changes.len();
        info!("Pushed {} tasks", report.pushed);

        info!("Step 2: Pulling remote changes");
        let remote_changes = self
            .remote
            .pull(owner, token, last_sync)
            .await
            .map_err(SyncError::PullFailed)?;
        report.pulled = remote_changes.len();

        for remote in remote_changes {
            self.merge(owner, remote, &mut report).await?;
        }
        info!(
            "Pulled {} tasks: {} inserted, {} overwritten, {} discarded (local newer or equal)",
            report.pulled, report.inserted, report.overwritten, report.discarded
        );

        let next = pass_start.max(last_sync);
        self.cursors
            .set(owner, next)
            .await
            .map_err(SyncError::Cursor)?;
        report.cursor = next;

        Ok(report)
    }

    async fn merge(
        &self,
        owner: OwnerId,
        remote: Task,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if remote.owner_id != owner {
            warn!(
                "Skipping pulled task {} owned by {} (syncing {})",
                remote.id, remote.owner_id, owner
            );
            report.skipped += 1;
            return Ok(());
        }

        // Local edits may land between this read and the write below, so the
        // write itself re-checks the timestamp.
        let local = self.store.get_by_id(remote.id).await?;
        let applied = match resolve(local.as_ref(), &remote) {
            ResolvedAction::Insert => match self.store.insert(&remote).await {
                Ok(()) => {
                    report.inserted += 1;
                    return Ok(());
                }
                Err(StoreError::AlreadyExists(_)) => {
                    self.store.overwrite_if_older(&remote).await?
                }
                Err(e) => return Err(e.into()),
            },
            ResolvedAction::Overwrite => self.store.overwrite_if_older(&remote).await?,
            ResolvedAction::Discard => false,
        };

        if applied {
            report.overwritten += 1;
        } else {
            debug!("keeping local version of task {}", remote.id);
            report.discarded += 1;
        }
        Ok(())
    }
}
