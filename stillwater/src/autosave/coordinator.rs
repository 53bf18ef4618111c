//! Performs draft writes and keeps local and remote identifiers in step.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::state::{SaveReport, SaveStatus};
use super::store::{DraftStore, SaveJob};
use crate::db::Gateway;
use crate::error::Result;
use crate::models::{DraftReceipt, OwnerId};

/// Result of a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// First write; the draft now has an id.
    Created(DraftReceipt),
    Updated {
        id: String,
        last_saved_at: DateTime<Utc>,
    },
    /// Nothing to write (blank, unchanged, or no longer editable).
    Skipped,
}

/// Serializes writes for one draft against the gateway.
///
/// `lane` is held for the whole duration of a write, so at most one write per
/// draft is outstanding. A request that arrives while another is in flight
/// waits for it, then builds its job from the snapshot as it is at that point.
pub struct SaveCoordinator<G: ?Sized> {
    gateway: Arc<G>,
    owner_id: OwnerId,
    store: Arc<Mutex<DraftStore>>,
    pub(super) lane: AsyncMutex<()>,
    status: watch::Sender<SaveReport>,
}

impl<G: Gateway + ?Sized> SaveCoordinator<G> {
    pub fn new(gateway: Arc<G>, store: Arc<Mutex<DraftStore>>) -> Self {
        let (owner_id, report) = {
            let guard = store.lock().unwrap_or_else(PoisonError::into_inner);
            (guard.owner_id().clone(), guard.report(guard.resting_status(), None))
        };
        let (status, _) = watch::channel(report);
        Self {
            gateway,
            owner_id,
            store,
            lane: AsyncMutex::new(()),
            status,
        }
    }

    pub(super) fn gateway(&self) -> &G {
        &self.gateway
    }

    pub(super) const fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub(super) fn lock_store(&self) -> MutexGuard<'_, DraftStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveReport> {
        self.status.subscribe()
    }

    pub fn current(&self) -> SaveReport {
        self.status.borrow().clone()
    }

    /// Publish a report built from the store.
    pub(super) fn report(&self, store: &DraftStore, status: SaveStatus, error: Option<String>) {
        self.status.send_replace(store.report(status, error));
    }

    /// Publish the resting status unless an error is on display.
    pub(super) fn settle(&self, store: &DraftStore) {
        if self.status.borrow().status != SaveStatus::Error {
            self.report(store, store.resting_status(), None);
        }
    }

    /// Explicit save: always writes unless the draft is blank.
    ///
    /// Called twice with no edit in between, the second call is an update of
    /// the id captured by the first.
    pub async fn save(&self) -> Result<SaveOutcome> {
        self.run(true).await
    }

    /// Debounced save: skips the write if nothing changed since the last one.
    pub async fn autosave(&self) -> Result<SaveOutcome> {
        self.run(false).await
    }

    async fn run(&self, force: bool) -> Result<SaveOutcome> {
        let _lane = self.lane.lock().await;

        let job = {
            let mut store = self.lock_store();
            match store.begin_save(force) {
                Some(job) => {
                    self.report(&store, SaveStatus::Saving, None);
                    job
                }
                None => {
                    self.settle(&store);
                    return Ok(SaveOutcome::Skipped);
                }
            }
        };

        let result = self.write(&job).await;

        let mut store = self.lock_store();
        let created = matches!(job, SaveJob::Create { .. });
        store.finish_save(job.into_sent(), &result);

        match result {
            Ok(receipt) => {
                self.report(&store, store.resting_status(), None);
                if created {
                    info!(draft_id = %receipt.id, "draft created");
                    Ok(SaveOutcome::Created(receipt))
                } else {
                    debug!(draft_id = %receipt.id, "draft updated");
                    Ok(SaveOutcome::Updated {
                        id: receipt.id,
                        last_saved_at: receipt.last_saved_at,
                    })
                }
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "draft save failed");
                self.report(&store, SaveStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn write(&self, job: &SaveJob) -> Result<DraftReceipt> {
        match job {
            SaveJob::Create { fields, .. } => {
                self.gateway.create_draft(&self.owner_id, fields).await
            }
            SaveJob::Update { id, patch, .. } => {
                let last_saved_at = self.gateway.update_draft(id, &self.owner_id, patch).await?;
                Ok(DraftReceipt {
                    id: id.clone(),
                    last_saved_at,
                })
            }
        }
    }
}
