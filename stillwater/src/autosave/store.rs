//! In-memory snapshot of the draft under edit and its save scheduling.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use super::debounce::Debouncer;
use super::state::{Persistence, SaveOp, SaveReport, SaveStatus};
use crate::error::{Error, Result};
use crate::models::{Draft, DraftEdit, DraftField, DraftFields, DraftPatch, DraftReceipt, OwnerId};

/// Whether the draft can still be edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Editing,
    /// Session create in flight; edits are refused.
    Publishing,
    Published { session_id: String },
}

/// One write taken from the store, ready to send to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveJob {
    Create {
        fields: DraftFields,
        sent: BTreeSet<DraftField>,
    },
    Update {
        id: String,
        patch: DraftPatch,
        sent: BTreeSet<DraftField>,
    },
}

impl SaveJob {
    /// Fields this job clears from the unsaved set.
    pub fn into_sent(self) -> BTreeSet<DraftField> {
        match self {
            Self::Create { sent, .. } | Self::Update { sent, .. } => sent,
        }
    }
}

/// Authoritative client-side state of one draft.
///
/// Edits land here synchronously and in arrival order. `dirty` holds the
/// fields changed since the last successful write; an update sends exactly
/// those fields, read from the snapshot at the moment the write is issued.
#[derive(Debug)]
pub struct DraftStore {
    owner_id: OwnerId,
    fields: DraftFields,
    dirty: BTreeSet<DraftField>,
    persistence: Persistence,
    debouncer: Debouncer,
    lifecycle: Lifecycle,
}

impl DraftStore {
    /// An empty, never-saved draft.
    pub fn new(owner_id: OwnerId, quiet_period: Duration) -> Self {
        Self {
            owner_id,
            fields: DraftFields::default(),
            dirty: BTreeSet::new(),
            persistence: Persistence::Unsaved,
            debouncer: Debouncer::new(quiet_period),
            lifecycle: Lifecycle::Editing,
        }
    }

    /// Resume editing a draft loaded from the store.
    ///
    /// A draft with an id must carry the time it was saved.
    pub fn from_draft(draft: Draft, quiet_period: Duration) -> Result<Self> {
        let persistence = match (draft.id, draft.last_saved_at) {
            (Some(id), Some(last_saved_at)) => Persistence::Saved { id, last_saved_at },
            (Some(id), None) => {
                return Err(Error::internal(format!("draft '{id}' has no save time")));
            }
            (None, _) => Persistence::Unsaved,
        };
        Ok(Self {
            owner_id: draft.owner_id,
            fields: draft.fields,
            dirty: BTreeSet::new(),
            persistence,
            debouncer: Debouncer::new(quiet_period),
            lifecycle: Lifecycle::Editing,
        })
    }

    pub const fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub const fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn snapshot(&self) -> Draft {
        Draft {
            id: self.persistence.id().map(String::from),
            owner_id: self.owner_id.clone(),
            fields: self.fields.clone(),
            last_saved_at: self.persistence.last_saved_at(),
        }
    }

    /// True if the store does not yet hold what the user typed.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.fields.is_blank()
            && (!self.dirty.is_empty() || self.persistence == Persistence::Unsaved)
    }

    /// Merge one field change. Never touches the gateway.
    pub fn apply_edit(&mut self, edit: DraftEdit) -> Result<Draft> {
        self.ensure_editable()?;
        let field = edit.field();
        if self.fields.apply(edit)? {
            self.dirty.insert(field);
        }
        Ok(self.snapshot())
    }

    fn ensure_editable(&self) -> Result<()> {
        match &self.lifecycle {
            Lifecycle::Editing => Ok(()),
            Lifecycle::Publishing => Err(Error::validation("draft is being published")),
            Lifecycle::Published { session_id } => {
                Err(Error::AlreadyPublished(session_id.clone()))
            }
        }
    }

    /// Arm the debounce timer with `task`.
    ///
    /// Blank drafts and drafts that are no longer editable are never
    /// scheduled; any timer already pending for them is cancelled.
    pub fn arm<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.ensure_editable().is_err() || self.fields.is_blank() {
            self.debouncer.cancel();
            return false;
        }
        self.debouncer.arm(task);
        true
    }

    /// Cancel the pending timer, if any. Idempotent.
    pub fn cancel_timer(&mut self) -> bool {
        self.debouncer.cancel()
    }

    pub fn timer_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Take the next write, moving the persistence state to in-flight.
    ///
    /// Returns `None` when there is nothing to do: the draft is blank, not
    /// editable, already in flight, or (unless `force`) already up to date.
    pub fn begin_save(&mut self, force: bool) -> Option<SaveJob> {
        if self.lifecycle != Lifecycle::Editing || self.fields.is_blank() {
            return None;
        }
        if !force && matches!(self.persistence, Persistence::Saved { .. }) && self.dirty.is_empty()
        {
            return None;
        }

        let op = self.persistence.begin()?;
        let sent = std::mem::take(&mut self.dirty);
        Some(match op {
            SaveOp::Create => SaveJob::Create {
                fields: self.fields.clone(),
                sent,
            },
            SaveOp::Update { id } => SaveJob::Update {
                patch: self.fields.patch(&sent),
                id,
                sent,
            },
        })
    }

    /// Settle a write. On failure the sent fields are marked unsaved again.
    pub fn finish_save(&mut self, sent: BTreeSet<DraftField>, result: &Result<DraftReceipt>) {
        match result {
            Ok(receipt) => self.persistence.complete(receipt.clone()),
            Err(_) => {
                self.persistence.abort();
                self.dirty.extend(sent);
            }
        }
    }

    /// Check that the draft may be published, without changing anything.
    pub fn check_publishable(&self) -> Result<()> {
        self.ensure_editable()?;
        self.fields.require_publishable()
    }

    /// Freeze the draft for publishing and return the content to publish.
    pub fn begin_publish(&mut self) -> Result<DraftFields> {
        self.check_publishable()?;
        self.debouncer.cancel();
        self.lifecycle = Lifecycle::Publishing;
        Ok(self.fields.clone())
    }

    pub fn finish_publish(&mut self, result: Result<&str, &Error>) {
        self.lifecycle = match result {
            Ok(session_id) => Lifecycle::Published {
                session_id: session_id.to_string(),
            },
            Err(_) => Lifecycle::Editing,
        };
    }

    /// Status to show when nothing is in flight.
    pub fn resting_status(&self) -> SaveStatus {
        if self.timer_pending() {
            SaveStatus::Pending
        } else if self.persistence.id().is_some() {
            SaveStatus::Saved
        } else {
            SaveStatus::Idle
        }
    }

    pub fn report(&self, status: SaveStatus, error: Option<String>) -> SaveReport {
        SaveReport {
            status,
            draft_id: self.persistence.id().map(String::from),
            last_saved_at: self.persistence.last_saved_at(),
            error,
        }
    }
}
