//! Persistence state of the draft under edit and the save-status signal.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::DraftReceipt;

/// Where the draft stands relative to the store.
///
/// A create can only start from `Unsaved` and an update only from `Saved`,
/// so two writes for the same draft can never be outstanding at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// Never persisted; the next save is a create.
    Unsaved,
    /// First create in flight.
    Creating,
    /// Persisted under `id`.
    Saved {
        id: String,
        last_saved_at: DateTime<Utc>,
    },
    /// Update of `id` in flight.
    Updating {
        id: String,
        last_saved_at: DateTime<Utc>,
    },
}

/// Store operation chosen by [`Persistence::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOp {
    Create,
    Update { id: String },
}

impl Persistence {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Saved { id, .. } | Self::Updating { id, .. } => Some(id),
            Self::Unsaved | Self::Creating => None,
        }
    }

    pub const fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Saved { last_saved_at, .. } | Self::Updating { last_saved_at, .. } => {
                Some(*last_saved_at)
            }
            Self::Unsaved | Self::Creating => None,
        }
    }

    /// Start a write. Returns `None` if one is already in flight.
    pub fn begin(&mut self) -> Option<SaveOp> {
        let (next, op) = match self {
            Self::Unsaved => (Self::Creating, SaveOp::Create),
            Self::Saved { id, last_saved_at } => (
                Self::Updating {
                    id: id.clone(),
                    last_saved_at: *last_saved_at,
                },
                SaveOp::Update { id: id.clone() },
            ),
            Self::Creating | Self::Updating { .. } => return None,
        };
        *self = next;
        Some(op)
    }

    /// Record a successful write. The id of a create is captured here.
    pub fn complete(&mut self, receipt: DraftReceipt) {
        match self {
            Self::Creating => {
                *self = Self::Saved {
                    id: receipt.id,
                    last_saved_at: receipt.last_saved_at,
                };
            }
            Self::Updating { id, .. } => {
                let id = std::mem::take(id);
                *self = Self::Saved {
                    id,
                    last_saved_at: receipt.last_saved_at,
                };
            }
            Self::Unsaved | Self::Saved { .. } => {}
        }
    }

    /// Roll back a failed write to the state it started from.
    pub fn abort(&mut self) {
        match self {
            Self::Creating => *self = Self::Unsaved,
            Self::Updating { id, last_saved_at } => {
                let id = std::mem::take(id);
                let last_saved_at = *last_saved_at;
                *self = Self::Saved { id, last_saved_at };
            }
            Self::Unsaved | Self::Saved { .. } => {}
        }
    }
}

/// Save status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    /// Nothing persisted and nothing scheduled.
    #[default]
    Idle,
    /// A save is scheduled for the end of the quiet period.
    Pending,
    /// A write is in flight.
    Saving,
    /// The latest write succeeded.
    Saved,
    /// The latest write failed; local edits are kept.
    Error,
}

impl SaveStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot published on the status channel after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub status: SaveStatus,
    /// Resolved id once the draft has been created.
    pub draft_id: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Message of the last failure, cleared by the next success.
    pub error: Option<String>,
}
