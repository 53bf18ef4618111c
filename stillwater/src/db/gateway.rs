//! The persistence contract the draft editor is written against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Draft, DraftFields, DraftPatch, DraftReceipt, NewSession, OwnerId};

/// Document store operations consumed by the auto-save workflow.
///
/// Implementations must give read-after-write consistency per document and
/// reject access by anyone other than the record's owner with
/// [`Error::Unauthorized`](crate::error::Error::Unauthorized).
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Persist a brand-new draft and return its identifier.
    async fn create_draft(&self, owner_id: &OwnerId, fields: &DraftFields) -> Result<DraftReceipt>;

    /// Apply a partial update to an existing draft.
    async fn update_draft(
        &self,
        id: &str,
        owner_id: &OwnerId,
        patch: &DraftPatch,
    ) -> Result<DateTime<Utc>>;

    async fn delete_draft(&self, id: &str, owner_id: &OwnerId) -> Result<()>;

    /// Create a session and return its identifier.
    async fn create_session(&self, owner_id: &OwnerId, session: &NewSession) -> Result<String>;

    async fn get_draft(&self, id: &str, owner_id: &OwnerId) -> Result<Draft>;
}
