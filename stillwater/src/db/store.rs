//! SQLite-backed implementation of the persistence gateway.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::gateway::Gateway;
use super::queries::{DraftQueries, SessionQueries};
use super::Database;
use crate::error::{Error, Result};
use crate::models::{
    Draft, DraftFields, DraftPatch, DraftReceipt, NewSession, OwnerId, Session, SessionPatch,
};

const DRAFT: &str = "draft";
const SESSION: &str = "session";

/// Generate a UUIDv7 (time-ordered, globally unique).
fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Shared handle to the document store.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Create a draft for `owner_id` and return the stored record.
    pub async fn insert_draft(&self, owner_id: &OwnerId, fields: &DraftFields) -> Result<Draft> {
        fields.validate()?;
        let db = self.db.lock().await;
        let id = generate_id();
        DraftQueries::insert(db.conn(), &id, owner_id, fields, Utc::now())?;
        debug!(draft_id = %id, owner = %owner_id, "draft created");
        owned_draft(db.conn(), &id, owner_id)
    }

    pub async fn fetch_draft(&self, id: &str, owner_id: &OwnerId) -> Result<Draft> {
        let db = self.db.lock().await;
        owned_draft(db.conn(), id, owner_id)
    }

    /// Partially update a draft; every write refreshes `last_saved_at`.
    pub async fn patch_draft(
        &self,
        id: &str,
        owner_id: &OwnerId,
        patch: &DraftPatch,
    ) -> Result<Draft> {
        patch.validate()?;
        let db = self.db.lock().await;
        owned_draft(db.conn(), id, owner_id)?;
        DraftQueries::update(db.conn(), id, patch, Utc::now())?;
        debug!(draft_id = %id, fields = ?patch.fields(), "draft updated");
        owned_draft(db.conn(), id, owner_id)
    }

    pub async fn remove_draft(&self, id: &str, owner_id: &OwnerId) -> Result<()> {
        let db = self.db.lock().await;
        owned_draft(db.conn(), id, owner_id)?;
        DraftQueries::delete(db.conn(), id)?;
        debug!(draft_id = %id, "draft deleted");
        Ok(())
    }

    pub async fn insert_session(&self, owner_id: &OwnerId, session: &NewSession) -> Result<Session> {
        session.validate()?;
        let db = self.db.lock().await;
        let id = generate_id();
        SessionQueries::insert(db.conn(), &id, owner_id, session, Utc::now())?;
        debug!(session_id = %id, published = session.published, "session created");
        owned_session(db.conn(), &id, owner_id)
    }

    /// Published sessions resolve for anyone; unpublished ones only for their owner.
    pub async fn fetch_session(&self, id: &str, viewer: Option<&OwnerId>) -> Result<Session> {
        let db = self.db.lock().await;
        SessionQueries::get_by_id(db.conn(), id)?
            .filter(|s| s.is_visible_to(viewer))
            .ok_or_else(|| Error::not_found(SESSION, id))
    }

    pub async fn patch_session(
        &self,
        id: &str,
        owner_id: &OwnerId,
        patch: SessionPatch,
    ) -> Result<Session> {
        let patch = patch.normalized()?;
        let db = self.db.lock().await;
        owned_session(db.conn(), id, owner_id)?;
        SessionQueries::update(db.conn(), id, &patch, Utc::now())?;
        owned_session(db.conn(), id, owner_id)
    }

    pub async fn remove_session(&self, id: &str, owner_id: &OwnerId) -> Result<()> {
        let db = self.db.lock().await;
        owned_session(db.conn(), id, owner_id)?;
        SessionQueries::delete(db.conn(), id)?;
        Ok(())
    }
}

/// Load a draft, enforcing that `owner_id` created it.
fn owned_draft(conn: &Connection, id: &str, owner_id: &OwnerId) -> Result<Draft> {
    let draft = DraftQueries::get_by_id(conn, id)?.ok_or_else(|| Error::not_found(DRAFT, id))?;
    if &draft.owner_id != owner_id {
        return Err(Error::unauthorized(DRAFT, id));
    }
    Ok(draft)
}

/// Load a session, enforcing that `owner_id` created it.
fn owned_session(conn: &Connection, id: &str, owner_id: &OwnerId) -> Result<Session> {
    let session =
        SessionQueries::get_by_id(conn, id)?.ok_or_else(|| Error::not_found(SESSION, id))?;
    if &session.owner_id != owner_id {
        return Err(Error::unauthorized(SESSION, id));
    }
    Ok(session)
}

fn receipt(draft: Draft) -> Result<DraftReceipt> {
    draft
        .into_receipt()
        .ok_or_else(|| Error::internal("stored draft is missing its id or timestamp"))
}

#[async_trait]
impl Gateway for Store {
    async fn create_draft(&self, owner_id: &OwnerId, fields: &DraftFields) -> Result<DraftReceipt> {
        receipt(self.insert_draft(owner_id, fields).await?)
    }

    async fn update_draft(
        &self,
        id: &str,
        owner_id: &OwnerId,
        patch: &DraftPatch,
    ) -> Result<DateTime<Utc>> {
        Ok(receipt(self.patch_draft(id, owner_id, patch).await?)?.last_saved_at)
    }

    async fn delete_draft(&self, id: &str, owner_id: &OwnerId) -> Result<()> {
        self.remove_draft(id, owner_id).await
    }

    async fn create_session(&self, owner_id: &OwnerId, session: &NewSession) -> Result<String> {
        Ok(self.insert_session(owner_id, session).await?.id)
    }

    async fn get_draft(&self, id: &str, owner_id: &OwnerId) -> Result<Draft> {
        self.fetch_draft(id, owner_id).await
    }
}
