//! Database query implementations.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{
    Draft, DraftFields, DraftPatch, NewSession, OwnerId, Session, SessionKind, SessionMedia,
    SessionPatch,
};

/// Parse a timestamp string flexibly from various formats.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Common SQLite datetime format: "YYYY-MM-DD HH:MM:SS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    // With fractional seconds: "YYYY-MM-DD HH:MM:SS.SSS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    Err(Error::internal(format!("Invalid timestamp format: {s}")))
}

fn parse_kind(s: &str) -> Result<SessionKind> {
    SessionKind::from_str(s).ok_or_else(|| Error::internal(format!("Invalid session type: {s}")))
}

/// Queries for drafts table.
pub struct DraftQueries;

impl DraftQueries {
    /// Insert a new draft.
    pub fn insert(
        conn: &Connection,
        id: &str,
        owner_id: &OwnerId,
        fields: &DraftFields,
        saved_at: DateTime<Utc>,
    ) -> Result<()> {
        conn.execute(
            r"INSERT INTO drafts (id, owner_id, title, description, kind, duration, content, last_saved_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                owner_id.as_str(),
                fields.title,
                fields.description,
                fields.kind.as_str(),
                fields.duration,
                fields.content,
                saved_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a draft by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Draft>> {
        let mut stmt = conn.prepare(
            r"SELECT id, owner_id, title, description, kind, duration, content, last_saved_at
              FROM drafts WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], |row| Ok(Self::row_to_draft(row)));

        match result {
            Ok(draft) => Ok(Some(draft?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a partial update; unset patch fields keep their stored value.
    pub fn update(
        conn: &Connection,
        id: &str,
        patch: &DraftPatch,
        saved_at: DateTime<Utc>,
    ) -> Result<usize> {
        let count = conn.execute(
            r"UPDATE drafts SET
                title = COALESCE(?1, title),
                description = COALESCE(?2, description),
                kind = COALESCE(?3, kind),
                duration = COALESCE(?4, duration),
                content = COALESCE(?5, content),
                last_saved_at = ?6
              WHERE id = ?7",
            params![
                patch.title,
                patch.description,
                patch.kind.map(SessionKind::as_str),
                patch.duration,
                patch.content,
                saved_at.to_rfc3339(),
                id,
            ],
        )?;
        Ok(count)
    }

    /// Delete a draft.
    pub fn delete(conn: &Connection, id: &str) -> Result<usize> {
        let count = conn.execute("DELETE FROM drafts WHERE id = ?1", params![id])?;
        Ok(count)
    }

    /// Convert a row to a Draft.
    fn row_to_draft(row: &rusqlite::Row<'_>) -> Result<Draft> {
        let kind_str: String = row.get(4)?;
        let saved_str: String = row.get(7)?;

        Ok(Draft {
            id: Some(row.get(0)?),
            owner_id: OwnerId::new(row.get::<_, String>(1)?),
            fields: DraftFields {
                title: row.get(2)?,
                description: row.get(3)?,
                kind: parse_kind(&kind_str)?,
                duration: row.get(5)?,
                content: row.get(6)?,
            },
            last_saved_at: Some(parse_timestamp(&saved_str)?),
        })
    }
}

/// Queries for sessions table.
pub struct SessionQueries;

impl SessionQueries {
    /// Insert a new session.
    pub fn insert(
        conn: &Connection,
        id: &str,
        owner_id: &OwnerId,
        session: &NewSession,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let fields = &session.fields;
        conn.execute(
            r"INSERT INTO sessions (id, owner_id, title, description, kind, duration, content,
                                    video_url, thumbnail_url, published, created_at, updated_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                id,
                owner_id.as_str(),
                fields.title,
                fields.description,
                fields.kind.as_str(),
                fields.duration,
                fields.content,
                session.media.video_url,
                session.media.thumbnail_url,
                session.published,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a session by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Session>> {
        let mut stmt = conn.prepare(
            r"SELECT id, owner_id, title, description, kind, duration, content,
                     video_url, thumbnail_url, published, created_at, updated_at
              FROM sessions WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], |row| Ok(Self::row_to_session(row)));

        match result {
            Ok(session) => Ok(Some(session?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply an owner edit; unset patch fields keep their stored value.
    pub fn update(
        conn: &Connection,
        id: &str,
        patch: &SessionPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<usize> {
        let count = conn.execute(
            r"UPDATE sessions SET
                title = COALESCE(?1, title),
                description = COALESCE(?2, description),
                kind = COALESCE(?3, kind),
                duration = COALESCE(?4, duration),
                content = COALESCE(?5, content),
                video_url = COALESCE(?6, video_url),
                thumbnail_url = COALESCE(?7, thumbnail_url),
                published = COALESCE(?8, published),
                updated_at = ?9
              WHERE id = ?10",
            params![
                patch.title,
                patch.description,
                patch.kind.map(SessionKind::as_str),
                patch.duration,
                patch.content,
                patch.video_url,
                patch.thumbnail_url,
                patch.published,
                updated_at.to_rfc3339(),
                id,
            ],
        )?;
        Ok(count)
    }

    /// Delete a session.
    pub fn delete(conn: &Connection, id: &str) -> Result<usize> {
        let count = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(count)
    }

    /// Convert a row to a Session.
    fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session> {
        let kind_str: String = row.get(4)?;
        let created_str: String = row.get(10)?;
        let updated_str: String = row.get(11)?;

        Ok(Session {
            id: row.get(0)?,
            owner_id: OwnerId::new(row.get::<_, String>(1)?),
            fields: DraftFields {
                title: row.get(2)?,
                description: row.get(3)?,
                kind: parse_kind(&kind_str)?,
                duration: row.get(5)?,
                content: row.get(6)?,
            },
            media: SessionMedia {
                video_url: row.get(7)?,
                thumbnail_url: row.get(8)?,
            },
            published: row.get(9)?,
            created_at: parse_timestamp(&created_str)?,
            updated_at: parse_timestamp(&updated_str)?,
        })
    }
}
