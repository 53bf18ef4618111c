//! Session model: published wellness content promoted from a draft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DraftFields, OwnerId};
use crate::error::{Error, Result};

/// Kind of practice a session describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    #[default]
    Yoga,
    Meditation,
    Fitness,
    Other,
}

impl SessionKind {
    /// Convert kind to string for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yoga => "yoga",
            Self::Meditation => "meditation",
            Self::Fitness => "fitness",
            Self::Other => "other",
        }
    }

    /// Parse kind from database or user input.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yoga" => Some(Self::Yoga),
            "meditation" => Some(Self::Meditation),
            "fitness" => Some(Self::Fitness),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional media attached when a session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMedia {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// A stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Creator of the session; never changes.
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub fields: DraftFields,
    #[serde(flatten)]
    pub media: SessionMedia,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Published sessions are public; the rest only resolve for their owner.
    pub fn is_visible_to(&self, viewer: Option<&OwnerId>) -> bool {
        self.published || viewer == Some(&self.owner_id)
    }
}

/// Request to create a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    #[serde(flatten)]
    pub fields: DraftFields,
    #[serde(flatten)]
    pub media: SessionMedia,
    #[serde(default)]
    pub published: bool,
}

impl NewSession {
    /// A published session carrying a copy of the draft's content.
    pub fn published_from(fields: &DraftFields, media: SessionMedia) -> Self {
        Self {
            fields: fields.clone(),
            media,
            published: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.fields.require_publishable()
    }
}

/// Owner edit of a stored session. Empty strings leave values untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<SessionKind>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
}

impl SessionPatch {
    /// Drop empty values so they never overwrite stored content.
    pub fn normalized(self) -> Result<Self> {
        if self.duration == Some(0) {
            return Err(Error::validation("duration must be at least one minute"));
        }
        let keep = |v: Option<String>| v.filter(|s| !s.is_empty());
        Ok(Self {
            title: keep(self.title),
            description: keep(self.description),
            content: keep(self.content),
            video_url: keep(self.video_url),
            thumbnail_url: keep(self.thumbnail_url),
            ..self
        })
    }
}
