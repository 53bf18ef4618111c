//! Draft model: the unpublished, auto-saved form of a session.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OwnerId, SessionKind};
use crate::error::{Error, Result};

/// Duration given to a new draft, in minutes.
pub const DEFAULT_DURATION: u32 = 30;

/// One editable field of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftField {
    Title,
    Description,
    #[serde(rename = "type")]
    Kind,
    Duration,
    Content,
}

impl DraftField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Kind => "type",
            Self::Duration => "duration",
            Self::Content => "content",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "title" => Some(Self::Title),
            "description" => Some(Self::Description),
            "type" | "kind" => Some(Self::Kind),
            "duration" => Some(Self::Duration),
            "content" => Some(Self::Content),
            _ => None,
        }
    }
}

impl std::fmt::Display for DraftField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single field change coming from the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftEdit {
    Title(String),
    Description(String),
    Kind(SessionKind),
    Duration(u32),
    Content(String),
}

impl DraftEdit {
    pub const fn field(&self) -> DraftField {
        match self {
            Self::Title(_) => DraftField::Title,
            Self::Description(_) => DraftField::Description,
            Self::Kind(_) => DraftField::Kind,
            Self::Duration(_) => DraftField::Duration,
            Self::Content(_) => DraftField::Content,
        }
    }

    /// Build an edit from a raw field name and value (form or CLI input).
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        let field = DraftField::from_str(field)
            .ok_or_else(|| Error::validation(format!("unknown field '{field}'")))?;

        Ok(match field {
            DraftField::Title => Self::Title(value.to_string()),
            DraftField::Description => Self::Description(value.to_string()),
            DraftField::Content => Self::Content(value.to_string()),
            DraftField::Kind => Self::Kind(SessionKind::from_str(value).ok_or_else(|| {
                Error::validation(format!("unknown session type '{value}'"))
            })?),
            DraftField::Duration => {
                let minutes: u32 = value
                    .trim()
                    .parse()
                    .map_err(|_| Error::validation(format!("invalid duration '{value}'")))?;
                Self::Duration(minutes)
            }
        })
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Duration(0) => Err(Error::validation("duration must be at least one minute")),
            _ => Ok(()),
        }
    }
}

/// The content fields shared by drafts and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftFields {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: SessionKind,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub content: String,
}

const fn default_duration() -> u32 {
    DEFAULT_DURATION
}

impl Default for DraftFields {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            kind: SessionKind::default(),
            duration: DEFAULT_DURATION,
            content: String::new(),
        }
    }
}

impl DraftFields {
    /// True when there is no text worth persisting.
    pub fn is_blank(&self) -> bool {
        self.title.is_empty() && self.description.is_empty() && self.content.is_empty()
    }

    /// Merge one edit. Returns whether the value actually changed.
    pub fn apply(&mut self, edit: DraftEdit) -> Result<bool> {
        edit.validate()?;
        let changed = match edit {
            DraftEdit::Title(v) => replace_if_changed(&mut self.title, v),
            DraftEdit::Description(v) => replace_if_changed(&mut self.description, v),
            DraftEdit::Kind(v) => replace_if_changed(&mut self.kind, v),
            DraftEdit::Duration(v) => replace_if_changed(&mut self.duration, v),
            DraftEdit::Content(v) => replace_if_changed(&mut self.content, v),
        };
        Ok(changed)
    }

    /// Values that any stored record must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.duration == 0 {
            return Err(Error::validation("duration must be at least one minute"));
        }
        Ok(())
    }

    /// Title, description and content must all be present before publishing.
    pub fn require_publishable(&self) -> Result<()> {
        let required = [
            (DraftField::Title, &self.title),
            (DraftField::Description, &self.description),
            (DraftField::Content, &self.content),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(Error::missing(*field));
        }
        self.validate()
    }

    /// Partial update carrying only the given fields, read from `self`.
    pub fn patch(&self, fields: &BTreeSet<DraftField>) -> DraftPatch {
        let mut patch = DraftPatch::default();
        for field in fields {
            match field {
                DraftField::Title => patch.title = Some(self.title.clone()),
                DraftField::Description => patch.description = Some(self.description.clone()),
                DraftField::Kind => patch.kind = Some(self.kind),
                DraftField::Duration => patch.duration = Some(self.duration),
                DraftField::Content => patch.content = Some(self.content.clone()),
            }
        }
        patch
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Partial update: `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SessionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DraftPatch {
    /// Names of the fields this patch sets.
    pub fn fields(&self) -> BTreeSet<DraftField> {
        let mut fields = BTreeSet::new();
        if self.title.is_some() {
            fields.insert(DraftField::Title);
        }
        if self.description.is_some() {
            fields.insert(DraftField::Description);
        }
        if self.kind.is_some() {
            fields.insert(DraftField::Kind);
        }
        if self.duration.is_some() {
            fields.insert(DraftField::Duration);
        }
        if self.content.is_some() {
            fields.insert(DraftField::Content);
        }
        fields
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration == Some(0) {
            return Err(Error::validation("duration must be at least one minute"));
        }
        Ok(())
    }
}

/// A draft as stored and as seen by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Absent until the first successful save.
    pub id: Option<String>,
    /// Creator of the draft; never changes.
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub fields: DraftFields,
    /// When the draft was last persisted.
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl Draft {
    /// A fresh, never-saved draft.
    #[cfg(test)]
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            id: None,
            owner_id,
            fields: DraftFields::default(),
            last_saved_at: None,
        }
    }

    /// Id and timestamp of a persisted draft; `None` if it was never saved.
    pub fn into_receipt(self) -> Option<DraftReceipt> {
        Some(DraftReceipt {
            id: self.id?,
            last_saved_at: self.last_saved_at?,
        })
    }
}

/// What the store hands back after a draft write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftReceipt {
    pub id: String,
    pub last_saved_at: DateTime<Utc>,
}
