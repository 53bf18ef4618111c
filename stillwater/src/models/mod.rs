//! Data models for drafts and sessions.

mod draft;
mod owner;
mod session;

pub use draft::{Draft, DraftEdit, DraftField, DraftFields, DraftPatch, DraftReceipt};
pub use owner::OwnerId;
pub use session::{NewSession, Session, SessionKind, SessionMedia, SessionPatch};
