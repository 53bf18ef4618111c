//! Debounced auto-save and publish for drafts.
//!
//! Edits land in an in-memory draft store synchronously. Each edit restarts a quiet
//! period; when it ends the [`SaveCoordinator`] writes the draft through a
//! [`Gateway`](crate::db::Gateway), creating it the first time and sending
//! partial updates afterwards. [`DraftEditor`] ties the two together for one
//! draft.

mod coordinator;
mod debounce;
mod editor;
mod publish;
mod state;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{SaveCoordinator, SaveOutcome};
pub use editor::DraftEditor;
pub use publish::PublishOutcome;
pub use state::{SaveReport, SaveStatus};
