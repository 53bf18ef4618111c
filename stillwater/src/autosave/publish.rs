//! Promotion of a draft into a published session.

use tracing::{info, warn};

use super::coordinator::SaveCoordinator;
use super::state::SaveStatus;
use crate::db::Gateway;
use crate::error::{Error, Result};
use crate::models::{NewSession, SessionMedia};

/// Result of a publish whose session create succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub session_id: String,
    /// Draft deleted after the session was created.
    pub retired_draft: Option<String>,
    /// Set when the session exists but the source draft could not be deleted.
    /// Both records are then persisted and need manual reconciliation.
    pub warning: Option<Error>,
}

impl<G: Gateway + ?Sized> SaveCoordinator<G> {
    /// Create a published session from the draft, then delete the draft.
    ///
    /// The two writes are not atomic. A failed delete is reported through
    /// [`PublishOutcome::warning`] rather than as an error.
    pub async fn publish(&self, media: SessionMedia) -> Result<PublishOutcome> {
        {
            let mut store = self.lock_store();
            store.check_publishable()?;
            store.cancel_timer();
        }

        // Let an in-flight save finish before the draft is frozen.
        let _lane = self.lane.lock().await;

        let (fields, draft_id) = {
            let mut store = self.lock_store();
            let fields = store.begin_publish()?;
            self.settle(&store);
            (fields, store.persistence().id().map(String::from))
        };

        let session = NewSession::published_from(&fields, media);
        let created = self.gateway().create_session(self.owner_id(), &session).await;
        {
            let mut store = self.lock_store();
            store.finish_publish(created.as_deref());
            if let Err(e) = &created {
                warn!(error = %e, "session create failed; draft left as is");
                self.report(&store, SaveStatus::Error, Some(e.to_string()));
            }
        }
        let session_id = created?;
        info!(session_id = %session_id, "session published");

        let Some(draft_id) = draft_id else {
            return Ok(PublishOutcome {
                session_id,
                retired_draft: None,
                warning: None,
            });
        };

        match self.gateway().delete_draft(&draft_id, self.owner_id()).await {
            Ok(()) => Ok(PublishOutcome {
                session_id,
                retired_draft: Some(draft_id),
                warning: None,
            }),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    draft_id = %draft_id,
                    error = %e,
                    "session published but draft was not deleted"
                );
                Ok(PublishOutcome {
                    session_id,
                    retired_draft: None,
                    warning: Some(e),
                })
            }
        }
    }
}
