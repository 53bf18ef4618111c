//! The editor-facing handle for one draft.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use super::coordinator::{SaveCoordinator, SaveOutcome};
use super::publish::PublishOutcome;
use super::state::{SaveReport, SaveStatus};
use super::store::DraftStore;
use crate::config::EditorConfig;
use crate::db::Gateway;
use crate::error::Result;
use crate::models::{Draft, DraftEdit, OwnerId, SessionMedia};

/// Owns a draft while it is being edited.
///
/// Dropping the editor cancels any pending auto-save. A save that has
/// already started runs to completion.
pub struct DraftEditor<G: ?Sized> {
    store: Arc<Mutex<DraftStore>>,
    coordinator: Arc<SaveCoordinator<G>>,
}

impl<G: Gateway + ?Sized + 'static> DraftEditor<G> {
    /// Start a new, empty draft for `owner_id`.
    pub fn new(gateway: Arc<G>, owner_id: OwnerId, config: &EditorConfig) -> Self {
        Self::with_store(gateway, DraftStore::new(owner_id, config.quiet_period))
    }

    /// Resume editing a persisted draft. Fails if it does not belong to `owner_id`.
    pub async fn open(
        gateway: Arc<G>,
        owner_id: OwnerId,
        id: &str,
        config: &EditorConfig,
    ) -> Result<Self> {
        let draft = gateway.get_draft(id, &owner_id).await?;
        debug!(draft_id = %id, "draft opened");
        Ok(Self::with_store(
            gateway,
            DraftStore::from_draft(draft, config.quiet_period)?,
        ))
    }

    fn with_store(gateway: Arc<G>, store: DraftStore) -> Self {
        let store = Arc::new(Mutex::new(store));
        let coordinator = Arc::new(SaveCoordinator::new(gateway, Arc::clone(&store)));
        Self { store, coordinator }
    }

    pub fn snapshot(&self) -> Draft {
        self.coordinator.lock_store().snapshot()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.coordinator.lock_store().has_unsaved_changes()
    }

    /// Merge one field change into the snapshot without scheduling anything.
    pub fn apply_edit(&self, edit: DraftEdit) -> Result<Draft> {
        self.coordinator.lock_store().apply_edit(edit)
    }

    /// (Re)start the quiet period. Returns false if nothing was scheduled
    /// because the draft is blank or no longer editable.
    pub fn schedule_save(&self) -> bool {
        let mut store = self.coordinator.lock_store();
        let armed = self.arm(&mut store);
        if armed {
            self.coordinator.report(&store, SaveStatus::Pending, None);
        } else {
            self.coordinator.settle(&store);
        }
        armed
    }

    fn arm(&self, store: &mut DraftStore) -> bool {
        let coordinator = Arc::clone(&self.coordinator);
        store.arm(async move {
            if let Err(e) = coordinator.autosave().await {
                debug!(error = %e, "scheduled save did not complete");
            }
        })
    }

    /// Apply an edit and restart the quiet period.
    pub fn edit(&self, edit: DraftEdit) -> Result<Draft> {
        let draft = self.apply_edit(edit)?;
        self.schedule_save();
        Ok(draft)
    }

    /// Cancel the pending auto-save. Idempotent.
    pub fn cancel(&self) -> bool {
        let mut store = self.coordinator.lock_store();
        let cancelled = store.cancel_timer();
        self.coordinator.settle(&store);
        cancelled
    }

    /// Save now, superseding any pending auto-save.
    pub async fn save(&self) -> Result<SaveOutcome> {
        self.cancel();
        self.coordinator.save().await
    }

    /// Write unsaved edits now, if there are any. Used when leaving the editor.
    pub async fn flush(&self) -> Result<SaveOutcome> {
        self.cancel();
        self.coordinator.autosave().await
    }

    /// Publish the draft. If publishing fails, unsaved edits are scheduled
    /// for auto-save again; the error stays on the status signal.
    pub async fn publish(&self, media: SessionMedia) -> Result<PublishOutcome> {
        let result = self.coordinator.publish(media).await;
        if result.is_err() {
            let mut store = self.coordinator.lock_store();
            if store.has_unsaved_changes() && !store.timer_pending() && self.arm(&mut store) {
                self.coordinator.settle(&store);
                debug!("auto-save re-armed after failed publish");
            }
        }
        result
    }

    pub fn status(&self) -> SaveReport {
        self.coordinator.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveReport> {
        self.coordinator.subscribe()
    }
}

impl<G: ?Sized> Drop for DraftEditor<G> {
    fn drop(&mut self) {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, Instant};

    use super::*;
    use crate::autosave::testing::{Call, Op, ScriptedGateway};
    use crate::error::Error;
    use crate::models::{DraftField, DraftFields, DraftPatch, NewSession, SessionKind};

    fn config() -> EditorConfig {
        EditorConfig::default()
    }

    fn owner() -> OwnerId {
        OwnerId::new("u1")
    }

    fn editor(gateway: &Arc<ScriptedGateway>) -> DraftEditor<ScriptedGateway> {
        DraftEditor::new(Arc::clone(gateway), owner(), &config())
    }

    fn title(s: &str) -> DraftEdit {
        DraftEdit::Title(s.to_string())
    }

    fn content(s: &str) -> DraftEdit {
        DraftEdit::Content(s.to_string())
    }

    fn fill(editor: &DraftEditor<ScriptedGateway>) {
        editor.apply_edit(title("Morning flow")).unwrap();
        editor
            .apply_edit(DraftEdit::Description("Gentle start".to_string()))
            .unwrap();
        editor.apply_edit(content("Breathe in.")).unwrap();
    }

    fn seeded(gateway: &ScriptedGateway, id: &str) {
        gateway.seed(Draft {
            id: Some(id.to_string()),
            owner_id: owner(),
            fields: DraftFields {
                title: "Evening".to_string(),
                description: "Wind down".to_string(),
                content: "Old".to_string(),
                ..DraftFields::default()
            },
            last_saved_at: Some(chrono::Utc::now()),
        });
    }

    fn count(calls: &[Call], op: fn(&Call) -> bool) -> usize {
        calls.iter().filter(|c| op(c)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_period_coalesces_edits() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        let start = Instant::now();

        editor.edit(title("A")).unwrap();
        sleep(Duration::from_millis(500)).await;
        editor.edit(title("AB")).unwrap();
        sleep(Duration::from_millis(2500)).await;

        let calls = gateway.timed_calls(start);
        assert_eq!(calls.len(), 1);
        let (at, call) = &calls[0];
        assert!(*at >= Duration::from_millis(2500) && *at < Duration::from_millis(2510));
        match call {
            Call::CreateDraft(fields) => assert_eq!(fields.title, "AB"),
            other => panic!("unexpected call {other:?}"),
        }

        let status = editor.status();
        assert_eq!(status.status, SaveStatus::Saved);
        assert_eq!(status.draft_id.as_deref(), Some("D1"));
        assert!(status.last_saved_at.is_some());
        assert_eq!(editor.snapshot().id.as_deref(), Some("D1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_draft_never_reaches_gateway() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);

        editor.apply_edit(DraftEdit::Kind(SessionKind::Fitness)).unwrap();
        editor.apply_edit(DraftEdit::Duration(45)).unwrap();
        assert!(!editor.schedule_save());

        // Typed then cleared before the quiet period ended.
        editor.edit(title("x")).unwrap();
        sleep(Duration::from_millis(500)).await;
        editor.edit(title("")).unwrap();

        sleep(Duration::from_secs(10)).await;
        assert!(gateway.calls().is_empty());
        assert_eq!(editor.status().status, SaveStatus::Idle);
        assert_eq!(editor.save().await.unwrap(), SaveOutcome::Skipped);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_save_updates_captured_id() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        editor.apply_edit(title("x")).unwrap();

        let first = editor.save().await.unwrap();
        assert!(matches!(first, SaveOutcome::Created(ref r) if r.id == "D1"));
        let second = editor.save().await.unwrap();
        assert!(matches!(second, SaveOutcome::Updated { ref id, .. } if id == "D1"));

        assert_eq!(
            gateway.calls()[1],
            Call::UpdateDraft {
                id: "D1".to_string(),
                patch: DraftPatch::default(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_racing_saves_create_once() {
        let gateway = ScriptedGateway::new();
        gateway.set_latency(Duration::from_secs(1));
        let editor = editor(&gateway);
        editor.apply_edit(title("x")).unwrap();

        let (a, b) = tokio::join!(editor.save(), editor.save());
        assert!(matches!(a.unwrap(), SaveOutcome::Created(_)));
        assert!(matches!(b.unwrap(), SaveOutcome::Updated { ref id, .. } if id == "D1"));

        let calls = gateway.calls();
        assert_eq!(count(&calls, |c| matches!(c, Call::CreateDraft(_))), 1);
        assert_eq!(gateway.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_draft_sends_only_edited_field() {
        let gateway = ScriptedGateway::new();
        seeded(&gateway, "D1");
        let editor = DraftEditor::open(Arc::clone(&gateway), owner(), "D1", &config())
            .await
            .unwrap();
        assert_eq!(editor.status().status, SaveStatus::Saved);

        editor.edit(content("New body")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            Call::UpdateDraft { id, patch } => {
                assert_eq!(id, "D1");
                assert_eq!(patch.fields().into_iter().collect::<Vec<_>>(), [DraftField::Content]);
                assert_eq!(patch.content.as_deref(), Some("New body"));
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(gateway.stored("D1").unwrap().fields.title, "Evening");
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_other_owner() {
        let gateway = ScriptedGateway::new();
        seeded(&gateway, "D1");
        let err = DraftEditor::open(Arc::clone(&gateway), OwnerId::new("u2"), "D1", &config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Unauthorized { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_save_defers_next() {
        let gateway = ScriptedGateway::new();
        seeded(&gateway, "D1");
        let editor = DraftEditor::open(Arc::clone(&gateway), owner(), "D1", &config())
            .await
            .unwrap();
        gateway.set_latency(Duration::from_secs(3));
        let start = Instant::now();

        editor.edit(content("x")).unwrap();
        sleep(Duration::from_millis(2500)).await;
        // First update is in flight until t=5000; this quiet period ends at 4500.
        editor.edit(content("xy")).unwrap();
        sleep(Duration::from_secs(7)).await;

        let updates: Vec<_> = gateway
            .timed_calls(start)
            .into_iter()
            .filter_map(|(at, call)| match call {
                Call::UpdateDraft { patch, .. } => Some((at, patch)),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].1.content.as_deref(), Some("x"));
        assert!(updates[1].0 >= Duration::from_millis(5000));
        assert_eq!(updates[1].1.content.as_deref(), Some("xy"));
        assert_eq!(gateway.max_in_flight(), 1);
        assert_eq!(gateway.stored("D1").unwrap().fields.content, "xy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_keeps_edits_for_next_cycle() {
        let gateway = ScriptedGateway::new();
        gateway.fail_next(Op::CreateDraft, Error::transient("connection reset"));
        let editor = editor(&gateway);

        editor.edit(title("Stretch")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        let status = editor.status();
        assert_eq!(status.status, SaveStatus::Error);
        assert!(status.error.unwrap().contains("connection reset"));
        assert_eq!(editor.snapshot().fields.title, "Stretch");
        assert!(editor.snapshot().id.is_none());
        assert!(editor.has_unsaved_changes());

        editor.edit(content("Reach up")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            Call::CreateDraft(fields) => {
                assert_eq!(fields.title, "Stretch");
                assert_eq!(fields.content, "Reach up");
            }
            other => panic!("unexpected call {other:?}"),
        }
        let status = editor.status();
        assert_eq!(status.status, SaveStatus::Saved);
        assert!(status.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_update_resends_both_fields() {
        let gateway = ScriptedGateway::new();
        seeded(&gateway, "D1");
        let editor = DraftEditor::open(Arc::clone(&gateway), owner(), "D1", &config())
            .await
            .unwrap();
        gateway.fail_next(Op::UpdateDraft, Error::transient("timeout"));

        editor.edit(title("T2")).unwrap();
        sleep(Duration::from_millis(2100)).await;
        editor.edit(content("C2")).unwrap();
        sleep(Duration::from_millis(2100)).await;

        match gateway.calls().last().unwrap() {
            Call::UpdateDraft { patch, .. } => {
                assert_eq!(patch.title.as_deref(), Some("T2"));
                assert_eq!(patch.content.as_deref(), Some("C2"));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        editor.edit(title("Leaving")).unwrap();

        assert!(matches!(editor.flush().await.unwrap(), SaveOutcome::Created(_)));
        assert_eq!(editor.flush().await.unwrap(), SaveOutcome::Skipped);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        editor.edit(title("x")).unwrap();
        assert_eq!(editor.status().status, SaveStatus::Pending);

        assert!(editor.cancel());
        assert!(!editor.cancel());
        assert_eq!(editor.status().status, SaveStatus::Idle);
        sleep(Duration::from_secs(5)).await;
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_save() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        editor.edit(title("x")).unwrap();
        drop(editor);

        sleep(Duration::from_secs(5)).await;
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_signal_follows_cycle() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        let mut rx = editor.subscribe();
        assert_eq!(rx.borrow_and_update().status, SaveStatus::Idle);

        editor.edit(title("x")).unwrap();
        assert_eq!(rx.borrow_and_update().status, SaveStatus::Pending);

        sleep(Duration::from_millis(2100)).await;
        let report = rx.borrow_and_update().clone();
        assert_eq!(report.status, SaveStatus::Saved);
        assert_eq!(report.draft_id.as_deref(), Some("D1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_requires_content_fields() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        editor.apply_edit(title("Only a title")).unwrap();
        editor
            .apply_edit(DraftEdit::Description("and a description".to_string()))
            .unwrap();

        let err = editor.publish(SessionMedia::default()).await.unwrap_err();
        assert_eq!(err, Error::missing(DraftField::Content));
        assert!(gateway.calls().is_empty());
        // Still editable after a refused publish.
        editor.apply_edit(content("now complete")).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_unsaved_draft_has_nothing_to_delete() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        fill(&editor);

        let media = SessionMedia {
            video_url: Some("https://cdn.example/v.mp4".to_string()),
            thumbnail_url: None,
        };
        let outcome = editor.publish(media.clone()).await.unwrap();
        assert_eq!(outcome.session_id, "S1");
        assert!(outcome.retired_draft.is_none());
        assert!(outcome.warning.is_none());

        let expected = NewSession::published_from(&editor.snapshot().fields, media);
        assert!(expected.published);
        assert_eq!(gateway.calls(), vec![Call::CreateSession(expected)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_cancels_pending_save() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        fill(&editor);
        editor.edit(title("Morning flow II")).unwrap();

        editor.publish(SessionMedia::default()).await.unwrap();
        sleep(Duration::from_secs(5)).await;

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::CreateSession(s) if s.fields.title == "Morning flow II"));
        assert!(matches!(
            editor.edit(title("late")),
            Err(Error::AlreadyPublished(ref id)) if id == "S1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_retires_saved_draft() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        fill(&editor);
        editor.save().await.unwrap();

        let outcome = editor.publish(SessionMedia::default()).await.unwrap();
        assert_eq!(outcome.retired_draft.as_deref(), Some("D1"));
        assert!(gateway.stored("D1").is_none());
        assert!(matches!(gateway.calls().last(), Some(Call::DeleteDraft(id)) if id == "D1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_waits_for_in_flight_create() {
        let gateway = ScriptedGateway::new();
        gateway.set_latency(Duration::from_secs(1));
        let editor = editor(&gateway);
        fill(&editor);
        editor.schedule_save();

        // The create is issued at t=2000 and resolves at t=3000.
        sleep(Duration::from_millis(2100)).await;
        let outcome = editor.publish(SessionMedia::default()).await.unwrap();

        assert_eq!(outcome.retired_draft.as_deref(), Some("D1"));
        let calls = gateway.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], Call::CreateDraft(_)));
        assert!(matches!(calls[1], Call::CreateSession(_)));
        assert_eq!(calls[2], Call::DeleteDraft("D1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_is_a_warning() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        fill(&editor);
        editor.save().await.unwrap();
        gateway.fail_next(Op::DeleteDraft, Error::transient("store unavailable"));

        let outcome = editor.publish(SessionMedia::default()).await.unwrap();
        assert_eq!(outcome.session_id, "S2");
        assert!(outcome.warning.is_some());
        assert!(outcome.retired_draft.is_none());
        assert!(gateway.get_draft("D1", &owner()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_session_create_leaves_draft_editable() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        fill(&editor);
        gateway.fail_next(Op::CreateSession, Error::transient("down"));

        assert!(editor.publish(SessionMedia::default()).await.is_err());
        assert_eq!(editor.status().status, SaveStatus::Error);
        assert!(editor.edit(title("retry")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_publish_reschedules_unsaved_edits() {
        let gateway = ScriptedGateway::new();
        let editor = editor(&gateway);
        editor.apply_edit(title("Morning flow")).unwrap();
        editor
            .apply_edit(DraftEdit::Description("Gentle start".to_string()))
            .unwrap();
        editor.edit(content("C")).unwrap();
        gateway.fail_next(Op::CreateSession, Error::transient("down"));

        assert!(editor.publish(SessionMedia::default()).await.is_err());
        sleep(Duration::from_secs(10)).await;

        let creates: Vec<_> = gateway
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateDraft(fields) => Some(fields),
                _ => None,
            })
            .collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].content, "C");
        assert!(!editor.has_unsaved_changes());
        assert_eq!(editor.status().status, SaveStatus::Saved);
    }
}
