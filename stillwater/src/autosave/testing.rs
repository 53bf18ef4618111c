//! Scripted gateway for exercising the editor on a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::db::Gateway;
use crate::error::{Error, Result};
use crate::models::{Draft, DraftFields, DraftPatch, DraftReceipt, NewSession, OwnerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateDraft(DraftFields),
    UpdateDraft { id: String, patch: DraftPatch },
    DeleteDraft(String),
    CreateSession(NewSession),
    GetDraft(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateDraft,
    UpdateDraft,
    DeleteDraft,
    CreateSession,
}

#[derive(Default)]
struct Script {
    calls: Vec<(Instant, Call)>,
    drafts: HashMap<String, Draft>,
    failures: HashMap<Op, VecDeque<Error>>,
    latency: Duration,
    next_id: usize,
}

/// In-memory gateway that records every call.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call takes this long (on the tokio clock) to resolve.
    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().unwrap().latency = latency;
    }

    pub fn fail_next(&self, op: Op, error: Error) {
        self.script
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub fn seed(&self, draft: Draft) {
        let id = draft.id.clone().expect("seeded drafts need an id");
        self.script.lock().unwrap().drafts.insert(id, draft);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Calls with the time they were issued, relative to `start`.
    pub fn timed_calls(&self, start: Instant) -> Vec<(Duration, Call)> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(at, call)| (at.duration_since(start), call.clone()))
            .collect()
    }

    pub fn stored(&self, id: &str) -> Option<Draft> {
        self.script.lock().unwrap().drafts.get(id).cloned()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: Call, op: Option<Op>) -> Result<()> {
        let latency = {
            let mut script = self.script.lock().unwrap();
            script.calls.push((Instant::now(), call));
            script.latency
        };

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        tokio::time::sleep(latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = op.and_then(|op| {
            self.script
                .lock()
                .unwrap()
                .failures
                .get_mut(&op)
                .and_then(VecDeque::pop_front)
        });
        failure.map_or(Ok(()), Err)
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut script = self.script.lock().unwrap();
        script.next_id += 1;
        format!("{prefix}{}", script.next_id)
    }

    fn with_owned<T>(
        &self,
        id: &str,
        owner_id: &OwnerId,
        f: impl FnOnce(&mut HashMap<String, Draft>) -> T,
    ) -> Result<T> {
        let mut script = self.script.lock().unwrap();
        let draft = script
            .drafts
            .get(id)
            .ok_or_else(|| Error::not_found("draft", id))?;
        if &draft.owner_id != owner_id {
            return Err(Error::unauthorized("draft", id));
        }
        Ok(f(&mut script.drafts))
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn create_draft(&self, owner_id: &OwnerId, fields: &DraftFields) -> Result<DraftReceipt> {
        self.enter(Call::CreateDraft(fields.clone()), Some(Op::CreateDraft))
            .await?;
        let id = self.next_id("D");
        let now = Utc::now();
        self.script.lock().unwrap().drafts.insert(
            id.clone(),
            Draft {
                id: Some(id.clone()),
                owner_id: owner_id.clone(),
                fields: fields.clone(),
                last_saved_at: Some(now),
            },
        );
        Ok(DraftReceipt {
            id,
            last_saved_at: now,
        })
    }

    async fn update_draft(
        &self,
        id: &str,
        owner_id: &OwnerId,
        patch: &DraftPatch,
    ) -> Result<DateTime<Utc>> {
        let call = Call::UpdateDraft {
            id: id.to_string(),
            patch: patch.clone(),
        };
        self.enter(call, Some(Op::UpdateDraft)).await?;
        let now = Utc::now();
        self.with_owned(id, owner_id, |drafts| {
            if let Some(draft) = drafts.get_mut(id) {
                let fields = &mut draft.fields;
                if let Some(v) = &patch.title {
                    fields.title.clone_from(v);
                }
                if let Some(v) = &patch.description {
                    fields.description.clone_from(v);
                }
                if let Some(v) = patch.kind {
                    fields.kind = v;
                }
                if let Some(v) = patch.duration {
                    fields.duration = v;
                }
                if let Some(v) = &patch.content {
                    fields.content.clone_from(v);
                }
                draft.last_saved_at = Some(now);
            }
        })?;
        Ok(now)
    }

    async fn delete_draft(&self, id: &str, owner_id: &OwnerId) -> Result<()> {
        self.enter(Call::DeleteDraft(id.to_string()), Some(Op::DeleteDraft))
            .await?;
        self.with_owned(id, owner_id, |drafts| {
            drafts.remove(id);
        })
    }

    async fn create_session(&self, _owner_id: &OwnerId, session: &NewSession) -> Result<String> {
        self.enter(Call::CreateSession(session.clone()), Some(Op::CreateSession))
            .await?;
        Ok(self.next_id("S"))
    }

    async fn get_draft(&self, id: &str, owner_id: &OwnerId) -> Result<Draft> {
        self.enter(Call::GetDraft(id.to_string()), None).await?;
        self.with_owned(id, owner_id, |drafts| drafts.get(id).cloned())?
            .ok_or_else(|| Error::not_found("draft", id))
    }
}
