//! HTTP implementation of the persistence gateway, for editing against a
//! remote server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::db::Gateway;
use crate::error::{Error, ErrorBody, Result};
use crate::models::{Draft, DraftFields, DraftPatch, DraftReceipt, NewSession, OwnerId, Session};
use crate::server::OWNER_HEADER;

const DRAFT: &str = "draft";
const SESSION: &str = "session";

/// Talks to the REST layer on behalf of one or more owners.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn drafts_url(&self) -> String {
        format!("{}/api/drafts", self.base_url)
    }

    fn draft_url(&self, id: &str) -> String {
        format!("{}/api/drafts/{}", self.base_url, urlencoding::encode(id))
    }

    fn session_url(&self, id: &str) -> String {
        format!("{}/api/sessions/{}", self.base_url, urlencoding::encode(id))
    }

    /// Read a session. Unpublished sessions resolve only for their owner.
    #[cfg(test)]
    pub async fn get_session(&self, id: &str, viewer: Option<&OwnerId>) -> Result<Session> {
        let mut req = self.client.get(self.session_url(id));
        if let Some(viewer) = viewer {
            req = req.header(OWNER_HEADER, viewer.as_str());
        }
        let resp = check(req.send().await?, SESSION, id).await?;
        Ok(resp.json().await?)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        owner_id: &OwnerId,
        entity: &'static str,
        id: &str,
    ) -> Result<T> {
        let resp = req.header(OWNER_HEADER, owner_id.as_str()).send().await?;
        Ok(check(resp, entity, id).await?.json().await?)
    }
}

/// Turn an error response back into the error the server raised.
async fn check(resp: Response, entity: &'static str, id: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status.to_string(),
    };
    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(message),
        StatusCode::CONFLICT => Error::AlreadyPublished(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::unauthorized(entity, id),
        StatusCode::NOT_FOUND => Error::not_found(entity, id),
        s if s.is_server_error() => Error::TransientIo(message),
        s => Error::internal(format!("unexpected status {s}: {message}")),
    })
}

fn receipt(draft: Draft) -> Result<DraftReceipt> {
    draft
        .into_receipt()
        .ok_or_else(|| Error::internal("server returned a draft without id or timestamp"))
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn create_draft(&self, owner_id: &OwnerId, fields: &DraftFields) -> Result<DraftReceipt> {
        let req = self.client.post(self.drafts_url()).json(fields);
        receipt(self.call(req, owner_id, DRAFT, "").await?)
    }

    async fn update_draft(
        &self,
        id: &str,
        owner_id: &OwnerId,
        patch: &DraftPatch,
    ) -> Result<DateTime<Utc>> {
        let req = self.client.put(self.draft_url(id)).json(patch);
        Ok(receipt(self.call(req, owner_id, DRAFT, id).await?)?.last_saved_at)
    }

    async fn delete_draft(&self, id: &str, owner_id: &OwnerId) -> Result<()> {
        let resp = self
            .client
            .delete(self.draft_url(id))
            .header(OWNER_HEADER, owner_id.as_str())
            .send()
            .await?;
        check(resp, DRAFT, id).await?;
        Ok(())
    }

    async fn create_session(&self, owner_id: &OwnerId, session: &NewSession) -> Result<String> {
        let req = self
            .client
            .post(format!("{}/api/sessions", self.base_url))
            .json(session);
        let session: Session = self.call(req, owner_id, SESSION, "").await?;
        Ok(session.id)
    }

    async fn get_draft(&self, id: &str, owner_id: &OwnerId) -> Result<Draft> {
        let req = self.client.get(self.draft_url(id));
        self.call(req, owner_id, DRAFT, id).await
    }
}
