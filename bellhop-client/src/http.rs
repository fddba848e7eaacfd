//! REST-backed data store.
//!
//! Talks to a PostgREST-style row API: query-parameter filters on GET,
//! filtered PATCH for the read flag. Access failures (401/403) are a
//! deployment problem and map to [`PipelineError::Permission`];
//! everything transport-shaped maps to connectivity.

use async_trait::async_trait;
use shared::{Notification, Order};

use crate::error::{PipelineError, PipelineResult};
use crate::reconcile::Viewer;
use crate::store::DataStore;

pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: None,
        }
    }

    /// Attach a bearer token for authenticated access.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(format!("{}/{}", self.base_url, path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    fn patch(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.patch(format!("{}/{}", self.base_url, path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn check(response: reqwest::Response) -> PipelineResult<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Permission(format!("{status} - {text}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Connectivity(format!("{status} - {text}")));
        }
        Ok(response)
    }

    /// PostgREST disjunction filter for the viewer's owned rows.
    fn owner_filter(viewer: &Viewer) -> String {
        match viewer.user_id.as_deref() {
            Some(user_id) => format!(
                "or=(user_id.eq.{user_id},client_id.eq.{})",
                viewer.client_id
            ),
            None => format!("client_id=eq.{}", viewer.client_id),
        }
    }
}

#[async_trait]
impl DataStore for RestStore {
    async fn fetch_unread_notifications(&self, limit: usize) -> PipelineResult<Vec<Notification>> {
        let response = self
            .get(&format!(
                "notifications?is_read=eq.false&order=created_at.desc&limit={limit}"
            ))
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::InvalidPayload(e.to_string()))
    }

    async fn fetch_orders(&self, viewer: &Viewer, limit: usize) -> PipelineResult<Vec<Order>> {
        let response = self
            .get(&format!(
                "orders?{}&order=created_at.desc&limit={limit}",
                Self::owner_filter(viewer)
            ))
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::InvalidPayload(e.to_string()))
    }

    async fn mark_notifications_read(&self, ids: &[String]) -> PipelineResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let response = self
            .patch(&format!("notifications?id=in.({})", ids.join(",")))
            .json(&serde_json::json!({ "is_read": true }))
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}
