//! HTTP client for the remote research store.
//!
//! Thin typed wrapper over the backend's non-streaming endpoints: state
//! snapshots, human-approval responses, and user-model CRUD. Every call
//! returns [`StoreError::Remote`] for non-success statuses so the service
//! layer can decide between retry, fallback, and surfacing.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, instrument};

use delve_core::state::ResearchState;
use delve_core::user_model::UserModel;
use delve_settings::types::EndpointSettings;

use crate::errors::{Result, StoreError};

/// A human-approval response posted back to the backend.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ApprovalResponse {
    /// Backend call this responds to.
    pub call_id: String,
    /// Reasoning node the interaction belongs to.
    pub node_id: String,
    /// Whether the user approved.
    pub approved: bool,
    /// Optional free-text reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Session the interaction belongs to.
    pub session_id: String,
}

/// Typed client for the remote store endpoints.
#[derive(Clone, Debug)]
pub struct RemoteStore {
    client: reqwest::Client,
    endpoints: EndpointSettings,
}

impl RemoteStore {
    /// Build a client from endpoint settings.
    pub fn new(endpoints: EndpointSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(endpoints.request_timeout_ms))
            .build()?;
        Ok(Self { client, endpoints })
    }

    /// Push a state snapshot to the backend.
    #[instrument(skip_all, fields(session_id = %state.identity.session_id))]
    pub async fn save_state(&self, state: &ResearchState) -> Result<()> {
        let response = self
            .client
            .post(self.endpoints.state_url())
            .json(state)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Fetch the backend's snapshot for a session.
    ///
    /// `Ok(None)` when the backend has no state for the session (404).
    #[instrument(skip(self))]
    pub async fn get_state(
        &self,
        session_id: &str,
        research_id: Option<&str>,
    ) -> Result<Option<ResearchState>> {
        let mut query: Vec<(&str, &str)> = vec![("session_id", session_id)];
        if let Some(research_id) = research_id {
            query.push(("research_id", research_id));
        }
        let response = self
            .client
            .get(self.endpoints.state_url())
            .query(&query)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(session_id, "remote has no state for session");
            return Ok(None);
        }
        let response = Self::ensure_success(response).await?;
        Ok(Some(response.json().await?))
    }

    /// Post a human-approval response.
    #[instrument(skip_all, fields(call_id = %approval.call_id))]
    pub async fn send_approval(&self, approval: &ApprovalResponse) -> Result<()> {
        let response = self
            .client
            .post(self.endpoints.approval_url())
            .json(approval)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// List user models.
    pub async fn list_user_models(&self) -> Result<Vec<UserModel>> {
        let response = self
            .client
            .get(self.endpoints.user_models_url())
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Create a user model.
    pub async fn create_user_model(&self, model: &UserModel) -> Result<()> {
        let response = self
            .client
            .post(self.endpoints.user_models_url())
            .json(model)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Update a user model.
    pub async fn update_user_model(&self, model: &UserModel) -> Result<()> {
        let url = format!("{}/{}", self.endpoints.user_models_url(), model.id.as_str());
        let response = self.client.put(url).json(model).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Delete a user model.
    pub async fn delete_user_model(&self, id: &str) -> Result<()> {
        let url = format!("{}/{}", self.endpoints.user_models_url(), id);
        let response = self.client.delete(url).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(StoreError::Remote {
            status: status.as_u16(),
            message,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
