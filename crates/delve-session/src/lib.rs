//! Session lifecycle.
//!
//! [`SessionManager`] owns the notion of "the active session": which
//! session the client is looking at, the cancellation token of any
//! in-flight research run, and the stable client id this process streams
//! under. Switching sessions or starting a fresh chat cancels the active
//! run outright — identity filtering in ingestion remains as a second
//! line of defense, but a cancelled stream stops consuming the network.

#![deny(unsafe_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use delve_bus::{BusEvent, EventBus};
use delve_core::events::StreamRequest;
use delve_core::ids::{ClientId, ResearchId, SessionId};
use delve_core::state::{InteractionStatus, ResearchState};
use delve_core::user_model::UserModel;
use delve_store::{ApprovalResponse, StateService};
use delve_stream::StreamRunner;

/// Errors raised by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] delve_store::StoreError),

    /// Streaming failure.
    #[error(transparent)]
    Stream(#[from] delve_stream::StreamError),

    /// The referenced interaction does not exist or was already resolved.
    #[error("no pending interaction with call id {0}")]
    UnknownInteraction(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Inputs for starting a research run beyond the objective itself.
#[derive(Clone, Debug, Default)]
pub struct RunParams {
    /// Persona profile to research as.
    pub user_model: Option<UserModel>,
    /// Backend model override.
    pub model: Option<String>,
    /// Owning user, when authenticated.
    pub user_id: Option<String>,
}

struct ActiveSession {
    session_id: SessionId,
    cancel: CancellationToken,
}

/// Tracks the active session and drives runs against it.
pub struct SessionManager {
    service: StateService,
    runner: Arc<StreamRunner>,
    bus: EventBus,
    client_id: ClientId,
    active: Mutex<ActiveSession>,
}

impl SessionManager {
    /// Create a manager with a freshly generated session and client id.
    #[must_use]
    pub fn new(service: StateService, runner: StreamRunner) -> Self {
        let bus = service.bus().clone();
        Self {
            service,
            runner: Arc::new(runner),
            bus,
            client_id: ClientId::generate(),
            active: Mutex::new(ActiveSession {
                session_id: SessionId::generate(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// The currently active session.
    #[must_use]
    pub fn active_session(&self) -> SessionId {
        self.active.lock().session_id.clone()
    }

    /// The stable client id this process streams under.
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Subscribe to the client bus.
    #[must_use]
    pub fn bus_subscribe(&self) -> delve_bus::BusReceiver {
        self.bus.subscribe()
    }

    /// Start a research run in the active session.
    ///
    /// Any in-flight run is cancelled first; one session drives at most
    /// one live stream.
    #[instrument(skip_all)]
    pub fn start_research(
        &self,
        objective: impl Into<String>,
        params: RunParams,
    ) -> JoinHandle<delve_stream::Result<ResearchState>> {
        let objective = objective.into();
        debug!(%objective, "starting research run");
        let (session_id, cancel) = {
            let mut active = self.active.lock();
            active.cancel.cancel();
            active.cancel = CancellationToken::new();
            (active.session_id.clone(), active.cancel.clone())
        };

        let request = StreamRequest {
            research_objective: objective,
            user_model: params.user_model,
            model: params.model,
            session_id: session_id.as_str().to_string(),
            research_id: ResearchId::generate().as_str().to_string(),
            user_id: params.user_id,
            client_id: self.client_id.as_str().to_string(),
        };

        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move { runner.run(request, cancel).await })
    }

    /// Switch to another session.
    ///
    /// Cancels the in-flight run, announces the switch, and loads the
    /// session's freshest snapshot (published as a state update when one
    /// exists).
    #[instrument(skip(self))]
    pub async fn select_session(&self, session_id: SessionId) -> Result<Option<ResearchState>> {
        {
            let mut active = self.active.lock();
            if active.session_id == session_id {
                debug!("session already active");
            }
            active.cancel.cancel();
            active.cancel = CancellationToken::new();
            active.session_id = session_id.clone();
        }
        self.bus.publish(BusEvent::SessionSelected {
            session_id: session_id.clone(),
        });

        let state = self
            .service
            .get_research_state(session_id.as_str(), None)
            .await?;
        if let Some(state) = &state {
            self.bus.publish(BusEvent::StateUpdate {
                state: Box::new(state.clone()),
            });
        }
        Ok(state)
    }

    /// Start a fresh chat: cancel the in-flight run and activate a new
    /// empty session.
    #[instrument(skip(self))]
    pub fn new_chat(&self) -> SessionId {
        let session_id = SessionId::generate();
        {
            let mut active = self.active.lock();
            active.cancel.cancel();
            active.cancel = CancellationToken::new();
            active.session_id = session_id.clone();
        }
        info!(session_id = %session_id, "started new chat");
        self.bus.publish(BusEvent::NewChatRequested {
            session_id: session_id.clone(),
        });
        session_id
    }

    /// Answer a pending human-approval interaction.
    ///
    /// Posts the response to the backend, resolves the interaction in the
    /// snapshot, and persists the updated state.
    #[instrument(skip(self, state), fields(call_id))]
    pub async fn respond_to_interaction(
        &self,
        state: &mut ResearchState,
        call_id: &str,
        approved: bool,
        reason: Option<String>,
    ) -> Result<()> {
        let Some(interaction) = state
            .human_interactions
            .iter()
            .find(|i| i.call_id == call_id && i.status == InteractionStatus::Pending)
        else {
            return Err(SessionError::UnknownInteraction(call_id.to_string()));
        };

        // Locally synthesized interactions have no backend counterpart.
        if !call_id.starts_with("local_") {
            self.service
                .send_approval(&ApprovalResponse {
                    call_id: call_id.to_string(),
                    node_id: interaction.node_id.clone(),
                    approved,
                    reason: reason.clone(),
                    session_id: state.identity.session_id.as_str().to_string(),
                })
                .await?;
        }

        let status = if approved {
            InteractionStatus::Approved
        } else {
            InteractionStatus::Rejected
        };
        let _ = state.resolve_interaction(call_id, status, reason);
        self.service.save_research_state(state).await?;
        Ok(())
    }

    /// Delete a session's cached state and history.
    pub fn clear_session(&self, session_id: &SessionId) -> Result<()> {
        self.service.clear_session(session_id.as_str())?;
        Ok(())
    }

    /// Toggle sidebar visibility for any listening views.
    pub fn toggle_sidebar(&self, open: bool) {
        self.bus.publish(BusEvent::SidebarToggle { open });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
