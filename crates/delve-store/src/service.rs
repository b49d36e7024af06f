//! State service — the one write path for research state.
//!
//! Every state mutation flows through [`StateService::save_research_state`]:
//! the snapshot lands in the local cache first (marked unsynced), is pushed
//! to the remote store, and is announced on the bus. Remote failures degrade
//! to cache-only operation instead of failing the save; the unsynced flag
//! records what the backend has not confirmed.
//!
//! Reads prefer the remote snapshot but resolve against the local cache by
//! `updated_at`, so a stale backend never rolls back state a client already
//! accumulated.

use tracing::{debug, info, instrument, warn};

use delve_bus::{BusEvent, EventBus};
use delve_core::state::ResearchState;
use delve_core::user_model::UserModel;

use crate::errors::{Result, StoreError};
use crate::remote::{ApprovalResponse, RemoteStore};
use crate::sqlite::ConnectionPool;
use crate::sqlite::repositories::{
    HistoryEntry, HistoryRepo, SnapshotRepo, UserModelRepo, WriteOutcome,
    snapshot::is_newer,
};

/// Coordinates the local snapshot cache, the remote store, and the bus.
#[derive(Clone)]
pub struct StateService {
    remote: RemoteStore,
    pool: ConnectionPool,
    bus: EventBus,
}

impl StateService {
    /// Build a service over an opened pool and remote client.
    #[must_use]
    pub fn new(remote: RemoteStore, pool: ConnectionPool, bus: EventBus) -> Self {
        Self { remote, pool, bus }
    }

    /// The bus this service publishes on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Persist a snapshot: local cache first, then remote, then the bus.
    ///
    /// A remote failure is logged and absorbed — the snapshot stays cached
    /// with `synced = false` and the save succeeds. Only local failures
    /// (pool, SQLite, serialization) propagate.
    #[instrument(skip_all, fields(
        session_id = %state.identity.session_id,
        status = ?state.status,
    ))]
    pub async fn save_research_state(&self, state: &ResearchState) -> Result<()> {
        let outcome = {
            let conn = self.pool.get()?;
            SnapshotRepo::upsert(&conn, state, false)?
        };
        if outcome == WriteOutcome::StaleDropped {
            debug!("snapshot older than cached row, skipping remote push");
            return Ok(());
        }

        match self.remote.save_state(state).await {
            Ok(()) => {
                let conn = self.pool.get()?;
                let _ = SnapshotRepo::mark_synced(
                    &conn,
                    state.identity.session_id.as_str(),
                    state.identity.client_id.as_str(),
                )?;
            }
            Err(err) if err.is_remote_failure() => {
                warn!(error = %err, "remote save failed, keeping unsynced cache entry");
            }
            Err(err) => return Err(err),
        }

        self.bus.publish(BusEvent::StateUpdate {
            state: Box::new(state.clone()),
        });
        Ok(())
    }

    /// Fetch the freshest snapshot for a session.
    ///
    /// The remote snapshot wins only when newer than the local cache
    /// (last-writer-wins by `updated_at`); a winning remote snapshot is
    /// cached locally. When the remote store is unreachable the cache
    /// serves alone.
    #[instrument(skip(self))]
    pub async fn get_research_state(
        &self,
        session_id: &str,
        research_id: Option<&str>,
    ) -> Result<Option<ResearchState>> {
        let local = {
            let conn = self.pool.get()?;
            SnapshotRepo::latest_for_session(&conn, session_id)?
        };

        let remote = match self.remote.get_state(session_id, research_id).await {
            Ok(remote) => remote,
            Err(err) if err.is_remote_failure() => {
                warn!(error = %err, "remote fetch failed, serving local cache");
                return Ok(local.map(|row| row.state));
            }
            Err(err) => return Err(err),
        };

        match (remote, local) {
            (Some(remote), Some(local)) => {
                if is_newer(&remote.updated_at, &local.updated_at) {
                    self.cache_remote(&remote)?;
                    Ok(Some(remote))
                } else {
                    debug!("local cache is at least as fresh as remote");
                    Ok(Some(local.state))
                }
            }
            (Some(remote), None) => {
                self.cache_remote(&remote)?;
                Ok(Some(remote))
            }
            (None, local) => Ok(local.map(|row| row.state)),
        }
    }

    fn cache_remote(&self, state: &ResearchState) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = SnapshotRepo::upsert(&conn, state, true)?;
        Ok(())
    }

    /// Drop all cached state for a session (snapshots and history).
    #[instrument(skip(self))]
    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let removed = SnapshotRepo::delete_for_session(&conn, session_id)?;
        let _ = HistoryRepo::delete(&conn, session_id)?;
        info!(session_id, removed, "cleared session cache");
        Ok(())
    }

    /// Record (or refresh) a session in the history list.
    pub fn record_history(
        &self,
        session_id: &str,
        research_id: Option<&str>,
        query: &str,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        HistoryRepo::upsert(&conn, session_id, research_id, query)
    }

    /// Bump a session's last-activity timestamp.
    pub fn touch_history(&self, session_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        HistoryRepo::touch(&conn, session_id)
    }

    /// List sessions, most recently active first.
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.pool.get()?;
        HistoryRepo::list(&conn, limit)
    }

    /// Get a single session's history entry.
    pub fn get_session(&self, session_id: &str) -> Result<Option<HistoryEntry>> {
        let conn = self.pool.get()?;
        HistoryRepo::get(&conn, session_id)
    }

    /// Post a human-approval response to the backend.
    pub async fn send_approval(&self, approval: &ApprovalResponse) -> Result<()> {
        self.remote.send_approval(approval).await
    }

    /// Save a user model locally and push it to the backend.
    ///
    /// Remote failures are absorbed like state saves: the model stays in
    /// the local cache.
    pub async fn save_user_model(&self, model: &UserModel, create: bool) -> Result<()> {
        {
            let conn = self.pool.get()?;
            UserModelRepo::upsert(&conn, model)?;
        }
        let pushed = if create {
            self.remote.create_user_model(model).await
        } else {
            self.remote.update_user_model(model).await
        };
        if let Err(err) = pushed {
            if !err.is_remote_failure() {
                return Err(err);
            }
            warn!(error = %err, id = %model.id, "remote user-model push failed");
        }
        Ok(())
    }

    /// List cached user models, refreshing from the backend when reachable.
    pub async fn list_user_models(&self) -> Result<Vec<UserModel>> {
        match self.remote.list_user_models().await {
            Ok(models) => {
                let conn = self.pool.get()?;
                for model in &models {
                    UserModelRepo::upsert(&conn, model)?;
                }
            }
            Err(err) if err.is_remote_failure() => {
                warn!(error = %err, "remote user-model list failed, serving local cache");
            }
            Err(err) => return Err(err),
        }
        let conn = self.pool.get()?;
        UserModelRepo::list(&conn)
    }

    /// Get a user model from the local cache.
    pub fn get_user_model(&self, id: &str) -> Result<Option<UserModel>> {
        let conn = self.pool.get()?;
        UserModelRepo::get(&conn, id)
    }

    /// The default user model, if any.
    pub fn default_user_model(&self) -> Result<Option<UserModel>> {
        let conn = self.pool.get()?;
        UserModelRepo::get_default(&conn)
    }

    /// Make `id` the sole default model.
    pub fn set_default_user_model(&self, id: &str) -> Result<()> {
        let mut conn = self.pool.get()?;
        UserModelRepo::set_default(&mut conn, id)
    }

    /// Delete a user model locally and remotely.
    pub async fn delete_user_model(&self, id: &str) -> Result<()> {
        let removed = {
            let conn = self.pool.get()?;
            UserModelRepo::delete(&conn, id)?
        };
        if !removed {
            return Err(StoreError::NotFound(format!("user model {id}")));
        }
        if let Err(err) = self.remote.delete_user_model(id).await {
            if !err.is_remote_failure() {
                return Err(err);
            }
            warn!(error = %err, id, "remote user-model delete failed");
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use delve_core::ids::{ClientId, ResearchId, SessionId};
    use delve_core::state::ResearchIdentity;
    use delve_settings::types::EndpointSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::sqlite::{ConnectionConfig, connection, run_migrations};

    async fn service_for(server: &MockServer) -> StateService {
        let endpoints = EndpointSettings {
            base_url: server.uri(),
            ..EndpointSettings::default()
        };
        let pool = connection::new_in_memory(&ConnectionConfig::default()).unwrap();
        run_migrations(&pool.get().unwrap()).unwrap();
        StateService::new(
            RemoteStore::new(endpoints).unwrap(),
            pool,
            EventBus::new(16),
        )
    }

    fn state_for(session: &str, client: &str) -> ResearchState {
        ResearchState::new(
            ResearchIdentity {
                session_id: SessionId::new(session),
                research_id: ResearchId::new("res_1"),
                client_id: ClientId::new(client),
            },
            "query",
        )
    }

    #[tokio::test]
    async fn save_marks_synced_and_publishes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/research/state"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let mut rx = service.bus().subscribe();
        let state = state_for("sess_1", "client_a");
        service.save_research_state(&state).await.unwrap();

        let conn = service.pool.get().unwrap();
        let row = SnapshotRepo::get(&conn, "sess_1", "client_a")
            .unwrap()
            .unwrap();
        assert!(row.synced);

        match rx.try_recv().unwrap() {
            BusEvent::StateUpdate { state: published } => {
                assert_eq!(*published, state);
            }
            other => panic!("unexpected bus event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_survives_remote_outage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/research/state"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let state = state_for("sess_1", "client_a");
        service.save_research_state(&state).await.unwrap();

        let conn = service.pool.get().unwrap();
        let row = SnapshotRepo::get(&conn, "sess_1", "client_a")
            .unwrap()
            .unwrap();
        assert!(!row.synced);
        assert_eq!(row.state, state);
    }

    #[tokio::test]
    async fn save_then_get_round_trips_through_cache() {
        let server = MockServer::start().await;
        // Remote accepts the save but has no state to serve back.
        Mock::given(method("POST"))
            .and(path("/research/state"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/research/state"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let mut state = state_for("sess_1", "client_a");
        state.push_source("https://a.com");
        state.push_reasoning_step("Planning");
        service.save_research_state(&state).await.unwrap();

        let fetched = service
            .get_research_state("sess_1", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, state);
    }

    #[tokio::test]
    async fn get_prefers_newer_remote_and_caches_it() {
        let server = MockServer::start().await;
        let mut remote_state = state_for("sess_1", "client_b");
        remote_state.push_source("https://remote-wins.com");
        remote_state.updated_at = "2026-06-02T00:00:00+00:00".into();
        Mock::given(method("GET"))
            .and(path("/research/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&remote_state))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let mut local = state_for("sess_1", "client_a");
        local.updated_at = "2026-06-01T00:00:00+00:00".into();
        {
            let conn = service.pool.get().unwrap();
            SnapshotRepo::upsert(&conn, &local, true).unwrap();
        }

        let fetched = service
            .get_research_state("sess_1", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, remote_state);

        let conn = service.pool.get().unwrap();
        let cached = SnapshotRepo::get(&conn, "sess_1", "client_b")
            .unwrap()
            .unwrap();
        assert_eq!(cached.state, remote_state);
    }

    #[tokio::test]
    async fn get_keeps_newer_local_over_stale_remote() {
        let server = MockServer::start().await;
        let mut remote_state = state_for("sess_1", "client_b");
        remote_state.updated_at = "2026-06-01T00:00:00+00:00".into();
        Mock::given(method("GET"))
            .and(path("/research/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&remote_state))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let mut local = state_for("sess_1", "client_a");
        local.push_source("https://local-wins.com");
        local.updated_at = "2026-06-02T00:00:00+00:00".into();
        {
            let conn = service.pool.get().unwrap();
            SnapshotRepo::upsert(&conn, &local, true).unwrap();
        }

        let fetched = service
            .get_research_state("sess_1", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.sources, vec!["https://local-wins.com"]);
    }

    #[tokio::test]
    async fn get_falls_back_to_cache_when_remote_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/research/state"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let state = state_for("sess_1", "client_a");
        {
            let conn = service.pool.get().unwrap();
            SnapshotRepo::upsert(&conn, &state, false).unwrap();
        }

        let fetched = service
            .get_research_state("sess_1", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, state);
    }

    #[tokio::test]
    async fn clear_session_removes_snapshots_and_history() {
        let server = MockServer::start().await;
        let service = service_for(&server).await;
        let state = state_for("sess_1", "client_a");
        {
            let conn = service.pool.get().unwrap();
            SnapshotRepo::upsert(&conn, &state, false).unwrap();
        }
        service.record_history("sess_1", Some("res_1"), "q").unwrap();

        service.clear_session("sess_1").unwrap();
        let conn = service.pool.get().unwrap();
        assert!(SnapshotRepo::get(&conn, "sess_1", "client_a").unwrap().is_none());
        assert!(HistoryRepo::get(&conn, "sess_1").unwrap().is_none());
    }

    #[tokio::test]
    async fn user_model_list_refreshes_cache_when_remote_up() {
        let server = MockServer::start().await;
        let model = UserModel::new("Academic");
        Mock::given(method("GET"))
            .and(path("/user-models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![&model]))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let models = service.list_user_models().await.unwrap();
        assert_eq!(models, vec![model.clone()]);
        // Now cached locally.
        assert!(service.get_user_model(model.id.as_str()).unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_unknown_user_model_is_not_found() {
        let server = MockServer::start().await;
        let service = service_for(&server).await;
        let err = service.delete_user_model("um_missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
