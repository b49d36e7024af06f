//! End-to-end run-loop tests against a mock backend.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use delve_bus::EventBus;
use delve_core::events::StreamRequest;
use delve_core::state::{ResearchState, ResearchStatus};
use delve_settings::types::EndpointSettings;
use delve_store::sqlite::{ConnectionConfig, connection, run_migrations};
use delve_store::{RemoteStore, StateService};
use delve_stream::{ResearchStreamClient, RunOptions, StreamRunner};

fn fast_options() -> RunOptions {
    RunOptions {
        heartbeat_interval: Duration::from_secs(60),
        poll_interval: Duration::from_millis(10),
        poll_max_attempts: 5,
        approval_cadence: None,
    }
}

fn runner_for(server: &MockServer, options: RunOptions) -> StreamRunner {
    let endpoints = EndpointSettings {
        base_url: server.uri(),
        ..EndpointSettings::default()
    };
    let pool = connection::new_in_memory(&ConnectionConfig::default()).unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();
    let service = StateService::new(
        RemoteStore::new(endpoints.clone()).unwrap(),
        pool,
        EventBus::new(256),
    );
    StreamRunner::new(
        ResearchStreamClient::new(endpoints).unwrap(),
        service,
        options,
    )
}

fn request() -> StreamRequest {
    StreamRequest {
        research_objective: "why is the sky blue".into(),
        user_model: None,
        model: None,
        session_id: "sess_1".into(),
        research_id: "res_1".into(),
        user_id: None,
        client_id: "client_1".into(),
    }
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

async fn accept_state_saves(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/research/state"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn run_accumulates_stream_and_completes() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"event\":\"start\",\"data\":{\"stage\":\"Planning\"}}\n\n",
        "data: {\"event\":\"reasoning\",\"data\":{\"step\":\"Searching the web\"}}\n\n",
        "data: {\"event\":\"source\",\"data\":{\"source\":\"https://a.com\"}}\n\n",
        "data: {\"event\":\"finding\",\"data\":{\"source\":\"https://a.com\",",
        "\"finding\":{\"title\":\"Rayleigh scattering\",\"summary\":\"Blue scatters most\"}}}\n\n",
        "data: {\"event\":\"update\",\"data\":{\"chunk\":\"partial\"}}\n\n",
        "data: {\"event\":\"complete\",\"data\":{\"answer\":\"done\"}}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/research/stream"))
        .respond_with(sse(body))
        .mount(&server)
        .await;
    accept_state_saves(&server).await;

    let runner = runner_for(&server, fast_options());
    let state = runner.run(request(), CancellationToken::new()).await.unwrap();

    assert_eq!(state.status, ResearchStatus::Completed);
    assert_eq!(state.answer, "done");
    assert_eq!(state.sources, vec!["https://a.com"]);
    assert_eq!(state.findings.len(), 1);
    assert_eq!(state.reasoning_path, vec!["Searching the web"]);
    assert!(state.stage.is_none());
}

#[tokio::test]
async fn events_for_other_runs_are_ignored() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"event\":\"source\",\"data\":{\"source\":\"https://foreign.com\",",
        "\"session_id\":\"sess_other\"}}\n\n",
        "data: {\"event\":\"source\",\"data\":{\"source\":\"https://mine.com\",",
        "\"session_id\":\"sess_1\"}}\n\n",
        "data: {\"event\":\"complete\",\"data\":{}}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/research/stream"))
        .respond_with(sse(body))
        .mount(&server)
        .await;
    accept_state_saves(&server).await;

    let runner = runner_for(&server, fast_options());
    let state = runner.run(request(), CancellationToken::new()).await.unwrap();

    assert_eq!(state.sources, vec!["https://mine.com"]);
}

#[tokio::test]
async fn broken_stream_falls_back_to_polling() {
    let server = MockServer::start().await;
    // Stream closes after one event, without a terminal record.
    let body = "data: {\"event\":\"start\",\"data\":{\"stage\":\"Planning\"}}\n\n";
    Mock::given(method("POST"))
        .and(path("/research/stream"))
        .respond_with(sse(body))
        .mount(&server)
        .await;
    accept_state_saves(&server).await;

    // Polling finds a completed run on the backend. Timestamps in the
    // future so the backend snapshot wins last-writer-wins resolution.
    let mut remote_state = ResearchState::new(
        delve_core::state::ResearchIdentity {
            session_id: delve_core::ids::SessionId::new("sess_1"),
            research_id: delve_core::ids::ResearchId::new("res_1"),
            client_id: delve_core::ids::ClientId::new("client_1"),
        },
        "why is the sky blue",
    );
    remote_state.adopt_final(Some("resolved by polling".into()), vec![], vec![], vec![]);
    remote_state.updated_at = "2999-01-01T00:00:00+00:00".into();
    Mock::given(method("GET"))
        .and(path("/research/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&remote_state))
        .mount(&server)
        .await;

    let runner = runner_for(&server, fast_options());
    let state = runner.run(request(), CancellationToken::new()).await.unwrap();

    assert_eq!(state.status, ResearchStatus::Completed);
    assert_eq!(state.answer, "resolved by polling");
}

#[tokio::test]
async fn exhausted_polling_returns_accumulated_state() {
    let server = MockServer::start().await;
    let body = "data: {\"event\":\"source\",\"data\":{\"source\":\"https://a.com\"}}\n\n";
    Mock::given(method("POST"))
        .and(path("/research/stream"))
        .respond_with(sse(body))
        .mount(&server)
        .await;
    accept_state_saves(&server).await;
    // Backend never has state for the session.
    Mock::given(method("GET"))
        .and(path("/research/state"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let runner = runner_for(&server, fast_options());
    let state = runner.run(request(), CancellationToken::new()).await.unwrap();

    // Not terminal, but what the stream delivered is preserved.
    assert_eq!(state.status, ResearchStatus::InProgress);
    assert_eq!(state.sources, vec!["https://a.com"]);
}

#[tokio::test]
async fn cancellation_ends_the_run_promptly() {
    let server = MockServer::start().await;
    let body = "data: {\"event\":\"start\",\"data\":{\"stage\":\"Planning\"}}\n\n";
    Mock::given(method("POST"))
        .and(path("/research/stream"))
        .respond_with(sse(body))
        .mount(&server)
        .await;
    accept_state_saves(&server).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let runner = runner_for(&server, fast_options());
    let state = runner.run(request(), cancel).await.unwrap();

    // Cancelled before any event was consumed.
    assert_eq!(state.status, ResearchStatus::InProgress);
    assert!(state.reasoning_path.is_empty());
}

#[tokio::test]
async fn rejected_stream_open_goes_straight_to_polling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/research/stream"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    accept_state_saves(&server).await;

    let mut remote_state = ResearchState::new(
        delve_core::state::ResearchIdentity {
            session_id: delve_core::ids::SessionId::new("sess_1"),
            research_id: delve_core::ids::ResearchId::new("res_1"),
            client_id: delve_core::ids::ClientId::new("client_1"),
        },
        "why is the sky blue",
    );
    remote_state.adopt_final(Some("from polling".into()), vec![], vec![], vec![]);
    remote_state.updated_at = "2999-01-01T00:00:00+00:00".into();
    Mock::given(method("GET"))
        .and(path("/research/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&remote_state))
        .mount(&server)
        .await;

    let runner = runner_for(&server, fast_options());
    let state = runner.run(request(), CancellationToken::new()).await.unwrap();
    assert_eq!(state.answer, "from polling");
}
