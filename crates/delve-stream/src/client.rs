//! SSE client for the research stream endpoint.
//!
//! Opens the stream with a POST carrying the [`StreamRequest`], then parses
//! each SSE record's payload into a [`ResearchEvent`] at the boundary.
//! Malformed records are logged and skipped — one bad payload must not kill
//! a live stream — while transport breaks surface as a terminal `Err` item
//! so the run loop can fall back to polling.

use std::pin::Pin;

use async_stream::stream;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use tracing::{debug, instrument, warn};

use delve_core::events::{ResearchEvent, StreamRequest};
use delve_settings::types::EndpointSettings;

use crate::errors::{Result, StreamError};

/// Parsed events from a live stream; ends after the first `Err` item.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ResearchEvent>> + Send>>;

/// Client for the streaming research endpoint.
#[derive(Clone, Debug)]
pub struct ResearchStreamClient {
    client: reqwest::Client,
    endpoints: EndpointSettings,
}

impl ResearchStreamClient {
    /// Build a client from endpoint settings.
    ///
    /// No request timeout is set: a research stream legitimately stays open
    /// for minutes. Connect failures still surface promptly.
    pub fn new(endpoints: EndpointSettings) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, endpoints })
    }

    /// Open a research stream.
    #[instrument(skip_all, fields(session_id = %request.session_id))]
    pub async fn open(&self, request: &StreamRequest) -> Result<EventStream> {
        let response = self
            .client
            .post(self.endpoints.stream_url())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StreamError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let mut records = response.bytes_stream().eventsource();
        Ok(Box::pin(stream! {
            while let Some(record) = records.next().await {
                match record {
                    Ok(record) => match ResearchEvent::parse(&record.data) {
                        Ok(event) => {
                            debug!(event_type = event.event_type(), "stream event");
                            yield Ok(event);
                        }
                        Err(err) => {
                            warn!(error = %err, payload = %record.data,
                                  "skipping malformed stream record");
                        }
                    },
                    Err(err) => {
                        yield Err(StreamError::Transport(err));
                        return;
                    }
                }
            }
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

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

    fn sse_response(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/event-stream")
            .set_body_string(body)
    }

    async fn client_for(server: &MockServer) -> ResearchStreamClient {
        ResearchStreamClient::new(EndpointSettings {
            base_url: server.uri(),
            ..EndpointSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn open_posts_request_and_parses_events() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"event\":\"start\",\"data\":{\"stage\":\"Planning\"}}\n\n",
            "data: {\"event\":\"source\",\"data\":{\"source\":\"https://a.com\"}}\n\n",
            "data: {\"event\":\"complete\",\"data\":{\"answer\":\"done\"}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/research/stream"))
            .and(body_partial_json(serde_json::json!({
                "research_objective": "why is the sky blue",
                "session_id": "sess_1",
            })))
            .respond_with(sse_response(body))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let events: Vec<_> = client
            .open(&request())
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_matches!(&events[0], ResearchEvent::Start { stage: Some(s), .. } if s == "Planning");
        assert_matches!(&events[1], ResearchEvent::Source { source, .. } if source == "https://a.com");
        assert_matches!(&events[2], ResearchEvent::Complete { answer: Some(a), .. } if a == "done");
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"event\":\"start\",\"data\":{}}\n\n",
            "data: this is not json\n\n",
            "data: {\"event\":\"nonsense\",\"data\":{}}\n\n",
            "data: {\"event\":\"complete\",\"data\":{}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/research/stream"))
            .respond_with(sse_response(body))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let events: Vec<_> = client
            .open(&request())
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_matches!(&events[0], ResearchEvent::Start { .. });
        assert_matches!(&events[1], ResearchEvent::Complete { .. });
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/research/stream"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let Err(err) = client.open(&request()).await else {
            panic!("expected the stream open to be rejected");
        };
        assert_matches!(err, StreamError::Rejected { status: 503, message } if message == "overloaded");
    }
}
