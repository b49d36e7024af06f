//! The research stream wire protocol.
//!
//! The backend streams SSE records whose payload is `{"event": "...",
//! "data": {...}}`. [`ResearchEvent`] is the tagged union those records are
//! parsed into at the boundary — business logic never sees loose JSON.
//!
//! Every event's data may carry the identifiers of the run it belongs to
//! ([`EventScope`]); ingestion drops events whose scope does not match the
//! active [`ResearchIdentity`](crate::state::ResearchIdentity). Missing
//! identifiers pass the filter (older backends omit them), present-but-
//! different identifiers fail it.

use serde::{Deserialize, Serialize};

use crate::state::{Finding, ResearchIdentity};

/// Identifiers embedded in an event's data, all optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventScope {
    /// Session the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Research run the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_id: Option<String>,
    /// Client the stream was opened by.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl EventScope {
    /// Whether this scope is compatible with the active identity.
    ///
    /// A missing identifier is compatible; a present identifier must match.
    #[must_use]
    pub fn matches(&self, identity: &ResearchIdentity) -> bool {
        let ok = |embedded: &Option<String>, active: &str| {
            embedded.as_deref().is_none_or(|v| v == active)
        };
        ok(&self.session_id, identity.session_id.as_str())
            && ok(&self.research_id, identity.research_id.as_str())
            && ok(&self.client_id, identity.client_id.as_str())
    }
}

/// A parsed stream record.
///
/// Wire format: `{"event": "<tag>", "data": {...}}`, adjacently tagged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// Stream opened; the backend announces the current stage.
    Start {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// Human-readable stage text.
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },

    /// Incremental answer text.
    Update {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// Answer fragment (newer backends).
        #[serde(skip_serializing_if = "Option::is_none")]
        chunk: Option<String>,
        /// Answer fragment (older backends use this key).
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
    },

    /// A discovered source URL.
    Source {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// The source URL.
        source: String,
    },

    /// A structured finding extracted from a source.
    Finding {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// The finding payload (`source`, `content`, `node_id`, `finding`).
        #[serde(flatten)]
        finding: Finding,
    },

    /// A reasoning step description.
    Reasoning {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// Free-text step description.
        step: String,
    },

    /// Synthesis update for one reasoning node.
    ReportUpdate {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// Node the synthesis belongs to.
        node_id: String,
        /// Query the node was answering.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        /// Synthesis text.
        synthesis: String,
        /// Confidence in [0, 1].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },

    /// Terminal synthesis for the whole run.
    FinalReport {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// Root node id; defaults to `root` when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        /// Report text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        synthesis: Option<String>,
        /// Confidence in [0, 1].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },

    /// The run finished; the server's arrays are authoritative.
    Complete {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// Final answer text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        /// Final source list.
        #[serde(default)]
        sources: Vec<String>,
        /// Final findings.
        #[serde(default)]
        findings: Vec<Finding>,
        /// Final reasoning path.
        #[serde(default)]
        reasoning_path: Vec<String>,
    },

    /// The backend reported an error.
    Error {
        /// Event identifiers.
        #[serde(flatten)]
        scope: EventScope,
        /// Error message (`message` key).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Error message (`error` key on some backends).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ResearchEvent {
    /// Parse a stream record payload (the JSON after `data: `).
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// The identifiers embedded in this event.
    #[must_use]
    pub fn scope(&self) -> &EventScope {
        match self {
            Self::Start { scope, .. }
            | Self::Update { scope, .. }
            | Self::Source { scope, .. }
            | Self::Finding { scope, .. }
            | Self::Reasoning { scope, .. }
            | Self::ReportUpdate { scope, .. }
            | Self::FinalReport { scope, .. }
            | Self::Complete { scope, .. }
            | Self::Error { scope, .. } => scope,
        }
    }

    /// The wire tag for this event (for logs and metrics labels).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Update { .. } => "update",
            Self::Source { .. } => "source",
            Self::Finding { .. } => "finding",
            Self::Reasoning { .. } => "reasoning",
            Self::ReportUpdate { .. } => "report_update",
            Self::FinalReport { .. } => "final_report",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

/// Body of the stream-open POST request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamRequest {
    /// The research objective to investigate.
    pub research_objective: String,
    /// Persona profile to research as, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_model: Option<crate::user_model::UserModel>,
    /// Backend model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Session the run belongs to.
    pub session_id: String,
    /// The research run id.
    pub research_id: String,
    /// Owning user, when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// The requesting client.
    pub client_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ClientId, ResearchId, SessionId};
    use assert_matches::assert_matches;

    fn identity() -> ResearchIdentity {
        ResearchIdentity {
            session_id: SessionId::new("sess_1"),
            research_id: ResearchId::new("res_1"),
            client_id: ClientId::new("client_1"),
        }
    }

    #[test]
    fn parse_start() {
        let event =
            ResearchEvent::parse(r#"{"event":"start","data":{"stage":"Planning research"}}"#)
                .unwrap();
        assert_matches!(event, ResearchEvent::Start { stage: Some(s), .. } if s == "Planning research");
    }

    #[test]
    fn parse_source_with_scope() {
        let event = ResearchEvent::parse(
            r#"{"event":"source","data":{"source":"https://a.com","session_id":"sess_1"}}"#,
        )
        .unwrap();
        assert_matches!(&event, ResearchEvent::Source { source, .. } if source == "https://a.com");
        assert_eq!(event.scope().session_id.as_deref(), Some("sess_1"));
    }

    #[test]
    fn parse_finding_flattens_payload() {
        let event = ResearchEvent::parse(
            r#"{"event":"finding","data":{"source":"https://a.com","finding":{"title":"X","summary":"S"}}}"#,
        )
        .unwrap();
        let ResearchEvent::Finding { finding, .. } = event else {
            panic!("expected finding event");
        };
        assert_eq!(finding.source, "https://a.com");
        assert_eq!(finding.detail.as_ref().unwrap().title.as_deref(), Some("X"));
    }

    #[test]
    fn parse_complete_defaults_missing_arrays() {
        let event =
            ResearchEvent::parse(r#"{"event":"complete","data":{"answer":"done"}}"#).unwrap();
        let ResearchEvent::Complete {
            answer,
            sources,
            findings,
            reasoning_path,
            ..
        } = event
        else {
            panic!("expected complete event");
        };
        assert_eq!(answer.as_deref(), Some("done"));
        assert!(sources.is_empty());
        assert!(findings.is_empty());
        assert!(reasoning_path.is_empty());
    }

    #[test]
    fn parse_unknown_event_fails() {
        assert!(ResearchEvent::parse(r#"{"event":"nonsense","data":{}}"#).is_err());
    }

    #[test]
    fn parse_malformed_json_fails() {
        assert!(ResearchEvent::parse(r#"{"event":"start","data":"#).is_err());
    }

    #[test]
    fn scope_matches_when_ids_absent() {
        let scope = EventScope::default();
        assert!(scope.matches(&identity()));
    }

    #[test]
    fn scope_matches_when_ids_equal() {
        let scope = EventScope {
            session_id: Some("sess_1".into()),
            research_id: Some("res_1".into()),
            client_id: Some("client_1".into()),
        };
        assert!(scope.matches(&identity()));
    }

    #[test]
    fn scope_rejects_foreign_session() {
        let scope = EventScope {
            session_id: Some("sess_other".into()),
            ..EventScope::default()
        };
        assert!(!scope.matches(&identity()));
    }

    #[test]
    fn scope_rejects_foreign_client() {
        let scope = EventScope {
            client_id: Some("client_other".into()),
            ..EventScope::default()
        };
        assert!(!scope.matches(&identity()));
    }

    #[test]
    fn event_type_matches_wire_tag() {
        let event = ResearchEvent::parse(r#"{"event":"reasoning","data":{"step":"Plan"}}"#).unwrap();
        assert_eq!(event.event_type(), "reasoning");
    }

    #[test]
    fn round_trip_report_update() {
        let event = ResearchEvent::ReportUpdate {
            scope: EventScope::default(),
            node_id: "n1".into(),
            query: Some("q".into()),
            synthesis: "text".into(),
            confidence: Some(0.7),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back = ResearchEvent::parse(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn stream_request_wire_shape() {
        let req = StreamRequest {
            research_objective: "why is the sky blue".into(),
            user_model: None,
            model: Some("deep-1".into()),
            session_id: "sess_1".into(),
            research_id: "res_1".into(),
            user_id: None,
            client_id: "client_1".into(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["research_objective"], "why is the sky blue");
        assert_eq!(v["session_id"], "sess_1");
        assert!(v.get("user_model").is_none());
    }
}
