//! Research state — the per-session snapshot of a research run.
//!
//! [`ResearchState`] accumulates what the stream has delivered so far:
//! the running answer, discovered sources, structured findings, the
//! reasoning path, and any human-approval interactions.
//!
//! Invariants enforced here rather than at call sites:
//!
//! - `sources` is append-only and deduplicated by URL.
//! - `findings` is append-only and deduplicated by (source, title, summary).
//! - `reasoning_path` grows by exactly one per accepted step and never
//!   shrinks outside [`ResearchState::adopt_final`] / a session reset.

use serde::{Deserialize, Serialize};

use crate::ids::{ClientId, ResearchId, SessionId};

/// Lifecycle status of a research run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    /// Stream is active or a poll is pending.
    #[default]
    InProgress,
    /// Terminal: the final report arrived.
    Completed,
    /// Terminal: the backend reported an error.
    Error,
    /// A human-approval interaction is pending.
    AwaitingHumanInput,
}

/// Structured detail attached to a finding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FindingDetail {
    /// Short title of the extraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// One-paragraph summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Backend confidence in [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Canonical URL, when it differs from the source URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A structured extraction from a source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Source URL this finding was extracted from.
    pub source: String,
    /// Raw extracted content, if the backend sent any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning node that produced this finding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Structured detail (title/summary/confidence).
    #[serde(rename = "finding", skip_serializing_if = "Option::is_none")]
    pub detail: Option<FindingDetail>,
}

impl Finding {
    /// Identity key for deduplication: (source, title, summary).
    ///
    /// Two findings with the same source and the same title/summary pair
    /// are the same finding, regardless of node id or raw content.
    #[must_use]
    pub fn dedup_key(&self) -> (&str, Option<&str>, Option<&str>) {
        let detail = self.detail.as_ref();
        (
            self.source.as_str(),
            detail.and_then(|d| d.title.as_deref()),
            detail.and_then(|d| d.summary.as_deref()),
        )
    }
}

/// Status of a human-approval interaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    /// Waiting for the user.
    #[default]
    Pending,
    /// User approved.
    Approved,
    /// User rejected.
    Rejected,
}

/// A human-in-the-loop interaction requested by the backend (or synthesized
/// locally at a configured reasoning cadence).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanInteraction {
    /// Correlates the response with the backend call.
    pub call_id: String,
    /// Reasoning node the interaction belongs to.
    pub node_id: String,
    /// Interaction kind, e.g. `approval`.
    pub interaction_type: String,
    /// Prompt shown to the user.
    pub content: String,
    /// Current status.
    pub status: InteractionStatus,
    /// User-supplied response text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// The identifiers a stream or snapshot belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResearchIdentity {
    /// Session the run belongs to.
    pub session_id: SessionId,
    /// The research run itself.
    pub research_id: ResearchId,
    /// The client (process/tab) that opened the stream.
    pub client_id: ClientId,
}

impl ResearchIdentity {
    /// Build an identity with freshly generated research and client ids.
    #[must_use]
    pub fn for_session(session_id: SessionId) -> Self {
        Self {
            session_id,
            research_id: ResearchId::generate(),
            client_id: ClientId::generate(),
        }
    }
}

/// The accumulated snapshot of a research run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResearchState {
    /// Identity this snapshot belongs to.
    #[serde(flatten)]
    pub identity: ResearchIdentity,
    /// Owning user, when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Lifecycle status.
    pub status: ResearchStatus,
    /// Current pipeline stage text from the latest `start` event. Cleared
    /// on completion; not part of the reasoning path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// The research objective.
    pub query: String,
    /// Running (or final) answer text.
    pub answer: String,
    /// Discovered source URLs, in discovery order.
    pub sources: Vec<String>,
    /// Structured findings.
    pub findings: Vec<Finding>,
    /// Free-text reasoning steps, in order.
    pub reasoning_path: Vec<String>,
    /// Human-approval interactions.
    pub human_interactions: Vec<HumanInteraction>,
    /// RFC 3339 timestamp of the last mutation. Drives last-writer-wins
    /// merges in the store.
    pub updated_at: String,
}

impl ResearchState {
    /// Create an empty in-progress state for a new research run.
    #[must_use]
    pub fn new(identity: ResearchIdentity, query: impl Into<String>) -> Self {
        Self {
            identity,
            user_id: None,
            status: ResearchStatus::InProgress,
            stage: None,
            query: query.into(),
            answer: String::new(),
            sources: Vec::new(),
            findings: Vec::new(),
            reasoning_path: Vec::new(),
            human_interactions: Vec::new(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Refresh `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Set the current stage text.
    pub fn set_stage(&mut self, stage: impl Into<String>) {
        self.stage = Some(stage.into());
        self.touch();
    }

    /// Append an answer fragment.
    pub fn push_answer_chunk(&mut self, chunk: &str) {
        self.answer.push_str(chunk);
        self.touch();
    }

    /// Append a source URL. Returns `false` if the URL was already known.
    pub fn push_source(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.sources.iter().any(|s| *s == url) {
            return false;
        }
        self.sources.push(url);
        self.touch();
        true
    }

    /// Append a finding. Returns `false` for duplicates
    /// (same source + title + summary).
    pub fn push_finding(&mut self, finding: Finding) -> bool {
        if self
            .findings
            .iter()
            .any(|f| f.dedup_key() == finding.dedup_key())
        {
            return false;
        }
        self.findings.push(finding);
        self.touch();
        true
    }

    /// Append a reasoning step. Steps are never deduplicated — the backend
    /// may legitimately repeat a description — so the path grows by exactly
    /// one per call.
    pub fn push_reasoning_step(&mut self, step: impl Into<String>) {
        self.reasoning_path.push(step.into());
        self.touch();
    }

    /// Record a human interaction and flip status to awaiting input.
    pub fn push_interaction(&mut self, interaction: HumanInteraction) {
        self.human_interactions.push(interaction);
        self.status = ResearchStatus::AwaitingHumanInput;
        self.touch();
    }

    /// Resolve a pending interaction by call id. Returns `false` when no
    /// pending interaction matches.
    pub fn resolve_interaction(
        &mut self,
        call_id: &str,
        status: InteractionStatus,
        response: Option<String>,
    ) -> bool {
        let Some(interaction) = self
            .human_interactions
            .iter_mut()
            .find(|i| i.call_id == call_id && i.status == InteractionStatus::Pending)
        else {
            return false;
        };
        interaction.status = status;
        interaction.response = response;
        if self
            .human_interactions
            .iter()
            .all(|i| i.status != InteractionStatus::Pending)
        {
            self.status = ResearchStatus::InProgress;
        }
        self.touch();
        true
    }

    /// Adopt the server's final arrays from a `complete` event.
    ///
    /// This is the one place accumulated arrays are replaced wholesale:
    /// the server's view is authoritative at completion.
    pub fn adopt_final(
        &mut self,
        answer: Option<String>,
        sources: Vec<String>,
        findings: Vec<Finding>,
        reasoning_path: Vec<String>,
    ) {
        if let Some(answer) = answer {
            self.answer = answer;
        }
        if !sources.is_empty() {
            self.sources = sources;
        }
        if !findings.is_empty() {
            self.findings = findings;
        }
        if !reasoning_path.is_empty() {
            self.reasoning_path = reasoning_path;
        }
        self.stage = None;
        self.status = ResearchStatus::Completed;
        self.touch();
    }

    /// Number of pending human interactions.
    #[must_use]
    pub fn pending_interactions(&self) -> usize {
        self.human_interactions
            .iter()
            .filter(|i| i.status == InteractionStatus::Pending)
            .count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
