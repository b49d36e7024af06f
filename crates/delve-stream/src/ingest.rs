//! Event ingestion — the reducer between the stream and research state.
//!
//! [`Ingestor`] owns the accumulating [`ResearchState`] and [`SynthesisSet`]
//! for one run. Each parsed event passes the identity filter first (events
//! scoped to a different session, run, or client are dropped), then mutates
//! state through the dedup-enforcing `push_*` methods. Accepted events are
//! re-published on the bus so views can react without re-parsing the wire.

use tracing::{debug, warn};
use uuid::Uuid;

use delve_bus::{BusEvent, EventBus};
use delve_core::events::ResearchEvent;
use delve_core::state::{
    HumanInteraction, InteractionStatus, ResearchIdentity, ResearchState, ResearchStatus,
};
use delve_core::synthesis::{Synthesis, SynthesisSet};

/// What applying one event did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The event mutated state; the run continues.
    Accepted,
    /// The event was scoped to a different run and was dropped.
    Filtered,
    /// Terminal: the run completed.
    Completed,
    /// Terminal: the backend reported an error.
    Failed(String),
}

/// Per-run event reducer.
pub struct Ingestor {
    state: ResearchState,
    syntheses: SynthesisSet,
    approval_cadence: Option<u32>,
    steps_since_approval: u32,
    bus: EventBus,
}

impl Ingestor {
    /// Start a reducer for a fresh run.
    #[must_use]
    pub fn new(
        identity: ResearchIdentity,
        query: impl Into<String>,
        approval_cadence: Option<u32>,
        bus: EventBus,
    ) -> Self {
        Self {
            state: ResearchState::new(identity, query),
            syntheses: SynthesisSet::default(),
            approval_cadence,
            steps_since_approval: 0,
            bus,
        }
    }

    /// Resume a reducer over previously cached state.
    #[must_use]
    pub fn resume(state: ResearchState, approval_cadence: Option<u32>, bus: EventBus) -> Self {
        Self {
            state,
            syntheses: SynthesisSet::default(),
            approval_cadence,
            steps_since_approval: 0,
            bus,
        }
    }

    /// The accumulated state so far.
    #[must_use]
    pub fn state(&self) -> &ResearchState {
        &self.state
    }

    /// Mutable access for interaction resolution.
    pub fn state_mut(&mut self) -> &mut ResearchState {
        &mut self.state
    }

    /// Per-node syntheses accumulated so far.
    #[must_use]
    pub fn syntheses(&self) -> &SynthesisSet {
        &self.syntheses
    }

    /// Consume the reducer, yielding the final state.
    #[must_use]
    pub fn into_state(self) -> ResearchState {
        self.state
    }

    /// Apply one parsed event.
    pub fn apply(&mut self, event: ResearchEvent) -> Applied {
        if !event.scope().matches(&self.state.identity) {
            debug!(
                event_type = event.event_type(),
                ?event,
                "dropping event scoped to a different run"
            );
            return Applied::Filtered;
        }

        let outcome = match event.clone() {
            ResearchEvent::Start { stage, .. } => {
                self.state.status = ResearchStatus::InProgress;
                if let Some(stage) = stage {
                    self.state.set_stage(stage);
                } else {
                    self.state.touch();
                }
                Applied::Accepted
            }
            ResearchEvent::Update { chunk, answer, .. } => {
                // Newer backends send `chunk`; older ones `answer`.
                if let Some(fragment) = chunk.or(answer) {
                    self.state.push_answer_chunk(&fragment);
                }
                Applied::Accepted
            }
            ResearchEvent::Source { source, .. } => {
                let _ = self.state.push_source(source);
                Applied::Accepted
            }
            ResearchEvent::Finding { finding, .. } => {
                // A finding implies its source was consulted.
                let _ = self.state.push_source(finding.source.clone());
                let _ = self.state.push_finding(finding);
                Applied::Accepted
            }
            ResearchEvent::Reasoning { step, .. } => {
                self.state.push_reasoning_step(step);
                self.maybe_request_approval();
                Applied::Accepted
            }
            ResearchEvent::ReportUpdate {
                node_id,
                query,
                synthesis,
                confidence,
                ..
            } => {
                let _ = self.syntheses.upsert(Synthesis::new(
                    node_id,
                    query.unwrap_or_default(),
                    synthesis,
                    confidence.unwrap_or(0.0),
                ));
                self.state.touch();
                Applied::Accepted
            }
            ResearchEvent::FinalReport {
                node_id,
                synthesis,
                confidence,
                ..
            } => {
                let text = synthesis.unwrap_or_default();
                if self.state.answer.is_empty() && !text.is_empty() {
                    self.state.answer.clone_from(&text);
                }
                self.syntheses.mark_final(Synthesis::new(
                    node_id.unwrap_or_else(|| "root".to_string()),
                    self.state.query.clone(),
                    text,
                    confidence.unwrap_or(1.0),
                ));
                self.state.touch();
                Applied::Accepted
            }
            ResearchEvent::Complete {
                answer,
                sources,
                findings,
                reasoning_path,
                ..
            } => {
                self.state.adopt_final(answer, sources, findings, reasoning_path);
                self.syntheses.complete = true;
                Applied::Completed
            }
            ResearchEvent::Error { message, error, .. } => {
                let message = message
                    .or(error)
                    .unwrap_or_else(|| "research failed".to_string());
                warn!(%message, "backend reported stream error");
                self.state.status = ResearchStatus::Error;
                self.state.touch();
                Applied::Failed(message)
            }
        };

        if outcome != Applied::Filtered {
            self.bus.publish(BusEvent::Stream {
                session_id: self.state.identity.session_id.clone(),
                event,
            });
        }
        outcome
    }

    /// Synthesize an approval request every Nth reasoning step, when a
    /// cadence is configured.
    fn maybe_request_approval(&mut self) {
        let Some(cadence) = self.approval_cadence else {
            return;
        };
        self.steps_since_approval += 1;
        if self.steps_since_approval < cadence {
            return;
        }
        self.steps_since_approval = 0;
        let step = self
            .state
            .reasoning_path
            .last()
            .cloned()
            .unwrap_or_default();
        self.state.push_interaction(HumanInteraction {
            call_id: format!("local_{}", Uuid::now_v7()),
            node_id: "local".to_string(),
            interaction_type: "approval".to_string(),
            content: format!("Continue with: {step}?"),
            status: InteractionStatus::Pending,
            response: None,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
