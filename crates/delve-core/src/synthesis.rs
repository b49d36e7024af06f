//! Report syntheses keyed by reasoning node.
//!
//! A [`Synthesis`] is a generated natural-language summary attached to a
//! reasoning node. [`SynthesisSet`] holds the per-node map plus the root
//! (final-report) marker; once the set is complete, further updates are
//! ignored — they are no longer meaningful for a finished run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A generated summary for one reasoning node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Synthesis {
    /// Reasoning node this synthesis belongs to.
    pub node_id: String,
    /// Query the node was answering.
    pub query: String,
    /// Synthesis text.
    pub synthesis: String,
    /// Confidence in [0, 1]; clamped on construction.
    pub confidence: f64,
    /// RFC 3339 timestamp of the last update.
    pub timestamp: String,
}

impl Synthesis {
    /// Build a synthesis with the current timestamp, clamping confidence
    /// into [0, 1].
    #[must_use]
    pub fn new(
        node_id: impl Into<String>,
        query: impl Into<String>,
        synthesis: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            query: query.into(),
            synthesis: synthesis.into(),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// All syntheses for a session, keyed by node id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SynthesisSet {
    /// Per-node syntheses.
    pub nodes: HashMap<String, Synthesis>,
    /// Node id of the final report, once one arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_node_id: Option<String>,
    /// True once a final report / complete event arrived.
    pub complete: bool,
}

impl SynthesisSet {
    /// Insert or update a synthesis for a node.
    ///
    /// Later updates for the same node replace the text and confidence but
    /// preserve identity (node id, and the original query when the update
    /// carries an empty one). Updates after completion are dropped.
    /// Returns `true` when the set changed.
    pub fn upsert(&mut self, incoming: Synthesis) -> bool {
        if self.complete {
            tracing::debug!(node_id = %incoming.node_id, "dropping synthesis update for completed session");
            return false;
        }
        match self.nodes.get_mut(&incoming.node_id) {
            Some(existing) => {
                existing.synthesis = incoming.synthesis;
                existing.confidence = incoming.confidence;
                existing.timestamp = incoming.timestamp;
                if !incoming.query.is_empty() {
                    existing.query = incoming.query;
                }
            }
            None => {
                let _ = self.nodes.insert(incoming.node_id.clone(), incoming);
            }
        }
        true
    }

    /// Record the final report: upsert the root synthesis and flip complete.
    pub fn mark_final(&mut self, root: Synthesis) {
        let node_id = root.node_id.clone();
        let _ = self.upsert(root);
        self.root_node_id = Some(node_id);
        self.complete = true;
    }

    /// The final-report synthesis, if the run completed.
    #[must_use]
    pub fn final_report(&self) -> Option<&Synthesis> {
        self.root_node_id.as_ref().and_then(|id| self.nodes.get(id))
    }

    /// Number of synthesized nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node has been synthesized yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(Synthesis::new("n1", "q", "s", 1.5).confidence, 1.0);
        assert_eq!(Synthesis::new("n1", "q", "s", -0.2).confidence, 0.0);
        assert_eq!(Synthesis::new("n1", "q", "s", 0.42).confidence, 0.42);
    }

    #[test]
    fn upsert_inserts_new_node() {
        let mut set = SynthesisSet::default();
        assert!(set.upsert(Synthesis::new("n1", "q", "first", 0.5)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn upsert_replaces_text_preserving_identity() {
        let mut set = SynthesisSet::default();
        let _ = set.upsert(Synthesis::new("n1", "original query", "first", 0.5));
        let _ = set.upsert(Synthesis::new("n1", "", "second", 0.9));

        let node = &set.nodes["n1"];
        assert_eq!(node.synthesis, "second");
        assert_eq!(node.confidence, 0.9);
        // Empty query on the update keeps the original.
        assert_eq!(node.query, "original query");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn upsert_after_complete_is_dropped() {
        let mut set = SynthesisSet::default();
        set.mark_final(Synthesis::new("root", "q", "final", 1.0));
        assert!(!set.upsert(Synthesis::new("n2", "q", "late", 0.5)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn mark_final_sets_root_and_complete() {
        let mut set = SynthesisSet::default();
        let _ = set.upsert(Synthesis::new("n1", "q", "partial", 0.3));
        set.mark_final(Synthesis::new("root", "q", "final report", 0.95));

        assert!(set.complete);
        assert_eq!(set.root_node_id.as_deref(), Some("root"));
        assert_eq!(set.final_report().unwrap().synthesis, "final report");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn final_report_none_before_completion() {
        let mut set = SynthesisSet::default();
        let _ = set.upsert(Synthesis::new("n1", "q", "partial", 0.3));
        assert!(set.final_report().is_none());
    }
}
