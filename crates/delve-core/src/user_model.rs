//! User models — named research-persona profiles.
//!
//! A user model shapes how the backend researches: depth, cognitive style,
//! which source classes to include, and their priority order. Lifecycle is
//! fully user-driven CRUD; at most one model is marked default.

use serde::{Deserialize, Serialize};

use crate::ids::UserModelId;

/// How deep the backend should research.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchDepth {
    /// Quick pass over top sources.
    Shallow,
    /// Balanced depth.
    #[default]
    Moderate,
    /// Exhaustive multi-hop research.
    Deep,
}

/// A stored research persona.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UserModel {
    /// Stable identifier.
    pub id: UserModelId,
    /// Display name.
    pub name: String,
    /// Research depth preference.
    #[serde(default)]
    pub research_depth: ResearchDepth,
    /// Free-text cognitive style, e.g. `analytical`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cognitive_style: Option<String>,
    /// Source classes to include, e.g. `academic`, `news`.
    #[serde(default)]
    pub included_sources: Vec<String>,
    /// Included sources in priority order (highest first).
    #[serde(default)]
    pub source_priorities: Vec<String>,
    /// Whether this is the default persona.
    #[serde(default)]
    pub is_default: bool,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl UserModel {
    /// Create a new persona with a generated id and the current timestamp.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UserModelId::generate(),
            name: name.into(),
            research_depth: ResearchDepth::default(),
            cognitive_style: None,
            included_sources: Vec::new(),
            source_priorities: Vec::new(),
            is_default: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_model_has_generated_id_and_defaults() {
        let m = UserModel::new("Analyst");
        assert!(m.id.as_str().starts_with("um_"));
        assert_eq!(m.name, "Analyst");
        assert_eq!(m.research_depth, ResearchDepth::Moderate);
        assert!(!m.is_default);
    }

    #[test]
    fn deserializes_with_missing_optionals() {
        let json = r#"{"id":"um_1","name":"Analyst","created_at":"2026-01-01T00:00:00Z"}"#;
        let m: UserModel = serde_json::from_str(json).unwrap();
        assert_eq!(m.research_depth, ResearchDepth::Moderate);
        assert!(m.included_sources.is_empty());
        assert!(m.source_priorities.is_empty());
    }

    #[test]
    fn depth_uses_snake_case_on_the_wire() {
        let m = UserModel {
            research_depth: ResearchDepth::Deep,
            ..UserModel::new("x")
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["research_depth"], "deep");
    }
}
