//! Branded identifier newtypes.
//!
//! All identifiers are prefixed UUID v7 strings (`sess_…`, `res_…`,
//! `client_…`, `um_…`). The prefix makes logs and database rows
//! self-describing; the newtype prevents mixing them up at compile time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[doc = $doc:literal])* $name:ident, $prefix:literal) => {
        $(#[doc = $doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh id with a UUID v7 suffix.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Wrap an existing id string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// A research conversation, persisted across restarts.
    SessionId,
    "sess"
);
branded_id!(
    /// A single research run within a session.
    ResearchId,
    "res"
);
branded_id!(
    /// A per-process identifier preventing cross-client event cross-talk.
    ClientId,
    "client"
);
branded_id!(
    /// A stored research-persona profile.
    UserModelId,
    "um"
);

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_uses_prefix() {
        assert!(SessionId::generate().as_str().starts_with("sess_"));
        assert!(ResearchId::generate().as_str().starts_with("res_"));
        assert!(ClientId::generate().as_str().starts_with("client_"));
        assert!(UserModelId::generate().as_str().starts_with("um_"));
    }

    #[test]
    fn generate_is_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::new("sess_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sess_abc\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner() {
        let id = ResearchId::new("res_1");
        assert_eq!(id.to_string(), "res_1");
    }
}
