//! # delve-bus
//!
//! Typed in-process publish/subscribe for delve client events.
//!
//! A single [`EventBus`] over `tokio::sync::broadcast` carries everything
//! components need to react to: state updates, raw stream events, session
//! selection, new-chat requests, sidebar toggles, heartbeats, and
//! user-facing notices.
//!
//! Ordering is per-publisher FIFO as provided by the broadcast channel.
//! Slow subscribers observe a counted [`Lagged`](tokio::sync::broadcast::error::RecvError::Lagged)
//! gap rather than corrupted state — each subscriber is expected to
//! re-sync from the store after a gap.

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use delve_core::events::ResearchEvent;
use delve_core::ids::SessionId;
use delve_core::state::ResearchState;

/// Severity of a user-facing notice (the toast equivalent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Informational.
    Info,
    /// Something degraded (e.g. falling back to polling).
    Warning,
    /// An operation failed.
    Error,
}

/// An event published on the client bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    /// A research state snapshot changed.
    StateUpdate {
        /// The full snapshot after the change.
        state: Box<ResearchState>,
    },
    /// A raw stream event was accepted by ingestion.
    Stream {
        /// Session the event was accepted for.
        session_id: SessionId,
        /// The accepted event.
        event: ResearchEvent,
    },
    /// The active session changed.
    SessionSelected {
        /// The newly active session.
        session_id: SessionId,
    },
    /// A fresh chat was requested.
    NewChatRequested {
        /// The newly created session.
        session_id: SessionId,
    },
    /// Sidebar visibility toggled.
    SidebarToggle {
        /// New visibility.
        open: bool,
    },
    /// Periodic refresh tick.
    Heartbeat {
        /// RFC 3339 timestamp of the tick.
        timestamp: String,
    },
    /// A user-facing notice.
    Notice {
        /// Severity.
        level: NoticeLevel,
        /// Message text.
        message: String,
    },
}

impl BusEvent {
    /// A heartbeat event stamped with the current time.
    #[must_use]
    pub fn heartbeat_now() -> Self {
        Self::Heartbeat {
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// The session this event concerns, when it has one.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::StateUpdate { state } => Some(&state.identity.session_id),
            Self::Stream { session_id, .. }
            | Self::SessionSelected { session_id }
            | Self::NewChatRequested { session_id } => Some(session_id),
            Self::SidebarToggle { .. } | Self::Heartbeat { .. } | Self::Notice { .. } => None,
        }
    }

    /// A short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateUpdate { .. } => "state_update",
            Self::Stream { .. } => "stream",
            Self::SessionSelected { .. } => "session_selected",
            Self::NewChatRequested { .. } => "new_chat_requested",
            Self::SidebarToggle { .. } => "sidebar_toggle",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Notice { .. } => "notice",
        }
    }
}

/// Receiver half of the bus.
pub type BusReceiver = broadcast::Receiver<BusEvent>;

/// The client event bus.
///
/// Cheap to clone; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Publishing with no subscribers is not an error — early events
    /// (before any view attaches) are simply dropped.
    pub fn publish(&self, event: BusEvent) {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => trace!(kind, receivers, "published bus event"),
            Err(_) => debug!(kind, "no subscribers for bus event"),
        }
    }

    /// Subscribe to all events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> BusReceiver {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
