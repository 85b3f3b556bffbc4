//! Relay Lifecycle Types
//!
//! Tracks the state of the single upstream vendor connection. The relay is a
//! one-shot resource: `Terminated` is absorbing and there is no transition
//! back to `Connecting`. The shared [`RelayStatus`] snapshot is what the
//! health endpoint reports instead of leaving feed loss as a log-only event.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use parking_lot::RwLock;

/// A symbol string (stock ticker).
pub type Symbol = String;

/// Lifecycle state of the upstream relay.
///
/// `Disconnected → Connecting → Streaming → Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RelayState {
    /// Constructed, not yet started.
    #[default]
    Disconnected = 0,
    /// Dial attempt in progress.
    Connecting = 1,
    /// Read loop and dispatch loop both active.
    Streaming = 2,
    /// Dial failure or read error; absorbing.
    Terminated = 3,
}

impl RelayState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Streaming,
            3 => Self::Terminated,
            _ => Self::Disconnected,
        }
    }

    /// Get the state name for health reporting.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Terminated => "terminated",
        }
    }
}

/// Shared snapshot of the upstream relay's health.
///
/// Written by the relay task, read by the health endpoint. All fields are
/// independently updated; readers see a best-effort snapshot.
#[derive(Debug, Default)]
pub struct RelayStatus {
    state: AtomicU8,
    frames_relayed: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl RelayStatus {
    /// Create a new status in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RelayState {
        RelayState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Transition to a new state. `Terminated` is absorbing: once reached,
    /// further transitions are ignored.
    pub fn set_state(&self, state: RelayState) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            if RelayState::from_u8(current) == RelayState::Terminated {
                None
            } else {
                Some(state as u8)
            }
        });
    }

    /// Whether the relay is currently streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state() == RelayState::Streaming
    }

    /// Record one inbound frame forwarded downstream.
    pub fn record_frame(&self) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Total frames forwarded downstream.
    #[must_use]
    pub fn frames_relayed(&self) -> u64 {
        self.frames_relayed.load(Ordering::Relaxed)
    }

    /// Record the most recent error.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.last_error.write() = Some(message.into());
    }

    /// Get the most recent error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        let status = RelayStatus::new();
        assert_eq!(status.state(), RelayState::Disconnected);
        assert_eq!(status.frames_relayed(), 0);
        assert!(status.last_error().is_none());
    }

    #[test]
    fn normal_transitions() {
        let status = RelayStatus::new();

        status.set_state(RelayState::Connecting);
        assert_eq!(status.state(), RelayState::Connecting);

        status.set_state(RelayState::Streaming);
        assert!(status.is_streaming());
    }

    #[test]
    fn terminated_is_absorbing() {
        let status = RelayStatus::new();
        status.set_state(RelayState::Terminated);

        status.set_state(RelayState::Streaming);
        assert_eq!(status.state(), RelayState::Terminated);

        status.set_state(RelayState::Connecting);
        assert_eq!(status.state(), RelayState::Terminated);
    }

    #[test]
    fn frame_counter_increments() {
        let status = RelayStatus::new();
        status.record_frame();
        status.record_frame();
        assert_eq!(status.frames_relayed(), 2);
    }

    #[test]
    fn last_error_is_replaced() {
        let status = RelayStatus::new();
        status.set_error("first");
        status.set_error("second");
        assert_eq!(status.last_error().as_deref(), Some("second"));
    }

    #[test]
    fn state_names() {
        assert_eq!(RelayState::Disconnected.as_str(), "disconnected");
        assert_eq!(RelayState::Streaming.as_str(), "streaming");
        assert_eq!(RelayState::Terminated.as_str(), "terminated");
    }
}
