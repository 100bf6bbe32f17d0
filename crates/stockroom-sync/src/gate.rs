//! # Connectivity Gate
//!
//! Tells the [`OfflineQueue`](crate::OfflineQueue) whether the store is
//! reachable.
//!
//! ```text
//! ┌──────────┐  transient store failure / host reports loss   ┌──────────┐
//! │  ONLINE  │ ─────────────────────────────────────────────► │ OFFLINE  │
//! │          │ ◄───────────────────────────────────────────── │          │
//! └──────────┘            host reports store reachable        └──────────┘
//!       │
//!       └── watchers (ReplayWorker) wake on every transition
//! ```

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Online,
    Offline,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Online => write!(f, "online"),
            ConnectionState::Offline => write!(f, "offline"),
        }
    }
}

/// Shared online/offline flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct ConnectivityGate {
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectivityGate {
    pub fn new(initial: ConnectionState) -> Self {
        let (state, _) = watch::channel(initial);
        ConnectivityGate {
            state: Arc::new(state),
        }
    }

    pub fn online() -> Self {
        Self::new(ConnectionState::Online)
    }

    pub fn offline() -> Self {
        Self::new(ConnectionState::Offline)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state() == ConnectionState::Online
    }

    pub fn set_online(&self) {
        self.transition(ConnectionState::Online);
    }

    pub fn set_offline(&self) {
        self.transition(ConnectionState::Offline);
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!(state = %next, "Connectivity changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let gate = ConnectivityGate::online();
        assert!(gate.is_online());

        let other = gate.clone();
        other.set_offline();
        assert!(!gate.is_online());
        assert_eq!(gate.state().to_string(), "offline");
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let gate = ConnectivityGate::offline();
        let mut rx = gate.subscribe();

        gate.set_offline();
        assert!(!rx.has_changed().unwrap());

        gate.set_online();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Online);
    }
}
