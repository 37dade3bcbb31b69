//! Connection lifecycle state reported to front ends.

use serde::{Deserialize, Serialize};

/// Where the engine's active connection currently stands.
///
/// `Disconnected → Joining → Active ⇄ Degraded → Disconnected`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection drives scheduling.
    Disconnected,
    /// A join request is in flight.
    Joining,
    /// Connected and the last heartbeat succeeded.
    Active,
    /// Connected but the server is unreachable; retried on the next tick.
    Degraded,
}

impl ConnectionState {
    /// Derive the state from the engine's flags.
    pub const fn derive(joining: bool, has_active: bool, is_online: bool) -> Self {
        match (joining, has_active, is_online) {
            (true, _, _) => Self::Joining,
            (false, false, _) => Self::Disconnected,
            (false, true, true) => Self::Active,
            (false, true, false) => Self::Degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_covers_lifecycle() {
        assert_eq!(
            ConnectionState::derive(false, false, false),
            ConnectionState::Disconnected
        );
        assert_eq!(
            ConnectionState::derive(true, false, false),
            ConnectionState::Joining
        );
        assert_eq!(
            ConnectionState::derive(false, true, true),
            ConnectionState::Active
        );
        assert_eq!(
            ConnectionState::derive(false, true, false),
            ConnectionState::Degraded
        );
    }
}
