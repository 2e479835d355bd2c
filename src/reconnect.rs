//! The reconnection policy: a small trait so a node can be built with a
//! different redial strategy without the rest of the crate caring which one.

use std::time::Duration;

/// Decides how long to wait before redialing a dropped outbound socket.
///
/// A zero duration disables reconnection entirely; the node
/// orchestrator never schedules a redial when `timeout()` returns
/// `Duration::ZERO`.
pub trait ReconnectionPolicy: Send {
    fn timeout(&self) -> Duration;
}

/// Never reconnects.
#[derive(Copy, Clone, Debug, Default)]
pub struct Never;

impl ReconnectionPolicy for Never {
    fn timeout(&self) -> Duration {
        Duration::ZERO
    }
}

/// Always waits the same fixed duration before redialing.
#[derive(Copy, Clone, Debug)]
pub struct Fixed(pub Duration);

impl ReconnectionPolicy for Fixed {
    fn timeout(&self) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_disables_reconnection() {
        assert_eq!(Never.timeout(), Duration::ZERO);
    }

    #[test]
    fn fixed_returns_its_configured_duration() {
        let policy = Fixed(Duration::from_secs(3));
        assert_eq!(policy.timeout(), Duration::from_secs(3));
    }
}
