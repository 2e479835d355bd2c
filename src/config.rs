//! Node configuration.

use std::net::SocketAddrV4;
use std::time::Duration;

use crate::error::Error;

const MAX_HEARTBEAT_SECS: u64 = 86_400;

/// Configuration accepted by [`crate::node::Node::new`].
///
/// Durations are clamped by [`Config::validated`]; constructing a
/// `Config` with an out-of-range value and skipping validation is a
/// programmer error, not a runtime condition, so `validated` fails fast
/// rather than silently clamping.
#[derive(Debug, Clone)]
pub struct Config {
    pub listener_addrs: Vec<SocketAddrV4>,
    pub listen_backlog: i32,
    pub handshake_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub reconnect_timeout: Duration,
    pub behind_nat: bool,
    pub chunk_size: u16,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            listener_addrs: Vec::new(),
            listen_backlog: 50,
            handshake_timeout: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(5),
            reconnect_timeout: Duration::from_secs(0),
            behind_nat: false,
            chunk_size: 1500,
        }
    }
}

impl Config {
    /// Checks the fields that have a documented valid range and returns an
    /// error describing the first violation found.
    pub fn validated(self) -> Result<Config, Error> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be non-zero".into()));
        }

        if self.heartbeat_timeout.as_secs() > MAX_HEARTBEAT_SECS {
            return Err(Error::Config(format!(
                "heartbeat_timeout must be <= {} s",
                MAX_HEARTBEAT_SECS
            )));
        }

        if self.listen_backlog < 0 {
            return Err(Error::Config("listen_backlog must be >= 0".into()));
        }

        Ok(self)
    }
}
