//! A peer-to-peer mesh networking core: a single-threaded, readiness-driven
//! event loop that lets nodes discover one another over TCP-like
//! connections, negotiate a reader/writer role per peer pair, exchange
//! framed application messages, and reconnect after transient failures.
//!
//! ## Usage
//!
//! First, add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! meshnet = "0.1"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::net::SocketAddrV4;
//! use std::time::Duration;
//!
//! use meshnet::config::Config;
//! use meshnet::id::NodeId;
//! use meshnet::node::{Node, NodeObserver};
//! use meshnet::reconnect::Fixed;
//!
//! struct Logger;
//! impl NodeObserver for Logger {}
//!
//! let addr: SocketAddrV4 = "127.0.0.1:4001".parse().unwrap();
//! let mut node = Node::new(
//!     NodeId::new(1),
//!     Config::default(),
//!     Box::new(Fixed(Duration::from_secs(3))),
//!     Logger,
//! )
//! .unwrap();
//!
//! node.add_listener(addr).unwrap();
//! node.listen_default();
//!
//! loop {
//!     node.step(Duration::from_millis(100)).unwrap();
//! #   break;
//! }
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod heartbeat;
pub mod id;
pub mod input;
pub mod node;
pub mod poller;
pub mod pool;
pub mod reconnect;
pub mod socket;

pub use config::Config;
pub use error::{Error, Result};
pub use id::{NodeId, SocketId};
pub use node::{Node, NodeObserver};
