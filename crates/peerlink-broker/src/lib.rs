//! # Peerlink Broker
//!
//! Rendezvous broker for peers that share a topic name but have no direct
//! route to each other yet. Peers subscribe to a topic, publish handshake
//! messages to it, and the broker fans each message out to every current
//! subscriber. Once the peers have a direct channel the broker is out of
//! the picture.
//!
//! ## Features
//!
//! - **Topic registry**: topic to subscriber mapping with no empty topics
//! - **Fanout**: each forwarded copy carries the current subscriber count
//! - **Attachments**: per-connection topic sets that survive host suspension
//!
//! ## Example
//!
//! ```rust
//! use peerlink_broker::Broker;
//!
//! let broker = Broker::default();
//! let (alice, mut alice_rx) = broker.connect().unwrap();
//! let (bob, _bob_rx) = broker.connect().unwrap();
//!
//! broker.handle_message(&alice, r#"{"type":"subscribe","topics":["room"]}"#);
//! broker.handle_message(&bob, r#"{"type":"subscribe","topics":["room"]}"#);
//! broker.handle_message(&bob, r#"{"type":"publish","topic":"room","signal":"offer"}"#);
//!
//! let forwarded = alice_rx.try_recv().unwrap();
//! assert!(forwarded.contains(r#""clients":2"#));
//! ```
//!
//! ## Wire Protocol
//!
//! ```json
//! {"type": "subscribe", "topics": ["room"]}
//! {"type": "unsubscribe", "topics": ["room"]}
//! {"type": "publish", "topic": "room", ...}
//! {"type": "ping"}
//! ```
//!
//! The broker answers a ping with `{"type": "pong"}` and forwards a publish
//! with an added `clients` field. Anything else is dropped without reply.

pub mod attachment;
pub mod broker;
pub mod command;
pub mod connection;
pub mod error;
pub mod registry;

pub use attachment::Attachment;
pub use broker::{Broker, BrokerStats};
pub use command::{ClientCommand, ServerMessage};
pub use connection::{create_connection, Connection, ConnectionId, ConnectionReceiver};
pub use error::{BrokerError, Result};
pub use registry::TopicRegistry;
