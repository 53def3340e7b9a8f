//! # Observability
//!
//! Structured logging for the node. Every log line carries structured
//! fields (`connection_id`, `topic`, ...) and can be emitted as JSON for
//! log aggregation.
//!
//! ```rust,ignore
//! use peerlink_node::observability::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//! ```

mod logging;

pub use logging::{init_logging, LogFormat};
