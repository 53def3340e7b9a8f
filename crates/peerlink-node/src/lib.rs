//! # Peerlink Node
//!
//! Hosts the rendezvous broker over WebSockets.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               Peerlink Node              │
//! │                                          │
//! │  GET /ws ──► socket task ──► Broker      │
//! │                 ▲              │         │
//! │                 └── outbound ◄─┘         │
//! │                                          │
//! │  GET /health    GET /stats               │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin peerlink-node -- --listen-addr 127.0.0.1:4444
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Router, shared state, probes
//! - [`ws`] - Broker WebSocket endpoint
//! - [`config`] - Node configuration
//! - [`observability`] - Structured logging

pub mod api;
pub mod config;
pub mod observability;
pub mod ws;
