//! HTTP surface of the node.
//!
//! - `GET /health` - liveness probe
//! - `GET /stats` - topic and subscriber counts
//! - `GET /ws` - broker WebSocket (see [`crate::ws`])

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use peerlink_broker::Broker;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::ws::ws_handler;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The broker.
    pub broker: Arc<Broker>,
    /// Open WebSocket slots.
    pub connections: Arc<ConnectionLimiter>,
    /// Interval between WebSocket pings.
    pub ping_interval: Duration,
}

impl AppState {
    /// Build state from configuration.
    pub fn new(broker: Arc<Broker>, config: &Config) -> Self {
        Self {
            broker,
            connections: Arc::new(ConnectionLimiter::new(config.max_connections)),
            ping_interval: config.ping_interval(),
        }
    }
}

/// Caps concurrent WebSocket connections.
#[derive(Debug)]
pub struct ConnectionLimiter {
    active: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    /// Allow up to `max` connections.
    pub fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a slot, or `None` when full. The slot frees on drop.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionSlot> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()?;
        Some(ConnectionSlot {
            limiter: self.clone(),
        })
    }

    /// Connections currently open.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// A reserved connection slot.
#[derive(Debug)]
pub struct ConnectionSlot {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.limiter.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Broker statistics.
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.broker.stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_caps_and_releases() {
        let limiter = Arc::new(ConnectionLimiter::new(2));
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.active(), 2);

        drop(a);
        assert_eq!(limiter.active(), 1);
        assert!(limiter.try_acquire().is_some());
    }
}
