//! Integration surface: the handler invoked for every delivered event.

use async_trait::async_trait;
use serde_json::Value;

/// Hook invoked for every event notification, in arrival order.
///
/// Invocation is awaited to completion before the next frame is processed,
/// so a handler observes events strictly in stream order. The embedding
/// application supplies its own implementation; `method` carries the event
/// type (e.g. `vulnerability-created`) and `params` the event body.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, method: &str, params: &Value);
}

/// Default handler that logs each delivered event.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_event(&self, method: &str, params: &Value) {
        let body = serde_json::to_string_pretty(params).unwrap_or_else(|_| params.to_string());
        tracing::info!(method = %method, params = %body, "Event delivered");
    }
}
