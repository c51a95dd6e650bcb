use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::websocket::Request;

/// How long a subscribe request may stay unanswered before the session
/// closes the connection.
pub(crate) const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bookkeeping for an in-flight subscribe request. The timeout deadline
/// lives and dies with the entry, so removal and cancellation are one map
/// operation.
struct PendingEntry {
    request: Request,
    deadline: Instant,
}

/// Tracks subscribe requests for a single connection.
///
/// Success, failure, and timeout are mutually exclusive terminal transitions
/// for a given request id: the first one to arrive removes the entry, and
/// any later transition for the same id is a no-op.
pub struct SubscriptionCoordinator {
    pending: HashMap<String, PendingEntry>,
}

impl SubscriptionCoordinator {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Build and register a subscribe request carrying the replay cursor.
    /// The id is guaranteed not to collide with any pending request. The
    /// returned frame must be sent by the caller.
    pub fn subscribe(&mut self, events: Vec<String>, cursor: String) -> Request {
        let mut id = Uuid::new_v4().to_string();
        while self.pending.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        let request = Request::subscribe(id.clone(), events, cursor);
        self.pending.insert(
            id,
            PendingEntry {
                request: request.clone(),
                deadline: Instant::now() + SUBSCRIBE_TIMEOUT,
            },
        );
        request
    }

    /// Earliest pending deadline and its request id, if any request is still
    /// in flight.
    pub fn next_timeout(&self) -> Option<(Instant, String)> {
        self.pending
            .iter()
            .min_by_key(|(_, entry)| entry.deadline)
            .map(|(id, entry)| (entry.deadline, id.clone()))
    }

    /// Server confirmed the subscription: resolve the pending entry and log
    /// the granted event set. No-op when the id is not pending.
    pub fn on_success(&mut self, id: &Value, result: &Value) -> bool {
        let Some(key) = id.as_str() else {
            return false;
        };
        match self.pending.remove(key) {
            Some(_) => {
                tracing::info!(id = %key, events = %result, "Subscribed to events");
                true
            }
            None => {
                tracing::debug!(id = %key, "Result for a request that is no longer pending");
                false
            }
        }
    }

    /// Server rejected the subscription. Returns true when the id was
    /// pending, in which case the caller closes the connection. No-op
    /// otherwise.
    pub fn on_failure(&mut self, id: &Value, error: &Value) -> bool {
        let Some(key) = id.as_str() else {
            return false;
        };
        match self.pending.remove(key) {
            Some(_) => {
                tracing::error!(id = %key, error = %error, "Subscribe request failed");
                true
            }
            None => {
                tracing::debug!(id = %key, "Error for a request that is no longer pending");
                false
            }
        }
    }

    /// The timeout deadline fired. Returns true when the id was still
    /// pending, in which case the caller closes the connection.
    pub fn on_timeout(&mut self, id: &str) -> bool {
        match self.pending.remove(id) {
            Some(entry) => {
                tracing::error!(
                    id = %id,
                    events = ?entry.request.params.events,
                    "Subscribe request timed out"
                );
                true
            }
            None => false,
        }
    }
}

impl Default for SubscriptionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cursor() -> String {
        "2024-01-01T00:00:00.000Z".to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_registers_a_fresh_pending_id() {
        let mut coordinator = SubscriptionCoordinator::new();
        let first = coordinator.subscribe(vec!["a".to_string()], cursor());
        let second = coordinator.subscribe(vec!["a".to_string()], cursor());

        assert_ne!(first.id, second.id);
        assert!(coordinator.next_timeout().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resolves_exactly_once() {
        let mut coordinator = SubscriptionCoordinator::new();
        let request = coordinator.subscribe(vec!["a".to_string()], cursor());
        let id = json!(request.id);

        assert!(coordinator.on_success(&id, &json!(["a"])));
        assert!(coordinator.next_timeout().is_none());

        // Late duplicates are safe no-ops
        assert!(!coordinator.on_success(&id, &json!(["a"])));
        assert!(!coordinator.on_failure(&id, &json!("late error")));
        assert!(!coordinator.on_timeout(request.id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_resolves_and_cancels_the_timeout() {
        let mut coordinator = SubscriptionCoordinator::new();
        let request = coordinator.subscribe(vec!["a".to_string()], cursor());

        assert!(coordinator.on_failure(&json!(request.id), &json!({"code": -32000})));
        assert!(coordinator.next_timeout().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_the_entry() {
        let mut coordinator = SubscriptionCoordinator::new();
        let request = coordinator.subscribe(vec!["a".to_string()], cursor());

        let (deadline, id) = coordinator.next_timeout().unwrap();
        assert_eq!(id, request.id);
        assert_eq!(deadline, Instant::now() + SUBSCRIBE_TIMEOUT);

        assert!(coordinator.on_timeout(&id));
        assert!(coordinator.next_timeout().is_none());
        assert!(!coordinator.on_success(&json!(id), &json!([])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_string_id_is_ignored() {
        let mut coordinator = SubscriptionCoordinator::new();
        coordinator.subscribe(vec!["a".to_string()], cursor());

        assert!(!coordinator.on_success(&json!(17), &json!([])));
        assert!(coordinator.next_timeout().is_some());
    }
}
