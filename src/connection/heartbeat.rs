use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::replay::now_cursor;
use crate::websocket::Response;

/// Window after which probe silence is treated as a dead link. The server
/// probes more frequently than this, so silence means the link is gone.
pub(crate) const PROBE_SILENCE_WINDOW: Duration = Duration::from_secs(31);

/// Supervises server liveness probes for a single connection.
///
/// The server drives the probe cadence; this side answers every probe with a
/// timestamped response correlated to the probe id and re-arms the silence
/// window. When the window elapses with no probe, the session closes the
/// connection.
pub struct HeartbeatMonitor {
    deadline: Instant,
}

impl HeartbeatMonitor {
    /// Arm the silence window, starting now.
    pub fn new() -> Self {
        Self {
            deadline: Instant::now() + PROBE_SILENCE_WINDOW,
        }
    }

    /// Deadline at which the link is considered dead.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Build the reply for a probe and re-arm the silence window. Applies to
    /// every probe, including the first one after connecting.
    pub fn answer(&mut self, id: Value) -> Response {
        self.deadline = Instant::now() + PROBE_SILENCE_WINDOW;
        Response::heartbeat(id, now_cursor())
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::CURSOR_LEN;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_answer_echoes_id_and_carries_timestamp() {
        let mut monitor = HeartbeatMonitor::new();
        let response = monitor.answer(json!("probe-1"));

        assert_eq!(response.id, json!("probe-1"));
        assert_eq!(response.result.chars().count(), CURSOR_LEN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_rearms_the_silence_window() {
        let mut monitor = HeartbeatMonitor::new();
        let initial = monitor.deadline();

        tokio::time::advance(Duration::from_secs(10)).await;
        monitor.answer(json!(1));

        assert_eq!(monitor.deadline(), initial + Duration::from_secs(10));
    }
}
