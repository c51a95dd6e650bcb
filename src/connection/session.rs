use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::ClientError;
use crate::notification::EventHandler;
use crate::replay::ReplayCursorStore;
use crate::websocket::InboundFrame;

use super::heartbeat::HeartbeatMonitor;
use super::subscription::SubscriptionCoordinator;

/// Sleep target for a deadline that is not currently armed.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Deliberate cooperative shutdown; the connection loop must not
    /// reconnect.
    Shutdown,
    /// No liveness probe arrived within the silence window.
    ProbeSilence,
    /// The peer closed the connection or the stream ran dry.
    StreamEnded,
    /// A failure the reconnect loop recovers from.
    Failed(ClientError),
}

/// One connection's event loop.
///
/// Sends the initial subscribe, then multiplexes inbound frames with the two
/// deadlines (probe silence, subscribe timeout) and the shutdown signal on a
/// single task. Frames are handled strictly in arrival order; deadline firing
/// shares the same task, so pending bookkeeping and the replay cursor are
/// never touched concurrently. Each reconnect gets a fresh `Session` — no
/// state crosses connections.
pub struct Session {
    events: Vec<String>,
    coordinator: SubscriptionCoordinator,
    monitor: HeartbeatMonitor,
    replay: Arc<ReplayCursorStore>,
    handler: Arc<dyn EventHandler>,
}

impl Session {
    pub fn new(
        events: Vec<String>,
        replay: Arc<ReplayCursorStore>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            events,
            coordinator: SubscriptionCoordinator::new(),
            monitor: HeartbeatMonitor::new(),
            replay,
            handler,
        }
    }

    /// Drive the connection until it ends.
    pub async fn run<S>(
        mut self,
        ws: WebSocketStream<S>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();

        let cursor = self.replay.load();
        let request = self.coordinator.subscribe(self.events.clone(), cursor);
        tracing::info!(id = %request.id, events = ?request.params.events, "Sending subscribe request");
        if let Err(e) = send_frame(&mut sink, &request).await {
            return SessionEnd::Failed(e);
        }

        loop {
            // Both sleeps are rebuilt from the stored deadlines on every turn,
            // so re-arming a deadline atomically replaces the prior timer.
            let probe_silence = tokio::time::sleep_until(self.monitor.deadline());
            tokio::pin!(probe_silence);

            let (deadline, pending_id) = match self.coordinator.next_timeout() {
                Some((at, id)) => (at, Some(id)),
                None => (Instant::now() + FAR_FUTURE, None),
            };
            let subscribe_timeout = tokio::time::sleep_until(deadline);
            tokio::pin!(subscribe_timeout);

            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, closing connection");
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }

                _ = &mut probe_silence => {
                    tracing::warn!(
                        window_secs = super::heartbeat::PROBE_SILENCE_WINDOW.as_secs(),
                        "No heartbeat within the silence window, closing connection"
                    );
                    let _ = sink.close().await;
                    return SessionEnd::ProbeSilence;
                }

                _ = &mut subscribe_timeout, if pending_id.is_some() => {
                    if let Some(id) = pending_id {
                        if self.coordinator.on_timeout(&id) {
                            let _ = sink.close().await;
                            return SessionEnd::Failed(ClientError::Subscription(format!(
                                "subscribe request {id} timed out"
                            )));
                        }
                    }
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(end) = self.route_frame(text.as_str(), &mut sink).await {
                                return end;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Connection closed by server");
                            return SessionEnd::StreamEnded;
                        }
                        // Binary, Ping, Pong — not part of this protocol;
                        // WebSocket-level pings are answered by the library.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WebSocket read failed");
                            return SessionEnd::Failed(ClientError::Transport(e));
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return SessionEnd::StreamEnded;
                        }
                    }
                }
            }
        }
    }

    /// Classify one inbound frame and dispatch it. Returns the session end
    /// when the frame terminates the connection.
    async fn route_frame<S>(
        &mut self,
        text: &str,
        sink: &mut SplitSink<WebSocketStream<S>, Message>,
    ) -> Option<SessionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Error parsing message, dropping frame");
                return None;
            }
        };

        match frame {
            InboundFrame::HeartbeatRequest { id } => {
                let reply = self.monitor.answer(id);
                if let Err(e) = send_frame(sink, &reply).await {
                    return Some(SessionEnd::Failed(e));
                }
            }
            InboundFrame::EventNotification { method, params } => {
                // The cursor must be durable before the handler observes
                // the event.
                if let Some(timestamp) = params.get("timestamp").and_then(Value::as_str) {
                    if let Err(e) = self.replay.save(timestamp) {
                        tracing::warn!(error = %e, "Failed to persist replay cursor");
                    }
                }
                self.handler.on_event(&method, &params).await;
            }
            InboundFrame::SubscribeResult { id, result } => {
                self.coordinator.on_success(&id, &result);
            }
            InboundFrame::SubscribeError { id, error } => {
                if self.coordinator.on_failure(&id, &error) {
                    let _ = sink.close().await;
                    return Some(SessionEnd::Failed(ClientError::Subscription(format!(
                        "subscribe request rejected: {error}"
                    ))));
                }
            }
            InboundFrame::Unrecognized => {
                tracing::warn!("Unsupported message format, dropping frame");
            }
        }

        None
    }
}

async fn send_frame<S, F>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    frame: &F,
) -> crate::error::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Serialize,
{
    let text = serde_json::to_string(frame)?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}
