//! Connection lifecycle: connect, run a session, back off, reconnect.

mod heartbeat;
mod session;
mod subscription;

pub use heartbeat::HeartbeatMonitor;
pub use session::{Session, SessionEnd};
pub use subscription::SubscriptionCoordinator;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::Settings;
use crate::error::{ClientError, Result};
use crate::notification::EventHandler;
use crate::replay::ReplayCursorStore;

/// Fixed pause between reconnect attempts. No growth, no retry ceiling: the
/// upstream service is authoritative and long-running, so the client keeps
/// trying until told to stop.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Handshake header carrying the API key.
const API_KEY_HEADER: &str = "X-SSAPI-KEY";

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Long-lived event stream client.
///
/// Owns the socket lifecycle: opens exactly one connection at a time, runs a
/// fresh [`Session`] over it, and on any non-deliberate end waits
/// [`RECONNECT_BACKOFF`] and reconnects, indefinitely, until shutdown is
/// requested.
pub struct EventStreamClient {
    settings: Settings,
    events: Vec<String>,
    api_key: HeaderValue,
    replay: Arc<ReplayCursorStore>,
    handler: Arc<dyn EventHandler>,
    shutdown: broadcast::Sender<()>,
}

impl EventStreamClient {
    /// Validate the configuration and build the client. Fails before any
    /// network activity when the event list is empty or the API key cannot
    /// be carried in a header.
    pub fn new(settings: Settings, handler: Arc<dyn EventHandler>) -> Result<Self> {
        let events = settings.event_names();
        if events.is_empty() {
            return Err(ClientError::Config(config::ConfigError::Message(
                "EVENTS must name at least one event".to_string(),
            )));
        }

        let api_key = HeaderValue::from_str(&settings.x_ssapi_key).map_err(|_| {
            ClientError::Config(config::ConfigError::Message(
                "X_SSAPI_KEY contains characters not allowed in a header".to_string(),
            ))
        })?;

        let replay = Arc::new(ReplayCursorStore::new(
            settings.replay_path.clone(),
            settings.from.clone(),
        ));
        let (shutdown, _) = broadcast::channel(1);

        Ok(Self {
            settings,
            events,
            api_key,
            replay,
            handler,
            shutdown,
        })
    }

    /// Sender used to request cooperative shutdown from outside the run
    /// loop. Sending on it closes the current connection and stops the loop
    /// without a reconnect.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Run until shutdown is requested.
    pub async fn run(&self) -> Result<()> {
        let url = self.settings.endpoint_url();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            match self.connect(&url).await {
                Ok(ws) => {
                    tracing::info!(url = %url, "Connected to event stream");
                    let session = Session::new(
                        self.events.clone(),
                        self.replay.clone(),
                        self.handler.clone(),
                    );
                    match session.run(ws, &mut shutdown_rx).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::ProbeSilence => {
                            tracing::warn!("Session ended: no heartbeat from server");
                        }
                        SessionEnd::StreamEnded => {
                            tracing::info!("Session ended: connection closed");
                        }
                        SessionEnd::Failed(e) => {
                            tracing::warn!(error = %e, "Session ended");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Connection attempt failed");
                }
            }

            // The shutdown signal is consulted here, before any reconnect
            // decision, so a deliberate close never causes another attempt.
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
            }
        }

        tracing::info!("Shutdown requested, not reconnecting");
        Ok(())
    }

    async fn connect(&self, url: &str) -> Result<WsStream> {
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert(API_KEY_HEADER, self.api_key.clone());

        let (ws, _response) = connect_async(request).await?;
        Ok(ws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::LoggingEventHandler;

    fn settings(events: &str, api_key: &str) -> Settings {
        Settings {
            hostname: "stream.example.com".to_string(),
            port: 443,
            events: events.to_string(),
            x_ssapi_key: api_key.to_string(),
            from: None,
            replay_path: ".replay_timestamp".to_string(),
        }
    }

    #[test]
    fn test_rejects_empty_event_list() {
        let result = EventStreamClient::new(settings(" , ", "key"), Arc::new(LoggingEventHandler));
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_rejects_api_key_with_invalid_header_characters() {
        let result = EventStreamClient::new(settings("a", "key\nwith-newline"), Arc::new(LoggingEventHandler));
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_accepts_valid_configuration() {
        let client = EventStreamClient::new(settings("a, b", "key"), Arc::new(LoggingEventHandler));
        assert!(client.is_ok());
    }
}
