use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Event stream host. Required.
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated event names to subscribe to. Required.
    pub events: String,
    /// API key carried on the WebSocket handshake. Required.
    pub x_ssapi_key: String,
    /// Replay override cursor used when no usable cursor is stored.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default = "default_replay_path")]
    pub replay_path: String,
}

fn default_port() -> u16 {
    443
}

fn default_replay_path() -> String {
    ".replay_timestamp".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let builder = Config::builder()
            // Start with default values
            .set_default("port", 443)?
            .set_default("replay_path", ".replay_timestamp")?
            // Load from environment variables
            // HOSTNAME, PORT, EVENTS, X_SSAPI_KEY, FROM, REPLAY_PATH
            .add_source(Environment::default().try_parsing(true));

        builder.build()?.try_deserialize()
    }

    /// Secure WebSocket endpoint of the event stream.
    pub fn endpoint_url(&self) -> String {
        format!("wss://{}:{}/api/ss/events", self.hostname, self.port)
    }

    /// Event names parsed from the comma-separated `events` value,
    /// whitespace-trimmed, empty entries dropped.
    pub fn event_names(&self) -> Vec<String> {
        self.events
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(events: &str) -> Settings {
        Settings {
            hostname: "stream.example.com".to_string(),
            port: default_port(),
            events: events.to_string(),
            x_ssapi_key: "test-key".to_string(),
            from: None,
            replay_path: default_replay_path(),
        }
    }

    #[test]
    fn test_endpoint_url_default_port() {
        let settings = settings("a");
        assert_eq!(
            settings.endpoint_url(),
            "wss://stream.example.com:443/api/ss/events"
        );
    }

    #[test]
    fn test_event_names_trimmed() {
        let settings = settings("vulnerability-created, vulnerability-updated");
        assert_eq!(
            settings.event_names(),
            vec!["vulnerability-created", "vulnerability-updated"]
        );
    }

    #[test]
    fn test_event_names_drops_empty_entries() {
        let settings = settings("a,, b ,");
        assert_eq!(settings.event_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_default_replay_path() {
        assert_eq!(default_replay_path(), ".replay_timestamp");
    }
}
