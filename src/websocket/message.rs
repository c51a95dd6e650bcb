use serde::Serialize;
use serde_json::Value;

/// JSON-RPC envelope version carried on every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the subscribe request.
pub const SUBSCRIBE_METHOD: &str = "subscribe";

/// Client-to-server request frame.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: SubscribeParams,
    pub id: String,
}

/// Parameters of the subscribe request: the event names to deliver and the
/// replay cursor to resume from.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeParams {
    pub events: Vec<String>,
    pub from: String,
}

impl Request {
    pub fn subscribe(id: String, events: Vec<String>, from: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: SUBSCRIBE_METHOD,
            params: SubscribeParams { events, from },
            id,
        }
    }
}

/// Client-to-server response frame, answering a server-initiated request.
/// The id is echoed verbatim so the server can correlate the reply.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub result: String,
    pub id: Value,
}

impl Response {
    pub fn heartbeat(id: Value, timestamp: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: timestamp,
            id,
        }
    }
}

/// Inbound frame, discriminated by JSON-RPC 2.0 envelope shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Server-initiated liveness probe: `method` + `id`.
    HeartbeatRequest { id: Value },
    /// Server push: `method` without `id`.
    EventNotification { method: String, params: Value },
    /// Reply to a client request: `result` + `id`.
    SubscribeResult { id: Value, result: Value },
    /// Error reply to a client request: `error` + `id`.
    SubscribeError { id: Value, error: Value },
    /// Anything else, including frames without the `jsonrpc: "2.0"` envelope.
    Unrecognized,
}

impl InboundFrame {
    /// Parse a raw text frame. Malformed JSON is an error the caller logs and
    /// drops; a well-formed frame of unknown shape classifies as
    /// [`InboundFrame::Unrecognized`].
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let payload: Value = serde_json::from_str(text)?;
        Ok(Self::classify(payload))
    }

    fn classify(payload: Value) -> Self {
        let Value::Object(mut frame) = payload else {
            return Self::Unrecognized;
        };

        if frame.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Self::Unrecognized;
        }

        if frame.contains_key("method") {
            let Some(method) = frame.get("method").and_then(Value::as_str) else {
                return Self::Unrecognized;
            };
            let method = method.to_string();

            return match frame.remove("id") {
                Some(id) => Self::HeartbeatRequest { id },
                None => Self::EventNotification {
                    method,
                    params: frame.remove("params").unwrap_or(Value::Null),
                },
            };
        }

        if frame.contains_key("result") && frame.contains_key("id") {
            if let (Some(result), Some(id)) = (frame.remove("result"), frame.remove("id")) {
                return Self::SubscribeResult { id, result };
            }
        }

        if frame.contains_key("error") && frame.contains_key("id") {
            if let (Some(error), Some(id)) = (frame.remove("error"), frame.remove("id")) {
                return Self::SubscribeError { id, error };
            }
        }

        Self::Unrecognized
    }
}
