mod message;

pub use message::{InboundFrame, Request, Response, SubscribeParams, JSONRPC_VERSION};
