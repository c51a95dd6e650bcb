// Shared infrastructure
pub mod config;
pub mod error;
pub mod replay;
pub mod websocket;

// Connection lifecycle
pub mod connection;

// Integration surface
pub mod notification;
