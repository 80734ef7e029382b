//! HTTP / WebSocket handlers.

mod http;
mod websocket;

pub use http::health_check;
pub use websocket::websocket_handler;
