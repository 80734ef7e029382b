mod websocket;

pub use websocket::WebSocketEventPusher;
