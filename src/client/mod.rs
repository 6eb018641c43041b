//! Client-side HTTP and WebSocket sessions.

mod session;
mod websocket;

pub use self::session::{ClientTx, HttpClientHandler, HttpClientSession};
pub use self::websocket::{WsClientHandler, WsClientSession};
