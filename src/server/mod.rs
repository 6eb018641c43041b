//! Server-side HTTP and WebSocket sessions.

mod session;
mod websocket;

pub use self::session::{HttpServerHandler, HttpServerSession, ServerTx};
pub use self::websocket::{WsServerHandler, WsServerSession};
