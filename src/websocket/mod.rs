//! WebSocket (RFC 6455) framing, handshakes and the per-connection
//! message machinery, including permessage-deflate (RFC 7692).

mod deflator;
mod error;
mod frame_header;
mod frame_parser;
mod keys;
mod session;

pub use self::deflator::{DeflateContext, Deflator, InflateContext};
pub use self::error::Error;
pub use self::frame_header::FrameHeader;
pub use self::frame_parser::FrameParser;
pub use self::keys::{Accept, Key};
pub use self::session::{WsCore, WsHandler};

/// Frame opcodes defined in RFC 6455, section 5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_u8(code: u8) -> Option<Opcode> {
        match code {
            0 => Some(Opcode::Continuation),
            1 => Some(Opcode::Text),
            2 => Some(Opcode::Binary),
            8 => Some(Opcode::Close),
            9 => Some(Opcode::Ping),
            10 => Some(Opcode::Pong),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match *self {
            Opcode::Continuation => 0,
            Opcode::Text => 1,
            Opcode::Binary => 2,
            Opcode::Close => 8,
            Opcode::Ping => 9,
            Opcode::Pong => 10,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(*self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// Close status codes, RFC 6455 section 7.4 plus the framework range.
pub mod status {
    pub const NORMAL_CLOSURE: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const NOT_ACCEPTABLE: u16 = 1003;
    /// Synthesized when a CLOSE frame carried no status code.
    pub const NO_STATUS_CODE: u16 = 1005;
    /// Synthesized when the transport went down without a CLOSE frame.
    pub const NO_CLOSE_FRAME: u16 = 1006;
    pub const MESSAGE_DATA_ERROR: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const MESSAGE_TOO_LARGE: u16 = 1009;
    pub const EXTENSION_REQUIRED: u16 = 1010;
    pub const UNEXPECTED_ERROR: u16 = 1011;
    pub const SERVICE_RESTART: u16 = 1012;
    pub const TRY_AGAIN_LATER: u16 = 1013;
}
