//! The protocol core of the poseidon server framework.
//!
//! This crate holds the hard part of the network stack: byte-stream
//! parsers, framing codecs and handshake state machines for HTTP/1.1 and
//! WebSocket (RFC 6455), the `permessage-deflate` extension (RFC 7692),
//! and the connection-level session state machines that glue parsing,
//! payload delivery and the mid-stream HTTP→WebSocket transition together.
//!
//! The parsers are pure state machines: they accept arbitrary transport
//! fragmentation, never touch the network and never block. Sessions are
//! generic over a [`Transport`] — a byte pipe that queues outbound data —
//! so the I/O layer (epoll loop, TLS, timeouts) lives elsewhere.

extern crate byteorder;
extern crate flate2;
extern crate httparse;
extern crate httpdate;
extern crate netbuf;
extern crate rand;
extern crate sha1;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;

pub mod client;
pub mod server;
pub mod websocket;

mod body_parser;
mod chunked;
mod config;
mod enums;
mod error;
mod field_name;
mod header_parser;
mod headers;
mod request;
mod request_parser;
mod request_target;
mod response;
mod response_parser;
mod transport;
mod value;

pub use config::Config;
pub use enums::{Method, PayloadType, Status, reason_phrase};
pub use error::ParseError;
pub use field_name::FieldName;
pub use header_parser::HeaderParser;
pub use request::RequestHead;
pub use request_parser::RequestParser;
pub use response::ResponseHead;
pub use response_parser::ResponseParser;
pub use transport::Transport;
pub use value::Value;
