extern crate netbuf;
extern crate poseidon_proto;

use std::io;

use netbuf::Buf;
use poseidon_proto::{Config, Transport};
use poseidon_proto::server::{WsServerHandler, WsServerSession};
use poseidon_proto::websocket::{Error, Opcode, WsHandler};


const HANDSHAKE: &'static [u8] =
    b"GET /chat HTTP/1.1\r\n\
      Host: server.example.com\r\n\
      Upgrade: websocket\r\n\
      Connection: Upgrade\r\n\
      Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
      Sec-WebSocket-Version: 13\r\n\r\n";

struct Pipe {
    out: Buf,
    closed: bool,
}

impl Pipe {
    fn new() -> Pipe {
        Pipe { out: Buf::new(), closed: false }
    }

    fn sent(&self) -> String {
        String::from_utf8_lossy(&self.out[..]).into_owned()
    }

    fn drain(&mut self) -> Vec<u8> {
        let bytes = (&self.out[..]).to_vec();
        let len = self.out.len();
        self.out.consume(len);
        bytes
    }
}

impl Transport for Pipe {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.out.extend(data);
        Ok(())
    }

    fn shut_down(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    messages: Vec<(Opcode, Vec<u8>)>,
    closes: Vec<(u16, String)>,
    accepted: Vec<String>,
}

impl WsHandler for Recorder {
    fn on_ws_message_finish(&mut self, opcode: Opcode, data: Buf)
        -> Result<(), Error>
    {
        self.messages.push((opcode, (&data[..]).to_vec()));
        Ok(())
    }

    fn on_ws_close(&mut self, status: u16, reason: &str) {
        self.closes.push((status, reason.to_string()));
    }
}

impl WsServerHandler for Recorder {
    fn on_ws_accepted(&mut self, uri: &str) {
        self.accepted.push(uri.to_string());
    }
}

fn buf(data: &[u8]) -> Buf {
    let mut buf = Buf::new();
    buf.extend(data);
    buf
}

fn upgraded() -> (WsServerSession, Pipe, Recorder) {
    let mut session = WsServerSession::new(&Config::new().done());
    let mut pipe = Pipe::new();
    let mut handler = Recorder::default();
    let mut data = buf(HANDSHAKE);
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    assert!(session.is_upgraded());
    pipe.drain();
    (session, pipe, handler)
}

#[test]
fn handshake_response() {
    let mut session = WsServerSession::new(&Config::new().done());
    let mut pipe = Pipe::new();
    let mut handler = Recorder::default();
    let mut data = buf(HANDSHAKE);

    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();

    let sent = pipe.sent();
    assert!(sent.starts_with("HTTP/1.1 101 Switching Protocols\r\n"),
            "got: {}", sent);
    assert!(sent.contains(
        "Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    assert!(sent.contains("Upgrade: websocket"));
    assert!(session.is_upgraded());
    assert_eq!(handler.accepted, ["server.example.com/chat"]);
    assert!(!pipe.closed);
}

#[test]
fn handshake_rejects_missing_upgrade() {
    let mut session = WsServerSession::new(&Config::new().done());
    let mut pipe = Pipe::new();
    let mut handler = Recorder::default();
    let mut data = buf(
        b"GET /chat HTTP/1.1\r\n\
          Host: server.example.com\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
          Sec-WebSocket-Version: 13\r\n\r\n");

    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();

    assert!(pipe.sent().starts_with("HTTP/1.1 400 "));
    assert!(!session.is_upgraded());
    assert!(pipe.closed);
    assert_eq!(handler.closes.len(), 1);
}

#[test]
fn handshake_version_mismatch_gets_426() {
    let mut session = WsServerSession::new(&Config::new().done());
    let mut pipe = Pipe::new();
    let mut handler = Recorder::default();
    let mut data = buf(
        b"GET /chat HTTP/1.1\r\n\
          Host: server.example.com\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
          Sec-WebSocket-Version: 8\r\n\r\n");

    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();

    let sent = pipe.sent();
    assert!(sent.starts_with("HTTP/1.1 426 "), "got: {}", sent);
    assert!(sent.contains("Sec-WebSocket-Version: 13"));
}

#[test]
fn masked_text_message() {
    let (mut session, mut pipe, mut handler) = upgraded();
    let mut data = buf(b"\x81\x85\x37\xfa\x21\x3d\x7f\x9f\x4d\x51\x58");
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    assert_eq!(handler.messages,
               [(Opcode::Text, b"Hello".to_vec())]);
}

#[test]
fn fragmented_text_message() {
    let (mut session, mut pipe, mut handler) = upgraded();
    // "Hel" without FIN, "lo" as FIN continuation, zero masking key
    let mut data = buf(b"\x01\x83\x00\x00\x00\x00Hel");
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    assert!(handler.messages.is_empty());

    let mut data = buf(b"\x80\x82\x00\x00\x00\x00lo");
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    assert_eq!(handler.messages,
               [(Opcode::Text, b"Hello".to_vec())]);
}

#[test]
fn server_sends_unmasked_text() {
    let (mut session, mut pipe, _handler) = upgraded();
    session.send(&mut pipe, Opcode::Text, b"Hello").unwrap();
    assert_eq!(pipe.drain(), b"\x81\x05\x48\x65\x6c\x6c\x6f");
}

#[test]
fn ping_is_answered_with_pong() {
    let (mut session, mut pipe, mut handler) = upgraded();
    let mut data = buf(b"\x89\x84\x00\x00\x00\x00ping");
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    assert_eq!(handler.messages,
               [(Opcode::Ping, b"ping".to_vec())]);
    // FIN + PONG with the identical payload, unmasked
    assert_eq!(pipe.drain(), b"\x8a\x04ping");
}

#[test]
fn pong_is_delivered() {
    let (mut session, mut pipe, mut handler) = upgraded();
    let mut data = buf(b"\x8a\x80\x00\x00\x00\x00");
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    assert_eq!(handler.messages,
               [(Opcode::Pong, b"".to_vec())]);
    assert_eq!(pipe.drain(), b"");
}

#[test]
fn close_with_status() {
    let (mut session, mut pipe, mut handler) = upgraded();
    // CLOSE with status 1000, zero masking key
    let mut data = buf(b"\x88\x82\x00\x00\x00\x00\x03\xe8");
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();

    assert_eq!(handler.closes, [(1000, String::new())]);
    // we answer with our own CLOSE and shut the transport down
    assert_eq!(pipe.drain(), b"\x88\x02\x03\xe8");
    assert!(pipe.closed);

    // closure fires exactly once, whatever happens afterwards
    let mut data = buf(b"\x88\x82\x00\x00\x00\x00\x03\xe8");
    session.on_stream(&mut pipe, &mut handler, &mut data, true).unwrap();
    assert_eq!(handler.closes.len(), 1);
}

#[test]
fn close_without_status_code() {
    let (mut session, mut pipe, mut handler) = upgraded();
    let mut data = buf(b"\x88\x80\x00\x00\x00\x00");
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    assert_eq!(handler.closes, [(1005, String::new())]);
}

#[test]
fn unmasked_frame_is_a_protocol_error() {
    let (mut session, mut pipe, mut handler) = upgraded();
    let mut data = buf(b"\x81\x05Hello");
    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    assert_eq!(handler.closes.len(), 1);
    assert_eq!(handler.closes[0].0, 1002);
    assert_eq!(handler.closes[0].1, "clients must mask frames to servers");
    assert!(pipe.closed);
}

#[test]
fn transport_eof_reports_1006() {
    let (mut session, mut pipe, mut handler) = upgraded();
    let mut data = Buf::new();
    session.on_stream(&mut pipe, &mut handler, &mut data, true).unwrap();
    assert_eq!(handler.closes,
               [(1006, "no CLOSE frame received".to_string())]);
}

#[test]
fn local_shutdown_emits_close_frame() {
    let (mut session, mut pipe, _handler) = upgraded();
    session.shut_down(&mut pipe, 1000, "").unwrap();
    assert_eq!(pipe.drain(), b"\x88\x02\x03\xe8");
    assert!(pipe.closed);

    // idempotent: no second CLOSE frame
    session.shut_down(&mut pipe, 1000, "").unwrap();
    assert_eq!(pipe.drain(), b"");
}

#[test]
fn shutdown_truncates_long_reasons() {
    let (mut session, mut pipe, _handler) = upgraded();
    let reason = String::from_utf8(vec![b'r'; 200]).unwrap();
    session.shut_down(&mut pipe, 1001, &reason).unwrap();
    let bytes = pipe.drain();
    assert_eq!(bytes[0], 0x88);
    assert_eq!(bytes[1], 125);
    assert_eq!(bytes.len(), 2 + 125);
}

#[test]
#[should_panic(expected = "control frame payload too large")]
fn oversized_ping_panics() {
    let (mut session, mut pipe, _handler) = upgraded();
    let payload = vec![0u8; 126];
    let _ = session.send(&mut pipe, Opcode::Ping, &payload);
}

#[test]
#[should_panic(expected = "not supported")]
fn close_opcode_is_not_sendable() {
    let (mut session, mut pipe, _handler) = upgraded();
    let _ = session.send(&mut pipe, Opcode::Close, b"");
}

#[test]
fn cors_preflight_then_handshake() {
    let mut session = WsServerSession::new(&Config::new().done());
    let mut pipe = Pipe::new();
    let mut handler = Recorder::default();
    let mut data = buf(
        b"OPTIONS /chat HTTP/1.1\r\n\
          Host: server.example.com\r\n\
          Origin: http://example.com\r\n\r\n");

    session.on_stream(&mut pipe, &mut handler, &mut data, false).unwrap();
    let sent = pipe.sent();
    assert!(sent.starts_with("HTTP/1.1 204 "), "got: {}", sent);
    assert!(sent.contains("Access-Control-Allow-Origin: *"));
    assert!(!session.is_upgraded());
    assert!(!pipe.closed);
}
