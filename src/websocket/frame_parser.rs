//! The incremental WebSocket frame decoder and the handshake state
//! machine that precedes it.

use std::time::SystemTime;

use netbuf::Buf;

use config::Config;
use enums::{Method, Status};
use header_parser::HeaderParser;
use request::RequestHead;
use response::ResponseHead;
use value::Value;
use websocket::frame_header::FrameHeader;
use websocket::keys::{Accept, Key};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Pending,
    ClientRequestSent,
    ServerAccepted,
    ClientAccepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FrameState {
    New,
    HeaderDone,
    PayloadDone,
    Error,
}

// Negotiation scratch space for `permessage-deflate`.
//
// PMCE is accepted only if every attribute is known and within range;
// anything else leaves `compression_level` at zero, which disables the
// extension. Reference: https://datatracker.ietf.org/doc/html/rfc7692
#[derive(Debug)]
struct PmceOffer {
    compression_level: u8,
    server_no_context_takeover: bool,
    client_no_context_takeover: bool,
    server_max_window_bits: u8,
    client_max_window_bits: u8,
}

impl PmceOffer {
    fn new() -> PmceOffer {
        PmceOffer {
            compression_level: 0,
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: 15,
            client_max_window_bits: 15,
        }
    }

    fn use_permessage_deflate(&mut self, hparser: &mut HeaderParser,
        default_compression_level: u8)
    {
        if self.compression_level != 0 {
            // A previous `permessage-deflate` element has already been
            // accepted.
            return;
        }

        if default_compression_level == 0 {
            return;
        }

        self.server_no_context_takeover = false;
        self.client_no_context_takeover = false;
        self.server_max_window_bits = 15;
        self.client_max_window_bits = 15;

        while hparser.next_attribute() {
            if hparser.current_name() == "server_no_context_takeover" {
                if !hparser.current_value().is_null() {
                    return;
                }

                // States that the server will not reuse a previous LZ77
                // sliding window when compressing a message. Ignored by
                // clients.
                self.server_no_context_takeover = true;
            }
            else if hparser.current_name() == "client_no_context_takeover" {
                if !hparser.current_value().is_null() {
                    return;
                }

                // States that the client will not reuse a previous LZ77
                // sliding window when compressing a message. Ignored by
                // servers.
                self.client_no_context_takeover = true;
            }
            else if hparser.current_name() == "server_max_window_bits" {
                if hparser.current_value().is_null() {
                    continue;
                }

                // States the maximum size of the LZ77 sliding window that
                // the server will use, in number of bits.
                if !hparser.current_value().is_integer() {
                    return;
                }
                let value = hparser.current_value().as_integer();
                if value < 9 || value > 15 {
                    return;
                }

                self.server_max_window_bits = value as u8;
            }
            else if hparser.current_name() == "client_max_window_bits" {
                if hparser.current_value().is_null() {
                    continue;
                }

                // States the maximum size of the LZ77 sliding window that
                // the client will use, in number of bits.
                if !hparser.current_value().is_integer() {
                    return;
                }
                let value = hparser.current_value().as_integer();
                if value < 9 || value > 15 {
                    return;
                }

                self.client_max_window_bits = value as u8;
            }
            else {
                // Unknown attributes reject the whole offer.
                return;
            }
        }

        self.compression_level = default_compression_level;
    }
}

/// Handshake composition and validation, PMCE parameter negotiation, and
/// the incremental frame decoder.
///
/// The handshake state and the frame state are orthogonal: frames can only
/// be parsed once the handshake has been accepted, and a frame error does
/// not change the handshake state. PMCE parameters become immutable once
/// the handshake completes.
pub struct FrameParser {
    default_compression_level: u8,
    max_message_length: usize,

    hs: HandshakeState,
    frame: FrameState,
    error_desc: Option<&'static str>,

    header: FrameHeader,
    payload: Buf,
    payload_rem: u64,

    // Header bits of the current, possibly fragmented, data message.
    msg_fin: bool,
    msg_rsv1: bool,
    msg_rsv2: bool,
    msg_rsv3: bool,
    msg_opcode: u8,

    // PMCE parameters, fixed at handshake time. Zero window bits mean
    // compression is off.
    pmce_compression_level: u8,
    pmce_send_no_context_takeover: bool,
    pmce_send_window_bits: u8,
    pmce_receive_window_bits: u8,

    client_key: Option<Key>,
}

impl FrameParser {
    pub fn new(config: &Config) -> FrameParser {
        FrameParser {
            default_compression_level:
                config.get_default_compression_level(),
            max_message_length: config.get_max_websocket_message_length(),
            hs: HandshakeState::Pending,
            frame: FrameState::New,
            error_desc: None,
            header: FrameHeader::default(),
            payload: Buf::new(),
            payload_rem: 0,
            msg_fin: false,
            msg_rsv1: false,
            msg_rsv2: false,
            msg_rsv3: false,
            msg_opcode: 0,
            pmce_compression_level: 0,
            pmce_send_no_context_takeover: false,
            pmce_send_window_bits: 0,
            pmce_receive_window_bits: 0,
            client_key: None,
        }
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    pub fn error(&self) -> bool {
        self.frame == FrameState::Error
    }

    pub fn error_description(&self) -> &'static str {
        self.error_desc.unwrap_or("success")
    }

    pub fn is_client_mode(&self) -> bool {
        self.hs == HandshakeState::ClientAccepted
    }

    pub fn is_server_mode(&self) -> bool {
        self.hs == HandshakeState::ServerAccepted
    }

    /// PMCE accessors; all of these return zero when PMCE is off.
    pub fn pmce_compression_level(&self) -> u8 {
        self.pmce_compression_level
    }

    pub fn pmce_send_no_context_takeover(&self) -> bool {
        self.pmce_send_no_context_takeover
    }

    pub fn pmce_send_window_bits(&self) -> u8 {
        self.pmce_send_window_bits
    }

    pub fn pmce_receive_window_bits(&self) -> u8 {
        self.pmce_receive_window_bits
    }

    /// Composes a WebSocket handshake request. The caller may adjust the
    /// request path or append headers before sending; the request shall be
    /// sent without a body.
    ///
    /// PMCE is requested unless the configured compression level is zero.
    ///
    /// # Panics
    ///
    /// Panics unless called first, before any handshake was accepted.
    pub fn create_handshake_request(&mut self, req: &mut RequestHead) {
        if self.hs != HandshakeState::Pending
            && self.hs != HandshakeState::ClientRequestSent
        {
            panic!("create_handshake_request() must be called at very first");
        }

        req.clear();
        req.method = Method::Get;
        req.path = "/".to_string();
        req.headers.reserve(8);
        req.headers.push(("Connection".into(), Value::from("Upgrade")));
        req.headers.push(("Upgrade".into(), Value::from("websocket")));
        req.headers.push(("Sec-WebSocket-Version".into(), Value::from(13i64)));

        let key = Key::new();
        req.headers.push(("Sec-WebSocket-Key".into(),
                          Value::from(key.to_string())));
        self.client_key = Some(key);

        if self.default_compression_level != 0 {
            req.headers.push(("Sec-WebSocket-Extensions".into(),
                Value::from("permessage-deflate; client_max_window_bits")));
        }

        // Await the response. This cannot fail, so the frame state is not
        // updated.
        self.hs = HandshakeState::ClientRequestSent;
    }

    /// Accepts a handshake request from a client and composes the response
    /// to send back verbatim, without a body.
    ///
    /// Errors are not reported directly: when `resp.status` is not 101
    /// afterwards, the handshake has failed and the connection should be
    /// closed after the response message. An OPTIONS request gets a CORS
    /// preflight response and leaves the handshake pending.
    ///
    /// # Panics
    ///
    /// Panics unless called first, before any handshake was accepted.
    pub fn accept_handshake_request(&mut self, resp: &mut ResponseHead,
        req: &RequestHead)
    {
        if self.hs != HandshakeState::Pending {
            panic!("accept_handshake_request() must be called at very first");
        }

        // Compose a default response, so in case of errors we return
        // immediately.
        resp.clear();
        resp.status = Status::BadRequest.code();
        resp.headers.reserve(8);
        resp.headers.push(("Connection".into(), Value::from("close")));

        if req.method == Method::Options {
            // Respond with allowed methods and the CORS headers for the
            // handshake fields of RFC 6455.
            resp.clear();
            resp.status = Status::NoContent.code();
            resp.headers.reserve(8);
            resp.headers.push(("Allow".into(), Value::from("GET")));
            resp.headers.push(("Date".into(),
                               Value::from(SystemTime::now())));
            resp.headers.push(("Access-Control-Allow-Origin".into(),
                               Value::from("*")));
            resp.headers.push(("Access-Control-Allow-Methods".into(),
                               Value::from("GET")));
            resp.headers.push(("Access-Control-Allow-Headers".into(),
                Value::from("Upgrade, Origin, Sec-WebSocket-Version, \
                             Sec-WebSocket-Key, Sec-WebSocket-Extensions, \
                             Sec-WebSocket-Protocol")));
            return;
        }

        self.frame = FrameState::Error;
        self.error_desc = Some("handshake request invalid");

        let mut hparser = HeaderParser::new();

        let mut connection_upgrade = false;
        let mut upgrade_ok = false;
        let mut ws_version_ok = false;
        let mut key_str = String::new();
        let mut pmce = PmceOffer::new();

        for &(ref name, ref value) in &req.headers {
            if *name == "Connection" {
                // Connection: Upgrade
                hparser.reload(value.as_str());
                while hparser.next_element() {
                    if hparser.current_name().eq_ignore_ascii_case("close") {
                        return;
                    }
                    if hparser.current_name()
                              .eq_ignore_ascii_case("upgrade") {
                        connection_upgrade = true;
                    }
                }
            }
            else if *name == "Upgrade" {
                // Upgrade: websocket
                if value.as_str() == "websocket" {
                    upgrade_ok = true;
                }
            }
            else if *name == "Sec-WebSocket-Version" {
                // Sec-WebSocket-Version: 13
                if value.as_str() == "13" {
                    ws_version_ok = true;
                }
            }
            else if *name == "Sec-WebSocket-Key" {
                // Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
                if value.as_str().len() == 24 {
                    key_str = value.as_str().to_string();
                }
            }
            else if *name == "Sec-WebSocket-Extensions" {
                // Sec-WebSocket-Extensions: permessage-deflate;
                //                           client_max_window_bits
                hparser.reload(value.as_str());
                while hparser.next_element() {
                    if hparser.current_name() == "permessage-deflate" {
                        pmce.use_permessage_deflate(&mut hparser,
                            self.default_compression_level);
                    }
                }
            }
        }

        if !ws_version_ok {
            // Respond with `426 Upgrade Required` and advertise the
            // version we speak.
            // Reference: https://datatracker.ietf.org/doc/html/rfc6455#section-4.2.2
            resp.status = Status::UpgradeRequired.code();
            resp.headers.push(("Upgrade".into(), Value::from("websocket")));
            resp.headers.push(("Sec-WebSocket-Version".into(),
                               Value::from(13i64)));
            error!("WebSocket handshake request not valid; failing");
            return;
        }

        if !connection_upgrade || !upgrade_ok || key_str.is_empty() {
            error!("WebSocket handshake request not valid; failing");
            return;
        }

        // Compose the response.
        resp.clear();
        resp.status = Status::SwitchingProtocols.code();
        resp.headers.push(("Connection".into(), Value::from("Upgrade")));
        resp.headers.push(("Upgrade".into(), Value::from("websocket")));
        resp.headers.push(("Date".into(), Value::from(SystemTime::now())));
        resp.headers.push(("Expires".into(), Value::from("0")));

        let accept = Accept::from_key_bytes(key_str.as_bytes());
        resp.headers.push(("Sec-WebSocket-Accept".into(),
                           Value::from(accept.to_string())));

        if pmce.compression_level != 0 {
            // If `client_no_context_takeover` was offered, it is echoed
            // back. Non-default window sizes are echoed too; a default of
            // 15 is left out, as some clients will not accept it.
            let mut pmce_str = "permessage-deflate".to_string();

            if pmce.client_no_context_takeover {
                pmce_str.push_str("; client_no_context_takeover");
            }

            if pmce.server_max_window_bits != 15 {
                pmce_str.push_str(&format!("; server_max_window_bits={}",
                                           pmce.server_max_window_bits));
            }

            if pmce.client_max_window_bits != 15 {
                pmce_str.push_str(&format!("; client_max_window_bits={}",
                                           pmce.client_max_window_bits));
            }

            resp.headers.push(("Sec-WebSocket-Extensions".into(),
                               Value::from(pmce_str)));

            // Accept PMCE parameters. The server sends with the server
            // window and receives with the client window.
            self.pmce_compression_level = pmce.compression_level;
            self.pmce_send_no_context_takeover =
                pmce.server_no_context_takeover;
            self.pmce_send_window_bits = pmce.server_max_window_bits;
            self.pmce_receive_window_bits = pmce.client_max_window_bits;
        }

        // For the server, this connection has now been established.
        self.hs = HandshakeState::ServerAccepted;
        self.frame = FrameState::New;
        self.error_desc = None;
    }

    /// Accepts a handshake response from the server. The caller shall
    /// check `is_client_mode()` afterwards; when it is still false the
    /// handshake failed.
    ///
    /// # Panics
    ///
    /// Panics unless `create_handshake_request()` was called before.
    pub fn accept_handshake_response(&mut self, resp: &ResponseHead) {
        if self.hs != HandshakeState::ClientRequestSent {
            panic!("accept_handshake_response() must be called after \
                    create_handshake_request()");
        }

        self.frame = FrameState::Error;
        self.error_desc = Some("handshake response invalid");

        let mut hparser = HeaderParser::new();

        let mut upgrade_ok = false;
        let mut accept_resp = String::new();
        let mut pmce = PmceOffer::new();

        for &(ref name, ref value) in &resp.headers {
            if *name == "Connection" {
                // Connection: Upgrade
                hparser.reload(value.as_str());
                while hparser.next_element() {
                    if hparser.current_name().eq_ignore_ascii_case("close") {
                        return;
                    }
                }
            }
            else if *name == "Upgrade" {
                // Upgrade: websocket
                if value.as_str() == "websocket" {
                    upgrade_ok = true;
                }
            }
            else if *name == "Sec-WebSocket-Accept" {
                // Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
                if value.as_str().len() == 28 {
                    accept_resp = value.as_str().to_string();
                }
            }
            else if *name == "Sec-WebSocket-Extensions" {
                hparser.reload(value.as_str());
                while hparser.next_element() {
                    if hparser.current_name() == "permessage-deflate" {
                        pmce.use_permessage_deflate(&mut hparser,
                            self.default_compression_level);
                    } else {
                        // An extension we never offered.
                        return;
                    }
                }
            }
        }

        if !upgrade_ok || accept_resp.is_empty() {
            error!("WebSocket handshake response not valid; failing");
            return;
        }

        // Recompute the expected accept token from the key we sent and
        // compare all 28 characters.
        let expected = {
            let key = self.client_key.as_ref()
                .expect("client key must exist after the request was sent");
            Accept::from_key_bytes(key.to_string().as_bytes()).to_string()
        };
        if expected != accept_resp {
            return;
        }

        if pmce.compression_level != 0 {
            // Accept PMCE parameters. The client sends with the client
            // window and receives with the server window.
            self.pmce_compression_level = pmce.compression_level;
            self.pmce_send_no_context_takeover =
                pmce.client_no_context_takeover;
            self.pmce_send_window_bits = pmce.client_max_window_bits;
            self.pmce_receive_window_bits = pmce.server_max_window_bits;
        }

        // For the client, this connection has now been established.
        self.hs = HandshakeState::ClientAccepted;
        self.frame = FrameState::New;
        self.error_desc = None;
    }

    /// Parses the header of a frame. `data` may be consumed partially and
    /// must be preserved between calls.
    ///
    /// # Panics
    ///
    /// Panics when no handshake has been accepted.
    pub fn parse_frame_header_from_stream(&mut self, data: &mut Buf) {
        if self.hs != HandshakeState::ServerAccepted
            && self.hs != HandshakeState::ClientAccepted
        {
            panic!("WebSocket connection not established");
        }

        if self.frame >= FrameState::HeaderDone {
            return;
        }

        if self.msg_fin {
            // A previous message has finished; forget it before the next
            // frame. Control frames must not touch these fields.
            self.msg_fin = false;
            self.msg_rsv1 = false;
            self.msg_rsv2 = false;
            self.msg_rsv3 = false;
            self.msg_opcode = 0;
        }

        if data.len() < 2 {
            return;
        }
        let len7 = data[1] & 0x7F;
        let rsv_bits = data[0] & 0x70;
        let fin = data[0] & 0x80 != 0;
        let opcode = data[0] & 15;
        let masked = data[1] & 0x80 != 0;

        if self.hs == HandshakeState::ServerAccepted && !masked {
            // RFC 6455 states that clients must mask all frames. It also
            // requires that servers must not mask frames, but we are
            // permissive about unnecessary masking.
            self.frame = FrameState::Error;
            self.error_desc = Some("clients must mask frames to servers");
            return;
        }

        match opcode {
            1 | 2 => {
                // TEXT / BINARY
                if self.msg_opcode != 0 {
                    // The previous message must have terminated.
                    self.frame = FrameState::Error;
                    self.error_desc = Some("continuation frame expected");
                    return;
                }

                let mut rsv_reject = rsv_bits;
                if self.pmce_send_window_bits != 0 {
                    // With PMCE enabled the RSV1 bit is acceptable here.
                    rsv_reject &= 0x30;
                }
                if rsv_reject != 0 {
                    self.frame = FrameState::Error;
                    self.error_desc = Some("invalid RSV bits in data frame");
                    return;
                }

                // Copy fields for later use.
                self.msg_fin = fin;
                self.msg_rsv1 = data[0] & 0x40 != 0;
                self.msg_rsv2 = data[0] & 0x20 != 0;
                self.msg_rsv3 = data[0] & 0x10 != 0;
                self.msg_opcode = opcode;
                trace!("data frame: opcode = {}", opcode);
            }
            0 => {
                // CONTINUATION
                if rsv_bits != 0 {
                    // RSV bits shall only be set in the first data frame.
                    self.frame = FrameState::Error;
                    self.error_desc =
                        Some("invalid RSV bits in continuation frame");
                    return;
                }

                if self.msg_opcode == 0 {
                    // A continuation frame must follow a data frame.
                    self.frame = FrameState::Error;
                    self.error_desc = Some("dangling continuation frame");
                    return;
                }

                // If this is a FIN frame, terminate the current message.
                if fin {
                    self.msg_fin = true;
                }
                trace!("data continuation: opcode = {}", self.msg_opcode);
            }
            8 | 9 | 10 => {
                // CLOSE / PING / PONG
                if rsv_bits != 0 {
                    // RSV bits shall only be set in a data frame.
                    self.frame = FrameState::Error;
                    self.error_desc =
                        Some("invalid RSV bits in control frame");
                    return;
                }

                if len7 > 125 {
                    // RFC 6455, 5.5. Control Frames: all control frames
                    // MUST have a payload length of 125 bytes or less...
                    self.frame = FrameState::Error;
                    self.error_desc = Some("control frame length not valid");
                    return;
                }

                if !fin {
                    // ... and MUST NOT be fragmented.
                    self.frame = FrameState::Error;
                    self.error_desc = Some("control frame not fragmentable");
                    return;
                }
                trace!("control frame: opcode = {}", opcode);
            }
            _ => {
                self.frame = FrameState::Error;
                self.error_desc = Some("unknown opcode");
                return;
            }
        }

        let (header, size) = match FrameHeader::decode(&data[..]) {
            Some(decoded) => decoded,
            None => return,
        };

        data.consume(size);
        self.payload_rem = header.payload_len;
        self.header = header;
        self.frame = FrameState::HeaderDone;
    }

    pub fn frame_header_complete(&self) -> bool {
        self.frame >= FrameState::HeaderDone
            && self.frame != FrameState::Error
    }

    pub fn frame_header(&self) -> &FrameHeader {
        &self.header
    }

    /// Parses the payload of a frame, unmasking it on the way into the
    /// frame payload buffer. `data` may be consumed partially and must be
    /// preserved between calls.
    ///
    /// # Panics
    ///
    /// Panics when the frame header has not been parsed yet.
    pub fn parse_frame_payload_from_stream(&mut self, data: &mut Buf) {
        if self.hs != HandshakeState::ServerAccepted
            && self.hs != HandshakeState::ClientAccepted
        {
            panic!("WebSocket connection not established");
        }

        if self.frame >= FrameState::PayloadDone {
            return;
        }
        if self.frame != FrameState::HeaderDone {
            panic!("WebSocket frame header not parsed yet");
        }

        let navail = ::std::cmp::min(data.len() as u64,
                                     self.payload_rem) as usize;
        if navail != 0 {
            // Move the (maybe partial) payload from `data` into the frame
            // payload buffer, unmasking it first.
            self.header.mask_payload(&mut data[..navail]);
            self.payload.extend(&data[..navail]);
            data.consume(navail);
            self.payload_rem -= navail as u64;
        }

        if self.payload_rem != 0 {
            return;
        }

        self.frame = FrameState::PayloadDone;
    }

    pub fn frame_payload_complete(&self) -> bool {
        self.frame >= FrameState::PayloadDone
            && self.frame != FrameState::Error
    }

    pub fn frame_payload(&self) -> &Buf {
        &self.payload
    }

    pub fn mut_frame_payload(&mut self) -> &mut Buf {
        &mut self.payload
    }

    pub fn take_frame_payload(&mut self) -> Buf {
        ::std::mem::replace(&mut self.payload, Buf::new())
    }

    /// Header bits of the current (maybe fragmented) data message. After
    /// a data frame these return that frame's bits until the message
    /// finishes; control frames interleaved into a fragmented message do
    /// not disturb them.
    pub fn message_fin(&self) -> bool {
        self.msg_fin
    }

    pub fn message_rsv1(&self) -> bool {
        self.msg_rsv1
    }

    pub fn message_rsv2(&self) -> bool {
        self.msg_rsv2
    }

    pub fn message_rsv3(&self) -> bool {
        self.msg_rsv3
    }

    pub fn message_opcode(&self) -> u8 {
        self.msg_opcode
    }

    /// Clears the current complete frame, so parsing of the next one can
    /// start.
    pub fn next_frame(&mut self) {
        assert!(self.frame >= FrameState::HeaderDone);

        self.header.clear();
        let len = self.payload.len();
        self.payload.consume(len);
        self.payload_rem = 0;
        self.frame = FrameState::New;
    }
}

#[cfg(test)]
mod test {
    use netbuf::Buf;

    use config::Config;
    use enums::Method;
    use request::RequestHead;
    use response::ResponseHead;
    use value::Value;
    use super::FrameParser;

    fn sample_request() -> RequestHead {
        let mut req = RequestHead::new();
        req.method = Method::Get;
        req.path = "/chat".into();
        req.host = "server.example.com".into();
        req.headers.push(("Host".into(),
                          Value::from("server.example.com")));
        req.headers.push(("Upgrade".into(), Value::from("websocket")));
        req.headers.push(("Connection".into(), Value::from("Upgrade")));
        req.headers.push(("Sec-WebSocket-Key".into(),
                          Value::from("dGhlIHNhbXBsZSBub25jZQ==")));
        req.headers.push(("Sec-WebSocket-Version".into(),
                          Value::from("13")));
        req
    }

    fn accepted_server() -> FrameParser {
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &sample_request());
        assert_eq!(resp.status, 101);
        parser
    }

    fn buf(data: &[u8]) -> Buf {
        let mut buf = Buf::new();
        buf.extend(data);
        buf
    }

    #[test]
    fn server_handshake_accept_token() {
        let parser = accepted_server();
        assert!(parser.is_server_mode());

        let mut resp = ResponseHead::new();
        let mut check = FrameParser::new(&Config::new());
        check.accept_handshake_request(&mut resp, &sample_request());
        assert_eq!(resp.header("Sec-WebSocket-Accept").unwrap().as_str(),
                   "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert_eq!(resp.header("Upgrade").unwrap().as_str(), "websocket");
        // no extensions were offered
        assert!(resp.header("Sec-WebSocket-Extensions").is_none());
        assert_eq!(check.pmce_send_window_bits(), 0);
    }

    #[test]
    fn handshake_version_mismatch() {
        let mut req = sample_request();
        for header in req.headers.iter_mut() {
            if header.0 == "Sec-WebSocket-Version" {
                header.1 = Value::from("8");
            }
        }
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert_eq!(resp.status, 426);
        assert_eq!(resp.header("Sec-WebSocket-Version").unwrap()
                       .as_integer(), 13);
        assert!(parser.error());
    }

    #[test]
    fn handshake_missing_key() {
        let mut req = sample_request();
        req.headers.retain(|&(ref name, _)| *name != "Sec-WebSocket-Key");
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert_eq!(resp.status, 400);
        assert!(parser.error());
    }

    #[test]
    fn handshake_connection_close() {
        let mut req = sample_request();
        for header in req.headers.iter_mut() {
            if header.0 == "Connection" {
                header.1 = Value::from("close");
            }
        }
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert_eq!(resp.status, 400);
    }

    #[test]
    fn cors_preflight() {
        let mut req = sample_request();
        req.method = Method::Options;
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert_eq!(resp.status, 204);
        assert_eq!(resp.header("Access-Control-Allow-Methods").unwrap()
                       .as_str(), "GET");
        // the handshake state is untouched, no error either
        assert!(!parser.is_server_mode());
    }

    #[test]
    fn pmce_negotiation() {
        let mut req = sample_request();
        req.headers.push(("Sec-WebSocket-Extensions".into(),
            Value::from("permessage-deflate; client_max_window_bits=11; \
                         server_no_context_takeover")));
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert_eq!(resp.status, 101);
        assert_eq!(parser.pmce_compression_level(), 6);
        assert!(parser.pmce_send_no_context_takeover());
        assert_eq!(parser.pmce_send_window_bits(), 15);
        assert_eq!(parser.pmce_receive_window_bits(), 11);
        assert_eq!(resp.header("Sec-WebSocket-Extensions").unwrap().as_str(),
                   "permessage-deflate; client_max_window_bits=11");
    }

    #[test]
    fn pmce_unknown_attribute_rejects_offer() {
        let mut req = sample_request();
        req.headers.push(("Sec-WebSocket-Extensions".into(),
            Value::from("permessage-deflate; frobnicate")));
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert_eq!(resp.status, 101);
        // handshake fine, compression off
        assert_eq!(parser.pmce_compression_level(), 0);
        assert!(resp.header("Sec-WebSocket-Extensions").is_none());
    }

    #[test]
    fn pmce_window_bits_out_of_range() {
        let mut req = sample_request();
        req.headers.push(("Sec-WebSocket-Extensions".into(),
            Value::from("permessage-deflate; client_max_window_bits=8")));
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert_eq!(parser.pmce_compression_level(), 0);
    }

    #[test]
    fn pmce_disabled_by_config() {
        let mut config = Config::new();
        config.default_compression_level(0);
        let mut req = sample_request();
        req.headers.push(("Sec-WebSocket-Extensions".into(),
            Value::from("permessage-deflate")));
        let mut parser = FrameParser::new(&config.done());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert_eq!(resp.status, 101);
        assert_eq!(parser.pmce_compression_level(), 0);
    }

    #[test]
    fn client_handshake_round_trip() {
        let config = Config::new();
        let mut client = FrameParser::new(&config);
        let mut req = RequestHead::new();
        client.create_handshake_request(&mut req);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.header("Upgrade").unwrap().as_str(), "websocket");
        assert_eq!(req.header("Sec-WebSocket-Key").unwrap().as_str().len(),
                   24);
        assert_eq!(req.header("Sec-WebSocket-Extensions").unwrap().as_str(),
                   "permessage-deflate; client_max_window_bits");
        // origin-form needs a Host header; the session adds it
        req.host = "server.example.com".into();
        req.headers.push(("Host".into(),
                          Value::from("server.example.com")));

        let mut server = FrameParser::new(&config);
        let mut resp = ResponseHead::new();
        server.accept_handshake_request(&mut resp, &req);
        assert_eq!(resp.status, 101);
        assert!(server.is_server_mode());

        client.accept_handshake_response(&resp);
        assert!(client.is_client_mode());
        // both sides agreed on compression
        assert_eq!(client.pmce_compression_level(), 6);
        assert_eq!(server.pmce_compression_level(), 6);
        assert_eq!(client.pmce_send_window_bits(),
                   server.pmce_receive_window_bits());
    }

    #[test]
    fn client_rejects_bad_accept() {
        let mut client = FrameParser::new(&Config::new());
        let mut req = RequestHead::new();
        client.create_handshake_request(&mut req);

        let mut resp = ResponseHead::new();
        resp.status = 101;
        resp.headers.push(("Upgrade".into(), Value::from("websocket")));
        resp.headers.push(("Sec-WebSocket-Accept".into(),
                           Value::from("AAAAAAAAAAAAAAAAAAAAAAAAAAA=")));
        client.accept_handshake_response(&resp);
        assert!(!client.is_client_mode());
        assert!(client.error());
    }

    #[test]
    fn unmasked_text_frame() {
        let mut parser = accepted_server();
        let mut data = buf(b"\x81\x05Hello");
        parser.parse_frame_header_from_stream(&mut data);
        // a server requires masked frames
        assert!(parser.error());
        assert_eq!(parser.error_description(),
                   "clients must mask frames to servers");
    }

    #[test]
    fn masked_text_frame() {
        let mut parser = accepted_server();
        let mut data = buf(b"\x81\x85\x37\xfa\x21\x3d\x7f\x9f\x4d\x51\x58");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.frame_header_complete());
        assert_eq!(parser.frame_header().payload_len, 5);
        parser.parse_frame_payload_from_stream(&mut data);
        assert!(parser.frame_payload_complete());
        assert_eq!(&parser.frame_payload()[..], b"Hello");
        assert!(parser.message_fin());
        assert_eq!(parser.message_opcode(), 1);
    }

    #[test]
    fn fragmented_message() {
        let mut parser = accepted_server();
        // "Hel" without FIN, then "lo" as FIN continuation, masked with a
        // zero key so the bytes stay readable.
        let mut data = buf(b"\x01\x83\x00\x00\x00\x00Hel");
        parser.parse_frame_header_from_stream(&mut data);
        parser.parse_frame_payload_from_stream(&mut data);
        assert!(parser.frame_payload_complete());
        assert!(!parser.message_fin());
        assert_eq!(parser.message_opcode(), 1);
        assert_eq!(&parser.take_frame_payload()[..], b"Hel");
        parser.next_frame();

        let mut data = buf(b"\x80\x82\x00\x00\x00\x00lo");
        parser.parse_frame_header_from_stream(&mut data);
        parser.parse_frame_payload_from_stream(&mut data);
        assert!(parser.frame_payload_complete());
        assert!(parser.message_fin());
        assert_eq!(parser.message_opcode(), 1);
        assert_eq!(&parser.frame_payload()[..], b"lo");
    }

    #[test]
    fn interleaved_control_frame_keeps_message_bits() {
        let mut parser = accepted_server();
        let mut data = buf(b"\x01\x81\x00\x00\x00\x00x");
        parser.parse_frame_header_from_stream(&mut data);
        parser.parse_frame_payload_from_stream(&mut data);
        parser.next_frame();

        // PING in the middle of the fragmented message
        let mut data = buf(b"\x89\x80\x00\x00\x00\x00");
        parser.parse_frame_header_from_stream(&mut data);
        parser.parse_frame_payload_from_stream(&mut data);
        assert!(parser.frame_payload_complete());
        assert_eq!(parser.message_opcode(), 1);
        assert!(!parser.message_fin());
        parser.next_frame();

        let mut data = buf(b"\x80\x80\x00\x00\x00\x00");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.frame_header_complete());
        assert!(parser.message_fin());
    }

    #[test]
    fn dangling_continuation() {
        let mut parser = accepted_server();
        let mut data = buf(b"\x80\x80\x00\x00\x00\x00");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.error());
        assert_eq!(parser.error_description(), "dangling continuation frame");
    }

    #[test]
    fn data_frame_mid_message() {
        let mut parser = accepted_server();
        let mut data = buf(b"\x01\x81\x00\x00\x00\x00x");
        parser.parse_frame_header_from_stream(&mut data);
        parser.parse_frame_payload_from_stream(&mut data);
        parser.next_frame();

        let mut data = buf(b"\x81\x81\x00\x00\x00\x00y");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.error());
        assert_eq!(parser.error_description(), "continuation frame expected");
    }

    #[test]
    fn control_frame_too_long() {
        let mut parser = accepted_server();
        // PING with 126-byte length
        let mut data = buf(b"\x89\xfe\x00\x7e");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.error());
        assert_eq!(parser.error_description(),
                   "control frame length not valid");
    }

    #[test]
    fn fragmented_control_frame() {
        let mut parser = accepted_server();
        let mut data = buf(b"\x09\x80\x00\x00\x00\x00");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.error());
        assert_eq!(parser.error_description(),
                   "control frame not fragmentable");
    }

    #[test]
    fn rsv1_without_pmce() {
        let mut parser = accepted_server();
        let mut data = buf(b"\xc1\x81\x00\x00\x00\x00x");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.error());
        assert_eq!(parser.error_description(),
                   "invalid RSV bits in data frame");
    }

    #[test]
    fn rsv1_with_pmce() {
        let mut req = sample_request();
        req.headers.push(("Sec-WebSocket-Extensions".into(),
                          Value::from("permessage-deflate")));
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);
        assert!(parser.is_server_mode());

        let mut data = buf(b"\xc1\x81\x00\x00\x00\x00x");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.frame_header_complete());
        assert!(parser.message_rsv1());
    }

    #[test]
    fn rsv1_on_continuation_rejected() {
        let mut req = sample_request();
        req.headers.push(("Sec-WebSocket-Extensions".into(),
                          Value::from("permessage-deflate")));
        let mut parser = FrameParser::new(&Config::new());
        let mut resp = ResponseHead::new();
        parser.accept_handshake_request(&mut resp, &req);

        let mut data = buf(b"\x01\x81\x00\x00\x00\x00x");
        parser.parse_frame_header_from_stream(&mut data);
        parser.parse_frame_payload_from_stream(&mut data);
        parser.next_frame();

        let mut data = buf(b"\xc0\x80\x00\x00\x00\x00");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.error());
        assert_eq!(parser.error_description(),
                   "invalid RSV bits in continuation frame");
    }

    #[test]
    fn unknown_opcode() {
        let mut parser = accepted_server();
        let mut data = buf(b"\x83\x80\x00\x00\x00\x00");
        parser.parse_frame_header_from_stream(&mut data);
        assert!(parser.error());
        assert_eq!(parser.error_description(), "unknown opcode");
    }

    #[test]
    fn header_split_invariance() {
        let frame: &[u8] = b"\x81\x85\x37\xfa\x21\x3d\x7f\x9f\x4d\x51\x58";
        for split in 1..frame.len() {
            let mut parser = accepted_server();
            let mut data = buf(&frame[..split]);
            parser.parse_frame_header_from_stream(&mut data);
            if parser.frame_header_complete() {
                parser.parse_frame_payload_from_stream(&mut data);
            }
            data.extend(&frame[split..]);
            parser.parse_frame_header_from_stream(&mut data);
            parser.parse_frame_payload_from_stream(&mut data);
            assert!(parser.frame_payload_complete(), "split at {}", split);
            assert_eq!(&parser.frame_payload()[..], b"Hello",
                       "split at {}", split);
        }
    }
}
