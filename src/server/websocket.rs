//! The server-side WebSocket session: an HTTP session whose headers hook
//! runs the handshake, then a frame pump over the upgraded stream.

use std::io;
use std::sync::Arc;

use netbuf::Buf;

use config::Config;
use enums::{Method, PayloadType, Status};
use request::RequestHead;
use response::ResponseHead;
use server::{HttpServerHandler, HttpServerSession, ServerTx};
use transport::Transport;
use value::Value;
use websocket::{Opcode, WsCore, WsHandler, status};


/// Hooks a WebSocket server application implements, on top of the shared
/// message hooks.
pub trait WsServerHandler: WsHandler {
    /// The handshake completed; `uri` is the reassembled request target.
    fn on_ws_accepted(&mut self, uri: &str) {
        debug!("accepted WebSocket connection: {}", uri);
    }
}

/// A server session that starts its life as HTTP, answers the RFC 6455
/// handshake synchronously from the request-headers hook, and then owns
/// the frame parser and the compression contexts.
pub struct WsServerSession {
    http: HttpServerSession,
    ws: WsCore,
}

// The internal HTTP handler that drives the handshake and forwards the
// upgraded stream into the frame pump.
struct Handshaker<'a, H: 'a> {
    ws: &'a mut WsCore,
    handler: &'a mut H,
}

impl<'a, T, H> HttpServerHandler<T> for Handshaker<'a, H>
    where T: Transport, H: WsServerHandler,
{
    fn on_request_headers(&mut self, tx: &mut ServerTx<T>,
        req: &mut RequestHead, close_after_payload: bool)
        -> io::Result<PayloadType>
    {
        if req.is_proxy {
            // Reject proxy requests.
            self.on_request_error(tx, Status::Forbidden)?;
            return Ok(PayloadType::Normal);
        }

        // Validate the handshake and send the response right away.
        let mut resp = ResponseHead::new();
        self.ws.parser.accept_handshake_request(&mut resp, req);
        tx.response_headers_only(&resp)?;

        if req.method == Method::Options {
            // A CORS preflight; the actual handshake may follow on a
            // separate request.
            return Ok(PayloadType::Normal);
        }

        if close_after_payload || !self.ws.parser.is_server_mode() {
            // The handshake failed; the response said so already.
            let desc = self.ws.parser.error_description();
            self.ws.close_once(tx.transport(), self.handler,
                               status::PROTOCOL_ERROR, desc)?;
            return Ok(PayloadType::Normal);
        }

        // Initialize extensions.
        self.ws.init_pmce();

        let mut uri = format!("{}{}", req.host, req.path);
        if !req.query.is_empty() {
            uri.push('?');
            uri.push_str(&req.query);
        }
        self.handler.on_ws_accepted(&uri);
        Ok(PayloadType::Normal)
    }

    fn on_request_payload_stream(&mut self, data: &mut Buf,
        _max_content_length: usize) -> Result<(), Status>
    {
        // A handshake request has no payload worth keeping.
        let len = data.len();
        data.consume(len);
        Ok(())
    }

    fn on_request_finish(&mut self, _tx: &mut ServerTx<T>,
        _req: RequestHead, _payload: Buf, _close_now: bool)
        -> io::Result<()>
    {
        Ok(())
    }

    fn on_request_error(&mut self, tx: &mut ServerTx<T>, status: Status)
        -> io::Result<()>
    {
        // This error can be reported synchronously.
        let mut resp = ResponseHead::with_status(status);
        resp.headers.push(("Connection".into(), Value::from("close")));
        tx.response(&mut resp, b"", false)?;

        self.ws.close_once(tx.transport(), self.handler,
                           status::NO_CLOSE_FRAME,
                           "handshake rejected by HTTP error")
    }

    fn on_upgraded_stream(&mut self, tx: &mut ServerTx<T>, data: &mut Buf,
        eof: bool) -> io::Result<()>
    {
        self.ws.process_stream(tx.transport(), self.handler, data, eof)
    }
}

impl WsServerSession {
    pub fn new(config: &Arc<Config>) -> WsServerSession {
        WsServerSession {
            http: HttpServerSession::new(config),
            // Frames from servers are not masked.
            ws: WsCore::new(config, false),
        }
    }

    /// Whether the handshake has completed and frames flow.
    pub fn is_upgraded(&self) -> bool {
        self.http.is_upgraded()
    }

    /// Feeds freshly received bytes through the session.
    pub fn on_stream<T, H>(&mut self, io: &mut T, handler: &mut H,
        data: &mut Buf, eof: bool) -> io::Result<()>
        where T: Transport, H: WsServerHandler,
    {
        let WsServerSession { ref mut http, ref mut ws } = *self;
        let mut glue = Handshaker { ws: ws, handler: handler };
        http.on_stream(io, &mut glue, data, eof)
    }

    /// Sends one data or control message.
    ///
    /// # Panics
    ///
    /// Panics when the handshake has not completed, for unsupported
    /// opcodes, and for control payloads over 125 bytes.
    pub fn send<T: Transport>(&mut self, io: &mut T, opcode: Opcode,
        data: &[u8]) -> io::Result<()>
    {
        if !self.http.is_upgraded() {
            panic!("WebSocket handshake not complete yet");
        }
        self.ws.send(io, opcode, data)
    }

    /// Sends a CLOSE frame (when upgraded) and shuts the transport down.
    /// Idempotent.
    pub fn shut_down<T: Transport>(&mut self, io: &mut T, status: u16,
        reason: &str) -> io::Result<()>
    {
        self.ws.shut_down(io, status, reason)
    }
}
