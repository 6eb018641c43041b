//! The client-side WebSocket session: issues the handshake request at
//! connect time, consumes the 101, then runs the frame pump.

use std::io;
use std::sync::Arc;

use netbuf::Buf;

use client::{ClientTx, HttpClientHandler, HttpClientSession};
use config::Config;
use enums::Status;
use request::RequestHead;
use response::ResponseHead;
use transport::Transport;
use websocket::{Opcode, WsCore, WsHandler, status};


/// Hooks a WebSocket client application implements, on top of the shared
/// message hooks.
pub trait WsClientHandler: WsHandler {
    /// The server accepted the handshake; messages may flow now.
    fn on_ws_connected(&mut self) {}
}

/// A client session. Construction composes and sends the handshake
/// request; the 101 response is consumed from the response-finish hook.
pub struct WsClientSession {
    http: HttpClientSession,
    ws: WsCore,
}

struct Handshaker<'a, H: 'a> {
    ws: &'a mut WsCore,
    handler: &'a mut H,
}

impl<'a, T, H> HttpClientHandler<T> for Handshaker<'a, H>
    where T: Transport, H: WsClientHandler,
{
    fn on_response_payload_stream(&mut self, data: &mut Buf,
        _max_content_length: usize) -> Result<(), Status>
    {
        // The handshake response has no payload worth keeping.
        let len = data.len();
        data.consume(len);
        Ok(())
    }

    fn on_response_finish(&mut self, tx: &mut ClientTx<T>,
        resp: ResponseHead, _payload: Buf, _close_now: bool)
        -> io::Result<()>
    {
        // Accept the handshake response.
        self.ws.parser.accept_handshake_response(&resp);

        if !self.ws.parser.is_client_mode() {
            // The handshake failed.
            let desc = self.ws.parser.error_description();
            return self.ws.close_once(tx.transport(), self.handler,
                                      status::PROTOCOL_ERROR, desc);
        }

        // Initialize extensions.
        self.ws.init_pmce();

        self.handler.on_ws_connected();
        Ok(())
    }

    fn on_upgraded_stream(&mut self, tx: &mut ClientTx<T>, data: &mut Buf,
        eof: bool) -> io::Result<()>
    {
        self.ws.process_stream(tx.transport(), self.handler, data, eof)
    }
}

impl WsClientSession {
    /// Sends the handshake request for `path`/`query` over `io` and
    /// returns the session awaiting the 101.
    pub fn connect<T: Transport>(config: &Arc<Config>, io: &mut T,
        host: &str, path: &str, query: &str) -> io::Result<WsClientSession>
    {
        let mut session = WsClientSession {
            http: HttpClientSession::new(config),
            // Frames from clients are masked.
            ws: WsCore::new(config, true),
        };
        session.http.set_default_host(host);

        let mut req = RequestHead::new();
        session.ws.parser.create_handshake_request(&mut req);
        if !path.is_empty() {
            req.path = path.to_string();
        }
        req.query = query.to_string();

        {
            let mut tx = session.http.tx(io);
            tx.request(&mut req, b"")?;
        }
        Ok(session)
    }

    /// Whether the handshake has completed and frames flow.
    pub fn is_upgraded(&self) -> bool {
        self.http.is_upgraded()
    }

    /// Feeds freshly received bytes through the session.
    pub fn on_stream<T, H>(&mut self, io: &mut T, handler: &mut H,
        data: &mut Buf, eof: bool) -> io::Result<()>
        where T: Transport, H: WsClientHandler,
    {
        let WsClientSession { ref mut http, ref mut ws } = *self;
        let mut glue = Handshaker { ws: ws, handler: handler };
        http.on_stream(io, &mut glue, data, eof)
    }

    /// Sends one data or control message, masked with a fresh random key.
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
