//! The server-side HTTP session state machine.

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use netbuf::Buf;

use config::Config;
use enums::{PayloadType, Status};
use header_parser::HeaderParser;
use request::RequestHead;
use request_parser::RequestParser;
use response::ResponseHead;
use transport::Transport;
use value::Value;


/// Hooks a server application implements.
///
/// For one connection the hooks are strictly serialized in byte-stream
/// order: `on_request_headers` precedes any `on_request_payload_stream`
/// for that request, which precede `on_request_finish`, which precedes the
/// next request's `on_request_headers`. Parser errors arrive through
/// `on_request_error` in request order, which matters for pipelining: an
/// eagerly synthesized response could overtake queued responses from a
/// worker thread.
pub trait HttpServerHandler<T: Transport> {
    /// The request head is complete. The returned payload type tells the
    /// session whether to parse a body or to commit to a protocol switch.
    ///
    /// The default logs the request and rejects proxy requests with 403.
    fn on_request_headers(&mut self, tx: &mut ServerTx<T>,
        req: &mut RequestHead, close_after_payload: bool)
        -> io::Result<PayloadType>
    {
        let _ = close_after_payload;
        if req.is_proxy {
            // Not a proxy server.
            self.on_request_error(tx, Status::Forbidden)?;
            return Ok(PayloadType::Normal);
        }

        debug!("HTTP server received request: {} {}",
               req.method, req.path);
        Ok(PayloadType::Normal)
    }

    /// A part of the request payload arrived. `data` holds everything
    /// received so far; a streaming consumer may drain a prefix. The
    /// default enforces the configured size cap, which becomes the status
    /// of `on_request_error`.
    fn on_request_payload_stream(&mut self, data: &mut Buf,
        max_content_length: usize) -> Result<(), Status>
    {
        if data.len() > max_content_length {
            return Err(Status::PayloadTooLarge);
        }
        Ok(())
    }

    /// The request is complete. `close_now` is set when the connection
    /// goes away after this request, so no response can follow it.
    fn on_request_finish(&mut self, tx: &mut ServerTx<T>, req: RequestHead,
        payload: Buf, close_now: bool) -> io::Result<()>;

    /// The parser rejected the request. Reported at the position of the
    /// failed request so responses stay ordered. The default sends an
    /// error page and closes.
    fn on_request_error(&mut self, tx: &mut ServerTx<T>, status: Status)
        -> io::Result<()>
    {
        tx.shut_down_with_status(status)
    }

    /// Bytes that arrived after a committed protocol switch (a sent 101 or
    /// a `Connect` payload type). Sessions that never upgrade don't
    /// implement this.
    fn on_upgraded_stream(&mut self, tx: &mut ServerTx<T>, data: &mut Buf,
        eof: bool) -> io::Result<()>
    {
        let _ = (tx, data, eof);
        panic!("on_upgraded_stream() not implemented");
    }
}

/// The sending half of a server session, passed to every hook. Borrows the
/// transport for the duration of the callback, so hooks can respond from
/// within the parsing path.
pub struct ServerTx<'a, T: 'a> {
    io: &'a mut T,
    upgrade_ack: &'a AtomicBool,
}

impl<'a, T: Transport + 'a> ServerTx<'a, T> {
    /// Direct access to the transport.
    pub fn transport(&mut self) -> &mut T {
        &mut *self.io
    }

    fn check_not_upgraded(&self) {
        if self.upgrade_ack.load(Ordering::Acquire) {
            panic!("HTTP connection switched to another protocol");
        }
    }

    // Sends the head plus an inline body. A 101 status commits the
    // protocol switch; an outbound `Connection: close` schedules transport
    // shutdown.
    fn raw_response(&mut self, resp: &ResponseHead, data: &[u8])
        -> io::Result<()>
    {
        let mut buf = Buf::new();
        resp.encode(&mut buf);
        buf.extend(data);
        self.io.send(&buf[..])?;

        // For server sessions a 101 means this side switches to another
        // protocol right after this message.
        if resp.status == 101 {
            self.upgrade_ack.store(true, Ordering::Release);
        }

        let mut hparser = HeaderParser::new();
        for &(ref name, ref value) in &resp.headers {
            if *name == "Connection" {
                hparser.reload(value.as_str());
                while hparser.next_element() {
                    if hparser.current_name().eq_ignore_ascii_case("close") {
                        self.io.shut_down()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Sends a response head without a body, e.g. a 101 handshake reply.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn response_headers_only(&mut self, resp: &ResponseHead)
        -> io::Result<()>
    {
        self.check_not_upgraded();
        self.raw_response(resp, b"")
    }

    /// Sends a complete response with an implicit `Content-Length`, which
    /// is suppressed for 1xx, 204 and 304. The body bytes are suppressed
    /// for responses to HEAD requests, whose headers still describe the
    /// full body.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn response(&mut self, resp: &mut ResponseHead, data: &[u8],
        method_was_head: bool) -> io::Result<()>
    {
        self.check_not_upgraded();

        // Some responses are required to have no payload and take no
        // `Content-Length` header.
        if resp.status <= 199 || resp.status == 204 || resp.status == 304 {
            return self.raw_response(resp, b"");
        }

        // Without a `Content-Length` the response would be interpreted as
        // terminated by connection closure.
        resp.headers.push(("Content-Length".into(),
                           Value::from(data.len() as i64)));

        self.raw_response(resp, if method_was_head { b"" } else { data })
    }

    /// Starts a chunked response by sending the head with
    /// `Transfer-Encoding: chunked` added.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn chunked_response_start(&mut self, resp: &mut ResponseHead)
        -> io::Result<()>
    {
        self.check_not_upgraded();
        resp.headers.push(("Transfer-Encoding".into(),
                           Value::from("chunked")));
        self.raw_response(resp, b"")
    }

    /// Sends one chunk. Empty sends are no-ops because a zero-length chunk
    /// would terminate the payload.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn chunked_response_send(&mut self, data: &[u8]) -> io::Result<()> {
        self.check_not_upgraded();

        if data.is_empty() {
            return Ok(());
        }

        // The chunk length is hexadecimal, without the `0x` prefix.
        let mut buf = Buf::new();
        write!(buf, "{:x}\r\n", data.len()).unwrap();
        buf.extend(data);
        buf.extend(b"\r\n");
        self.io.send(&buf[..])
    }

    /// Terminates a chunked response.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn chunked_response_finish(&mut self) -> io::Result<()> {
        self.check_not_upgraded();
        self.io.send(b"0\r\n\r\n")
    }

    /// Sends a default error page for `status` with `Connection: close`
    /// and shuts the transport down. Used to abandon a connection that
    /// cannot be served.
    pub fn shut_down_with_status(&mut self, status: Status)
        -> io::Result<()>
    {
        if self.upgrade_ack.load(Ordering::Acquire) {
            return self.io.shut_down();
        }

        let mut resp = ResponseHead::with_status(status);
        resp.headers.push(("Content-Type".into(),
                           Value::from("text/html")));
        resp.headers.push(("Connection".into(), Value::from("close")));

        let page = format!(
            "<html>\
             <head><title>{code} {reason}</title></head>\
             <body><h1>{code} {reason}</h1></body>\
             </html>",
            code = status.code(), reason = status.reason());

        self.response(&mut resp, page.as_bytes(), false)?;
        self.io.shut_down()
    }

    /// Requests plain transport shutdown.
    pub fn shut_down(&mut self) -> io::Result<()> {
        self.io.shut_down()
    }
}

/// A server session: wraps the request parser, drives the handler hooks
/// and hands upgraded streams over.
pub struct HttpServerSession {
    parser: RequestParser,
    upgrade_ack: AtomicBool,
    failed: bool,
}

impl HttpServerSession {
    pub fn new(config: &Arc<Config>) -> HttpServerSession {
        HttpServerSession {
            parser: RequestParser::new(config),
            upgrade_ack: AtomicBool::new(false),
            failed: false,
        }
    }

    /// Whether the connection committed to another protocol. Senders read
    /// this without entering the parsing path.
    pub fn is_upgraded(&self) -> bool {
        self.upgrade_ack.load(Ordering::Acquire)
    }

    /// Builds the sending half for use outside of hooks, e.g. from a
    /// worker thread finishing a deferred response.
    pub fn tx<'a, T: Transport>(&'a self, io: &'a mut T) -> ServerTx<'a, T> {
        ServerTx { io: io, upgrade_ack: &self.upgrade_ack }
    }

    /// Feeds freshly received bytes through the session. `eof` marks the
    /// final call for this connection.
    pub fn on_stream<T, H>(&mut self, io: &mut T, handler: &mut H,
        data: &mut Buf, eof: bool) -> io::Result<()>
        where T: Transport, H: HttpServerHandler<T>,
    {
        loop {
            // The connection may have switched to another protocol, either
            // before this call or from within a hook below.
            if self.upgrade_ack.load(Ordering::Acquire) {
                let mut tx = ServerTx { io: &mut *io,
                                        upgrade_ack: &self.upgrade_ack };
                return handler.on_upgraded_stream(&mut tx, data, eof);
            }

            // If something has gone wrong, ignore further incoming data.
            if self.parser.error() || self.failed {
                let len = data.len();
                data.consume(len);
                return Ok(());
            }

            if !self.parser.headers_complete() {
                self.parser.parse_headers_from_stream(data, eof);

                if self.parser.error() {
                    let len = data.len();
                    data.consume(len);
                    let status = self.parser.http_status_from_error();
                    let mut tx = ServerTx { io: &mut *io,
                                            upgrade_ack: &self.upgrade_ack };
                    return handler.on_request_error(&mut tx, status);
                }

                if !self.parser.headers_complete() {
                    return Ok(());
                }

                let close_after = self.parser.should_close_after_payload();
                let payload_type = {
                    let mut tx = ServerTx { io: &mut *io,
                                            upgrade_ack: &self.upgrade_ack };
                    handler.on_request_headers(&mut tx,
                                               self.parser.mut_head(),
                                               close_after)?
                };
                match payload_type {
                    PayloadType::Normal | PayloadType::Empty => {}
                    PayloadType::Connect => {
                        self.upgrade_ack.store(true, Ordering::Release);
                        let mut tx = ServerTx {
                            io: &mut *io, upgrade_ack: &self.upgrade_ack };
                        return handler.on_upgraded_stream(&mut tx, data,
                                                          eof);
                    }
                }
            }

            if !self.parser.payload_complete() {
                self.parser.parse_payload_from_stream(data, eof);

                if self.parser.error() {
                    let len = data.len();
                    data.consume(len);
                    let status = self.parser.http_status_from_error();
                    let mut tx = ServerTx { io: &mut *io,
                                            upgrade_ack: &self.upgrade_ack };
                    return handler.on_request_error(&mut tx, status);
                }

                let max = self.parser.max_content_length();
                if let Err(status) = handler.on_request_payload_stream(
                    self.parser.mut_payload(), max)
                {
                    self.failed = true;
                    let len = data.len();
                    data.consume(len);
                    let mut tx = ServerTx { io: &mut *io,
                                            upgrade_ack: &self.upgrade_ack };
                    return handler.on_request_error(&mut tx, status);
                }

                if !self.parser.payload_complete() {
                    return Ok(());
                }

                // The request is complete now.
                let close_now = self.parser.should_close_after_payload();
                let head = self.parser.take_head();
                let payload = self.parser.take_payload();
                let mut tx = ServerTx { io: &mut *io,
                                        upgrade_ack: &self.upgrade_ack };
                handler.on_request_finish(&mut tx, head, payload,
                                          close_now)?;
            }

            self.parser.next_message();
            trace!("HTTP parser done: data.len = {}, eof = {}",
                   data.len(), eof);
        }
    }
}
