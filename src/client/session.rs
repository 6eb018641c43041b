//! The client-side HTTP session state machine.

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use netbuf::Buf;

use config::Config;
use enums::{PayloadType, Status};
use request::RequestHead;
use response::ResponseHead;
use response_parser::ResponseParser;
use transport::Transport;
use value::Value;


/// Hooks a client application implements.
///
/// Responses arrive in the order the requests were issued; for each one,
/// `on_response_headers` precedes the payload-stream calls, which precede
/// `on_response_finish`.
pub trait HttpClientHandler<T: Transport> {
    /// The response head is complete. Return `Empty` when the request that
    /// provoked this response was HEAD (or anything else whose response
    /// carries headers for an absent body), `Connect` to commit to a
    /// protocol switch.
    fn on_response_headers(&mut self, resp: &mut ResponseHead)
        -> io::Result<PayloadType>
    {
        debug!("HTTP client received response: {} {}",
               resp.status, resp.reason);
        Ok(PayloadType::Normal)
    }

    /// A part of the response payload arrived. The default enforces the
    /// configured size cap.
    fn on_response_payload_stream(&mut self, data: &mut Buf,
        max_content_length: usize) -> Result<(), Status>
    {
        if data.len() > max_content_length {
            return Err(Status::PayloadTooLarge);
        }
        Ok(())
    }

    /// The response is complete. `close_now` is set when the connection
    /// dies after this response.
    fn on_response_finish(&mut self, tx: &mut ClientTx<T>,
        resp: ResponseHead, payload: Buf, close_now: bool)
        -> io::Result<()>;

    /// Bytes that arrived after a committed protocol switch (a received
    /// 101 or a `Connect` payload type).
    fn on_upgraded_stream(&mut self, tx: &mut ClientTx<T>, data: &mut Buf,
        eof: bool) -> io::Result<()>
    {
        let _ = (tx, data, eof);
        panic!("on_upgraded_stream() not implemented");
    }
}

/// The sending half of a client session.
pub struct ClientTx<'a, T: 'a> {
    io: &'a mut T,
    upgrade_ack: &'a AtomicBool,
    default_host: &'a str,
}

impl<'a, T: Transport + 'a> ClientTx<'a, T> {
    /// Direct access to the transport.
    pub fn transport(&mut self) -> &mut T {
        &mut *self.io
    }

    fn check_not_upgraded(&self) {
        if self.upgrade_ack.load(Ordering::Acquire) {
            panic!("HTTP connection switched to another protocol");
        }
    }

    fn raw_request(&mut self, req: &RequestHead, data: &[u8])
        -> io::Result<()>
    {
        let mut buf = Buf::new();
        req.encode(&mut buf);
        buf.extend(data);
        self.io.send(&buf[..])
    }

    // `Host:` is mandatory in HTTP/1.1 for origin-form requests.
    fn add_host(&self, req: &mut RequestHead) {
        if !req.is_proxy && !self.default_host.is_empty() {
            req.headers.push(("Host".into(),
                              Value::from(self.default_host)));
        }
    }

    /// Sends a complete request. `Host` is added when not in proxy mode;
    /// `Content-Length` is added only for a non-empty body, since request
    /// messages have no payload by default.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn request(&mut self, req: &mut RequestHead, data: &[u8])
        -> io::Result<()>
    {
        self.check_not_upgraded();

        self.add_host(req);
        if !data.is_empty() {
            req.headers.push(("Content-Length".into(),
                              Value::from(data.len() as i64)));
        }

        self.raw_request(req, data)
    }

    /// Starts a chunked request.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn chunked_request_start(&mut self, req: &mut RequestHead)
        -> io::Result<()>
    {
        self.check_not_upgraded();

        self.add_host(req);
        req.headers.push(("Transfer-Encoding".into(),
                          Value::from("chunked")));

        self.raw_request(req, b"")
    }

    /// Sends one chunk. Empty sends are no-ops because a zero-length
    /// chunk would terminate the payload.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn chunked_request_send(&mut self, data: &[u8]) -> io::Result<()> {
        self.check_not_upgraded();

        if data.is_empty() {
            return Ok(());
        }

        let mut buf = Buf::new();
        write!(buf, "{:x}\r\n", data.len()).unwrap();
        buf.extend(data);
        buf.extend(b"\r\n");
        self.io.send(&buf[..])
    }

    /// Terminates a chunked request.
    ///
    /// # Panics
    ///
    /// Panics after a protocol switch.
    pub fn chunked_request_finish(&mut self) -> io::Result<()> {
        self.check_not_upgraded();
        self.io.send(b"0\r\n\r\n")
    }

    /// Requests transport shutdown.
    pub fn shut_down(&mut self) -> io::Result<()> {
        self.io.shut_down()
    }
}

/// A client session: wraps the response parser and drives the handler
/// hooks in response order.
pub struct HttpClientSession {
    parser: ResponseParser,
    upgrade_ack: AtomicBool,
    default_host: String,
    failed: bool,
}

impl HttpClientSession {
    pub fn new(config: &Arc<Config>) -> HttpClientSession {
        HttpClientSession {
            parser: ResponseParser::new(config),
            upgrade_ack: AtomicBool::new(false),
            default_host: String::new(),
            failed: false,
        }
    }

    /// Sets the value for the `Host` headers of subsequent requests.
    pub fn set_default_host<S: Into<String>>(&mut self, host: S) {
        self.default_host = host.into();
    }

    /// Whether the connection committed to another protocol.
    pub fn is_upgraded(&self) -> bool {
        self.upgrade_ack.load(Ordering::Acquire)
    }

    /// Builds the sending half.
    pub fn tx<'a, T: Transport>(&'a self, io: &'a mut T) -> ClientTx<'a, T> {
        ClientTx {
            io: io,
            upgrade_ack: &self.upgrade_ack,
            default_host: &self.default_host,
        }
    }

    /// Feeds freshly received bytes through the session. `eof` marks the
    /// final call for this connection.
    pub fn on_stream<T, H>(&mut self, io: &mut T, handler: &mut H,
        data: &mut Buf, eof: bool) -> io::Result<()>
        where T: Transport, H: HttpClientHandler<T>,
    {
        loop {
            if self.upgrade_ack.load(Ordering::Acquire) {
                let mut tx = self.tx(&mut *io);
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
                    // Unlike a server, a client has nobody to report to;
                    // drop the connection.
                    let len = data.len();
                    data.consume(len);
                    return io.shut_down();
                }

                if !self.parser.headers_complete() {
                    return Ok(());
                }

                let payload_type =
                    handler.on_response_headers(self.parser.mut_head())?;
                match payload_type {
                    PayloadType::Normal => {}
                    PayloadType::Empty => self.parser.set_no_payload(),
                    PayloadType::Connect => {
                        self.upgrade_ack.store(true, Ordering::Release);
                        let mut tx = self.tx(&mut *io);
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
                    return io.shut_down();
                }

                let max = self.parser.max_content_length();
                if let Err(status) = handler.on_response_payload_stream(
                    self.parser.mut_payload(), max)
                {
                    debug!("dropping connection: {:?}", status);
                    self.failed = true;
                    let len = data.len();
                    data.consume(len);
                    return io.shut_down();
                }

                if !self.parser.payload_complete() {
                    return Ok(());
                }

                // The response is complete now.
                let status = self.parser.head().status;
                let close_now = self.parser.should_close_after_payload();
                let head = self.parser.take_head();
                let payload = self.parser.take_payload();
                {
                    let mut tx = self.tx(&mut *io);
                    handler.on_response_finish(&mut tx, head, payload,
                                               close_now)?;
                }

                // For WebSocket (and HTTP/2) a 101 means the server has
                // switched to another protocol. CONNECT responses are
                // handled right after the headers instead; see above.
                if status == 101 {
                    self.upgrade_ack.store(true, Ordering::Release);
                }
            }

            self.parser.next_message();
            trace!("HTTP parser done: data.len = {}, eof = {}",
                   data.len(), eof);
        }
    }

}
