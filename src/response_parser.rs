//! Incremental parser for HTTP responses.

use httparse;
use netbuf::Buf;

use body_parser::BodyProgress;
use chunked;
use config::Config;
use enums::Status;
use error::ParseError;
use headers;
use response::ResponseHead;
use value::Value;


/// Number of headers to allocate on a stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers
const MAX_HEADERS: usize = 1024;
/// A hard limit on the size of the header block
const MAX_HEADERS_LENGTH: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum State {
    New,
    HeadersDone,
    PayloadDone,
}

/// A streaming parser producing a [`ResponseHead`] and a payload buffer.
///
/// The same re-entrancy rules apply as for the request parser. In addition,
/// the owner may call `set_no_payload` after the headers complete for
/// messages that have no body regardless of their headers, such as the
/// response to a HEAD request.
#[derive(Debug)]
pub struct ResponseParser {
    state: State,
    error: Option<ParseError>,
    head: ResponseHead,
    payload: Buf,
    body: Option<BodyProgress>,
    close_after_payload: bool,
    max_content_length: usize,
}

impl ResponseParser {
    pub fn new(config: &Config) -> ResponseParser {
        ResponseParser {
            state: State::New,
            error: None,
            head: ResponseHead::new(),
            payload: Buf::new(),
            body: None,
            close_after_payload: false,
            max_content_length: config.get_max_response_content_length(),
        }
    }

    pub fn headers_complete(&self) -> bool {
        self.state >= State::HeadersDone
    }

    pub fn payload_complete(&self) -> bool {
        self.state >= State::PayloadDone
    }

    pub fn error(&self) -> bool {
        self.error.is_some()
    }

    pub fn http_status_from_error(&self) -> Status {
        self.error.as_ref().map(|e| e.to_status()).unwrap_or(Status::Ok)
    }

    pub fn should_close_after_payload(&self) -> bool {
        self.close_after_payload
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn mut_head(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    pub fn take_head(&mut self) -> ResponseHead {
        ::std::mem::replace(&mut self.head, ResponseHead::new())
    }

    pub fn payload(&self) -> &Buf {
        &self.payload
    }

    pub fn mut_payload(&mut self) -> &mut Buf {
        &mut self.payload
    }

    pub fn take_payload(&mut self) -> Buf {
        ::std::mem::replace(&mut self.payload, Buf::new())
    }

    /// Declares that this message has no payload no matter what its headers
    /// say. Responses to HEAD requests carry the `Content-Length` of the
    /// body a GET would have produced, without the body itself.
    ///
    /// # Panics
    ///
    /// Panics unless called between headers-complete and payload-complete.
    pub fn set_no_payload(&mut self) {
        assert!(self.state == State::HeadersDone,
                "set_no_payload() requires complete headers");
        self.body = Some(BodyProgress::Fixed(0));
    }

    pub fn parse_headers_from_stream(&mut self, data: &mut Buf, eof: bool) {
        if self.state >= State::HeadersDone || self.error.is_some() {
            return;
        }

        let parsed = {
            let mut vec;
            let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
            let mut raw = httparse::Response::new(&mut headers);
            let mut result = raw.parse(&data[..]);
            if matches!(result, Err(httparse::Error::TooManyHeaders)) {
                vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
                raw = httparse::Response::new(&mut vec);
                result = raw.parse(&data[..]);
            }
            match result {
                Ok(httparse::Status::Complete(bytes)) => {
                    match scan_response(&raw) {
                        Ok((head, body, close)) => Ok((head, body, close,
                                                       bytes)),
                        Err(e) => Err(e),
                    }
                }
                Ok(httparse::Status::Partial) => {
                    if data.len() > MAX_HEADERS_LENGTH {
                        Err(ParseError::HeadersTooLong)
                    } else if eof && data.len() > 0 {
                        Err(ParseError::Incomplete)
                    } else {
                        return;
                    }
                }
                Err(e) => Err(ParseError::from(e)),
            }
        };

        match parsed {
            Ok((head, body, close, bytes)) => {
                data.consume(bytes);
                self.head = head;
                self.body = Some(body);
                self.close_after_payload = close;
                self.state = State::HeadersDone;
            }
            Err(e) => {
                self.error = Some(e);
            }
        }
    }

    /// # Panics
    ///
    /// Panics when the headers have not been parsed yet.
    pub fn parse_payload_from_stream(&mut self, data: &mut Buf, eof: bool) {
        if self.state >= State::PayloadDone || self.error.is_some() {
            return;
        }
        if self.state != State::HeadersDone {
            panic!("HTTP response header not parsed yet");
        }

        let result = self.body.as_mut().unwrap()
            .parse(data, &mut self.payload, eof);
        match result {
            Ok(done) => {
                if self.payload.len() > self.max_content_length {
                    self.error = Some(ParseError::TooLarge);
                } else if done {
                    self.state = State::PayloadDone;
                }
            }
            Err(e) => {
                self.error = Some(e);
            }
        }
    }

    /// Resets the parser for the next pipelined response.
    ///
    /// # Panics
    ///
    /// Panics unless the current message is complete.
    pub fn next_message(&mut self) {
        assert!(self.state == State::PayloadDone,
                "HTTP response not complete yet");
        self.state = State::New;
        self.error = None;
        self.head.clear();
        self.payload = Buf::new();
        self.body = None;
        self.close_after_payload = false;
    }
}

fn scan_response(raw: &httparse::Response)
    -> Result<(ResponseHead, BodyProgress, bool), ParseError>
{
    let version = raw.version.unwrap();
    let status = raw.code.unwrap();

    let mut head = ResponseHead::new();
    head.status = status;
    head.reason = raw.reason.unwrap_or("").to_string();
    for h in raw.headers.iter() {
        let value = String::from_utf8_lossy(h.value).into_owned();
        head.headers.push((h.name.into(), Value::from(value)));
    }

    // The body length algorithm for responses. 1xx, 204 and 304 never have
    // a body; otherwise chunked wins over `Content-Length`; with neither,
    // the body extends to the end of the stream.
    let bodyless = status < 200 || status == 204 || status == 304;
    let mut has_content_length = false;
    let mut chunked = false;
    let mut fixed_length = 0u64;
    let mut close = version == 0;
    for h in raw.headers.iter() {
        if h.name.eq_ignore_ascii_case("Transfer-Encoding") {
            if let Some(enc) = h.value.split(|&ch| ch == b',').last() {
                if headers::is_chunked(enc) {
                    chunked = true;
                }
            }
        } else if h.name.eq_ignore_ascii_case("Content-Length") {
            if has_content_length {
                return Err(ParseError::Length);
            }
            has_content_length = true;
            let s = ::std::str::from_utf8(h.value)
                .map_err(|_| ParseError::Length)?;
            fixed_length = s.trim().parse()
                .map_err(|_| ParseError::Length)?;
        } else if h.name.eq_ignore_ascii_case("Connection") {
            if h.value.split(|&ch| ch == b',').any(headers::is_close) {
                close = true;
            } else if version == 0
                && headers::contains_token(h.value, "keep-alive")
            {
                close = false;
            }
        }
    }

    let body = if bodyless {
        BodyProgress::Fixed(0)
    } else if chunked {
        BodyProgress::Chunked(chunked::State::new())
    } else if has_content_length {
        BodyProgress::Fixed(fixed_length)
    } else {
        // Terminated by connection close.
        close = true;
        BodyProgress::Eof
    };
    Ok((head, body, close))
}

#[cfg(test)]
mod test {
    use netbuf::Buf;

    use config::Config;
    use enums::Status;
    use super::ResponseParser;

    fn parser() -> ResponseParser {
        ResponseParser::new(&Config::new())
    }

    fn feed(input: &[u8], eof: bool) -> ResponseParser {
        let mut p = parser();
        let mut data = Buf::new();
        data.extend(input);
        p.parse_headers_from_stream(&mut data, eof);
        if p.headers_complete() {
            p.parse_payload_from_stream(&mut data, eof);
        }
        p
    }

    const SIMPLE: &'static [u8] =
        b"HTTP/1.1 200 OK\r\n\
          Content-Length: 5\r\n\r\nhello";

    #[test]
    fn simple_response() {
        let mut p = feed(SIMPLE, false);
        assert!(p.payload_complete());
        assert!(!p.error());
        let head = p.take_head();
        assert_eq!(head.status, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(&p.take_payload()[..], b"hello");
    }

    #[test]
    fn split_invariance() {
        for split in 1..SIMPLE.len() {
            let mut p = parser();
            let mut data = Buf::new();
            data.extend(&SIMPLE[..split]);
            p.parse_headers_from_stream(&mut data, false);
            if p.headers_complete() {
                p.parse_payload_from_stream(&mut data, false);
            }
            data.extend(&SIMPLE[split..]);
            p.parse_headers_from_stream(&mut data, false);
            p.parse_payload_from_stream(&mut data, false);
            assert!(p.payload_complete(), "split at {}", split);
            assert_eq!(&p.payload()[..], b"hello");
        }
    }

    #[test]
    fn no_content_has_no_body() {
        let p = feed(b"HTTP/1.1 204 No Content\r\n\r\n", false);
        assert!(p.payload_complete());
        assert_eq!(p.payload().len(), 0);
    }

    #[test]
    fn switching_protocols_has_no_body() {
        let mut p = parser();
        let mut data = Buf::new();
        data.extend(b"HTTP/1.1 101 Switching Protocols\r\n\
                      Upgrade: websocket\r\n\r\n\x81\x05hello");
        p.parse_headers_from_stream(&mut data, false);
        p.parse_payload_from_stream(&mut data, false);
        assert!(p.payload_complete());
        // the frame bytes stay in the receive buffer
        assert_eq!(&data[..], b"\x81\x05hello");
    }

    #[test]
    fn read_until_eof() {
        let mut p = parser();
        let mut data = Buf::new();
        data.extend(b"HTTP/1.1 200 OK\r\n\r\nstream until");
        p.parse_headers_from_stream(&mut data, false);
        assert!(p.headers_complete());
        assert!(p.should_close_after_payload());
        p.parse_payload_from_stream(&mut data, false);
        assert!(!p.payload_complete());
        data.extend(b" the end");
        p.parse_payload_from_stream(&mut data, true);
        assert!(p.payload_complete());
        assert_eq!(&p.payload()[..], b"stream until the end");
    }

    #[test]
    fn head_response_via_set_no_payload() {
        let mut p = parser();
        let mut data = Buf::new();
        data.extend(b"HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\n");
        p.parse_headers_from_stream(&mut data, false);
        assert!(p.headers_complete());
        p.set_no_payload();
        p.parse_payload_from_stream(&mut data, false);
        assert!(p.payload_complete());
        assert_eq!(p.payload().len(), 0);
    }

    #[test]
    fn chunked_response() {
        let p = feed(b"HTTP/1.1 200 OK\r\n\
                       Transfer-Encoding: chunked\r\n\r\n\
                       3\r\nfoo\r\n0\r\n\r\n", false);
        assert!(p.payload_complete());
        assert_eq!(&p.payload()[..], b"foo");
    }

    #[test]
    fn oversized_payload() {
        let mut config = Config::new();
        config.max_response_content_length(4);
        let mut p = ResponseParser::new(&config.done());
        let mut data = Buf::new();
        data.extend(b"HTTP/1.1 200 OK\r\n\r\nmore than four");
        p.parse_headers_from_stream(&mut data, false);
        p.parse_payload_from_stream(&mut data, false);
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::PayloadTooLarge);
    }

    #[test]
    fn empty_reason_allowed() {
        let p = feed(b"HTTP/1.1 200 \r\nContent-Length: 0\r\n\r\n", false);
        assert!(p.payload_complete());
        assert_eq!(p.head().reason, "");
    }
}
