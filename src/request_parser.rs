//! Incremental parser for HTTP requests.

use httparse;
use netbuf::Buf;

use body_parser::BodyProgress;
use chunked;
use config::Config;
use enums::{Method, Status};
use error::ParseError;
use headers;
use request::RequestHead;
use request_target::{RequestTarget, Authority, split_path_query};
use value::Value;


/// Number of headers to allocate on a stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers
const MAX_HEADERS: usize = 1024;
/// A hard limit on the size of the header block
const MAX_HEADERS_LENGTH: usize = 65536;
/// Longest method token we are willing to store
const MAX_METHOD_LENGTH: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum State {
    New,
    HeadersDone,
    PayloadDone,
}

/// A streaming parser producing a [`RequestHead`] and a payload buffer.
///
/// Both parsing entry points consume a prefix of the buffer they are given
/// and may be called any number of times with the same buffer as more bytes
/// arrive; an arbitrary split of the input yields the same result as one
/// big read. After the payload completes the parser pauses until
/// `next_message` resets it for the next pipelined request.
///
/// A syntax error freezes the parser; `http_status_from_error` derives the
/// status code the session reports.
pub struct RequestParser {
    state: State,
    error: Option<ParseError>,
    head: RequestHead,
    payload: Buf,
    body: Option<BodyProgress>,
    close_after_payload: bool,
    max_content_length: usize,
}

impl RequestParser {
    pub fn new(config: &Config) -> RequestParser {
        RequestParser {
            state: State::New,
            error: None,
            head: RequestHead::new(),
            payload: Buf::new(),
            body: None,
            close_after_payload: false,
            max_content_length: config.get_max_request_content_length(),
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

    /// The HTTP status derived from the error sentinel, or `Ok` when no
    /// error has occurred.
    pub fn http_status_from_error(&self) -> Status {
        self.error.as_ref().map(|e| e.to_status()).unwrap_or(Status::Ok)
    }

    pub fn should_close_after_payload(&self) -> bool {
        self.close_after_payload
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn mut_head(&mut self) -> &mut RequestHead {
        &mut self.head
    }

    pub fn take_head(&mut self) -> RequestHead {
        ::std::mem::replace(&mut self.head, RequestHead::new())
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

    /// Consumes bytes until the header block is complete. Pauses afterwards
    /// so the owner can inspect the head before any payload is parsed.
    pub fn parse_headers_from_stream(&mut self, data: &mut Buf, eof: bool) {
        if self.state >= State::HeadersDone || self.error.is_some() {
            return;
        }

        let parsed = {
            let mut vec;
            let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
            let mut raw = httparse::Request::new(&mut headers);
            let mut result = raw.parse(&data[..]);
            if matches!(result, Err(httparse::Error::TooManyHeaders)) {
                vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
                raw = httparse::Request::new(&mut vec);
                result = raw.parse(&data[..]);
            }
            match result {
                Ok(httparse::Status::Complete(bytes)) => {
                    match scan_request(&raw, self.max_content_length) {
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

    /// Consumes payload bytes, accumulating them into the parser-owned
    /// buffer. Pauses when the payload is complete.
    ///
    /// # Panics
    ///
    /// Panics when the headers have not been parsed yet.
    pub fn parse_payload_from_stream(&mut self, data: &mut Buf, eof: bool) {
        if self.state >= State::PayloadDone || self.error.is_some() {
            return;
        }
        if self.state != State::HeadersDone {
            panic!("HTTP request header not parsed yet");
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

    /// Resets the parser for the next pipelined request.
    ///
    /// # Panics
    ///
    /// Panics unless the current message is complete.
    pub fn next_message(&mut self) {
        assert!(self.state == State::PayloadDone,
                "HTTP request not complete yet");
        self.state = State::New;
        self.error = None;
        self.head.clear();
        self.payload = Buf::new();
        self.body = None;
        self.close_after_payload = false;
    }
}

// Turns a complete `httparse` request into a header block, a body-progress
// descriptor and the keep-alive decision.
fn scan_request(raw: &httparse::Request, max_content_length: usize)
    -> Result<(RequestHead, BodyProgress, bool), ParseError>
{
    let method_str = raw.method.unwrap();
    if method_str.len() > MAX_METHOD_LENGTH {
        return Err(ParseError::Method);
    }
    let version = raw.version.unwrap();

    let mut head = RequestHead::new();
    head.method = Method::from(method_str);
    for h in raw.headers.iter() {
        let value = String::from_utf8_lossy(h.value).into_owned();
        head.headers.push((h.name.into(), Value::from(value)));
    }

    // Split the request-target. An absolute URI switches the request into
    // proxy mode and determines SSL and the default port; the origin form
    // requires exactly one `Host` header instead.
    match RequestTarget::parse(raw.path.unwrap()) {
        Some(RequestTarget::Origin(target)) => {
            let (path, query) = split_path_query(target);
            head.path = path.to_string();
            head.query = query.to_string();
            head.host = single_host_header(&head)?;
        }
        Some(RequestTarget::Absolute { ssl, authority, path }) => {
            head.is_proxy = true;
            head.is_ssl = ssl;
            head.port = if ssl { 443 } else { 80 };
            let auth = Authority::split(authority).ok_or(ParseError::Url)?;
            if let Some(userinfo) = auth.userinfo {
                head.userinfo = userinfo.to_string();
            }
            head.host = auth.host.to_string();
            if let Some(port) = auth.port {
                head.port = port;
            }
            let (path, query) = split_path_query(path);
            head.path = if path.is_empty() { "/".to_string() }
                        else { path.to_string() };
            head.query = query.to_string();
        }
        Some(RequestTarget::Authority(authority)) => {
            // The authority form only makes sense for CONNECT.
            if head.method != Method::Connect {
                return Err(ParseError::Url);
            }
            let auth = Authority::split(authority).ok_or(ParseError::Url)?;
            head.host = auth.host.to_string();
            if let Some(port) = auth.port {
                head.port = port;
            }
        }
        Some(RequestTarget::Asterisk) => {
            head.path = "*".to_string();
            head.host = single_host_header(&head)?;
        }
        None => return Err(ParseError::Url),
    }

    // Implements the body length algorithm for requests:
    // http://httpwg.github.io/specs/rfc7230.html#message.body.length
    //
    // 1. A valid `Transfer-Encoding` header with `chunked` as the last
    //    encoding makes the request chunked.
    // 2. Otherwise a valid `Content-Length` header gives the length.
    // 3. With neither, the request has an empty body.
    let mut has_content_length = false;
    let mut chunked = false;
    let mut fixed_length = 0u64;
    let mut close = version == 0;
    for h in raw.headers.iter() {
        if h.name.eq_ignore_ascii_case("Transfer-Encoding") {
            if let Some(enc) = h.value.split(|&ch| ch == b',').last() {
                if headers::is_chunked(enc) {
                    if has_content_length {
                        // override but don't allow keep-alive
                        close = true;
                    }
                    chunked = true;
                }
            }
        } else if h.name.eq_ignore_ascii_case("Content-Length") {
            if has_content_length {
                return Err(ParseError::Length);
            }
            has_content_length = true;
            if !chunked {
                let s = ::std::str::from_utf8(h.value)
                    .map_err(|_| ParseError::Length)?;
                fixed_length = s.trim().parse()
                    .map_err(|_| ParseError::Length)?;
            } else {
                // transfer-encoding has preference and don't allow
                // keep-alive
                close = true;
            }
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

    let body = if chunked {
        BodyProgress::Chunked(chunked::State::new())
    } else {
        if fixed_length as usize > max_content_length {
            return Err(ParseError::TooLarge);
        }
        BodyProgress::Fixed(fixed_length)
    };
    Ok((head, body, close))
}

// Multiple `Host` headers are not allowed, and the origin form requires
// one.
fn single_host_header(head: &RequestHead) -> Result<String, ParseError> {
    let mut hosts = head.headers.iter()
        .filter(|&&(ref name, _)| *name == "Host")
        .map(|&(_, ref value)| value.as_str());
    match (hosts.next(), hosts.next()) {
        (Some(host), None) => Ok(host.to_string()),
        _ => Err(ParseError::Url),
    }
}

#[cfg(test)]
mod test {
    use netbuf::Buf;

    use config::Config;
    use enums::{Method, Status};
    use super::RequestParser;

    fn parser() -> RequestParser {
        RequestParser::new(&Config::new())
    }

    fn feed(input: &[u8]) -> RequestParser {
        let mut p = parser();
        let mut data = Buf::new();
        data.extend(input);
        p.parse_headers_from_stream(&mut data, false);
        if p.headers_complete() {
            p.parse_payload_from_stream(&mut data, false);
        }
        p
    }

    const SIMPLE: &'static [u8] =
        b"GET /hello?name=world HTTP/1.1\r\n\
          Host: example.com\r\n\
          Accept: */*\r\n\r\n";

    #[test]
    fn simple_request() {
        let mut p = feed(SIMPLE);
        assert!(p.headers_complete());
        assert!(p.payload_complete());
        assert!(!p.error());
        assert!(!p.should_close_after_payload());
        let head = p.take_head();
        assert_eq!(head.method, Method::Get);
        assert_eq!(head.path, "/hello");
        assert_eq!(head.query, "name=world");
        assert_eq!(head.host, "example.com");
        assert!(!head.is_proxy);
        assert_eq!(head.headers.len(), 2);
        assert_eq!(head.header("accept").unwrap().as_str(), "*/*");
    }

    #[test]
    fn split_invariance() {
        // Feeding byte by byte must produce exactly the same result as one
        // shot.
        for split in 1..SIMPLE.len() {
            let mut p = parser();
            let mut data = Buf::new();
            data.extend(&SIMPLE[..split]);
            p.parse_headers_from_stream(&mut data, false);
            data.extend(&SIMPLE[split..]);
            p.parse_headers_from_stream(&mut data, false);
            assert!(p.headers_complete(), "split at {}", split);
            p.parse_payload_from_stream(&mut data, false);
            assert!(p.payload_complete());
            assert_eq!(p.head().path, "/hello");
            assert_eq!(p.head().host, "example.com");
        }
    }

    #[test]
    fn fixed_payload() {
        let mut p = feed(b"POST /in HTTP/1.1\r\n\
                           Host: example.com\r\n\
                           Content-Length: 5\r\n\r\nhello");
        assert!(p.payload_complete());
        assert_eq!(&p.take_payload()[..], b"hello");
    }

    #[test]
    fn chunked_payload() {
        let mut p = feed(b"POST /in HTTP/1.1\r\n\
                           Host: example.com\r\n\
                           Transfer-Encoding: chunked\r\n\r\n\
                           5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n");
        assert!(p.payload_complete());
        assert_eq!(&p.take_payload()[..], b"hello world");
    }

    #[test]
    fn pipelined_requests() {
        let mut p = parser();
        let mut data = Buf::new();
        data.extend(SIMPLE);
        data.extend(b"GET /second HTTP/1.1\r\nHost: example.com\r\n\r\n");
        p.parse_headers_from_stream(&mut data, false);
        p.parse_payload_from_stream(&mut data, false);
        assert!(p.payload_complete());
        assert_eq!(p.head().path, "/hello");
        p.next_message();
        p.parse_headers_from_stream(&mut data, false);
        p.parse_payload_from_stream(&mut data, false);
        assert!(p.payload_complete());
        assert_eq!(p.head().path, "/second");
        assert_eq!(data.len(), 0);
    }

    #[test]
    fn proxy_request() {
        let p = feed(b"GET http://bob@example.com:8080/x?q=1 HTTP/1.1\r\n\r\n");
        assert!(p.headers_complete());
        let head = p.head();
        assert!(head.is_proxy);
        assert!(!head.is_ssl);
        assert_eq!(head.host, "example.com");
        assert_eq!(head.port, 8080);
        assert_eq!(head.userinfo, "bob");
        assert_eq!(head.path, "/x");
        assert_eq!(head.query, "q=1");
    }

    #[test]
    fn proxy_default_port() {
        let p = feed(b"GET https://example.com/ HTTP/1.1\r\n\r\n");
        assert!(p.head().is_ssl);
        assert_eq!(p.head().port, 443);
    }

    #[test]
    fn connect_request() {
        let p = feed(b"CONNECT example.com:443 HTTP/1.1\r\n\
                       Host: example.com:443\r\n\r\n");
        assert!(p.headers_complete());
        assert_eq!(p.head().method, Method::Connect);
        assert_eq!(p.head().host, "example.com");
        assert_eq!(p.head().port, 443);
    }

    #[test]
    fn missing_host_is_an_error() {
        let p = feed(b"GET / HTTP/1.1\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::BadRequest);
    }

    #[test]
    fn duplicate_host_is_an_error() {
        let p = feed(b"GET / HTTP/1.1\r\n\
                       Host: a.example\r\n\
                       Host: b.example\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::BadRequest);
    }

    #[test]
    fn bad_version() {
        let p = feed(b"GET / HTTP/6.6\r\nHost: x\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.http_status_from_error(),
                   Status::VersionNotSupported);
    }

    #[test]
    fn oversized_method() {
        let p = feed(b"ABCDEFGHIJKL / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::MethodNotAllowed);
    }

    #[test]
    fn bad_content_length() {
        let p = feed(b"POST / HTTP/1.1\r\nHost: x\r\n\
                       Content-Length: banana\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::LengthRequired);
    }

    #[test]
    fn duplicate_content_length() {
        let p = feed(b"POST / HTTP/1.1\r\nHost: x\r\n\
                       Content-Length: 5\r\nContent-Length: 5\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::LengthRequired);
    }

    #[test]
    fn oversized_declared_payload() {
        let mut config = Config::new();
        config.max_request_content_length(16);
        let mut p = RequestParser::new(&config.done());
        let mut data = Buf::new();
        data.extend(b"POST / HTTP/1.1\r\nHost: x\r\n\
                      Content-Length: 17\r\n\r\n");
        p.parse_headers_from_stream(&mut data, false);
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::PayloadTooLarge);
    }

    #[test]
    fn oversized_chunked_payload() {
        let mut config = Config::new();
        config.max_request_content_length(4);
        let mut p = RequestParser::new(&config.done());
        let mut data = Buf::new();
        data.extend(b"POST / HTTP/1.1\r\nHost: x\r\n\
                      Transfer-Encoding: chunked\r\n\r\n\
                      10\r\naaaaaaaaaaaaaaaa\r\n");
        p.parse_headers_from_stream(&mut data, false);
        assert!(p.headers_complete());
        p.parse_payload_from_stream(&mut data, false);
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::PayloadTooLarge);
    }

    #[test]
    fn http10_closes_by_default() {
        let p = feed(b"GET / HTTP/1.0\r\nHost: x\r\n\r\n");
        assert!(p.should_close_after_payload());

        let p = feed(b"GET / HTTP/1.0\r\nHost: x\r\n\
                       Connection: keep-alive\r\n\r\n");
        assert!(!p.should_close_after_payload());
    }

    #[test]
    fn connection_close() {
        let p = feed(b"GET / HTTP/1.1\r\nHost: x\r\n\
                       Connection: close\r\n\r\n");
        assert!(p.should_close_after_payload());
    }

    #[test]
    fn eof_mid_message() {
        let mut p = parser();
        let mut data = Buf::new();
        data.extend(b"GET / HTTP/1.1\r\nHo");
        p.parse_headers_from_stream(&mut data, true);
        assert!(p.error());
        assert_eq!(p.http_status_from_error(), Status::BadRequest);
    }

    #[test]
    fn clean_eof_between_messages() {
        let mut p = parser();
        let mut data = Buf::new();
        p.parse_headers_from_stream(&mut data, true);
        assert!(!p.error());
        assert!(!p.headers_complete());
    }
}
