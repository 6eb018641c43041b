//! Request header block.

use std::io::Write;

use netbuf::Buf;

use enums::Method;
use field_name::FieldName;
use value::Value;


/// The head of an HTTP request: the request line plus the ordered header
/// list.
///
/// Headers keep their arrival order and duplicates are allowed (except for
/// `Host`, which the parser enforces). `is_proxy` is set when the request
/// used the absolute URI form, in which case `is_ssl` and `port` describe
/// the scheme.
#[derive(Debug, Default)]
pub struct RequestHead {
    pub method: Method,
    pub is_proxy: bool,
    pub is_ssl: bool,
    /// Zero when no port was given anywhere.
    pub port: u16,
    pub host: String,
    pub userinfo: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(FieldName, Value)>,
}

impl RequestHead {
    pub fn new() -> RequestHead {
        RequestHead::default()
    }

    /// Clears all fields, keeping allocations where possible.
    pub fn clear(&mut self) {
        self.method = Method::Get;
        self.is_proxy = false;
        self.is_ssl = false;
        self.port = 0;
        self.host.clear();
        self.userinfo.clear();
        self.path.clear();
        self.query.clear();
        self.headers.clear();
    }

    /// The first header with the given name, if any.
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.iter()
            .find(|&&(ref n, _)| *n == name)
            .map(|&(_, ref v)| v)
    }

    /// Encodes the head in wire format, terminated by an empty line. The
    /// output is suitable for sending through a stream socket. Headers with
    /// an empty name or an empty value are skipped.
    pub fn encode(&self, buf: &mut Buf) {
        write!(buf, "{} ", self.method).unwrap();

        if self.is_proxy {
            // The URI shall be absolute.
            if self.is_ssl {
                write!(buf, "https://").unwrap();
            } else {
                write!(buf, "http://").unwrap();
            }

            if !self.userinfo.is_empty() {
                write!(buf, "{}@", self.userinfo).unwrap();
            }

            write!(buf, "{}", self.host).unwrap();
            if self.port != 0 {
                write!(buf, ":{}", self.port).unwrap();
            }
        }

        if !self.path.starts_with('/') {
            write!(buf, "/{}", self.path).unwrap();
        } else {
            write!(buf, "{}", self.path).unwrap();
        }

        if !self.query.is_empty() {
            write!(buf, "?{}", self.query).unwrap();
        }

        write!(buf, " HTTP/1.1").unwrap();

        for &(ref name, ref value) in &self.headers {
            if !name.is_empty() && !value.as_str().is_empty() {
                write!(buf, "\r\n{}: {}", name, value.as_str()).unwrap();
            }
        }

        write!(buf, "\r\n\r\n").unwrap();
    }
}
