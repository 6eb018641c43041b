//! Response header block.

use std::io::Write;

use netbuf::Buf;

use enums::{Status, reason_phrase};
use field_name::FieldName;
use value::Value;


/// The head of an HTTP response: status line plus the ordered header list.
///
/// `status` is zero until assigned; the wire allows any code a peer cares
/// to send, so this is a plain number rather than the `Status` enum. An
/// empty `reason` is replaced with the default phrase at emission time.
#[derive(Debug, Default)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(FieldName, Value)>,
}

impl ResponseHead {
    pub fn new() -> ResponseHead {
        ResponseHead::default()
    }

    pub fn with_status(status: Status) -> ResponseHead {
        ResponseHead {
            status: status.code(),
            reason: String::new(),
            headers: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.status = 0;
        self.reason.clear();
        self.headers.clear();
    }

    /// The first header with the given name, if any.
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.iter()
            .find(|&&(ref n, _)| *n == name)
            .map(|&(_, ref v)| v)
    }

    /// Encodes the head in wire format, terminated by an empty line.
    /// Headers with an empty name or an empty value are skipped.
    pub fn encode(&self, buf: &mut Buf) {
        if self.reason.is_empty() {
            write!(buf, "HTTP/1.1 {} {}", self.status,
                   reason_phrase(self.status)).unwrap();
        } else {
            write!(buf, "HTTP/1.1 {} {}", self.status, self.reason).unwrap();
        }

        for &(ref name, ref value) in &self.headers {
            if !name.is_empty() && !value.as_str().is_empty() {
                write!(buf, "\r\n{}: {}", name, value.as_str()).unwrap();
            }
        }

        write!(buf, "\r\n\r\n").unwrap();
    }
}
