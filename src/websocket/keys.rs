//! `Sec-WebSocket-Key` and `Sec-WebSocket-Accept` header values.

use std::fmt;
use std::str::from_utf8;

use rand::{Rng, thread_rng};
use sha1::Sha1;


/// WebSocket GUID constant (provided by spec)
pub const GUID: &'static str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The `Sec-WebSocket-Key` header value: a random 16-byte nonce, shown in
/// base64. A client keeps the key it sent so the accept token in the
/// server's response can be validated against it.
pub struct Key([u8; 16]);

/// The `Sec-WebSocket-Accept` header value.
pub struct Accept([u8; 20]);

const CHARS: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                               abcdefghijklmnopqrstuvwxyz\
                               0123456789+/";

// Standard base64 with padding; the fixed input sizes here always pad.
fn base64(input: &[u8], output: &mut [u8]) {
    let mut o = 0;
    for chunk in input.chunks(3) {
        let n = ((chunk[0] as usize) << 16)
            | ((*chunk.get(1).unwrap_or(&0) as usize) << 8)
            | (*chunk.get(2).unwrap_or(&0) as usize);
        output[o] = CHARS[(n >> 18) & 63];
        output[o+1] = CHARS[(n >> 12) & 63];
        output[o+2] = if chunk.len() > 1 { CHARS[(n >> 6) & 63] }
                      else { b'=' };
        output[o+3] = if chunk.len() > 2 { CHARS[n & 63] } else { b'=' };
        o += 4;
    }
}

impl Key {
    /// Create a new (random) key, eligible to use for a client connection.
    pub fn new() -> Key {
        let mut key = [0u8; 16];
        thread_rng().fill_bytes(&mut key);
        Key(key)
    }
}

impl Accept {
    /// Create an Accept header value from a key received in a header.
    ///
    /// Note: key here is a key as passed in the header value
    /// (base64-encoded), which is not validated (the spec does not require
    /// that).
    pub fn from_key_bytes(key: &[u8]) -> Accept {
        let mut sha1 = Sha1::new();
        sha1.update(key);
        sha1.update(GUID.as_bytes());
        Accept(sha1.digest().bytes())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buf = [0u8; 24];
        base64(&self.0, &mut buf);
        f.write_str(from_utf8(&buf).unwrap())
    }
}

impl fmt::Display for Accept {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buf = [0u8; 28];
        base64(&self.0, &mut buf);
        f.write_str(from_utf8(&buf).unwrap())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "websocket::Key({})", self)
    }
}

impl fmt::Debug for Accept {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "websocket::Accept({})", self)
    }
}
