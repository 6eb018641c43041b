//! Scanning of raw header values during message parsing.
//!
//! These helpers operate on the untyped byte values that `httparse` hands
//! out, before anything has been copied into a header block. Comparison is
//! case-insensitive and surrounding whitespace is ignored.

fn is_ws(ch: u8) -> bool {
    matches!(ch, b'\r' | b'\n' | b' ' | b'\t')
}

fn trim(mut val: &[u8]) -> &[u8] {
    while val.first().map_or(false, |&ch| is_ws(ch)) {
        val = &val[1..];
    }
    while val.last().map_or(false, |&ch| is_ws(ch)) {
        val = &val[..val.len() - 1];
    }
    val
}

fn token_eq(val: &[u8], token: &str) -> bool {
    let val = trim(val);
    val.len() == token.len()
        && val.iter().zip(token.as_bytes())
              .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// Whether a `Connection`-style header value equals `close`.
pub fn is_close(val: &[u8]) -> bool {
    token_eq(val, "close")
}

/// Whether a `Transfer-Encoding` token equals `chunked`.
pub fn is_chunked(val: &[u8]) -> bool {
    token_eq(val, "chunked")
}

/// Whether a comma-separated header value contains the given token.
pub fn contains_token(val: &[u8], token: &str) -> bool {
    val.split(|&ch| ch == b',').any(|item| token_eq(item, token))
}
