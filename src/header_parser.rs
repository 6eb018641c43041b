//! Iteration over structured HTTP header values.
//!
//! Many headers (`Connection`, `Cache-Control`, `Set-Cookie`,
//! `Sec-WebSocket-Extensions`, `Alt-Svc`) share one shape: a `, `-separated
//! list of elements, where each element is a `;`-separated list of
//! attributes, and each attribute is `name` or `name=value`. This cursor
//! walks that shape without allocating a tree.

use value::Value;


const FRESH: usize = ::std::usize::MAX;
const ERROR_HPOS: usize = ::std::usize::MAX - 1;

/// A cursor over one header value string.
///
/// `next_attribute` advances within the current element and stops at an
/// element boundary; `next_element` advances past any remaining attributes
/// of the current element. A syntax error freezes the cursor: every
/// subsequent call returns `false`.
#[derive(Debug, Default)]
pub struct HeaderParser {
    hstr: String,
    hpos: usize,
    name: String,
    value: Value,
}

impl HeaderParser {
    pub fn new() -> HeaderParser {
        HeaderParser {
            hstr: String::new(),
            hpos: 0,
            name: String::new(),
            value: Value::new(),
        }
    }

    pub fn clear(&mut self) {
        self.hstr.clear();
        self.hpos = 0;
        self.name.clear();
        self.value.clear();
    }

    /// Starts parsing a new header value.
    pub fn reload<S: Into<String>>(&mut self, hstr: S) {
        self.hstr = hstr.into();
        self.hpos = FRESH;
        self.name.clear();
        self.value.clear();
    }

    /// Whether the cursor is frozen on a syntax error.
    pub fn error(&self) -> bool {
        self.hpos == ERROR_HPOS
    }

    /// The name of the current attribute.
    pub fn current_name(&self) -> &str {
        &self.name
    }

    /// The value of the current attribute. Null when the attribute had no
    /// `=value` part.
    pub fn current_value(&self) -> &Value {
        &self.value
    }

    // Consumes the separator at `hpos` and the attribute after it. Returns
    // the byte value of the terminating separator, or None at the end of
    // input or on error.
    fn next_attribute_from_separator(&mut self) -> Option<u8> {
        // Skip the current separator. A fresh cursor holds `FRESH`, which
        // wraps around to the first byte.
        self.hpos = self.hpos.wrapping_add(1);
        debug_assert!(self.hpos <= self.hstr.len());
        let bytes = self.hstr.as_bytes();
        let mut pos = self.hpos;

        // Skip leading whitespace. This function shall not move across
        // element boundaries.
        while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
            pos += 1;
        }

        if pos == bytes.len() || bytes[pos] == b';' || bytes[pos] == b',' {
            self.hpos = pos;
            return None;
        }

        // Parse the name of an attribute, and initialize its value to null.
        let tlen = self.value.parse_token_partial(&self.hstr[pos..]);
        if tlen == 0 {
            debug!("invalid attribute name at `{}`", &self.hstr[pos..]);
            self.hpos = ERROR_HPOS;
            return None;
        }

        pos += tlen;
        self.name.clear();
        self.name.push_str(self.value.as_str());
        self.value.clear();

        // If an equals sign is encountered, then there will be a value, so
        // parse it.
        let bytes = self.hstr.as_bytes();
        while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
            pos += 1;
        }

        if pos < bytes.len() && bytes[pos] == b'=' {
            pos += 1;

            while pos < bytes.len()
                && (bytes[pos] == b' ' || bytes[pos] == b'\t')
            {
                pos += 1;
            }

            let tlen = self.value.parse(&self.hstr[pos..]);
            pos += tlen;

            // Ensure the value is not null in this case, so it's
            // distinguishable from not having a value.
            if tlen == 0 {
                self.value.set_string("");
            }
        }

        // Skip trailing whitespace.
        let bytes = self.hstr.as_bytes();
        while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
            pos += 1;
        }

        // The attribute shall have been terminated by a separator.
        if pos != bytes.len() && bytes[pos] != b';' && bytes[pos] != b',' {
            debug!("invalid character encountered at `{}`", &self.hstr[pos..]);
            self.hpos = ERROR_HPOS;
            return None;
        }

        // Accept this attribute and return the terminating separator.
        self.hpos = pos;
        if pos == bytes.len() {
            Some(0)
        } else {
            Some(bytes[pos])
        }
    }

    /// Advances to the next attribute of the current element. Returns
    /// `false` at an element boundary, at the end of input, or on error.
    pub fn next_attribute(&mut self) -> bool {
        // The first call shall retrieve the first attribute.
        if self.hpos == FRESH {
            return self.next_attribute_from_separator().is_some();
        }

        if self.hpos >= self.hstr.len() {
            // If `hpos` equals the string length then the end of the input
            // has been reached; otherwise it indicates an error, so don't
            // touch it.
            return false;
        }

        match self.hstr.as_bytes()[self.hpos] {
            b',' => {
                // Stop at this element separator.
                false
            }
            b';' => {
                // Move past this attribute separator.
                self.next_attribute_from_separator().is_some()
            }
            _ => {
                self.hpos = ERROR_HPOS;
                false
            }
        }
    }

    /// Skips any remaining attributes of the current element and advances
    /// to the first attribute of the next one. Returns `false` at the end
    /// of input or on error.
    pub fn next_element(&mut self) -> bool {
        // The first call shall retrieve the first attribute.
        if self.hpos == FRESH {
            return self.next_attribute_from_separator().is_some();
        }

        loop {
            if self.hpos >= self.hstr.len() {
                return false;
            }

            match self.hstr.as_bytes()[self.hpos] {
                b',' => {
                    // Move past this element separator.
                    return self.next_attribute_from_separator().is_some();
                }
                b';' => {
                    // Move past this attribute separator.
                    self.next_attribute_from_separator();
                    continue;
                }
                _ => {
                    self.hpos = ERROR_HPOS;
                    return false;
                }
            }
        }
    }
}
