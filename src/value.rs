//! A single HTTP field value with typed views.
//!
//! HTTP headers are semi-structured: a field like `Sec-WebSocket-Version:
//! 13` is legitimately both an integer and a token string. A `Value`
//! therefore keeps every applicable representation at once, so consumers can
//! read whichever view they need without re-parsing.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use httpdate::{parse_http_date, fmt_http_date};


const STR_VALID: u8 = 0b0000_0001;
const INT_VALID: u8 = 0b0000_0010;
const DBL_VALID: u8 = 0b0000_0100;
const DT_VALID: u8  = 0b0000_1000;

// https://www.rfc-editor.org/rfc/rfc2616#section-2.2
fn is_ctl_or_sep(ch: u8) -> bool {
    ch <= 0x20 || ch == 0x7F
        || ch == b'\\' || ch == b'"'
        || ch == b'(' || ch == b')' || ch == b'<' || ch == b'>'
        || ch == b'@' || ch == b',' || ch == b';' || ch == b':'
        || ch == b'/' || ch == b'[' || ch == b']' || ch == b'?'
        || ch == b'=' || ch == b'{' || ch == b'}'
}

fn is_ctl_or_unquoted_sep(ch: u8) -> bool {
    ch <= 0x20 || ch == 0x7F || ch == b',' || ch == b';'
}

fn is_ctl_or_ws(ch: u8) -> bool {
    ch <= 0x20 || ch == 0x7F
}

/// A parsed HTTP field value.
///
/// All views are kept synchronized: assigning or parsing any representation
/// updates every other one that applies, so `Value::from("2592000")` is a
/// string, an integer and a double at the same time.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    string: String,
    integer: i64,
    double: f64,
    datetime: SystemTime,
    valid: u8,
}

impl Default for Value {
    fn default() -> Value {
        Value {
            string: String::new(),
            integer: 0,
            double: 0.,
            datetime: UNIX_EPOCH,
            valid: 0,
        }
    }
}

impl Value {
    /// Creates a null value.
    pub fn new() -> Value {
        Value::default()
    }

    /// Resets this value to null.
    pub fn clear(&mut self) {
        self.string.clear();
        self.integer = 0;
        self.double = 0.;
        self.datetime = UNIX_EPOCH;
        self.valid = 0;
    }

    pub fn is_null(&self) -> bool {
        self.valid & STR_VALID == 0
    }

    /// The string view. Empty for null values.
    pub fn as_str(&self) -> &str {
        &self.string
    }

    pub fn is_integer(&self) -> bool {
        self.valid & INT_VALID != 0
    }

    pub fn as_integer(&self) -> i64 {
        self.integer
    }

    pub fn is_double(&self) -> bool {
        self.valid & DBL_VALID != 0
    }

    pub fn as_double(&self) -> f64 {
        self.double
    }

    pub fn is_datetime(&self) -> bool {
        self.valid & DT_VALID != 0
    }

    pub fn as_datetime(&self) -> SystemTime {
        self.datetime
    }

    /// Sets this value from a raw string and updates all other views.
    pub fn set_string<S: Into<String>>(&mut self, s: S) {
        self.string = s.into();
        self.valid = STR_VALID;
        self.update_variants();
    }

    pub fn set_integer(&mut self, num: i64) {
        self.integer = num;
        self.valid = INT_VALID;
        self.update_variants();
    }

    pub fn set_double(&mut self, num: f64) {
        self.double = num;
        self.valid = DBL_VALID;
        self.update_variants();
    }

    pub fn set_datetime(&mut self, tm: SystemTime) {
        self.datetime = tm;
        self.valid = DT_VALID;
        self.update_variants();
    }

    // Makes all views that can be derived from the authoritative one valid.
    fn update_variants(&mut self) {
        if self.valid & INT_VALID != 0 {
            // Initialize others from the integer.
            self.string = self.integer.to_string();
            self.valid = STR_VALID | INT_VALID;

            self.double = self.integer as f64;
            self.valid |= DBL_VALID;

            self.datetime = UNIX_EPOCH;
        }
        else if self.valid & DBL_VALID != 0 {
            // Initialize others from the double.
            self.string = fmt_double(self.double);
            self.valid = STR_VALID | DBL_VALID;

            if self.double == self.double.trunc()
                && self.double >= -9.223372036854776e18
                && self.double < 9.223372036854776e18
            {
                self.integer = self.double as i64;
                self.valid |= INT_VALID;
            }

            self.datetime = UNIX_EPOCH;
        }
        else if self.valid & DT_VALID != 0 {
            // Initialize others from the date/time.
            self.string = fmt_http_date(self.datetime);
            self.valid = STR_VALID | DT_VALID;

            self.integer = 0;
            self.double = 0.;
        }
        else if self.valid & STR_VALID != 0 {
            // Initialize others from the string.
            self.valid = STR_VALID;
            let trimmed = self.string.trim_matches(|c| c == ' ' || c == '\t');
            if !trimmed.is_empty() {
                if let Ok(num) = trimmed.parse::<i64>() {
                    self.integer = num;
                    self.valid |= INT_VALID;
                }

                if let Ok(num) = trimmed.parse::<f64>() {
                    if num.is_finite() {
                        self.double = num;
                        self.valid |= DBL_VALID;
                    }
                }

                if let Ok(tm) = parse_http_date(trimmed) {
                    self.datetime = tm;
                    self.valid |= DT_VALID;
                }
            }
        }
    }

    /// Tries parsing a quoted string. Upon success, the number of characters
    /// that have been accepted is returned. Otherwise zero is returned, and
    /// the contents of this value are indeterminate.
    pub fn parse_quoted_string_partial(&mut self, s: &str) -> usize {
        self.clear();

        let bytes = s.as_bytes();
        if bytes.len() < 2 || bytes[0] != b'"' {
            return 0;
        }

        let mut unescaped = Vec::new();
        let mut cur = 1;
        let mut escaped = false;
        while escaped || bytes[cur] != b'"' {
            if escaped || bytes[cur] != b'\\' {
                unescaped.push(bytes[cur]);
                escaped = false;
            } else {
                escaped = true;
            }

            cur += 1;

            // Fail if there is no closing quote.
            if cur == bytes.len() {
                return 0;
            }
        }

        // Only ASCII bytes have been stripped, so this cannot fail for an
        // input that was valid UTF-8 in the first place.
        self.string = String::from_utf8_lossy(&unescaped).into_owned();
        self.valid = STR_VALID;
        self.update_variants();
        cur + 1
    }

    /// Tries parsing an HTTP date/time (RFC 1123, RFC 850 or asctime form)
    /// from the beginning of `s`. Returns the number of characters accepted,
    /// or zero on mismatch.
    pub fn parse_datetime_partial(&mut self, s: &str) -> usize {
        self.clear();

        // The formats have fixed or near-fixed lengths, so probing prefixes
        // is enough: 29 for RFC 1123, 30 to 33 for RFC 850 (the weekday name
        // varies), 24 for asctime.
        let lengths = [29usize, 30, 31, 32, 33, 24];
        for &len in lengths.iter() {
            if s.len() >= len && s.is_char_boundary(len) {
                if let Ok(tm) = parse_http_date(&s[..len]) {
                    self.datetime = tm;
                    self.string = s[..len].to_string();
                    self.valid = STR_VALID | DT_VALID;
                    return len;
                }
            }
        }
        0
    }

    /// Tries parsing an HTTP token and stores it as a string. Returns the
    /// number of characters accepted, or zero on mismatch.
    pub fn parse_token_partial(&mut self, s: &str) -> usize {
        self.clear();

        let len = s.bytes().position(|b| is_ctl_or_sep(b)).unwrap_or(s.len());
        if len == 0 {
            return 0;
        }

        self.string.push_str(&s[..len]);
        self.valid = STR_VALID;
        self.update_variants();
        len
    }

    /// Tries parsing an HTTP unquoted string. This is a more permissive
    /// variant of a token: all characters other than whitespace, control
    /// characters, `,` and `;` are accepted. Returns the number of characters
    /// accepted, or zero on mismatch.
    pub fn parse_unquoted_partial(&mut self, s: &str) -> usize {
        self.clear();

        let len = s.bytes().position(|b| is_ctl_or_unquoted_sep(b))
                           .unwrap_or(s.len());
        if len == 0 {
            return 0;
        }

        self.string.push_str(&s[..len]);
        self.valid = STR_VALID;
        self.update_variants();
        len
    }

    /// Tries parsing an HTTP value, possibly from an HTTP header. The string
    /// is matched against these rules, in this order:
    ///
    /// * a quoted string, enclosed in a pair of double quotes
    /// * an HTTP date/time, starting with a weekday
    /// * an HTTP unquoted string
    ///
    /// Returns the number of characters consumed, or zero on mismatch.
    pub fn parse(&mut self, s: &str) -> usize {
        if s.is_empty() {
            return 0;
        }

        if s.as_bytes()[0] == b'"' {
            let len = self.parse_quoted_string_partial(s);
            if len != 0 {
                return len;
            }
        }

        let len = self.parse_datetime_partial(s);
        if len != 0 {
            return len;
        }

        self.parse_unquoted_partial(s)
    }
}

fn fmt_double(num: f64) -> String {
    // `{}` on f64 prints the shortest string that round-trips, which matches
    // what we want for a header value.
    format!("{}", num)
}

impl<'a> From<&'a str> for Value {
    fn from(s: &'a str) -> Value {
        let mut value = Value::new();
        value.set_string(s);
        value
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        let mut value = Value::new();
        value.set_string(s);
        value
    }
}

impl From<i64> for Value {
    fn from(num: i64) -> Value {
        let mut value = Value::new();
        value.set_integer(num);
        value
    }
}

impl From<f64> for Value {
    fn from(num: f64) -> Value {
        let mut value = Value::new();
        value.set_double(num);
        value
    }
}

impl From<SystemTime> for Value {
    fn from(tm: SystemTime) -> Value {
        let mut value = Value::new();
        value.set_datetime(tm);
        value
    }
}

impl fmt::Display for Value {
    /// Converts this value to its string form, suitable for immediate use
    /// in an HTTP header. Emission uses the most precise view. Note that an
    /// HTTP date/time, which contains a comma itself, is not enclosed in
    /// double quotes.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.valid & INT_VALID != 0 {
            return write!(f, "{}", self.integer);
        }
        if self.valid & DBL_VALID != 0 {
            return write!(f, "{}", fmt_double(self.double));
        }
        if self.valid & DT_VALID != 0 {
            return write!(f, "{}", fmt_http_date(self.datetime));
        }

        // Check whether the string has to be quoted.
        let bytes = self.string.as_bytes();
        if !bytes.iter().any(|&b| is_ctl_or_sep(b)) {
            return f.write_str(&self.string);
        }

        f.write_str("\"")?;
        let mut pos = 0;
        while pos < bytes.len() {
            let b = bytes[pos];
            if b == b'\\' || b == b'"' {
                // Escape it.
                f.write_str(if b == b'\\' { "\\\\" } else { "\\\"" })?;
                pos += 1;
            } else if is_ctl_or_ws(b) {
                // Replace this sequence of control and space characters with
                // a single space.
                f.write_str(" ")?;
                while pos < bytes.len() && is_ctl_or_ws(bytes[pos]) {
                    pos += 1;
                }
            } else {
                // Write this sequence verbatim.
                let start = pos;
                while pos < bytes.len() && !is_ctl_or_sep(bytes[pos]) {
                    pos += 1;
                }
                f.write_str(&self.string[start..pos])?;
            }
        }
        f.write_str("\"")
    }
}
