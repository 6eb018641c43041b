//! Permissive splitting of the request-target.

/// The four request-target forms of RFC 7230.
#[derive(Debug, PartialEq)]
pub enum RequestTarget<'a> {
    /// Usual form of `/hello?name=world`
    Origin(&'a str),
    /// Full url: `http://example.com:8080/hello`
    ///
    /// Note in this case (unlike in Origin) path may not start with a slash
    Absolute { ssl: bool, authority: &'a str, path: &'a str },
    /// Only hostname `example.com:8080`, only useful for `CONNECT` method
    Authority(&'a str),
    /// Asterisk `*`
    Asterisk,
}

/// An authority split into its parts. The port stays `None` when absent,
/// so callers can apply a scheme default.
#[derive(Debug, PartialEq)]
pub struct Authority<'a> {
    pub userinfo: Option<&'a str>,
    pub host: &'a str,
    pub port: Option<u16>,
}

// Authority can't contain `/` or `?` or `#`. The rules for what it *can*
// contain are complex, so anything else is accepted.
fn authority_end_char(&ch: &u8) -> bool {
    ch == b'/' || ch == b'?' || ch == b'#'
}

impl<'a> RequestTarget<'a> {
    pub fn parse(s: &'a str) -> Option<RequestTarget<'a>> {
        use self::RequestTarget::*;

        if s.len() == 0 {
            return None;
        }
        if s.starts_with("/") {
            return Some(Origin(s));
        }
        if s.starts_with("http://") {
            let auth_end = s[7..].as_bytes().iter()
                .position(authority_end_char)
                .unwrap_or(s.len()-7);
            return Some(Absolute {
                ssl: false,
                authority: &s[7..7+auth_end],
                path: &s[7+auth_end..],
            });
        }
        if s.starts_with("https://") {
            let auth_end = s[8..].as_bytes().iter()
                .position(authority_end_char)
                .unwrap_or(s.len()-8);
            return Some(Absolute {
                ssl: true,
                authority: &s[8..8+auth_end],
                path: &s[8+auth_end..],
            });
        }
        if s == "*" {
            return Some(Asterisk);
        }
        if s.contains("://") {
            // some scheme we don't speak
            return None;
        }
        if s.as_bytes().iter().position(authority_end_char).is_none() {
            return Some(Authority(s));
        }

        return None;
    }
}

impl<'a> Authority<'a> {
    /// Splits `user:pass@host:port` on the `@` and the last `:`.
    pub fn split(s: &'a str) -> Option<Authority<'a>> {
        let (userinfo, hostport) = match s.rfind('@') {
            Some(at) => (Some(&s[..at]), &s[at+1..]),
            None => (None, s),
        };
        if hostport.is_empty() {
            return None;
        }
        // An IPv6 literal like `[::1]:80` contains colons inside the
        // brackets, so only a colon after the closing bracket is a port.
        let colon = if hostport.starts_with('[') {
            match hostport.find(']') {
                Some(end) => hostport[end..].find(':').map(|i| end + i),
                None => return None,
            }
        } else {
            hostport.rfind(':')
        };
        match colon {
            Some(idx) => {
                let port = match hostport[idx+1..].parse::<u16>() {
                    Ok(port) => port,
                    Err(_) => return None,
                };
                Some(Authority {
                    userinfo: userinfo,
                    host: &hostport[..idx],
                    port: Some(port),
                })
            }
            None => Some(Authority {
                userinfo: userinfo,
                host: hostport,
                port: None,
            }),
        }
    }
}

/// Splits a path-and-query string at the first `?`.
pub fn split_path_query(s: &str) -> (&str, &str) {
    match s.find('?') {
        Some(idx) => (&s[..idx], &s[idx+1..]),
        None => (s, ""),
    }
}
