
/// This type is returned from the `on_request_headers` / `on_response_headers`
/// hook of an HTTP session and tells the session how to treat the payload of
/// the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    /// Parse a payload according to `Content-Length` / `Transfer-Encoding`.
    Normal,
    /// The message has no payload regardless of its headers. This is what a
    /// client returns for the response to a HEAD request, whose headers
    /// describe the body that a GET would have received.
    Empty,
    /// Commit to a protocol switch. The session stops HTTP parsing and
    /// forwards all remaining bytes verbatim to `on_upgraded_stream`. Used
    /// for CONNECT and for protocol upgrades handled outside the session.
    Connect,
}
