//! The error sentinel stored by the message parsers.

use httparse;

use enums::Status;

quick_error! {
    /// What went wrong while parsing an HTTP message.
    ///
    /// A parser that hits one of these freezes: further input is discarded
    /// and the owning session reports the derived HTTP status exactly once.
    #[derive(Debug)]
    pub enum ParseError {
        /// Only HTTP/1.0 and HTTP/1.1 are spoken here.
        Version {
            description("unsupported HTTP version")
        }
        /// The method token is not something we are willing to store.
        Method {
            description("invalid method")
        }
        /// The request-target (or the `Host` header set) is unusable.
        Url {
            description("invalid URL")
        }
        /// `Content-Length` is missing, duplicated or malformed.
        Length {
            description("invalid content length")
        }
        /// The payload exceeds the configured maximum.
        TooLarge {
            description("payload too large")
        }
        /// The header block exceeds the fixed size limit.
        HeadersTooLong {
            description("header block too long")
        }
        /// The stream ended in the middle of a message.
        Incomplete {
            description("unexpected end of stream")
        }
        /// Malformed chunked encoding.
        Chunk {
            description("invalid chunked encoding")
        }
        /// Any other syntax error reported by the header parser.
        Syntax(err: httparse::Error) {
            description("malformed HTTP message")
            display("malformed HTTP message: {:?}", err)
        }
    }
}

impl ParseError {
    /// The HTTP status a server reports for this error.
    pub fn to_status(&self) -> Status {
        match *self {
            ParseError::Version => Status::VersionNotSupported,
            ParseError::Method => Status::MethodNotAllowed,
            ParseError::Length => Status::LengthRequired,
            ParseError::TooLarge => Status::PayloadTooLarge,
            ParseError::Url
            | ParseError::HeadersTooLong
            | ParseError::Incomplete
            | ParseError::Chunk
            | ParseError::Syntax(_) => Status::BadRequest,
        }
    }
}

impl From<httparse::Error> for ParseError {
    fn from(err: httparse::Error) -> ParseError {
        match err {
            httparse::Error::Version => ParseError::Version,
            err => ParseError::Syntax(err),
        }
    }
}

#[cfg(test)]
mod test {
    use httparse;

    use enums::Status;
    use super::ParseError;

    #[test]
    fn status_mapping() {
        assert_eq!(ParseError::Version.to_status(),
                   Status::VersionNotSupported);
        assert_eq!(ParseError::Method.to_status(), Status::MethodNotAllowed);
        assert_eq!(ParseError::Length.to_status(), Status::LengthRequired);
        assert_eq!(ParseError::TooLarge.to_status(), Status::PayloadTooLarge);
        assert_eq!(ParseError::Url.to_status(), Status::BadRequest);
        assert_eq!(ParseError::from(httparse::Error::Token).to_status(),
                   Status::BadRequest);
        assert_eq!(ParseError::from(httparse::Error::Version).to_status(),
                   Status::VersionNotSupported);
    }
}
