use flate2::DecompressError;

use websocket::status;

quick_error! {
    /// What a message hook or the inbound decompressor can fail with.
    ///
    /// The session turns one of these into a CLOSE frame with the status
    /// from `close_status` and then shuts the transport down.
    #[derive(Debug)]
    pub enum Error {
        /// An assembled message exceeds the configured maximum, before or
        /// after decompression.
        TooLarge {
            description("message length limit exceeded")
        }
        /// The peer sent compressed data the inflater rejects.
        Inflate(err: DecompressError) {
            description("invalid compressed data")
            display("invalid compressed data: {}", err)
            from()
        }
        /// Anything a user hook wants to fail with.
        Custom(err: Box<::std::error::Error + Send + Sync>) {
            description("custom error")
            display("custom error: {}", err)
        }
    }
}

impl Error {
    /// Create an error instance wrapping a custom error.
    pub fn custom<E: Into<Box<::std::error::Error + Send + Sync>>>(err: E)
        -> Error
    {
        Error::Custom(err.into())
    }

    /// The CLOSE status this error maps to.
    pub fn close_status(&self) -> u16 {
        match *self {
            Error::TooLarge => status::MESSAGE_TOO_LARGE,
            Error::Inflate(_) => status::PROTOCOL_ERROR,
            Error::Custom(_) => status::UNEXPECTED_ERROR,
        }
    }

    /// A static description usable as a CLOSE reason.
    pub fn close_reason(&self) -> &'static str {
        match *self {
            Error::TooLarge => "message length limit exceeded",
            Error::Inflate(_) => "invalid compressed data",
            Error::Custom(_) => "unexpected error",
        }
    }
}

#[test]
fn send_sync() {
    fn send_sync<T: Send + Sync>(_: T) {}
    send_sync(Error::TooLarge);
}
