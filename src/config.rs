//! Protocol configuration.

use std::sync::Arc;


/// Limits and tunables consumed by the parsers and sessions.
///
/// The framework reads these from its configuration file
/// (`network.http.*`); the protocol core only consumes the values.
#[derive(Debug, Clone)]
pub struct Config {
    max_request_content_length: usize,
    max_response_content_length: usize,
    max_websocket_message_length: usize,
    default_compression_level: u8,
}

impl Config {
    /// Create a config with defaults.
    pub fn new() -> Config {
        Config {
            max_request_content_length: 1 << 20,
            max_response_content_length: 1 << 20,
            max_websocket_message_length: 1 << 20,
            default_compression_level: 6,
        }
    }

    /// Maximum size of a buffered request payload.
    ///
    /// Default is 1 MiB. Requests whose payload exceeds this are rejected
    /// with `413 Payload Too Large`.
    pub fn max_request_content_length(&mut self, limit: usize) -> &mut Self {
        self.max_request_content_length = limit;
        self
    }

    /// Maximum size of a buffered response payload.
    ///
    /// Default is 1 MiB.
    pub fn max_response_content_length(&mut self, limit: usize) -> &mut Self {
        self.max_response_content_length = limit;
        self
    }

    /// Maximum size of an assembled WebSocket message, measured after
    /// decompression.
    ///
    /// Default is 1 MiB.
    pub fn max_websocket_message_length(&mut self, limit: usize) -> &mut Self {
        self.max_websocket_message_length = limit;
        self
    }

    /// Compression level for `permessage-deflate`, 0 to 9.
    ///
    /// Default is 6. Zero disables the PMCE offer entirely: no extension is
    /// requested by clients and none is accepted by servers.
    pub fn default_compression_level(&mut self, level: u8) -> &mut Self {
        assert!(level <= 9, "compression level must be within 0 ..= 9");
        self.default_compression_level = level;
        self
    }

    pub fn get_max_request_content_length(&self) -> usize {
        self.max_request_content_length
    }

    pub fn get_max_response_content_length(&self) -> usize {
        self.max_response_content_length
    }

    pub fn get_max_websocket_message_length(&self) -> usize {
        self.max_websocket_message_length
    }

    pub fn get_default_compression_level(&self) -> u8 {
        self.default_compression_level
    }

    /// Create an Arc'd config clone to pass to the constructors.
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
