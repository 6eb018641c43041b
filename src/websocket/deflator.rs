//! Per-connection `permessage-deflate` streams (RFC 7692).
//!
//! One raw-DEFLATE context per direction. The deflate and inflate halves
//! carry independent locks, so a worker thread compressing an outbound
//! message never blocks the I/O thread decompressing an inbound one on the
//! same connection.

use std::sync::{Mutex, MutexGuard};

use flate2::{Compress, CompressError, Compression, Decompress,
             FlushCompress, FlushDecompress};

use websocket::FrameParser;
use websocket::error::Error;


// The four bytes zlib appends on Z_SYNC_FLUSH, elided on the wire per
// RFC 7692, section 7.2.1.
const SYNC_FLUSH_TRAILER: &'static [u8] = b"\x00\x00\xFF\xFF";

/// The compressor and decompressor of one connection, created when the
/// handshake negotiated `permessage-deflate` and owned by the session for
/// its lifetime.
pub struct Deflator {
    deflate: Mutex<DeflateContext>,
    inflate: Mutex<InflateContext>,
}

pub struct DeflateContext {
    stream: Compress,
    buf: Vec<u8>,
}

pub struct InflateContext {
    stream: Decompress,
    buf: Vec<u8>,
}

impl Deflator {
    /// Creates both contexts at the window sizes the handshake settled on.
    ///
    /// # Panics
    ///
    /// Panics when the parser has not negotiated PMCE.
    pub fn new(parser: &FrameParser) -> Deflator {
        let level = parser.pmce_compression_level() as u32;
        let send_bits = parser.pmce_send_window_bits();
        let receive_bits = parser.pmce_receive_window_bits();
        assert!(send_bits != 0 && receive_bits != 0,
                "PMCE was not negotiated");
        Deflator {
            deflate: Mutex::new(DeflateContext {
                stream: Compress::new_with_window_bits(
                    Compression::new(level), false, send_bits),
                buf: Vec::new(),
            }),
            inflate: Mutex::new(InflateContext {
                stream: Decompress::new_with_window_bits(false, receive_bits),
                buf: Vec::new(),
            }),
        }
    }

    /// Locks the outbound half. The lock must be held for the whole
    /// message: with context takeover in effect, compressed messages
    /// depend on each other and must not interleave.
    pub fn deflate_lock(&self) -> MutexGuard<DeflateContext> {
        self.deflate.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Locks the inbound half.
    pub fn inflate_lock(&self) -> MutexGuard<InflateContext> {
        self.inflate.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl DeflateContext {
    /// Drops the LZ77 window, as required before each message when
    /// `no_context_takeover` is in effect for the sending side, and after
    /// a failed compression attempt.
    pub fn reset(&mut self) {
        self.stream.reset();
    }

    pub fn clear_output(&mut self) {
        self.buf.clear();
    }

    pub fn output(&self) -> &[u8] {
        &self.buf
    }

    /// Compresses a part of a message into the output buffer.
    pub fn message_stream(&mut self, data: &[u8])
        -> Result<(), CompressError>
    {
        let mut consumed = 0usize;
        while consumed < data.len() {
            self.buf.reserve(1024);
            let before = self.stream.total_in();
            self.stream.compress_vec(&data[consumed..], &mut self.buf,
                                     FlushCompress::None)?;
            consumed += (self.stream.total_in() - before) as usize;
        }
        Ok(())
    }

    /// Flushes the message with Z_SYNC_FLUSH and strips the trailing
    /// `00 00 FF FF`, which the receiver will put back.
    pub fn message_finish(&mut self) -> Result<(), CompressError> {
        loop {
            self.buf.reserve(16);
            self.stream.compress_vec(&[], &mut self.buf,
                                     FlushCompress::Sync)?;
            if self.buf.len() < self.buf.capacity() {
                // zlib had more output space than it needed, so the flush
                // is complete.
                break;
            }
        }

        if self.buf.ends_with(SYNC_FLUSH_TRAILER) {
            let len = self.buf.len() - SYNC_FLUSH_TRAILER.len();
            self.buf.truncate(len);
        }
        Ok(())
    }
}

impl InflateContext {
    pub fn clear_output(&mut self) {
        self.buf.clear();
    }

    pub fn output(&self) -> &[u8] {
        &self.buf
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        ::std::mem::replace(&mut self.buf, Vec::new())
    }

    /// Decompresses a frame payload into the output buffer, enforcing a
    /// running cap on the decompressed size.
    pub fn message_stream(&mut self, data: &[u8], max_message_length: usize)
        -> Result<(), Error>
    {
        let mut consumed = 0usize;
        while consumed < data.len() {
            self.buf.reserve(1024);
            let before = self.stream.total_in();
            self.stream.decompress_vec(&data[consumed..], &mut self.buf,
                                       FlushDecompress::Sync)?;
            consumed += (self.stream.total_in() - before) as usize;

            if self.buf.len() > max_message_length {
                return Err(Error::TooLarge);
            }
        }
        Ok(())
    }

    /// Feeds the sync-flush trailer the sender stripped, completing the
    /// message.
    pub fn message_finish(&mut self, max_message_length: usize)
        -> Result<(), Error>
    {
        self.message_stream(SYNC_FLUSH_TRAILER, max_message_length)
    }
}
