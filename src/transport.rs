//! The capability a session needs from the byte pipe underneath it.

use std::io;

use netbuf::Buf;


/// A stream-oriented byte pipe.
///
/// Implementations queue bytes and return; they never block on socket
/// writability. The I/O layer owns the socket and the send queue and calls
/// back into the session with inbound bytes.
pub trait Transport {
    /// Queues bytes for transmission.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Requests an orderly shutdown once queued bytes are flushed.
    /// Idempotent.
    fn shut_down(&mut self) -> io::Result<()>;
}

/// A plain buffer works as a transport for tests and for composing
/// protocol bytes off-line; `shut_down` is a no-op.
impl Transport for Buf {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend(data);
        Ok(())
    }

    fn shut_down(&mut self) -> io::Result<()> {
        Ok(())
    }
}
