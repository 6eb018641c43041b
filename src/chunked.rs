//! Decoding of `Transfer-Encoding: chunked` payloads.

use httparse::{self, parse_chunk_size};
use netbuf::Buf;

use error::ParseError;


#[derive(Debug, Clone)]
enum Phase {
    /// Waiting for a `hex-len CRLF` size line.
    Size,
    /// Moving this many bytes of chunk data.
    Data(u64),
    /// Waiting for the CRLF that terminates chunk data.
    DataEnd,
    /// A zero-size chunk was seen; discarding trailer lines.
    Trailer,
    Done,
}

/// Incremental decoder that moves chunk data out of the receive buffer
/// into the payload buffer, discarding the framing.
#[derive(Debug, Clone)]
pub struct State {
    phase: Phase,
}

impl State {
    pub fn new() -> State {
        State { phase: Phase::Size }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Consumes as much of `data` as possible, appending decoded bytes to
    /// `payload`. Returns without error when more input is needed.
    pub fn parse(&mut self, data: &mut Buf, payload: &mut Buf)
        -> Result<(), ParseError>
    {
        loop {
            match self.phase {
                Phase::Size => {
                    match parse_chunk_size(&data[..]) {
                        Ok(httparse::Status::Complete((bytes, 0))) => {
                            data.consume(bytes);
                            self.phase = Phase::Trailer;
                        }
                        Ok(httparse::Status::Complete((bytes, size))) => {
                            data.consume(bytes);
                            self.phase = Phase::Data(size);
                        }
                        Ok(httparse::Status::Partial) => return Ok(()),
                        Err(_) => return Err(ParseError::Chunk),
                    }
                }
                Phase::Data(remaining) => {
                    let chunk = ::std::cmp::min(remaining,
                                                data.len() as u64) as usize;
                    payload.extend(&data[..chunk]);
                    data.consume(chunk);
                    if chunk as u64 == remaining {
                        self.phase = Phase::DataEnd;
                    } else {
                        self.phase = Phase::Data(remaining - chunk as u64);
                        return Ok(());
                    }
                }
                Phase::DataEnd => {
                    if data.len() < 2 {
                        return Ok(());
                    }
                    if &data[..2] != b"\r\n" {
                        return Err(ParseError::Chunk);
                    }
                    data.consume(2);
                    self.phase = Phase::Size;
                }
                Phase::Trailer => {
                    // Trailer headers are accepted and thrown away. An
                    // empty line ends the message.
                    match find_crlf(&data[..]) {
                        Some(0) => {
                            data.consume(2);
                            self.phase = Phase::Done;
                        }
                        Some(end) => {
                            data.consume(end + 2);
                        }
                        None => return Ok(()),
                    }
                }
                Phase::Done => return Ok(()),
            }
        }
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|pair| pair == b"\r\n")
}
