//! Message body progress, shared by the request and response parsers.

use netbuf::Buf;

use chunked;
use error::ParseError;


#[derive(Debug, Clone)]
pub enum BodyProgress {
    /// So many bytes are still expected.
    Fixed(u64),
    /// Read until the peer closes the connection. Responses only.
    Eof,
    Chunked(chunked::State),
}

impl BodyProgress {
    /// Moves payload bytes out of `data`. Returns `true` once the body is
    /// complete.
    pub fn parse(&mut self, data: &mut Buf, payload: &mut Buf, eof: bool)
        -> Result<bool, ParseError>
    {
        use self::BodyProgress::*;
        match *self {
            Fixed(ref mut remaining) => {
                let chunk = ::std::cmp::min(*remaining,
                                            data.len() as u64) as usize;
                payload.extend(&data[..chunk]);
                data.consume(chunk);
                *remaining -= chunk as u64;
                if *remaining == 0 {
                    Ok(true)
                } else if eof {
                    Err(ParseError::Incomplete)
                } else {
                    Ok(false)
                }
            }
            Eof => {
                let len = data.len();
                payload.extend(&data[..]);
                data.consume(len);
                Ok(eof)
            }
            Chunked(ref mut state) => {
                state.parse(data, payload)?;
                if state.is_done() {
                    Ok(true)
                } else if eof {
                    Err(ParseError::Incomplete)
                } else {
                    Ok(false)
                }
            }
        }
    }
}
