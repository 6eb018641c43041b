//! The 2 to 14 byte WebSocket frame header.

use byteorder::{BigEndian, ByteOrder};
use netbuf::Buf;


/// A decoded frame header.
///
/// `payload_len` always holds the real length; `encode` picks the shortest
/// wire representation from its value. The opcode is kept raw because the
/// header codec does not decide which opcodes are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub masked: bool,
    pub opcode: u8,
    pub masking_key: u32,
    pub payload_len: u64,
}

impl FrameHeader {
    pub fn clear(&mut self) {
        *self = FrameHeader::default();
    }

    /// Encodes this frame header in wire format. The output is suitable
    /// for sending through a stream socket, immediately followed by the
    /// (masked) payload.
    pub fn encode(&self, buf: &mut Buf) {
        let mut bytes = [0u8; 14];
        let mut ntotal = 2;

        bytes[0] = (self.fin as u8) << 7 | (self.rsv1 as u8) << 6
                   | (self.rsv2 as u8) << 5 | (self.rsv3 as u8) << 4
                   | (self.opcode & 15);
        let mask_bit = (self.masked as u8) << 7;

        if self.payload_len <= 125 {
            // one-byte length
            bytes[1] = mask_bit | self.payload_len as u8;
        } else if self.payload_len <= 65535 {
            // two-byte length
            bytes[1] = mask_bit | 126;
            ntotal += 2;
            BigEndian::write_u16(&mut bytes[ntotal-2..ntotal],
                                 self.payload_len as u16);
        } else {
            // eight-byte length
            bytes[1] = mask_bit | 127;
            ntotal += 8;
            BigEndian::write_u64(&mut bytes[ntotal-8..ntotal],
                                 self.payload_len);
        }

        if self.masked {
            // four-byte masking key
            ntotal += 4;
            BigEndian::write_u32(&mut bytes[ntotal-4..ntotal],
                                 self.masking_key);
        }

        buf.extend(&bytes[..ntotal]);
    }

    /// Decodes a frame header from the beginning of `data`. Returns the
    /// header and its encoded size, or `None` when more bytes are needed.
    pub fn decode(data: &[u8]) -> Option<(FrameHeader, usize)> {
        if data.len() < 2 {
            return None;
        }

        let mut header = FrameHeader {
            fin: data[0] & 0x80 != 0,
            rsv1: data[0] & 0x40 != 0,
            rsv2: data[0] & 0x20 != 0,
            rsv3: data[0] & 0x10 != 0,
            opcode: data[0] & 15,
            masked: data[1] & 0x80 != 0,
            masking_key: 0,
            payload_len: 0,
        };

        let mut ntotal = 2;
        match data[1] & 0x7F {
            126 => {
                ntotal += 2;
                if data.len() < ntotal {
                    return None;
                }
                header.payload_len =
                    BigEndian::read_u16(&data[ntotal-2..ntotal]) as u64;
            }
            127 => {
                ntotal += 8;
                if data.len() < ntotal {
                    return None;
                }
                header.payload_len =
                    BigEndian::read_u64(&data[ntotal-8..ntotal]);
            }
            len => {
                header.payload_len = len as u64;
            }
        }

        if header.masked {
            ntotal += 4;
            if data.len() < ntotal {
                return None;
            }
            header.masking_key =
                BigEndian::read_u32(&data[ntotal-4..ntotal]);
        }

        Some((header, ntotal))
    }

    /// Masks a part (or unmasks a masked part) of the frame payload,
    /// updating `masking_key` incrementally so that consecutive calls
    /// continue where the previous one stopped. Does nothing when `masked`
    /// is unset or the key is zero.
    pub fn mask_payload(&mut self, data: &mut [u8]) {
        if !self.masked || self.masking_key == 0 {
            return;
        }

        let mut key = self.masking_key;
        for byte in data.iter_mut() {
            key = key << 8 | key >> 24;
            *byte ^= key as u8;
        }
        self.masking_key = key;
    }
}
