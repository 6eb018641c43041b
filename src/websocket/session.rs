//! The per-connection WebSocket machinery shared by the server and client
//! sessions: frame pump, message assembly, compression, sending and
//! closure.

use std::io;

use byteorder::{BigEndian, ByteOrder};
use netbuf::Buf;
use rand::{Rng, thread_rng};

use config::Config;
use transport::Transport;
use websocket::{Deflator, Error, FrameHeader, FrameParser, Opcode, status};


/// Hooks a WebSocket application implements.
///
/// All hooks for one connection are serialized and arrive in byte-stream
/// order. A hook returning an error makes the session close the connection
/// with the corresponding CLOSE status.
pub trait WsHandler {
    /// Part of a data message has been assembled. `data` holds everything
    /// received (and decompressed) so far; a streaming consumer may drain
    /// a prefix. The default checks the message against the configured
    /// size cap.
    fn on_ws_message_data_stream(&mut self, opcode: Opcode, data: &mut Buf,
        max_message_length: usize) -> Result<(), Error>
    {
        let _ = opcode;
        if data.len() > max_message_length {
            return Err(Error::TooLarge);
        }
        Ok(())
    }

    /// A complete message has arrived: TEXT or BINARY with everything
    /// reassembled and decompressed, or a PING/PONG payload.
    fn on_ws_message_finish(&mut self, opcode: Opcode, data: Buf)
        -> Result<(), Error>;

    /// The connection is going away. Called exactly once, whether closure
    /// was initiated by the peer, by this side, or by a protocol error.
    fn on_ws_close(&mut self, status: u16, reason: &str);
}

/// State a WebSocket session keeps once the handshake is done. The server
/// and client sessions embed this and differ only in how the handshake is
/// driven and whether outgoing frames are masked.
pub struct WsCore {
    pub parser: FrameParser,
    pmce: Option<Deflator>,
    msg: Buf,
    closure_notified: bool,
    close_sent: bool,
    mask_frames: bool,
}

impl WsCore {
    pub fn new(config: &Config, mask_frames: bool) -> WsCore {
        WsCore {
            parser: FrameParser::new(config),
            pmce: None,
            msg: Buf::new(),
            closure_notified: false,
            close_sent: false,
            mask_frames: mask_frames,
        }
    }

    /// Constructs the compression contexts once the handshake settled on
    /// PMCE.
    pub fn init_pmce(&mut self) {
        if self.parser.pmce_send_window_bits() != 0 {
            self.pmce = Some(Deflator::new(&self.parser));
        }
    }

    pub fn pmce_active(&self) -> bool {
        self.pmce.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closure_notified
    }

    /// Delivers `on_ws_close` exactly once, then answers with a CLOSE
    /// frame and shuts the transport down.
    pub fn close_once<T, H>(&mut self, io: &mut T, handler: &mut H,
        status: u16, reason: &str) -> io::Result<()>
        where T: Transport, H: WsHandler,
    {
        if self.closure_notified {
            return Ok(());
        }

        self.closure_notified = true;
        handler.on_ws_close(status, reason);
        self.shut_down(io, status::NORMAL_CLOSURE, "")
    }

    /// Runs the frame pump over freshly arrived bytes.
    pub fn process_stream<T, H>(&mut self, io: &mut T, handler: &mut H,
        data: &mut Buf, eof: bool) -> io::Result<()>
        where T: Transport, H: WsHandler,
    {
        self.pump_frames(io, handler, data)?;

        if eof && !self.closure_notified {
            // The transport went down without a closing handshake.
            self.close_once(io, handler, status::NO_CLOSE_FRAME,
                            "no CLOSE frame received")?;
        }
        Ok(())
    }

    fn pump_frames<T, H>(&mut self, io: &mut T, handler: &mut H,
        data: &mut Buf) -> io::Result<()>
        where T: Transport, H: WsHandler,
    {
        loop {
            // If something has gone wrong, ignore further incoming data.
            if self.parser.error() || self.closure_notified {
                let len = data.len();
                data.consume(len);
                return Ok(());
            }

            if !self.parser.frame_header_complete() {
                self.parser.parse_frame_header_from_stream(data);

                if self.parser.error() {
                    let len = data.len();
                    data.consume(len);
                    let desc = self.parser.error_description();
                    return self.close_once(io, handler,
                                           status::PROTOCOL_ERROR, desc);
                }

                if !self.parser.frame_header_complete() {
                    return Ok(());
                }

                // The header just completed. A fresh non-CONTINUATION data
                // frame starts a new message; this must happen exactly
                // once per frame, not once per read.
                let opcode = self.parser.frame_header().opcode;
                if opcode >= 1 && opcode <= 7 {
                    let len = self.msg.len();
                    self.msg.consume(len);
                    if let Some(ref pmce) = self.pmce {
                        pmce.inflate_lock().clear_output();
                    }
                }
            }

            if !self.parser.frame_payload_complete() {
                self.parser.parse_frame_payload_from_stream(data);

                let opcode = self.parser.frame_header().opcode;
                if opcode <= 7 {
                    // The RSV1 bit marks part of a compressed message.
                    if self.parser.message_rsv1() {
                        let result = match self.pmce {
                            None => {
                                let len = data.len();
                                data.consume(len);
                                return self.close_once(io, handler,
                                    status::UNEXPECTED_ERROR,
                                    "PMCE not initialized");
                            }
                            Some(ref pmce) => {
                                let max = self.parser.max_message_length();
                                let mut inflate = pmce.inflate_lock();
                                let mut result = inflate.message_stream(
                                    &self.parser.frame_payload()[..], max);
                                if result.is_ok()
                                    && self.parser.frame_payload_complete()
                                    && self.parser.message_fin()
                                {
                                    result = inflate.message_finish(max);
                                }
                                result.map(|()| inflate.take_output())
                            }
                        };
                        match result {
                            Ok(inflated) => {
                                // the compressed bytes have been consumed
                                let _ = self.parser.take_frame_payload();
                                self.msg.extend(&inflated);
                            }
                            Err(err) => {
                                let len = data.len();
                                data.consume(len);
                                return self.close_once(io, handler,
                                    err.close_status(), err.close_reason());
                            }
                        }
                    } else {
                        let payload = self.parser.take_frame_payload();
                        self.msg.extend(&payload[..]);
                    }

                    // Whatever was appended is part of a (potentially
                    // fragmented) data message; let the handler look at it.
                    let opcode = data_opcode(self.parser.message_opcode());
                    let max = self.parser.max_message_length();
                    if let Err(err) = handler.on_ws_message_data_stream(
                        opcode, &mut self.msg, max)
                    {
                        let len = data.len();
                        data.consume(len);
                        return self.close_once(io, handler,
                            err.close_status(), err.close_reason());
                    }
                }

                if !self.parser.frame_payload_complete() {
                    return Ok(());
                }

                // Handle this frame. Fragmented data frames have already
                // been handled; control frames are processed as a whole.
                if self.parser.frame_header().fin {
                    match self.parser.frame_header().opcode {
                        0 | 1 | 2 => {
                            let opcode =
                                data_opcode(self.parser.message_opcode());
                            let msg = ::std::mem::replace(&mut self.msg,
                                                          Buf::new());
                            if let Err(err) =
                                handler.on_ws_message_finish(opcode, msg)
                            {
                                let len = data.len();
                                data.consume(len);
                                return self.close_once(io, handler,
                                    err.close_status(), err.close_reason());
                            }
                        }
                        8 => {
                            // CLOSE, with a big-endian status code when
                            // the payload is long enough.
                            let payload = self.parser.take_frame_payload();
                            let (status, offset) = if payload.len() >= 2 {
                                (BigEndian::read_u16(&payload[..2]), 2)
                            } else {
                                (status::NO_STATUS_CODE, 0)
                            };
                            let reason = String::from_utf8_lossy(
                                &payload[offset..]).into_owned();
                            debug!("WebSocket closed by peer [{}] {:?}",
                                   status, reason);
                            let len = data.len();
                            data.consume(len);
                            return self.close_once(io, handler, status,
                                                   &reason);
                        }
                        9 => {
                            // PING is delivered, then answered with a PONG
                            // carrying the identical payload.
                            let payload = self.parser.take_frame_payload();
                            let echo = (&payload[..]).to_vec();
                            trace!("WebSocket PING ({} bytes)", echo.len());
                            if let Err(err) = handler.on_ws_message_finish(
                                Opcode::Ping, payload)
                            {
                                let len = data.len();
                                data.consume(len);
                                return self.close_once(io, handler,
                                    err.close_status(), err.close_reason());
                            }
                            self.send_raw_frame(io, true, false,
                                                Opcode::Pong, &echo)?;
                        }
                        10 => {
                            let payload = self.parser.take_frame_payload();
                            trace!("WebSocket PONG ({} bytes)",
                                   payload.len());
                            if let Err(err) = handler.on_ws_message_finish(
                                Opcode::Pong, payload)
                            {
                                let len = data.len();
                                data.consume(len);
                                return self.close_once(io, handler,
                                    err.close_status(), err.close_reason());
                            }
                        }
                        _ => unreachable!("opcode was validated"),
                    }
                }

                self.parser.next_frame();
            }
        }
    }

    /// Sends one message as a single frame, compressing data messages
    /// through PMCE when it pays off.
    ///
    /// # Panics
    ///
    /// Panics for opcodes other than TEXT, BINARY, PING and PONG, and for
    /// control payloads over 125 bytes.
    pub fn send<T: Transport>(&mut self, io: &mut T, opcode: Opcode,
        data: &[u8]) -> io::Result<()>
    {
        match opcode {
            Opcode::Text | Opcode::Binary => {
                if let Some(ref pmce) = self.pmce {
                    // Compressing tiny frames loses, and without context
                    // takeover the break-even point is much higher.
                    let threshold =
                        if self.parser.pmce_send_no_context_takeover() {
                            1024 + 16
                        } else {
                            16
                        };
                    if data.len() >= threshold {
                        // The deflate mutex stays locked until the frame
                        // is composed: with context takeover, compressed
                        // messages depend on each other.
                        let mut deflate = pmce.deflate_lock();
                        deflate.clear_output();

                        if self.parser.pmce_send_no_context_takeover() {
                            deflate.reset();
                        }

                        let mut compressed = deflate.message_stream(data);
                        if compressed.is_ok() {
                            compressed = deflate.message_finish();
                        }
                        match compressed {
                            Ok(()) => {
                                // FIN + RSV1 + opcode
                                return send_frame(io, self.mask_frames,
                                    true, true, opcode, deflate.output());
                            }
                            Err(err) => {
                                // The deflator is in an indeterminate
                                // state now; reset it and fall back to the
                                // uncompressed path.
                                error!("could not compress message: {}",
                                       err);
                                deflate.reset();
                            }
                        }
                    }
                }

                // FIN + opcode
                self.send_raw_frame(io, true, false, opcode, data)
            }

            Opcode::Ping | Opcode::Pong => {
                if data.len() > 125 {
                    panic!("control frame payload too large: {} > 125",
                           data.len());
                }

                // Control messages are never compressed.
                self.send_raw_frame(io, true, false, opcode, data)
            }

            _ => panic!("WebSocket opcode {:?} not supported here", opcode),
        }
    }

    /// Sends a CLOSE frame (when the connection is up) and shuts the
    /// transport down. Idempotent.
    pub fn shut_down<T: Transport>(&mut self, io: &mut T, status: u16,
        reason: &str) -> io::Result<()>
    {
        let upgraded = self.parser.is_server_mode()
            || self.parser.is_client_mode();
        if upgraded && !self.close_sent {
            self.close_sent = true;

            // A control frame cannot exceed 125 bytes of payload, so the
            // reason has to fit in 123.
            let mut payload = [0u8; 125];
            BigEndian::write_u16(&mut payload[..2], status);
            let reason = reason.as_bytes();
            let n = ::std::cmp::min(reason.len(), 123);
            payload[2..2+n].copy_from_slice(&reason[..n]);

            // FIN + CLOSE
            if let Err(err) = self.send_raw_frame(io, true, false,
                                                  Opcode::Close,
                                                  &payload[..2+n])
            {
                error!("failed to send WebSocket CLOSE notification: {}",
                       err);
            }
        }
        io.shut_down()
    }

    fn send_raw_frame<T: Transport>(&self, io: &mut T, fin: bool,
        rsv1: bool, opcode: Opcode, payload: &[u8]) -> io::Result<()>
    {
        send_frame(io, self.mask_frames, fin, rsv1, opcode, payload)
    }
}

fn data_opcode(raw: u8) -> Opcode {
    match raw {
        2 => Opcode::Binary,
        _ => Opcode::Text,
    }
}

// Composes a single frame and hands it to the transport. Frames from
// clients are masked with a random 31-bit key; frames from servers are
// not masked.
fn send_frame<T: Transport>(io: &mut T, mask: bool, fin: bool, rsv1: bool,
    opcode: Opcode, payload: &[u8]) -> io::Result<()>
{
    let mut header = FrameHeader {
        fin: fin,
        rsv1: rsv1,
        opcode: opcode.as_u8(),
        payload_len: payload.len() as u64,
        .. FrameHeader::default()
    };
    if mask {
        header.masked = true;
        header.masking_key = thread_rng().gen::<u32>() >> 1;
    }

    let mut buf = Buf::new();
    header.encode(&mut buf);
    let start = buf.len();
    buf.extend(payload);
    if mask {
        header.mask_payload(&mut buf[start..]);
    }
    io.send(&buf[..])
}
