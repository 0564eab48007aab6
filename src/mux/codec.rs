//! Frame encoding and decoding
//!
//! Frames travel with a 9-octet header: 3-octet big-endian payload length,
//! 1-octet type, 1-octet flags, 4-octet stream ID with the high bit
//! reserved. Header sets are serialized as uncompressed length-prefixed
//! name/value entries, pseudo-fields first.
//!
//! Decoding is incremental: bytes are fed in whatever chunks the transport
//! delivers and complete frames come out once enough has accumulated, so
//! chunk boundaries never affect the decoded result.

use super::error::{Error, ResetCode, Result};
use super::frames::*;
use super::headers::HeaderSet;
use super::MAX_FRAME_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Outcome of decoding one frame
///
/// A malformed payload is consumed and reported with its stream ID so the
/// session can force-close that one stream without touching siblings.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed frame
    Frame(Frame),
    /// The frame's payload was malformed; the bytes were consumed
    Malformed { stream_id: u32, error: Error },
}

/// Incremental frame codec
pub struct FrameCodec {
    read_buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        FrameCodec {
            read_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Encode a frame header
    pub fn encode_header(
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        header[3] = frame_type.as_u8();
        header[4] = flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0)
        let stream_id = stream_id & 0x7FFF_FFFF;
        header[5] = ((stream_id >> 24) & 0xFF) as u8;
        header[6] = ((stream_id >> 16) & 0xFF) as u8;
        header[7] = ((stream_id >> 8) & 0xFF) as u8;
        header[8] = (stream_id & 0xFF) as u8;

        header
    }

    /// Decode a frame header
    ///
    /// Returns (raw type byte, flags, stream id, payload length). The type
    /// byte stays raw so unknown frame types can be skipped, not rejected.
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> (u8, FrameFlags, u32, usize) {
        let length =
            ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);

        let type_byte = bytes[3];
        let flags = FrameFlags::from_u8(bytes[4]);

        let stream_id = ((bytes[5] as u32 & 0x7F) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32);

        (type_byte, flags, stream_id, length)
    }

    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame) -> Bytes {
        let mut flags = FrameFlags::empty();
        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let header = Self::encode_header(FrameType::Data, flags, frame.stream_id, frame.data.len());

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.data.len());
        buf.put_slice(&header);
        buf.put_slice(&frame.data);
        buf.freeze()
    }

    /// Encode a HEADERS frame
    ///
    /// Fields are written in wire order (pseudo-fields first), each as
    /// `u16 name_len, name, u16 value_len, value`.
    pub fn encode_headers_frame(frame: &HeadersFrame) -> Bytes {
        let mut payload = BytesMut::new();
        for (name, value) in frame.headers.iter_wire_order() {
            payload.put_u16(name.len() as u16);
            payload.put_slice(name.as_bytes());
            payload.put_u16(value.len() as u16);
            payload.put_slice(value.as_bytes());
        }

        let mut flags = FrameFlags::empty();
        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let header =
            Self::encode_header(FrameType::Headers, flags, frame.stream_id, payload.len());

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
        buf.put_slice(&header);
        buf.put_slice(&payload);
        buf.freeze()
    }

    /// Encode a RESET frame
    pub fn encode_reset_frame(frame: &ResetFrame) -> Bytes {
        let header = Self::encode_header(FrameType::Reset, FrameFlags::empty(), frame.stream_id, 4);

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);
        buf.put_slice(&header);
        buf.put_u32(frame.code.as_u32());
        buf.freeze()
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoAwayFrame) -> Bytes {
        let header = Self::encode_header(FrameType::GoAway, FrameFlags::empty(), 0, 8);

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 8);
        buf.put_slice(&header);
        buf.put_u32(frame.last_stream_id & 0x7FFF_FFFF);
        buf.put_u32(frame.code.as_u32());
        buf.freeze()
    }

    /// Feed raw bytes read from the transport into the decode buffer
    pub fn feed(&mut self, bytes: &[u8]) {
        self.read_buffer.extend_from_slice(bytes);
    }

    /// Number of buffered, not yet decoded bytes
    pub fn buffered(&self) -> usize {
        self.read_buffer.len()
    }

    /// Decode the next complete frame out of the buffer
    ///
    /// Returns `Ok(None)` when more bytes are needed. Unknown frame types
    /// are consumed and skipped. Connection-level garbage (an impossible
    /// frame length) is the only hard error; per-frame payload problems are
    /// reported as [`Decoded::Malformed`] with their stream ID.
    pub fn next_frame(&mut self) -> Result<Option<Decoded>> {
        loop {
            if self.read_buffer.len() < FRAME_HEADER_SIZE {
                return Ok(None);
            }

            let mut header = [0u8; FRAME_HEADER_SIZE];
            header.copy_from_slice(&self.read_buffer[..FRAME_HEADER_SIZE]);
            let (type_byte, flags, stream_id, payload_len) = Self::decode_header(&header);

            if payload_len > MAX_FRAME_SIZE {
                return Err(Error::FrameSize(format!(
                    "frame payload too large: {}",
                    payload_len
                )));
            }

            if self.read_buffer.len() < FRAME_HEADER_SIZE + payload_len {
                return Ok(None);
            }

            self.read_buffer.advance(FRAME_HEADER_SIZE);
            let payload = self.read_buffer.split_to(payload_len).freeze();

            let frame_type = match FrameType::from_u8(type_byte) {
                Some(t) => t,
                // Unknown frame types are ignored
                None => continue,
            };

            let frame = match frame_type {
                FrameType::Data => Frame::Data(DataFrame {
                    stream_id,
                    data: payload,
                    end_stream: flags.is_end_stream(),
                }),
                FrameType::Headers => match Self::decode_header_payload(&payload) {
                    Ok(headers) => Frame::Headers(HeadersFrame {
                        stream_id,
                        headers,
                        end_stream: flags.is_end_stream(),
                    }),
                    Err(error) => {
                        return Ok(Some(Decoded::Malformed { stream_id, error }));
                    }
                },
                FrameType::Reset => {
                    if payload.len() != 4 {
                        return Ok(Some(Decoded::Malformed {
                            stream_id,
                            error: Error::FrameSize("RESET payload must be 4 bytes".to_string()),
                        }));
                    }
                    let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    Frame::Reset(ResetFrame {
                        stream_id,
                        code: ResetCode::from_u32(code).unwrap_or(ResetCode::InternalError),
                    })
                }
                FrameType::GoAway => {
                    if payload.len() != 8 {
                        return Err(Error::FrameSize(
                            "GOAWAY payload must be 8 bytes".to_string(),
                        ));
                    }
                    let last = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                        & 0x7FFF_FFFF;
                    let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                    Frame::GoAway(GoAwayFrame {
                        last_stream_id: last,
                        code: ResetCode::from_u32(code).unwrap_or(ResetCode::InternalError),
                    })
                }
            };

            return Ok(Some(Decoded::Frame(frame)));
        }
    }

    fn decode_header_payload(payload: &[u8]) -> Result<HeaderSet> {
        let mut headers = HeaderSet::new();
        let mut pos = 0;
        let mut seen_regular = false;

        while pos < payload.len() {
            let name = Self::decode_entry(payload, &mut pos)?;
            let value = Self::decode_entry(payload, &mut pos)?;

            if name.is_empty() {
                return Err(Error::ProtocolViolation("empty field name".to_string()));
            }

            // Pseudo-fields must precede regular fields on the wire
            if HeaderSet::is_pseudo(&name) {
                if seen_regular {
                    return Err(Error::ProtocolViolation(format!(
                        "pseudo-field {} after regular field",
                        name
                    )));
                }
            } else {
                seen_regular = true;
            }

            headers.insert(name, value);
        }

        Ok(headers)
    }

    fn decode_entry(payload: &[u8], pos: &mut usize) -> Result<String> {
        if *pos + 2 > payload.len() {
            return Err(Error::ProtocolViolation(
                "truncated header entry".to_string(),
            ));
        }
        let len = u16::from_be_bytes([payload[*pos], payload[*pos + 1]]) as usize;
        *pos += 2;

        if *pos + len > payload.len() {
            return Err(Error::ProtocolViolation(
                "truncated header entry".to_string(),
            ));
        }
        let text = std::str::from_utf8(&payload[*pos..*pos + len])
            .map_err(|_| Error::ProtocolViolation("header entry is not UTF-8".to_string()))?
            .to_string();
        *pos += len;

        Ok(text)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
