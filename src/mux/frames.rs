//! Frame model
//!
//! The wire format is modeled abstractly: headers travel as named fields,
//! not a compressed byte layout. Four frame kinds are enough to carry the
//! engine's semantics.

use super::error::ResetCode;
use super::headers::HeaderSet;
use bytes::Bytes;
use std::fmt;

/// Frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// DATA frame (0x0) - carries a body chunk
    Data = 0x0,
    /// HEADERS frame (0x1) - carries a complete header set for one direction
    Headers = 0x1,
    /// RESET frame (0x2) - abruptly terminates one stream
    Reset = 0x2,
    /// GOAWAY frame (0x3) - initiates connection shutdown
    GoAway = 0x3,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Reset),
            0x3 => Some(FrameType::GoAway),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Reset => "RESET",
            FrameType::GoAway => "GOAWAY",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// Frame flags
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Check if a flag is set
    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    /// Check if END_STREAM is set
    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }
}

/// HEADERS frame: one direction's complete header set
#[derive(Debug, Clone)]
pub struct HeadersFrame {
    /// Stream ID
    pub stream_id: u32,
    /// The header set
    pub headers: HeaderSet,
    /// Direction completes with these headers
    pub end_stream: bool,
}

impl HeadersFrame {
    /// Create a new HEADERS frame
    pub fn new(stream_id: u32, headers: HeaderSet, end_stream: bool) -> Self {
        HeadersFrame {
            stream_id,
            headers,
            end_stream,
        }
    }
}

/// DATA frame: one body chunk
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Body chunk
    pub data: Bytes,
    /// Direction completes with this chunk
    pub end_stream: bool,
}

impl DataFrame {
    /// Create a new DATA frame
    pub fn new(stream_id: u32, data: Bytes, end_stream: bool) -> Self {
        DataFrame {
            stream_id,
            data,
            end_stream,
        }
    }
}

/// RESET frame: abrupt termination of one stream
#[derive(Debug, Clone, Copy)]
pub struct ResetFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Why the stream was reset
    pub code: ResetCode,
}

impl ResetFrame {
    /// Create a new RESET frame
    pub fn new(stream_id: u32, code: ResetCode) -> Self {
        ResetFrame { stream_id, code }
    }
}

/// GOAWAY frame: connection shutdown notice
#[derive(Debug, Clone, Copy)]
pub struct GoAwayFrame {
    /// Highest stream ID the sender processed
    pub last_stream_id: u32,
    /// Shutdown reason
    pub code: ResetCode,
}

impl GoAwayFrame {
    /// Create a new GOAWAY frame
    pub fn new(last_stream_id: u32, code: ResetCode) -> Self {
        GoAwayFrame {
            last_stream_id,
            code,
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone)]
pub enum Frame {
    Headers(HeadersFrame),
    Data(DataFrame),
    Reset(ResetFrame),
    GoAway(GoAwayFrame),
}

impl Frame {
    /// Stream the frame targets; GOAWAY targets the connection (stream 0)
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Headers(f) => f.stream_id,
            Frame::Data(f) => f.stream_id,
            Frame::Reset(f) => f.stream_id,
            Frame::GoAway(_) => super::CONNECTION_STREAM_ID,
        }
    }
}
