//! Engine error types
//!
//! Per-stream protocol violations are isolated: they force-close the
//! offending stream and never touch siblings. Transport failures are always
//! fatal to the whole session. Timeout expiry is an event, not an error.

use std::fmt;

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or incomplete header set, or a frame received in a state
    /// that forbids it
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Underlying byte stream failed; fatal to the session
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Non-idempotent operation called in a state that forbids it
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Frame targets a stream the session does not know
    #[error("stream not found: {0}")]
    StreamNotFound(u32),

    /// Stream is closed and cannot carry the operation
    #[error("stream closed: {0}")]
    StreamClosed(u32),

    /// Frame length outside the allowed range
    #[error("frame size error: {0}")]
    FrameSize(String),

    /// Session has been closed
    #[error("session closed")]
    SessionClosed,
}

/// Reset codes carried by RESET and GOAWAY frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResetCode {
    /// Graceful, nothing went wrong
    NoError = 0x0,
    /// Peer violated the protocol
    ProtocolError = 0x1,
    /// Stream no longer needed
    Cancel = 0x2,
    /// Implementation fault
    InternalError = 0x3,
}

impl ResetCode {
    /// Convert reset code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create reset code from u32
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ResetCode::NoError),
            0x1 => Some(ResetCode::ProtocolError),
            0x2 => Some(ResetCode::Cancel),
            0x3 => Some(ResetCode::InternalError),
            _ => None,
        }
    }

    /// Get reset code name
    pub fn name(&self) -> &'static str {
        match self {
            ResetCode::NoError => "NO_ERROR",
            ResetCode::ProtocolError => "PROTOCOL_ERROR",
            ResetCode::Cancel => "CANCEL",
            ResetCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ResetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
