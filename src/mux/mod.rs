//! Multiplexed request/response protocol engine
//!
//! One [`Session`](session::Session) owns a transport connection and carries
//! many concurrent [`Stream`](stream::Stream)s, each a single
//! request/response exchange. Header sets carry reserved pseudo-fields
//! (`:method`, `:path`, `:scheme`, `:authority` on requests, `:status` on
//! responses) ahead of regular fields. Every stream owns a single-shot,
//! resettable idle timer.
//!
//! # Architecture
//!
//! Dispatch is single-threaded and cooperative: the only suspension points
//! are transport readiness and the earliest armed timer deadline, both
//! folded into [`Session::poll`](session::Session::poll). All results are
//! delivered as [`Event`](session::Event)s drained from the session, in
//! per-stream order; events across different streams carry no relative
//! ordering guarantee.
//!
//! # Examples
//!
//! ```no_run
//! use muxlink::mux::{Client, Event, HeaderSet};
//!
//! # fn example() -> muxlink::mux::Result<()> {
//! let mut client = Client::connect("127.0.0.1:8080".parse().unwrap())?;
//! let id = client.request(HeaderSet::request("GET", "/", "http", "localhost"))?;
//! client.finish(id)?;
//!
//! while let Some(event) = client.poll_event(None)? {
//!     match event {
//!         Event::HeadersReceived { headers, .. } => {
//!             assert_eq!(headers.get(":status"), Some("200"));
//!         }
//!         Event::End { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod frames;
pub mod headers;
pub mod server;
pub mod session;
pub mod stream;
pub mod timeout;

pub use client::Client;
pub use codec::FrameCodec;
pub use error::{Error, ResetCode, Result};
pub use frames::{DataFrame, Frame, FrameFlags, FrameType, GoAwayFrame, HeadersFrame, ResetFrame};
pub use headers::HeaderSet;
pub use server::Server;
pub use session::{Event, Role, Session, SessionState};
pub use stream::{Stream, StreamId, StreamState};
pub use timeout::TimeoutController;

/// Maximum frame payload size (16MB - 1)
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Stream ID 0 is reserved for connection-level frames
pub const CONNECTION_STREAM_ID: u32 = 0;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;
