//! Stream management
//!
//! A stream is one request/response exchange multiplexed over a session. It
//! owns the header sets for both directions, an append-only body
//! accumulator, and a single idle-timeout controller. State moves
//! `Idle -> Open -> HalfClosedLocal | HalfClosedRemote -> Closed`; abrupt
//! reset jumps straight to `Closed`.

use super::error::{Error, Result};
use super::headers::HeaderSet;
use super::timeout::TimeoutController;
use super::MAX_STREAM_ID;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;

/// Stream ID type
pub type StreamId = u32;

/// Stream state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No frames sent or received yet
    Idle,
    /// Both sides can send
    Open,
    /// We finished sending, the peer can still send
    HalfClosedLocal,
    /// The peer finished sending, we can still send
    HalfClosedRemote,
    /// Terminal; no further events fire
    Closed,
}

impl StreamState {
    /// Check if the local side can still send
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if the remote side can still send
    pub fn can_receive(&self) -> bool {
        matches!(
            self,
            StreamState::Idle | StreamState::Open | StreamState::HalfClosedLocal
        )
    }

    /// Check if the stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// One request/response exchange
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    state: StreamState,
    /// Header set we sent (request for client streams, response for server)
    local_headers: Option<HeaderSet>,
    /// Header set the peer sent
    remote_headers: Option<HeaderSet>,
    /// Received body bytes, append-only until end-of-stream
    body: BytesMut,
    timeout: TimeoutController,
    end_delivered: bool,
    close_delivered: bool,
}

impl Stream {
    /// Create a new stream
    pub fn new(id: StreamId) -> Self {
        Stream {
            id,
            state: StreamState::Idle,
            local_headers: None,
            remote_headers: None,
            body: BytesMut::new(),
            timeout: TimeoutController::new(),
            end_delivered: false,
            close_delivered: false,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Header set sent by the local side, if finalized
    pub fn local_headers(&self) -> Option<&HeaderSet> {
        self.local_headers.as_ref()
    }

    /// Header set sent by the peer, if finalized
    pub fn remote_headers(&self) -> Option<&HeaderSet> {
        self.remote_headers.as_ref()
    }

    /// Received body bytes accumulated so far
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take the accumulated body
    pub fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body).freeze()
    }

    /// The stream's idle timer
    pub fn timeout(&self) -> &TimeoutController {
        &self.timeout
    }

    /// The stream's idle timer, mutable
    pub fn timeout_mut(&mut self) -> &mut TimeoutController {
        &mut self.timeout
    }

    /// Record that our header set goes out
    ///
    /// A direction's header set finalizes at most once: a second send is an
    /// `InvalidState` error, not a violation by the peer.
    pub fn send_headers(&mut self, headers: HeaderSet, end_stream: bool) -> Result<()> {
        if self.local_headers.is_some() {
            return Err(Error::InvalidState(format!(
                "headers already sent on stream {}",
                self.id
            )));
        }

        match self.state {
            StreamState::Idle => {
                self.state = if end_stream {
                    StreamState::HalfClosedLocal
                } else {
                    StreamState::Open
                };
            }
            StreamState::Open => {
                if end_stream {
                    self.state = StreamState::HalfClosedLocal;
                }
            }
            StreamState::HalfClosedRemote => {
                if end_stream {
                    self.state = StreamState::Closed;
                }
            }
            _ => {
                return Err(Error::StreamClosed(self.id));
            }
        }

        self.local_headers = Some(headers);
        self.timeout.on_activity();
        if self.state.is_closed() {
            self.timeout.seal();
        }
        Ok(())
    }

    /// Record the peer's header set
    ///
    /// Receiving headers for an already-finalized direction, or on a closed
    /// stream, is a protocol violation.
    pub fn recv_headers(&mut self, headers: HeaderSet, end_stream: bool) -> Result<()> {
        if self.remote_headers.is_some() {
            return Err(Error::ProtocolViolation(format!(
                "duplicate header set on stream {}",
                self.id
            )));
        }
        if !self.state.can_receive() {
            return Err(Error::ProtocolViolation(format!(
                "headers received on stream {} in state {:?}",
                self.id, self.state
            )));
        }

        match self.state {
            StreamState::Idle => {
                self.state = if end_stream {
                    StreamState::HalfClosedRemote
                } else {
                    StreamState::Open
                };
            }
            StreamState::Open => {
                if end_stream {
                    self.state = StreamState::HalfClosedRemote;
                }
            }
            StreamState::HalfClosedLocal => {
                if end_stream {
                    self.state = StreamState::Closed;
                }
            }
            _ => unreachable!("can_receive checked above"),
        }

        self.remote_headers = Some(headers);
        if self.state.is_closed() {
            self.timeout.seal();
        }
        Ok(())
    }

    /// Record an outgoing body chunk
    pub fn send_data(&mut self, end_stream: bool) -> Result<()> {
        if self.local_headers.is_none() {
            return Err(Error::InvalidState(format!(
                "data before headers on stream {}",
                self.id
            )));
        }
        if !self.state.can_send() {
            return Err(Error::StreamClosed(self.id));
        }

        if end_stream {
            self.state = match self.state {
                StreamState::Open => StreamState::HalfClosedLocal,
                StreamState::HalfClosedRemote => StreamState::Closed,
                other => other,
            };
        }

        self.timeout.on_activity();
        if self.state.is_closed() {
            self.timeout.seal();
        }
        Ok(())
    }

    /// Record an incoming body chunk, appending it in arrival order
    pub fn recv_data(&mut self, data: &Bytes, end_stream: bool) -> Result<()> {
        if self.remote_headers.is_none() {
            return Err(Error::ProtocolViolation(format!(
                "data before headers on stream {}",
                self.id
            )));
        }
        if !self.state.can_receive() {
            return Err(Error::ProtocolViolation(format!(
                "data received on stream {} in state {:?}",
                self.id, self.state
            )));
        }

        self.body.extend_from_slice(data);

        if end_stream {
            self.state = match self.state {
                StreamState::Open => StreamState::HalfClosedRemote,
                StreamState::HalfClosedLocal => StreamState::Closed,
                other => other,
            };
            if self.state.is_closed() {
                self.timeout.seal();
            }
        }
        Ok(())
    }

    /// Whether the peer has finished its direction
    pub fn remote_done(&self) -> bool {
        matches!(
            self.state,
            StreamState::HalfClosedRemote | StreamState::Closed
        )
    }

    /// Close the stream; terminal and idempotent
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
        self.timeout.seal();
    }

    /// Abrupt reset: close and discard buffered unread body
    pub fn reset(&mut self) {
        self.close();
        self.body.clear();
    }

    /// First call returns true, later calls false; guards the end event
    pub fn mark_end_delivered(&mut self) -> bool {
        !std::mem::replace(&mut self.end_delivered, true)
    }

    /// First call returns true, later calls false; guards the close event
    pub fn mark_close_delivered(&mut self) -> bool {
        !std::mem::replace(&mut self.close_delivered, true)
    }

    /// Whether the close event was already handed to the application
    pub fn close_delivered(&self) -> bool {
        self.close_delivered
    }
}

/// Stream table for one session
///
/// Allocates locally-initiated IDs (client odd, server even, monotonic) and
/// admits peer-initiated IDs, enforcing parity and monotonicity.
#[derive(Debug)]
pub struct StreamMap {
    streams: HashMap<StreamId, Stream>,
    next_local_id: StreamId,
    highest_remote_id: StreamId,
    is_client: bool,
}

impl StreamMap {
    /// Create a stream table
    ///
    /// Clients allocate odd IDs starting at 1, servers even IDs starting
    /// at 2.
    pub fn new(is_client: bool) -> Self {
        StreamMap {
            streams: HashMap::new(),
            next_local_id: if is_client { 1 } else { 2 },
            highest_remote_id: 0,
            is_client,
        }
    }

    /// Allocate the next local stream ID and create the stream
    pub fn create_local(&mut self) -> Result<StreamId> {
        if self.next_local_id > MAX_STREAM_ID {
            return Err(Error::InvalidState(
                "stream ID space exhausted".to_string(),
            ));
        }

        let id = self.next_local_id;
        self.next_local_id += 2;
        self.streams.insert(id, Stream::new(id));
        Ok(id)
    }

    /// Admit a peer-initiated stream ID, creating the stream
    ///
    /// The peer's IDs must carry the opposite parity of ours and increase
    /// monotonically; anything else is a protocol violation.
    pub fn admit_remote(&mut self, id: StreamId) -> Result<&mut Stream> {
        let peer_parity = if self.is_client { 0 } else { 1 };
        if id % 2 != peer_parity {
            return Err(Error::ProtocolViolation(format!(
                "peer-initiated stream {} has wrong parity",
                id
            )));
        }
        if id <= self.highest_remote_id {
            return Err(Error::ProtocolViolation(format!(
                "peer-initiated stream {} is not monotonically increasing",
                id
            )));
        }

        self.highest_remote_id = id;
        Ok(self.streams.entry(id).or_insert_with(|| Stream::new(id)))
    }

    /// Get a stream by ID
    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    /// Get a mutable stream by ID
    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    /// Remove a stream
    pub fn remove(&mut self, id: StreamId) -> Option<Stream> {
        self.streams.remove(&id)
    }

    /// All known stream IDs
    pub fn ids(&self) -> Vec<StreamId> {
        self.streams.keys().copied().collect()
    }

    /// Number of streams not yet closed
    pub fn active_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| !s.state().is_closed())
            .count()
    }

    /// Drop closed streams whose close event was already delivered
    pub fn cleanup_closed(&mut self) {
        self.streams
            .retain(|_, s| !(s.state().is_closed() && s.close_delivered()));
    }

    /// Highest peer-initiated ID seen so far
    pub fn highest_remote_id(&self) -> StreamId {
        self.highest_remote_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_headers() -> HeaderSet {
        HeaderSet::request("GET", "/", "http", "localhost")
    }

    #[test]
    fn test_state_transitions_on_send() {
        let mut stream = Stream::new(1);
        assert_eq!(stream.state(), StreamState::Idle);

        stream.send_headers(request_headers(), false).unwrap();
        assert_eq!(stream.state(), StreamState::Open);

        stream.send_data(true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn test_both_directions_done_closes() {
        let mut stream = Stream::new(1);
        stream.send_headers(request_headers(), true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
        assert!(!stream.remote_done());

        stream
            .recv_headers(HeaderSet::response(200), false)
            .unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);

        stream.recv_data(&Bytes::from("body"), true).unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(stream.remote_done());
        assert_eq!(stream.body(), b"body");

        // Both finalized header sets stay readable
        assert_eq!(stream.local_headers().unwrap().get(":method"), Some("GET"));
        assert_eq!(stream.remote_headers().unwrap().get(":status"), Some("200"));
    }

    #[test]
    fn test_headers_sent_twice_is_invalid_state() {
        let mut stream = Stream::new(1);
        stream.send_headers(request_headers(), false).unwrap();

        let result = stream.send_headers(request_headers(), false);
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_headers_received_twice_is_protocol_violation() {
        let mut stream = Stream::new(1);
        stream.send_headers(request_headers(), true).unwrap();
        stream
            .recv_headers(HeaderSet::response(200), false)
            .unwrap();

        let result = stream.recv_headers(HeaderSet::response(200), false);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_headers_after_close_is_protocol_violation() {
        let mut stream = Stream::new(1);
        stream.close();

        let result = stream.recv_headers(HeaderSet::response(200), false);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_data_before_headers_rejected() {
        let mut stream = Stream::new(1);

        assert!(matches!(
            stream.send_data(false),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            stream.recv_data(&Bytes::from("x"), false),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_body_accumulates_in_order() {
        let mut stream = Stream::new(1);
        stream.send_headers(request_headers(), true).unwrap();
        stream
            .recv_headers(HeaderSet::response(200), false)
            .unwrap();

        stream.recv_data(&Bytes::from("first "), false).unwrap();
        stream.recv_data(&Bytes::from("second "), false).unwrap();
        stream.recv_data(&Bytes::from("third"), true).unwrap();

        assert_eq!(stream.body(), b"first second third");
    }

    #[test]
    fn test_close_is_terminal_and_seals_timer() {
        let mut stream = Stream::new(1);
        stream
            .timeout_mut()
            .arm(std::time::Duration::from_millis(1), || {});

        stream.close();
        assert!(stream.state().is_closed());
        assert!(stream.timeout().is_sealed());
        assert!(!stream.timeout().is_armed());

        // Idempotent
        stream.close();
        assert!(stream.state().is_closed());
    }

    #[test]
    fn test_reset_discards_buffered_body() {
        let mut stream = Stream::new(1);
        stream.send_headers(request_headers(), true).unwrap();
        stream
            .recv_headers(HeaderSet::response(200), false)
            .unwrap();
        stream.recv_data(&Bytes::from("buffered"), false).unwrap();

        stream.reset();
        assert!(stream.body().is_empty());
        assert!(stream.state().is_closed());
    }

    #[test]
    fn test_delivery_guards_fire_once() {
        let mut stream = Stream::new(1);
        assert!(stream.mark_end_delivered());
        assert!(!stream.mark_end_delivered());
        assert!(stream.mark_close_delivered());
        assert!(!stream.mark_close_delivered());
    }

    #[test]
    fn test_stream_map_client_ids_odd_monotonic() {
        let mut map = StreamMap::new(true);
        assert_eq!(map.create_local().unwrap(), 1);
        assert_eq!(map.create_local().unwrap(), 3);
        assert_eq!(map.create_local().unwrap(), 5);
        assert_eq!(map.active_count(), 3);
    }

    #[test]
    fn test_stream_map_server_ids_even() {
        let mut map = StreamMap::new(false);
        assert_eq!(map.create_local().unwrap(), 2);
        assert_eq!(map.create_local().unwrap(), 4);
    }

    #[test]
    fn test_admit_remote_enforces_parity() {
        // A server admits client-initiated (odd) IDs
        let mut map = StreamMap::new(false);
        assert!(map.admit_remote(1).is_ok());
        assert!(matches!(
            map.admit_remote(4),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_admit_remote_enforces_monotonicity() {
        let mut map = StreamMap::new(false);
        map.admit_remote(5).unwrap();

        assert!(matches!(
            map.admit_remote(3),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            map.admit_remote(5),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(map.admit_remote(7).is_ok());
    }

    #[test]
    fn test_cleanup_keeps_undelivered_closed_streams() {
        let mut map = StreamMap::new(true);
        let id = map.create_local().unwrap();
        map.get_mut(id).unwrap().close();

        // Close event not delivered yet; stream must survive cleanup
        map.cleanup_closed();
        assert!(map.get(id).is_some());

        assert!(map.get_mut(id).unwrap().mark_close_delivered());
        map.cleanup_closed();
        assert!(map.get(id).is_none());
    }
}
