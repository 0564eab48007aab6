//! Sessions
//!
//! A session owns one transport connection and multiplexes many concurrent
//! streams over it. Streams never touch the transport; all frame writes go
//! through the session, which serializes them, and all inbound activity is
//! surfaced as [`Event`]s drained from a single queue via [`Session::poll`].
//!
//! Dispatch is single-threaded and cooperative. The only suspension points
//! are transport readability and the earliest armed idle-timer deadline;
//! `poll` folds both into one wait. Events for a given stream are delivered
//! in protocol order; events across different streams carry no relative
//! ordering guarantee.
//!
//! Failure semantics: a transport error is fatal to the whole session and
//! abruptly closes every live stream, each firing its close event exactly
//! once. A per-stream protocol violation force-closes only that stream;
//! siblings are untouched.

use super::codec::{Decoded, FrameCodec};
use super::error::{Error, ResetCode, Result};
use super::frames::{DataFrame, Frame, GoAwayFrame, HeadersFrame, ResetFrame};
use super::headers::HeaderSet;
use super::stream::{StreamId, StreamMap, StreamState};
use super::CONNECTION_STREAM_ID;
use crate::net::{PollEvents, Transport};
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Session role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Connection-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Streams may be created and frames exchanged
    Open,
    /// Shutdown announced; in-flight streams may drain, no new streams
    Closing,
    /// Terminal; the transport has been released
    Closed,
}

/// Asynchronous notifications drained via [`Session::poll`]
///
/// Terminal events (`End`, `StreamClosed`, `SessionClosed`) are delivered
/// at most once per stream/session.
#[derive(Debug)]
pub enum Event {
    /// Server role: the peer opened a stream with this request header set
    StreamOpened { id: StreamId, headers: HeaderSet },
    /// Client role: the peer answered with this response header set
    HeadersReceived { id: StreamId, headers: HeaderSet },
    /// A body chunk arrived; chunks for one stream arrive in send order
    Data { id: StreamId, chunk: Bytes },
    /// The peer finished its direction of the stream
    End { id: StreamId },
    /// The stream's idle timer elapsed
    Timeout { id: StreamId },
    /// The stream was force-closed by a protocol violation
    StreamError { id: StreamId, error: Error },
    /// The stream reached its terminal state
    StreamClosed { id: StreamId },
    /// The session failed; every live stream is being closed
    SessionError { error: Error },
    /// The session reached its terminal state
    SessionClosed,
}

/// A multiplexed connection
pub struct Session<T: Transport> {
    transport: T,
    codec: FrameCodec,
    streams: StreamMap,
    role: Role,
    state: SessionState,
    events: VecDeque<Event>,
    session_closed_delivered: bool,
}

impl<T: Transport> Session<T> {
    /// Create a session over an established transport
    pub fn new(transport: T, role: Role) -> Self {
        Session {
            transport,
            codec: FrameCodec::new(),
            streams: StreamMap::new(role == Role::Client),
            role,
            state: SessionState::Open,
            events: VecDeque::new(),
            session_closed_delivered: false,
        }
    }

    /// Session role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Connection-level state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of streams not yet closed
    pub fn active_streams(&self) -> usize {
        self.streams.active_count()
    }

    /// State of one stream, if the session still knows it
    pub fn stream_state(&self, id: StreamId) -> Option<StreamState> {
        self.streams.get(id).map(|s| s.state())
    }

    /// Body bytes accumulated for one stream
    pub fn stream_body(&self, id: StreamId) -> Option<&[u8]> {
        self.streams.get(id).map(|s| s.body())
    }

    /// Take the accumulated body for one stream
    pub fn take_body(&mut self, id: StreamId) -> Option<Bytes> {
        self.streams.get_mut(id).map(|s| s.take_body())
    }

    /// Header set the peer sent on one stream, if finalized
    pub fn remote_headers(&self, id: StreamId) -> Option<&HeaderSet> {
        self.streams.get(id).and_then(|s| s.remote_headers())
    }

    /// Open a stream and send its request header set (client role)
    ///
    /// Allocates the next locally-initiated ID. With `end_stream` the
    /// request carries no body.
    pub fn open_stream(&mut self, headers: HeaderSet, end_stream: bool) -> Result<StreamId> {
        if self.role != Role::Client {
            return Err(Error::InvalidState(
                "only client sessions open streams".to_string(),
            ));
        }
        if self.state != SessionState::Open {
            return Err(Error::SessionClosed);
        }
        headers.validate_request()?;

        let id = self.streams.create_local()?;
        let frame = FrameCodec::encode_headers_frame(&HeadersFrame::new(
            id,
            headers.clone(),
            end_stream,
        ));

        // Stream bookkeeping cannot fail on a freshly created stream
        if let Some(stream) = self.streams.get_mut(id) {
            stream.send_headers(headers, end_stream)?;
        }
        self.write_all(&frame)?;
        Ok(id)
    }

    /// Send the response header set on a stream (server role)
    ///
    /// A second call for the same stream is an `InvalidState` error. A
    /// `date` field is stamped if the application did not set one.
    pub fn respond(&mut self, id: StreamId, headers: HeaderSet, end_stream: bool) -> Result<()> {
        if self.role != Role::Server {
            return Err(Error::InvalidState(
                "only server sessions respond".to_string(),
            ));
        }
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        headers.validate_response()?;

        let mut headers = headers;
        if !headers.contains("date") {
            headers.insert("date", http_date_now());
        }

        let stream = self
            .streams
            .get_mut(id)
            .ok_or(Error::StreamNotFound(id))?;
        stream.send_headers(headers.clone(), end_stream)?;
        let closed = stream.state().is_closed();

        let frame =
            FrameCodec::encode_headers_frame(&HeadersFrame::new(id, headers, end_stream));
        self.write_all(&frame)?;

        if closed {
            self.enqueue_stream_closed(id);
        }
        Ok(())
    }

    /// Send a body chunk on a stream
    ///
    /// Finishing (`end_stream`) restarts an armed idle timer rather than
    /// disabling it; the fresh countdown only fires if the stream stays
    /// open and idle.
    pub fn send_data(&mut self, id: StreamId, data: Bytes, end_stream: bool) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }

        let stream = self
            .streams
            .get_mut(id)
            .ok_or(Error::StreamNotFound(id))?;
        stream.send_data(end_stream)?;
        let closed = stream.state().is_closed();

        let frame = FrameCodec::encode_data_frame(&DataFrame::new(id, data, end_stream));
        self.write_all(&frame)?;

        if closed {
            self.enqueue_stream_closed(id);
        }
        Ok(())
    }

    /// Finish our direction of a stream with an empty final chunk
    pub fn finish(&mut self, id: StreamId) -> Result<()> {
        self.send_data(id, Bytes::new(), true)
    }

    /// Arm the idle timer on a stream
    ///
    /// Re-arming cancels any pending arming. Arming a closed or unknown
    /// stream is a tolerated no-op: the callback is dropped and never
    /// fires. This never fails.
    pub fn set_stream_timeout<F: FnMut() + 'static>(
        &mut self,
        id: StreamId,
        duration: Duration,
        callback: F,
    ) {
        if let Some(stream) = self.streams.get_mut(id) {
            stream.timeout_mut().arm(duration, callback);
        }
    }

    /// Close one stream from the application side
    ///
    /// Idempotent: a stream that already delivered its close event is left
    /// alone, so an explicit close after session teardown never double
    /// fires.
    pub fn close_stream(&mut self, id: StreamId) -> Result<()> {
        let Some(stream) = self.streams.get_mut(id) else {
            return Ok(());
        };

        let was_closed = stream.state().is_closed();
        stream.close();

        if !was_closed && self.state == SessionState::Open {
            // Best effort; the stream is closed locally either way
            let frame =
                FrameCodec::encode_reset_frame(&ResetFrame::new(id, ResetCode::Cancel));
            let _ = self.write_all(&frame);
        }
        self.enqueue_stream_closed(id);
        Ok(())
    }

    /// Graceful close: announce shutdown, close every live stream exactly
    /// once, release the transport
    ///
    /// Already-accumulated stream bodies stay readable. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let frame = FrameCodec::encode_goaway_frame(&GoAwayFrame::new(
            self.streams.highest_remote_id(),
            ResetCode::NoError,
        ));
        // Best effort; teardown proceeds regardless
        let _ = self.write_all(&frame);

        self.teardown(false);
        Ok(())
    }

    /// Abrupt close: discard buffered unread bodies and release the
    /// transport immediately
    pub fn abort(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let frame = FrameCodec::encode_goaway_frame(&GoAwayFrame::new(
            self.streams.highest_remote_id(),
            ResetCode::Cancel,
        ));
        let _ = self.write_all(&frame);

        self.teardown(true);
        Ok(())
    }

    /// Drive the session and return the next event
    ///
    /// Waits up to `timeout` (forever if `None`) on transport readability
    /// or the earliest armed timer deadline, whichever comes first. Returns
    /// `Ok(None)` when the timeout elapses with nothing to deliver, or when
    /// the session is closed and the queue is drained. At least one
    /// transport pass runs even with a zero timeout.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Option<Event>> {
        let started = Instant::now();
        let mut first_pass = true;

        loop {
            if let Some(event) = self.events.pop_front() {
                self.streams.cleanup_closed();
                return Ok(Some(event));
            }
            if self.state == SessionState::Closed {
                return Ok(None);
            }

            let now = Instant::now();
            self.fire_due_timers(now);
            if !self.events.is_empty() {
                continue;
            }

            // A drained Closing session finishes its shutdown
            if self.state == SessionState::Closing && self.streams.active_count() == 0 {
                self.teardown(false);
                continue;
            }

            let remaining = match timeout {
                Some(t) => {
                    let elapsed = now.duration_since(started);
                    if elapsed >= t && !first_pass {
                        return Ok(None);
                    }
                    Some(t.saturating_sub(elapsed))
                }
                None => None,
            };
            first_pass = false;

            let until_deadline = self
                .earliest_deadline()
                .map(|d| d.saturating_duration_since(now));
            let wait = match (remaining, until_deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            };

            let readable = match self.transport.poll(PollEvents::Read, wait) {
                Ok(ready) => ready,
                Err(e) => {
                    self.transport_failed(Error::TransportFailure(e.to_string()));
                    continue;
                }
            };

            if readable {
                let mut buf = [0u8; 4096];
                match self.transport.read(&mut buf) {
                    Ok(0) => {
                        // Peer hung up
                        self.transport_failed(Error::TransportFailure(
                            "connection closed by peer".to_string(),
                        ));
                    }
                    Ok(n) => {
                        self.codec.feed(&buf[..n]);
                        self.drain_frames();
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        self.transport_failed(Error::TransportFailure(e.to_string()));
                    }
                }
            }
        }
    }

    fn drain_frames(&mut self) {
        loop {
            match self.codec.next_frame() {
                Ok(None) => break,
                Ok(Some(Decoded::Frame(frame))) => self.handle_frame(frame),
                Ok(Some(Decoded::Malformed { stream_id, error })) => {
                    self.stream_protocol_error(stream_id, error);
                }
                Err(error) => {
                    // Framing is unrecoverable; the connection is garbage
                    self.transport_failed(error);
                    break;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Headers(f) => self.handle_headers(f),
            Frame::Data(f) => self.handle_data(f),
            Frame::Reset(f) => self.handle_reset(f),
            Frame::GoAway(f) => self.handle_goaway(f),
        }
    }

    fn handle_headers(&mut self, frame: HeadersFrame) {
        let id = frame.stream_id;
        if id == CONNECTION_STREAM_ID {
            self.transport_failed(Error::ProtocolViolation(
                "HEADERS on the connection stream".to_string(),
            ));
            return;
        }

        if self.streams.get(id).is_some() {
            self.handle_headers_existing(id, frame);
        } else {
            self.handle_headers_new(id, frame);
        }
    }

    /// Headers for a stream we already track: the peer's answer
    fn handle_headers_existing(&mut self, id: StreamId, frame: HeadersFrame) {
        let validation = match self.role {
            Role::Client => frame.headers.validate_response(),
            Role::Server => frame.headers.validate_request(),
        };
        if let Err(error) = validation {
            self.stream_protocol_error(id, error);
            return;
        }

        let stream = match self.streams.get_mut(id) {
            Some(s) => s,
            None => return,
        };
        if let Err(error) = stream.recv_headers(frame.headers.clone(), frame.end_stream) {
            self.stream_protocol_error(id, error);
            return;
        }

        self.events.push_back(Event::HeadersReceived {
            id,
            headers: frame.headers,
        });
        if frame.end_stream {
            self.after_remote_end(id);
        }
    }

    /// Headers for an unknown stream ID: a peer-initiated open, or noise
    fn handle_headers_new(&mut self, id: StreamId, frame: HeadersFrame) {
        let our_parity = if self.role == Role::Client { 1 } else { 0 };
        if id % 2 == our_parity {
            // One of ours, already reaped; frames racing a reset are noise
            return;
        }

        if self.role == Role::Client {
            // Peer-initiated streams toward a client are not supported
            self.stream_protocol_error(
                id,
                Error::ProtocolViolation("server-initiated stream".to_string()),
            );
            return;
        }

        if self.state != SessionState::Open {
            // Late open while closing: refuse it
            let reset = FrameCodec::encode_reset_frame(&ResetFrame::new(id, ResetCode::Cancel));
            let _ = self.write_all(&reset);
            return;
        }

        if let Err(error) = frame.headers.validate_request() {
            // Admit so the violation is tracked on the stream, then reject
            let _ = self.streams.admit_remote(id);
            self.stream_protocol_error(id, error);
            return;
        }

        let stream = match self.streams.admit_remote(id) {
            Ok(s) => s,
            Err(error) => {
                self.stream_protocol_error(id, error);
                return;
            }
        };
        if let Err(error) = stream.recv_headers(frame.headers.clone(), frame.end_stream) {
            self.stream_protocol_error(id, error);
            return;
        }

        self.events.push_back(Event::StreamOpened {
            id,
            headers: frame.headers,
        });
        if frame.end_stream {
            self.after_remote_end(id);
        }
    }

    fn handle_data(&mut self, frame: DataFrame) {
        let id = frame.stream_id;
        let stream = match self.streams.get_mut(id) {
            Some(s) => s,
            // Late data for a reaped stream is noise
            None => return,
        };

        if let Err(error) = stream.recv_data(&frame.data, frame.end_stream) {
            self.stream_protocol_error(id, error);
            return;
        }

        if !frame.data.is_empty() {
            self.events.push_back(Event::Data {
                id,
                chunk: frame.data,
            });
        }
        if frame.end_stream {
            self.after_remote_end(id);
        }
    }

    fn handle_reset(&mut self, frame: ResetFrame) {
        let id = frame.stream_id;
        let Some(stream) = self.streams.get_mut(id) else {
            return;
        };

        stream.reset();
        if matches!(
            frame.code,
            ResetCode::ProtocolError | ResetCode::InternalError
        ) {
            self.events.push_back(Event::StreamError {
                id,
                error: Error::ProtocolViolation(format!(
                    "peer reset stream {} with {}",
                    id, frame.code
                )),
            });
        }
        self.enqueue_stream_closed(id);
    }

    fn handle_goaway(&mut self, frame: GoAwayFrame) {
        if frame.code != ResetCode::NoError {
            self.events.push_back(Event::SessionError {
                error: Error::TransportFailure(format!("peer went away with {}", frame.code)),
            });
        }

        if self.state == SessionState::Open {
            self.state = SessionState::Closing;
        }
        // In-flight streams drain; poll finishes the shutdown once the
        // session is idle
        if self.streams.active_count() == 0 {
            self.teardown(false);
        }
    }

    /// Remote direction completed: deliver end, maybe close
    fn after_remote_end(&mut self, id: StreamId) {
        let Some(stream) = self.streams.get_mut(id) else {
            return;
        };

        if stream.mark_end_delivered() {
            self.events.push_back(Event::End { id });
        }
        if self
            .streams
            .get(id)
            .map(|s| s.state().is_closed())
            .unwrap_or(false)
        {
            self.enqueue_stream_closed(id);
        }
    }

    /// Force-close one stream after a protocol violation; siblings are
    /// untouched
    fn stream_protocol_error(&mut self, id: StreamId, error: Error) {
        if self.state == SessionState::Open {
            let reset =
                FrameCodec::encode_reset_frame(&ResetFrame::new(id, ResetCode::ProtocolError));
            // Best effort; the local close happens either way
            let _ = self.write_all(&reset);
        }

        if let Some(stream) = self.streams.get_mut(id) {
            stream.reset();
        }
        self.events.push_back(Event::StreamError { id, error });
        self.enqueue_stream_closed(id);
    }

    /// Transport failure: fatal, abrupt, every live stream closes once
    fn transport_failed(&mut self, error: Error) {
        if self.state == SessionState::Closed {
            return;
        }
        self.events.push_back(Event::SessionError { error });
        self.teardown(true);
    }

    /// Close every live stream exactly once and release the transport
    fn teardown(&mut self, abrupt: bool) {
        for id in self.streams.ids() {
            if let Some(stream) = self.streams.get_mut(id) {
                if abrupt {
                    stream.reset();
                } else {
                    stream.close();
                }
            }
            self.enqueue_stream_closed(id);
        }

        if !self.session_closed_delivered {
            self.session_closed_delivered = true;
            self.events.push_back(Event::SessionClosed);
        }

        let _ = self.transport.close();
        self.state = SessionState::Closed;
    }

    /// Queue the close event for a stream at most once
    fn enqueue_stream_closed(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.get_mut(id) {
            if stream.mark_close_delivered() {
                self.events.push_back(Event::StreamClosed { id });
            }
        }
    }

    fn fire_due_timers(&mut self, now: Instant) {
        for id in self.streams.ids() {
            if let Some(stream) = self.streams.get_mut(id) {
                if stream.timeout_mut().fire_if_due(now) {
                    self.events.push_back(Event::Timeout { id });
                }
            }
        }
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.streams
            .ids()
            .into_iter()
            .filter_map(|id| self.streams.get(id).and_then(|s| s.timeout().deadline()))
            .min()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self
                .transport
                .write(&data[written..])
                .map_err(|e| Error::TransportFailure(e.to_string()))?;
            if n == 0 {
                return Err(Error::TransportFailure(
                    "connection closed during write".to_string(),
                ));
            }
            written += n;
        }
        Ok(())
    }
}

/// Current time as an IMF-fixdate string, e.g. `Sun, 23 Aug 2026 10:00:00 GMT`
fn http_date_now() -> String {
    const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as i64;
    let days = secs.div_euclid(86400);
    let tod = secs.rem_euclid(86400);
    let (hour, minute, second) = (tod / 3600, (tod % 3600) / 60, tod % 60);

    // Epoch day 0 was a Thursday
    let weekday = WEEKDAYS[days.rem_euclid(7) as usize];

    // Civil date from day count (Gregorian, proleptic)
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        weekday, day, MONTHS[(month - 1) as usize], year, hour, minute, second
    )
}
