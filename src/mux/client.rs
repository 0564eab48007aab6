//! Client endpoint
//!
//! A thin wrapper tying a client-role [`Session`] to a [`TcpTransport`].
//! Everything protocol-shaped lives in the session; this type only handles
//! connecting and forwards the stream operations.

use super::error::Result;
use super::headers::HeaderSet;
use super::session::{Event, Role, Session, SessionState};
use super::stream::StreamId;
use crate::net::TcpTransport;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;

/// A connected client
pub struct Client {
    session: Session<TcpTransport>,
}

impl Client {
    /// Connect to a server and start a client-role session
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let transport = TcpTransport::connect(addr)?;
        Ok(Client {
            session: Session::new(transport, Role::Client),
        })
    }

    /// Open a stream and send its request header set
    ///
    /// The stream stays open for a request body; send chunks with
    /// [`send_data`](Self::send_data) and end with [`finish`](Self::finish).
    pub fn request(&mut self, headers: HeaderSet) -> Result<StreamId> {
        self.session.open_stream(headers, false)
    }

    /// Open a stream for a request that carries no body
    pub fn request_without_body(&mut self, headers: HeaderSet) -> Result<StreamId> {
        self.session.open_stream(headers, true)
    }

    /// Send a request body chunk
    pub fn send_data(&mut self, id: StreamId, data: Bytes, end_stream: bool) -> Result<()> {
        self.session.send_data(id, data, end_stream)
    }

    /// Finish the request side of a stream
    pub fn finish(&mut self, id: StreamId) -> Result<()> {
        self.session.finish(id)
    }

    /// Arm the idle timer on a stream; a tolerated no-op once closed
    pub fn set_stream_timeout<F: FnMut() + 'static>(
        &mut self,
        id: StreamId,
        duration: Duration,
        callback: F,
    ) {
        self.session.set_stream_timeout(id, duration, callback)
    }

    /// Drive the session and return the next event
    pub fn poll_event(&mut self, timeout: Option<Duration>) -> Result<Option<Event>> {
        self.session.poll(timeout)
    }

    /// Take the response body accumulated for one stream
    pub fn take_body(&mut self, id: StreamId) -> Option<Bytes> {
        self.session.take_body(id)
    }

    /// Connection-level state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Gracefully close the session; idempotent
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Abruptly close the session, discarding buffered bodies
    pub fn abort(&mut self) -> Result<()> {
        self.session.abort()
    }

    /// Access the underlying session
    pub fn session(&self) -> &Session<TcpTransport> {
        &self.session
    }
}
