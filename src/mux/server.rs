//! Server endpoint
//!
//! Binds a listening socket and turns each accepted connection into a
//! server-role [`Session`]. Connections are independent; callers decide how
//! to schedule them (the tests run one thread per connection).

use super::error::Result;
use super::session::{Role, Session};
use crate::net::{bind_listener, TcpTransport};
use std::net::{SocketAddr, TcpListener};

/// A listening server
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind a listener; port 0 picks an ephemeral port
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = bind_listener(addr)?;
        Ok(Server { listener })
    }

    /// The bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one connection as a server-role session
    pub fn accept(&self) -> Result<Session<TcpTransport>> {
        let (stream, _peer) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        Ok(Session::new(TcpTransport::new(stream), Role::Server))
    }
}
