//! Network transport layer
//!
//! The engine never touches sockets directly; it goes through the
//! [`Transport`](transport::Transport) trait so plain TCP and any future
//! encrypted transport share the same multiplexer code.

pub mod transport;

pub use transport::{bind_listener, PollEvents, TcpTransport, Transport};
