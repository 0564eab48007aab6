//! muxlink - Multiplexed Request/Response Protocol Engine
//!
//! This crate provides a session/stream multiplexing engine with per-stream
//! idle-timeout management over an ordered byte transport.

pub mod mux;
pub mod net;
