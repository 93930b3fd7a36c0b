//! Non-blocking byte transport abstraction.
//!
//! The framing engine never blocks: it asks a [`Transport`] whether there is
//! room to write or data to read, then moves as many bytes as the transport
//! will take in one call. This crate provides:
//! - The [`Transport`] trait itself
//! - An in-memory loopback/duplex transport for tests and demos
//! - A non-blocking adapter over any `Read + Write` stream
//! - Unix domain socket binding (Linux/macOS)

pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use stream::StreamTransport;
pub use traits::Transport;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
