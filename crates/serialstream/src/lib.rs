//! Typed message framing for constrained, non-blocking byte streams.
//!
//! serialstream moves command-tagged messages of string, integer and float
//! packets over any duplex byte transport that can do partial, non-blocking
//! reads and writes: a UART, a socket, or an in-memory ring.
//!
//! # Crate Structure
//!
//! - [`transport`]: The non-blocking transport trait and its implementations
//! - [`frame`]: Packets, messages, pools and the polling framing engine

/// Re-export transport types.
pub mod transport {
    pub use serialstream_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serialstream_frame::*;
}
