//! Resumable message framing over non-blocking byte transports.
//!
//! A message is a one-byte command id followed by up to 255 typed packets:
//!
//! ```text
//! Message := cmd:u8  count:u8  Packet{count}
//! Packet  := kind:u8 size:u16(BE) payload:size bytes
//! ```
//!
//! Numeric payloads (`INT32`, `FLOAT32`) travel as big-endian 4-byte words.
//! The [`Engine`] moves at most one partial transfer per direction on each
//! [`Engine::poll`], so it can sit inside any cooperative scheduler loop and
//! never blocks. Packets and messages are recycled through LIFO pools; after
//! warm-up, steady-state traffic allocates nothing.

pub mod engine;
pub mod error;
pub mod machine;
pub mod message;
pub mod packet;
pub mod pool;
mod recv;
mod send;

pub use engine::{Engine, EngineConfig, EngineStats, PoolCensus, DEFAULT_QUEUE_CAPACITY};
pub use error::{FrameError, Result};
pub use machine::Phase;
pub use message::{Message, MAX_PACKETS, MESSAGE_HEADER_SIZE, PACKET_HEADER_SIZE};
pub use packet::{Packet, PacketBuffer, PacketKind, MAX_PACKET_PAYLOAD, NUMERIC_WIDTH};
pub use pool::{MessagePool, PacketPool, Pool};
