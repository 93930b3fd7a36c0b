use crate::packet::PacketKind;

/// Errors that can occur while building, sending or receiving messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The wire carried a packet kind byte outside the known set.
    #[error("unknown packet kind {0:#04x}")]
    UnknownKind(u8),

    /// A numeric packet's size is not a whole number of 4-byte elements.
    #[error("{kind:?} payload of {size} bytes is not a multiple of 4")]
    MisalignedPayload { kind: PacketKind, size: usize },

    /// The payload exceeds what the wire or the configuration allows.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A message already holds the maximum of 255 packets.
    #[error("message already holds 255 packets")]
    TooManyPackets,
}

pub type Result<T> = std::result::Result<T, FrameError>;
