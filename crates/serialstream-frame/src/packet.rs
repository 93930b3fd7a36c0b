//! Typed payload units.
//!
//! A [`Packet`] is one field of a message: a byte string or a run of 4-byte
//! numbers. Payload bytes are kept in host order; [`Packet::convert_byte_order`]
//! flips numeric payloads to and from network order around the wire.

use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Width in bytes of one numeric element.
pub const NUMERIC_WIDTH: usize = 4;

/// Largest payload a packet can carry (the size field is a `u16`).
pub const MAX_PACKET_PAYLOAD: usize = u16::MAX as usize;

/// Packet type tag, transmitted as a single byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Raw bytes, sent as-is.
    #[default]
    String = 0,
    /// Signed 32-bit integers.
    Int32 = 1,
    /// IEEE-754 single-precision floats.
    Float32 = 2,
}

impl PacketKind {
    /// Size of one element of this kind.
    pub fn element_width(self) -> usize {
        match self {
            PacketKind::String => 1,
            PacketKind::Int32 | PacketKind::Float32 => NUMERIC_WIDTH,
        }
    }

    /// Whether payloads of this kind are byte-order converted on the wire.
    pub fn is_numeric(self) -> bool {
        !matches!(self, PacketKind::String)
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            PacketKind::String => "STRING",
            PacketKind::Int32 => "INT32",
            PacketKind::Float32 => "FLOAT32",
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketKind::String),
            1 => Ok(PacketKind::Int32),
            2 => Ok(PacketKind::Float32),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl From<PacketKind> for u8 {
    fn from(kind: PacketKind) -> Self {
        kind as u8
    }
}

/// Backing storage of a packet.
///
/// `Owned` storage belongs to the packet and is reused across pool cycles.
/// `Shared` is a read-only view of bytes owned elsewhere (static data or a
/// refcounted slice); any mutation copies it into `Owned` storage first.
#[derive(Debug, Clone)]
pub enum PacketBuffer {
    Owned(BytesMut),
    Shared(Bytes),
}

impl PacketBuffer {
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            PacketBuffer::Owned(buf) => &buf[..],
            PacketBuffer::Shared(view) => &view[..],
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, PacketBuffer::Owned(_))
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        PacketBuffer::Owned(BytesMut::new())
    }
}

/// One typed, sized field of a message.
#[derive(Debug, Default)]
pub struct Packet {
    kind: PacketKind,
    byte_size: u16,
    buffer: PacketBuffer,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Payload size in bytes as transmitted.
    pub fn byte_size(&self) -> usize {
        usize::from(self.byte_size)
    }

    /// Size of the current backing storage.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the backing storage belongs to this packet.
    pub fn is_owned(&self) -> bool {
        self.buffer.is_owned()
    }

    /// Number of elements: bytes for strings, 4-byte words for numbers.
    pub fn element_count(&self) -> usize {
        self.byte_size() / self.kind.element_width()
    }

    /// The payload bytes, in host order.
    pub fn payload(&self) -> &[u8] {
        self.buffer
            .as_slice()
            .get(..self.byte_size())
            .unwrap_or_default()
    }

    /// Ensure owned storage of at least `byte_size` bytes.
    ///
    /// Grows by discarding the old storage and allocating exactly
    /// `byte_size` bytes; never shrinks. A shared view that is already
    /// large enough is copied into owned storage.
    pub fn resize_buffer(&mut self) {
        let needed = self.byte_size();
        match &self.buffer {
            PacketBuffer::Owned(buf) if buf.len() >= needed => return,
            PacketBuffer::Shared(view) if view.len() >= needed => {
                self.buffer = PacketBuffer::Owned(BytesMut::from(&view[..]));
                return;
            }
            _ => {}
        }
        self.buffer = PacketBuffer::Owned(BytesMut::zeroed(needed));
    }

    /// Swap each numeric element between host and network byte order.
    ///
    /// A no-op for strings. Applying it twice restores the original bytes.
    pub fn convert_byte_order(&mut self) {
        if !self.kind.is_numeric() {
            return;
        }
        for word in self.payload_mut().chunks_exact_mut(NUMERIC_WIDTH) {
            let host = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
            word.copy_from_slice(&host.to_be_bytes());
        }
    }

    /// Replace the contents with a byte string.
    pub fn set_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.load(PacketKind::String, bytes.len())?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Replace the contents with UTF-8 text.
    pub fn set_str(&mut self, text: &str) -> Result<()> {
        self.set_bytes(text.as_bytes())
    }

    /// Replace the contents with 32-bit integers.
    pub fn set_i32s(&mut self, values: &[i32]) -> Result<()> {
        let payload = self.load(PacketKind::Int32, values.len() * NUMERIC_WIDTH)?;
        for (word, value) in payload.chunks_exact_mut(NUMERIC_WIDTH).zip(values) {
            word.copy_from_slice(&value.to_ne_bytes());
        }
        Ok(())
    }

    /// Replace the contents with 32-bit floats.
    pub fn set_f32s(&mut self, values: &[f32]) -> Result<()> {
        let payload = self.load(PacketKind::Float32, values.len() * NUMERIC_WIDTH)?;
        for (word, value) in payload.chunks_exact_mut(NUMERIC_WIDTH).zip(values) {
            word.copy_from_slice(&value.to_ne_bytes());
        }
        Ok(())
    }

    /// Point the packet at bytes owned elsewhere, without copying.
    ///
    /// Numeric payloads must already be in host order. Sending leaves the
    /// view borrowed; any mutation, including [`convert_byte_order`] and
    /// reuse as a receive target, copies it into owned storage.
    ///
    /// [`convert_byte_order`]: Packet::convert_byte_order
    pub fn set_shared(&mut self, kind: PacketKind, bytes: Bytes) -> Result<()> {
        check_size(kind, bytes.len(), MAX_PACKET_PAYLOAD)?;
        self.kind = kind;
        self.byte_size = bytes.len() as u16;
        self.buffer = PacketBuffer::Shared(bytes);
        Ok(())
    }

    /// The payload as text, if this is a UTF-8 string packet.
    pub fn as_str(&self) -> Option<&str> {
        match self.kind {
            PacketKind::String => std::str::from_utf8(self.payload()).ok(),
            _ => None,
        }
    }

    /// The payload read as host-order 32-bit integers.
    pub fn i32s(&self) -> impl Iterator<Item = i32> + '_ {
        self.payload()
            .chunks_exact(NUMERIC_WIDTH)
            .map(|w| i32::from_ne_bytes([w[0], w[1], w[2], w[3]]))
    }

    /// The payload read as host-order 32-bit floats.
    pub fn f32s(&self) -> impl Iterator<Item = f32> + '_ {
        self.payload()
            .chunks_exact(NUMERIC_WIDTH)
            .map(|w| f32::from_ne_bytes([w[0], w[1], w[2], w[3]]))
    }

    /// Check the size against `max_payload` and the element width.
    pub fn validate(&self, max_payload: usize) -> Result<()> {
        check_size(self.kind, self.byte_size(), max_payload)
    }

    pub(crate) fn set_kind(&mut self, kind: PacketKind) {
        self.kind = kind;
    }

    /// Record the size read off the wire and make room for the payload.
    pub(crate) fn set_wire_size(&mut self, byte_size: u16) {
        self.byte_size = byte_size;
        self.resize_buffer();
    }

    pub(crate) fn payload_mut(&mut self) -> &mut [u8] {
        self.resize_buffer();
        let len = self.byte_size();
        match &mut self.buffer {
            PacketBuffer::Owned(buf) => &mut buf[..len],
            PacketBuffer::Shared(_) => &mut [],
        }
    }

    fn load(&mut self, kind: PacketKind, len: usize) -> Result<&mut [u8]> {
        check_size(kind, len, MAX_PACKET_PAYLOAD)?;
        if !self.buffer.is_owned() {
            self.buffer = PacketBuffer::default();
        }
        self.kind = kind;
        self.byte_size = len as u16;
        Ok(self.payload_mut())
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.payload() == other.payload()
    }
}

pub(crate) fn check_size(kind: PacketKind, size: usize, max_payload: usize) -> Result<()> {
    let max = max_payload.min(MAX_PACKET_PAYLOAD);
    if size > max {
        return Err(FrameError::PayloadTooLarge { size, max });
    }
    if size % kind.element_width() != 0 {
        return Err(FrameError::MisalignedPayload { kind, size });
    }
    Ok(())
}
