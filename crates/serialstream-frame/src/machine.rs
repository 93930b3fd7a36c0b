//! Pieces shared by the send and receive state machines.

use serialstream_transport::Transport;
use tracing::debug;

use crate::error::FrameError;
use crate::message::Message;

/// Where a direction is in the wire grammar.
///
/// `Idle → Cmd → Pkts → (Type → Size → Data)* → Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    Cmd,
    Pkts,
    Type,
    Size,
    Data,
}

/// The fixed-width header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Cmd,
    Pkts,
    Type,
    Size,
}

impl From<Stage> for Phase {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Cmd => Phase::Cmd,
            Stage::Pkts => Phase::Pkts,
            Stage::Type => Phase::Type,
            Stage::Size => Phase::Size,
        }
    }
}

/// A one- or two-byte header field partway across the wire.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Field {
    bytes: [u8; 2],
    len: usize,
    done: usize,
}

impl Field {
    /// A single byte to send.
    pub(crate) fn byte(value: u8) -> Self {
        Self {
            bytes: [value, 0],
            len: 1,
            done: 0,
        }
    }

    /// A 16-bit value to send in network order.
    pub(crate) fn word(value: u16) -> Self {
        Self {
            bytes: value.to_be_bytes(),
            len: 2,
            done: 0,
        }
    }

    /// An empty slot of `len` bytes to receive into.
    pub(crate) fn expect(len: usize) -> Self {
        Self {
            bytes: [0; 2],
            len: len.min(2),
            done: 0,
        }
    }

    pub(crate) fn pending(&self) -> &[u8] {
        &self.bytes[self.done..self.len]
    }

    pub(crate) fn pending_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.done..self.len]
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.done = (self.done + n).min(self.len);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.done == self.len
    }

    pub(crate) fn as_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// The received bytes read as a network-order `u16`.
    pub(crate) fn as_word(&self) -> u16 {
        u16::from_be_bytes(self.bytes)
    }
}

/// Progress through a packet payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor {
    done: usize,
    len: usize,
}

impl Cursor {
    pub(crate) fn new(len: usize) -> Self {
        Self { done: 0, len }
    }

    pub(crate) fn range(&self) -> std::ops::Range<usize> {
        self.done..self.len
    }

    pub(crate) fn offset(&self) -> usize {
        self.done
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.done = (self.done + n).min(self.len);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.done == self.len
    }
}

/// Result of completing one state.
pub(crate) enum Step<S> {
    /// Move to the next state.
    Continue(S),
    /// The message is fully transferred; the direction returns to idle.
    Done(Message),
}

/// A transition that may reject the message, handing it back with the reason.
pub(crate) type Transition<S> = std::result::Result<Step<S>, (Message, FrameError)>;

/// One non-blocking write attempt. Transport errors count as zero progress.
pub(crate) fn write_some<T: Transport>(transport: &mut T, pending: &[u8], errors: &mut u64) -> usize {
    if pending.is_empty() {
        return 0;
    }
    match transport.write_some(pending) {
        Ok(n) => n.min(pending.len()),
        Err(err) => {
            *errors += 1;
            debug!(error = %err, "transport write failed; retrying next poll");
            0
        }
    }
}

/// One non-blocking read attempt. Transport errors count as zero progress.
pub(crate) fn read_some<T: Transport>(
    transport: &mut T,
    pending: &mut [u8],
    errors: &mut u64,
) -> usize {
    if pending.is_empty() {
        return 0;
    }
    match transport.read_some(pending) {
        Ok(n) => n.min(pending.len()),
        Err(err) => {
            *errors += 1;
            debug!(error = %err, "transport read failed; retrying next poll");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use serialstream_transport::MemoryTransport;

    use super::*;

    #[test]
    fn field_word_is_network_order() {
        let mut field = Field::word(0x1234);
        assert_eq!(field.pending(), &[0x12, 0x34]);
        field.advance(1);
        assert_eq!(field.pending(), &[0x34]);
        assert!(!field.is_complete());
        field.advance(5);
        assert!(field.is_complete());
        assert!(field.pending().is_empty());
    }

    #[test]
    fn field_receives_in_pieces() {
        let mut field = Field::expect(2);
        field.pending_mut()[0] = 0x01;
        field.advance(1);
        field.pending_mut()[0] = 0x02;
        field.advance(1);
        assert_eq!(field.as_word(), 0x0102);
    }

    #[test]
    fn cursor_tracks_remaining_range() {
        let mut cursor = Cursor::new(10);
        cursor.advance(4);
        assert_eq!(cursor.range(), 4..10);
        assert_eq!(cursor.offset(), 4);
        cursor.advance(6);
        assert!(cursor.is_complete());
        assert!(Cursor::new(0).is_complete());
    }

    #[test]
    fn transport_errors_become_stalls() {
        let mut transport = MemoryTransport::loopback(8);
        let mut errors = 0;

        transport.fail_next_writes(1);
        assert_eq!(write_some(&mut transport, b"ab", &mut errors), 0);
        assert_eq!(errors, 1);
        assert_eq!(write_some(&mut transport, b"ab", &mut errors), 2);

        let mut buf = [0u8; 2];
        transport.fail_next_reads(1);
        assert_eq!(read_some(&mut transport, &mut buf, &mut errors), 0);
        assert_eq!(errors, 2);
        assert_eq!(read_some(&mut transport, &mut buf, &mut errors), 2);
    }

    #[test]
    fn empty_transfers_skip_the_transport() {
        let mut transport = MemoryTransport::loopback(8);
        transport.fail_next_writes(1);
        let mut errors = 0;
        assert_eq!(write_some(&mut transport, &[], &mut errors), 0);
        assert_eq!(errors, 0);
    }
}
