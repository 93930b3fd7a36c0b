//! Send direction: serializes one queued message across as many polls as the
//! transport needs.

use crate::machine::{Cursor, Field, Phase, Stage, Step};
use crate::message::Message;
use crate::packet::NUMERIC_WIDTH;

/// Bytes of a borrowed numeric payload converted to network order at a time.
const STAGING_SIZE: usize = 16 * NUMERIC_WIDTH;

/// Network-order copy of the next words of a numeric payload whose buffer is
/// a borrowed view and cannot be converted in place.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Staging {
    bytes: [u8; STAGING_SIZE],
    done: usize,
    len: usize,
}

impl Staging {
    /// Convert the leading words of `payload`, which starts on a word boundary.
    fn load(payload: &[u8]) -> Self {
        let mut bytes = [0; STAGING_SIZE];
        let len = payload.len().min(STAGING_SIZE);
        let words = bytes[..len].chunks_exact_mut(NUMERIC_WIDTH);
        for (dst, src) in words.zip(payload.chunks_exact(NUMERIC_WIDTH)) {
            let host = u32::from_ne_bytes([src[0], src[1], src[2], src[3]]);
            dst.copy_from_slice(&host.to_be_bytes());
        }
        Self { bytes, done: 0, len }
    }

    fn pending(&self) -> &[u8] {
        &self.bytes[self.done..self.len]
    }

    fn advance(&mut self, n: usize) {
        self.done = (self.done + n).min(self.len);
    }

    fn is_drained(&self) -> bool {
        self.done == self.len
    }
}

/// Send machine state. Transfer progress lives inside the variant.
#[derive(Debug, Default)]
pub(crate) enum SendState {
    #[default]
    Idle,
    Header {
        msg: Message,
        index: usize,
        stage: Stage,
        field: Field,
    },
    Data {
        msg: Message,
        index: usize,
        cursor: Cursor,
        staging: Option<Staging>,
    },
}

impl SendState {
    /// Begin a message with its command byte.
    pub(crate) fn start(msg: Message) -> Self {
        SendState::Header {
            field: Field::byte(msg.cmd()),
            msg,
            index: 0,
            stage: Stage::Cmd,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        match self {
            SendState::Idle => Phase::Idle,
            SendState::Header { stage, .. } => (*stage).into(),
            SendState::Data { .. } => Phase::Data,
        }
    }

    pub(crate) fn message(&self) -> Option<&Message> {
        match self {
            SendState::Idle => None,
            SendState::Header { msg, .. } | SendState::Data { msg, .. } => Some(msg),
        }
    }

    /// Bytes of the current state still owed to the wire.
    pub(crate) fn pending(&self) -> &[u8] {
        match self {
            SendState::Idle => &[],
            SendState::Header { field, .. } => field.pending(),
            SendState::Data {
                staging: Some(staging),
                ..
            } => staging.pending(),
            SendState::Data {
                msg,
                index,
                cursor,
                staging: None,
            } => msg
                .packets()
                .get(*index)
                .and_then(|p| p.payload().get(cursor.range()))
                .unwrap_or_default(),
        }
    }

    /// Byte offset reached within the current state.
    pub(crate) fn offset(&self) -> usize {
        match self {
            SendState::Data { cursor, .. } => cursor.offset(),
            _ => 0,
        }
    }

    pub(crate) fn advance(&mut self, n: usize) {
        match self {
            SendState::Idle => {}
            SendState::Header { field, .. } => field.advance(n),
            SendState::Data {
                msg,
                index,
                cursor,
                staging,
            } => {
                cursor.advance(n);
                if let Some(staging) = staging {
                    staging.advance(n);
                    if staging.is_drained() && !cursor.is_complete() {
                        let rest = msg
                            .packets()
                            .get(*index)
                            .and_then(|p| p.payload().get(cursor.range()))
                            .unwrap_or_default();
                        *staging = Staging::load(rest);
                    }
                }
            }
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        match self {
            SendState::Idle => true,
            SendState::Header { field, .. } => field.is_complete(),
            SendState::Data { cursor, .. } => cursor.is_complete(),
        }
    }

    /// Transition after the current state's bytes are all written.
    ///
    /// Outgoing messages are validated when queued, so sending never fails.
    pub(crate) fn complete(self) -> Step<Self> {
        match self {
            SendState::Idle => Step::Continue(SendState::Idle),
            SendState::Header {
                msg,
                index,
                stage: Stage::Cmd,
                ..
            } => Step::Continue(SendState::Header {
                field: Field::byte(msg.packet_count()),
                msg,
                index,
                stage: Stage::Pkts,
            }),
            SendState::Header {
                msg,
                stage: Stage::Pkts,
                ..
            } => {
                if msg.packet_count() == 0 {
                    Step::Done(msg)
                } else {
                    Self::begin_packet(msg, 0)
                }
            }
            SendState::Header {
                msg,
                index,
                stage: Stage::Type,
                ..
            } => {
                let size = msg.packets()[index].byte_size() as u16;
                Step::Continue(SendState::Header {
                    msg,
                    index,
                    stage: Stage::Size,
                    field: Field::word(size),
                })
            }
            SendState::Header {
                mut msg,
                index,
                stage: Stage::Size,
                ..
            } => {
                let packet = &mut msg.packets_mut()[index];
                let cursor = Cursor::new(packet.byte_size());
                let staging = if packet.kind().is_numeric() && !packet.is_owned() {
                    Some(Staging::load(packet.payload()))
                } else {
                    packet.convert_byte_order();
                    None
                };
                Step::Continue(SendState::Data {
                    msg,
                    index,
                    cursor,
                    staging,
                })
            }
            SendState::Data {
                mut msg,
                index,
                staging,
                ..
            } => {
                if staging.is_none() {
                    // Put the payload back in host order for whoever reuses it.
                    msg.packets_mut()[index].convert_byte_order();
                }
                let next = index + 1;
                if next == msg.packets().len() {
                    Step::Done(msg)
                } else {
                    Self::begin_packet(msg, next)
                }
            }
        }
    }

    fn begin_packet(msg: Message, index: usize) -> Step<Self> {
        let kind = msg.packets()[index].kind();
        Step::Continue(SendState::Header {
            msg,
            index,
            stage: Stage::Type,
            field: Field::byte(kind.into()),
        })
    }
}
