//! Receive direction: rebuilds one message at a time from whatever bytes the
//! transport has on each poll.

use crate::machine::{Cursor, Field, Phase, Stage, Step, Transition};
use crate::message::Message;
use crate::packet::{check_size, PacketKind};
use crate::pool::PacketPool;

/// Receive machine state. Transfer progress lives inside the variant.
#[derive(Debug, Default)]
pub(crate) enum RecvState {
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
    },
}

impl RecvState {
    /// Begin filling `msg`, starting with its command byte.
    pub(crate) fn start(msg: Message) -> Self {
        RecvState::Header {
            msg,
            index: 0,
            stage: Stage::Cmd,
            field: Field::expect(1),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        match self {
            RecvState::Idle => Phase::Idle,
            RecvState::Header { stage, .. } => (*stage).into(),
            RecvState::Data { .. } => Phase::Data,
        }
    }

    pub(crate) fn message(&self) -> Option<&Message> {
        match self {
            RecvState::Idle => None,
            RecvState::Header { msg, .. } | RecvState::Data { msg, .. } => Some(msg),
        }
    }

    /// Space in the current state still waiting for bytes.
    pub(crate) fn pending_mut(&mut self) -> &mut [u8] {
        match self {
            RecvState::Idle => &mut [],
            RecvState::Header { field, .. } => field.pending_mut(),
            RecvState::Data { msg, index, cursor } => match msg.packet_mut(*index) {
                Some(packet) => &mut packet.payload_mut()[cursor.range()],
                None => &mut [],
            },
        }
    }

    pub(crate) fn advance(&mut self, n: usize) {
        match self {
            RecvState::Idle => {}
            RecvState::Header { field, .. } => field.advance(n),
            RecvState::Data { cursor, .. } => cursor.advance(n),
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        match self {
            RecvState::Idle => true,
            RecvState::Header { field, .. } => field.is_complete(),
            RecvState::Data { cursor, .. } => cursor.is_complete(),
        }
    }

    /// Transition after the current state's bytes have all arrived.
    ///
    /// Packets are drawn from `pool` once the count is known. A kind byte
    /// outside the known set, or a size that is misaligned or above
    /// `max_payload`, fails the message.
    pub(crate) fn complete(self, pool: &PacketPool, max_payload: usize) -> Transition<Self> {
        match self {
            RecvState::Idle => Ok(Step::Continue(RecvState::Idle)),
            RecvState::Header {
                mut msg,
                index,
                stage: Stage::Cmd,
                field,
            } => {
                msg.set_cmd(field.as_byte());
                Ok(Step::Continue(RecvState::Header {
                    msg,
                    index,
                    stage: Stage::Pkts,
                    field: Field::expect(1),
                }))
            }
            RecvState::Header {
                mut msg,
                stage: Stage::Pkts,
                field,
                ..
            } => {
                let count = field.as_byte();
                msg.set_packet_count(count, pool);
                if count == 0 {
                    Ok(Step::Done(msg))
                } else {
                    Ok(Self::begin_packet(msg, 0))
                }
            }
            RecvState::Header {
                mut msg,
                index,
                stage: Stage::Type,
                field,
            } => match PacketKind::try_from(field.as_byte()) {
                Ok(kind) => {
                    msg.packets_mut()[index].set_kind(kind);
                    Ok(Step::Continue(RecvState::Header {
                        msg,
                        index,
                        stage: Stage::Size,
                        field: Field::expect(2),
                    }))
                }
                Err(err) => Err((msg, err)),
            },
            RecvState::Header {
                mut msg,
                index,
                stage: Stage::Size,
                field,
            } => {
                let size = field.as_word();
                let packet = &mut msg.packets_mut()[index];
                if let Err(err) = check_size(packet.kind(), usize::from(size), max_payload) {
                    return Err((msg, err));
                }
                packet.set_wire_size(size);
                Ok(Step::Continue(RecvState::Data {
                    msg,
                    index,
                    cursor: Cursor::new(usize::from(size)),
                }))
            }
            RecvState::Data { mut msg, index, .. } => {
                msg.packets_mut()[index].convert_byte_order();
                let next = index + 1;
                if next == msg.packets().len() {
                    Ok(Step::Done(msg))
                } else {
                    Ok(Self::begin_packet(msg, next))
                }
            }
        }
    }

    fn begin_packet(msg: Message, index: usize) -> Step<Self> {
        Step::Continue(RecvState::Header {
            msg,
            index,
            stage: Stage::Type,
            field: Field::expect(1),
        })
    }
}
