use std::fmt;

use crate::error::{FrameError, Result};
use crate::packet::Packet;
use crate::pool::PacketPool;

/// Most packets a message can carry (the count is sent as one byte).
pub const MAX_PACKETS: usize = u8::MAX as usize;

/// Bytes of framing ahead of the packets: command and packet count.
pub const MESSAGE_HEADER_SIZE: usize = 2;

/// Bytes of framing ahead of each payload: kind and big-endian size.
pub const PACKET_HEADER_SIZE: usize = 3;

/// A command id plus an ordered run of packets.
///
/// Packets come from, and go back to, a [`PacketPool`]. A message released
/// to a message pool keeps its packets so the next user can reuse their
/// storage. Dropping a message returns its packets to the pool they were
/// drawn from.
#[derive(Default)]
pub struct Message {
    cmd: u8,
    packets: Vec<Packet>,
    pool: Option<PacketPool>,
}

impl Message {
    pub fn new(cmd: u8) -> Self {
        Self {
            cmd,
            packets: Vec::new(),
            pool: None,
        }
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn set_cmd(&mut self, cmd: u8) {
        self.cmd = cmd;
    }

    pub fn packet_count(&self) -> u8 {
        self.packets.len() as u8
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn packets_mut(&mut self) -> &mut [Packet] {
        &mut self.packets
    }

    pub fn packet(&self, index: usize) -> Option<&Packet> {
        self.packets.get(index)
    }

    pub fn packet_mut(&mut self, index: usize) -> Option<&mut Packet> {
        self.packets.get_mut(index)
    }

    /// Grow or shrink to exactly `count` packets.
    ///
    /// Growth checks packets out of `pool`; shrinking releases them from the
    /// tail. Retained packets are untouched.
    pub fn set_packet_count(&mut self, count: u8, pool: &PacketPool) {
        self.attach(pool);
        let count = usize::from(count);
        while self.packets.len() < count {
            self.packets.push(pool.checkout());
        }
        while self.packets.len() > count {
            if let Some(packet) = self.packets.pop() {
                pool.release(packet);
            }
        }
    }

    /// Append one packet from `pool` and return it for filling in.
    pub fn push_packet(&mut self, pool: &PacketPool) -> Result<&mut Packet> {
        if self.packets.len() >= MAX_PACKETS {
            return Err(FrameError::TooManyPackets);
        }
        self.attach(pool);
        self.packets.push(pool.checkout());
        let last = self.packets.len() - 1;
        Ok(&mut self.packets[last])
    }

    /// Total encoded length on the wire.
    pub fn wire_size(&self) -> usize {
        MESSAGE_HEADER_SIZE
            + self
                .packets
                .iter()
                .map(|p| PACKET_HEADER_SIZE + p.byte_size())
                .sum::<usize>()
    }

    /// Check every packet against `max_payload` and its element width.
    pub fn validate(&self, max_payload: usize) -> Result<()> {
        self.packets
            .iter()
            .try_for_each(|p| p.validate(max_payload))
    }

    /// Remember where packets go on drop. An empty message follows the
    /// newest pool; one holding packets stays with the pool it has.
    fn attach(&mut self, pool: &PacketPool) {
        match &self.pool {
            Some(current) if current.same_pool(pool) => {}
            Some(_) if !self.packets.is_empty() => {}
            _ => self.pool = Some(pool.clone()),
        }
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.release_all(self.packets.drain(..));
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.cmd == other.cmd && self.packets == other.packets
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("cmd", &self.cmd)
            .field("packets", &self.packets)
            .finish()
    }
}
