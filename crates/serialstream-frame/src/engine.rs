//! The framing engine: queues, pools and both state machines behind one
//! polling entry point.

use std::collections::VecDeque;

use serialstream_transport::Transport;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::machine::{self, Phase, Step};
use crate::message::Message;
use crate::packet::MAX_PACKET_PAYLOAD;
use crate::pool::{MessagePool, PacketPool};
use crate::recv::RecvState;
use crate::send::SendState;

/// Default initial capacity of the send and receive queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Configuration for the framing engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest packet payload accepted in either direction. Default: 65535.
    pub max_payload_size: u16,
    /// Messages created up front in each message pool.
    pub prefill_messages: usize,
    /// Packets created up front in the packet pool.
    pub prefill_packets: usize,
    /// Initial capacity of each queue.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PACKET_PAYLOAD as u16,
            prefill_messages: 0,
            prefill_packets: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Counters accumulated across polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    /// Polls where a busy send direction moved no bytes.
    pub write_stalls: u64,
    /// Polls where a busy receive direction moved no bytes.
    pub read_stalls: u64,
    /// Transport calls that returned an error (treated as stalls).
    pub transport_errors: u64,
    /// Messages dropped because their wire data failed validation.
    pub rejected: u64,
}

/// Where the engine's packets are right now.
///
/// With no messages checked out by the caller,
/// `packets_allocated == packets_pooled + packets_held`. A message the caller
/// drops instead of recycling hands its packets straight back to the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCensus {
    /// Packets ever created by the packet pool.
    pub packets_allocated: usize,
    /// Packets waiting in the packet pool.
    pub packets_pooled: usize,
    /// Packets attached to messages the engine holds (queues, pools, in flight).
    pub packets_held: usize,
    pub send_messages_pooled: usize,
    pub recv_messages_pooled: usize,
}

/// Drives the wire protocol over a non-blocking [`Transport`].
///
/// Each [`poll`](Engine::poll) makes at most one transfer attempt per
/// direction. Sending and receiving are independent; each direction handles
/// one message at a time and resumes exactly where the last poll stopped.
pub struct Engine<T> {
    transport: T,
    config: EngineConfig,
    send_queue: VecDeque<Message>,
    recv_queue: VecDeque<Message>,
    send_pool: MessagePool,
    recv_pool: MessagePool,
    packet_pool: PacketPool,
    send: SendState,
    recv: RecvState,
    stats: EngineStats,
}

impl<T: Transport> Engine<T> {
    /// Create an engine with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(transport: T, config: EngineConfig) -> Self {
        Self {
            transport,
            send_queue: VecDeque::with_capacity(config.queue_capacity),
            recv_queue: VecDeque::with_capacity(config.queue_capacity),
            send_pool: MessagePool::with_prefill(config.prefill_messages),
            recv_pool: MessagePool::with_prefill(config.prefill_messages),
            packet_pool: PacketPool::with_prefill(config.prefill_packets),
            send: SendState::Idle,
            recv: RecvState::Idle,
            stats: EngineStats::default(),
            config,
        }
    }

    /// Check out a message for sending, sized to `packet_count` packets.
    ///
    /// Recycled packets keep their previous contents; fill each one before
    /// enqueueing.
    pub fn compose(&mut self, cmd: u8, packet_count: u8) -> Message {
        let mut msg = self.send_pool.checkout();
        msg.set_cmd(cmd);
        msg.set_packet_count(packet_count, &self.packet_pool);
        msg
    }

    /// The packet pool, for resizing messages outside [`compose`](Engine::compose).
    pub fn packet_pool(&self) -> &PacketPool {
        &self.packet_pool
    }

    /// Queue a message for sending. The engine owns it until it is sent.
    ///
    /// A message with an invalid packet is rejected and recycled.
    pub fn enqueue_send(&mut self, msg: Message) -> Result<()> {
        if let Err(err) = msg.validate(usize::from(self.config.max_payload_size)) {
            warn!(cmd = msg.cmd(), error = %err, "rejecting outgoing message");
            self.send_pool.release(msg);
            return Err(err);
        }
        trace!(cmd = msg.cmd(), queued = self.send_queue.len() + 1, "message queued");
        self.send_queue.push_back(msg);
        Ok(())
    }

    /// Take the oldest fully received message, if any.
    pub fn dequeue_received(&mut self) -> Option<Message> {
        self.recv_queue.pop_front()
    }

    /// Hand a consumed message back for reuse by the receive side.
    pub fn recycle_received(&mut self, msg: Message) {
        self.recv_pool.release(msg);
    }

    /// Advance both directions by at most one transfer each.
    ///
    /// Transport errors are treated as zero progress. Returns an error when
    /// incoming wire data is rejected; the partial message is recycled and
    /// the receive side starts over on the next byte.
    pub fn poll(&mut self) -> Result<()> {
        self.poll_send();
        self.poll_recv()
    }

    fn poll_send(&mut self) {
        let busy = !matches!(self.send, SendState::Idle);
        // A state with nothing left to write needs no transport capacity.
        if !self.transport.can_write() && !(busy && self.send.is_complete()) {
            if busy {
                self.stats.write_stalls += 1;
            }
            return;
        }

        self.send = match std::mem::take(&mut self.send) {
            SendState::Idle => match self.send_queue.pop_front() {
                Some(msg) => {
                    debug!(cmd = msg.cmd(), packets = msg.packet_count(), "send started");
                    SendState::start(msg)
                }
                None => SendState::Idle,
            },
            mut state => {
                let written = machine::write_some(
                    &mut self.transport,
                    state.pending(),
                    &mut self.stats.transport_errors,
                );
                state.advance(written);
                self.stats.bytes_written += written as u64;

                if !state.is_complete() {
                    if written == 0 {
                        self.stats.write_stalls += 1;
                        trace!(phase = ?state.phase(), offset = state.offset(), "send stalled");
                    }
                    state
                } else {
                    match state.complete() {
                        Step::Continue(next) => next,
                        Step::Done(msg) => {
                            self.stats.messages_sent += 1;
                            debug!(cmd = msg.cmd(), packets = msg.packet_count(), "send complete");
                            self.send_pool.release(msg);
                            SendState::Idle
                        }
                    }
                }
            }
        };
    }

    fn poll_recv(&mut self) -> Result<()> {
        let busy = !matches!(self.recv, RecvState::Idle);
        if !self.transport.can_read() && !(busy && self.recv.is_complete()) {
            if busy {
                self.stats.read_stalls += 1;
            }
            return Ok(());
        }

        let mut failure = None;
        self.recv = match std::mem::take(&mut self.recv) {
            RecvState::Idle => RecvState::start(self.recv_pool.checkout()),
            mut state => {
                let read = machine::read_some(
                    &mut self.transport,
                    state.pending_mut(),
                    &mut self.stats.transport_errors,
                );
                state.advance(read);
                self.stats.bytes_read += read as u64;

                if !state.is_complete() {
                    if read == 0 {
                        self.stats.read_stalls += 1;
                        trace!(phase = ?state.phase(), "receive stalled");
                    }
                    state
                } else {
                    let max_payload = usize::from(self.config.max_payload_size);
                    match state.complete(&self.packet_pool, max_payload) {
                        Ok(Step::Continue(next)) => next,
                        Ok(Step::Done(msg)) => {
                            self.stats.messages_received += 1;
                            debug!(cmd = msg.cmd(), packets = msg.packet_count(), "receive complete");
                            self.recv_queue.push_back(msg);
                            RecvState::Idle
                        }
                        Err((msg, err)) => {
                            self.stats.rejected += 1;
                            warn!(cmd = msg.cmd(), error = %err, "rejecting incoming message");
                            self.recv_pool.release(msg);
                            failure = Some(err);
                            RecvState::Idle
                        }
                    }
                }
            }
        };

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Current phase of the send direction.
    pub fn send_phase(&self) -> Phase {
        self.send.phase()
    }

    /// Current phase of the receive direction.
    pub fn recv_phase(&self) -> Phase {
        self.recv.phase()
    }

    /// Messages waiting to be sent, not counting one in flight.
    pub fn pending_sends(&self) -> usize {
        self.send_queue.len()
    }

    /// Received messages waiting to be dequeued.
    pub fn pending_received(&self) -> usize {
        self.recv_queue.len()
    }

    /// Whether there is nothing left to send and nothing half-received.
    pub fn is_idle(&self) -> bool {
        self.send_queue.is_empty()
            && matches!(self.send, SendState::Idle)
            && matches!(self.recv, RecvState::Idle)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Account for every packet the engine knows about.
    pub fn census(&self) -> PoolCensus {
        let held = self
            .send_queue
            .iter()
            .chain(self.recv_queue.iter())
            .chain(self.send_pool.iter())
            .chain(self.recv_pool.iter())
            .chain(self.send.message())
            .chain(self.recv.message())
            .map(|msg| msg.packets().len())
            .sum::<usize>();

        PoolCensus {
            packets_allocated: self.packet_pool.allocated(),
            packets_pooled: self.packet_pool.len(),
            packets_held: held,
            send_messages_pooled: self.send_pool.len(),
            recv_messages_pooled: self.recv_pool.len(),
        }
    }

    /// Current engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Borrow the transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the engine and return the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T> std::fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("send", &self.send.phase())
            .field("recv", &self.recv.phase())
            .field("pending_sends", &self.send_queue.len())
            .field("pending_received", &self.recv_queue.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serialstream_transport::MemoryTransport;

    use super::*;
    use crate::error::FrameError;

    fn run_until_received(engine: &mut Engine<MemoryTransport>, max_polls: usize) -> Message {
        for _ in 0..max_polls {
            engine.poll().unwrap();
            if let Some(msg) = engine.dequeue_received() {
                return msg;
            }
        }
        panic!("no message after {max_polls} polls");
    }

    #[test]
    fn loopback_roundtrip() {
        let mut engine = Engine::new(MemoryTransport::loopback(64));
        let mut msg = engine.compose(3, 2);
        msg.packet_mut(0).unwrap().set_i32s(&[-1, 2]).unwrap();
        msg.packet_mut(1).unwrap().set_str("ok").unwrap();
        engine.enqueue_send(msg).unwrap();

        let received = run_until_received(&mut engine, 64);
        assert_eq!(received.cmd(), 3);
        assert_eq!(received.packets()[0].i32s().collect::<Vec<_>>(), vec![-1, 2]);
        assert_eq!(received.packets()[1].as_str(), Some("ok"));
        engine.recycle_received(received);

        let stats = engine.stats();
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_received, 1);
        assert_eq!(stats.bytes_written, stats.bytes_read);
        assert!(engine.is_idle());
    }

    #[test]
    fn sent_messages_return_to_send_pool() {
        let mut engine = Engine::new(MemoryTransport::loopback(64));
        let msg = engine.compose(1, 1);
        engine.enqueue_send(msg).unwrap();
        let received = run_until_received(&mut engine, 32);
        engine.recycle_received(received);

        let census = engine.census();
        assert_eq!(census.send_messages_pooled, 1);
        assert_eq!(census.recv_messages_pooled, 1);

        let again = engine.compose(2, 0);
        assert_eq!(engine.census().send_messages_pooled, 0);
        assert_eq!(again.cmd(), 2);
    }

    #[test]
    fn invalid_outgoing_message_is_rejected() {
        let config = EngineConfig {
            max_payload_size: 4,
            ..EngineConfig::default()
        };
        let mut engine = Engine::with_config(MemoryTransport::loopback(64), config);
        let mut msg = engine.compose(1, 1);
        msg.packet_mut(0).unwrap().set_str("too long").unwrap();

        let err = engine.enqueue_send(msg).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 8, max: 4 }));
        assert_eq!(engine.pending_sends(), 0);
        assert_eq!(engine.census().send_messages_pooled, 1);
    }

    #[test]
    fn unknown_kind_on_the_wire_is_reported() {
        let mut engine = Engine::new(MemoryTransport::loopback(64));
        engine.get_mut().inject_inbound(&[1, 1, 0xEE]);

        let mut failure = None;
        for _ in 0..8 {
            if let Err(err) = engine.poll() {
                failure = Some(err);
                break;
            }
        }
        assert!(matches!(failure, Some(FrameError::UnknownKind(0xEE))));
        assert_eq!(engine.recv_phase(), Phase::Idle);
        assert_eq!(engine.stats().rejected, 1);
        assert_eq!(engine.census().recv_messages_pooled, 1);
    }

    #[test]
    fn transport_errors_stall_without_losing_bytes() {
        let mut engine = Engine::new(MemoryTransport::loopback(64));
        let mut msg = engine.compose(9, 1);
        msg.packet_mut(0).unwrap().set_str("abc").unwrap();
        engine.enqueue_send(msg).unwrap();

        engine.get_mut().fail_next_writes(3);
        engine.get_mut().fail_next_reads(2);

        let received = run_until_received(&mut engine, 64);
        assert_eq!(received.packets()[0].as_str(), Some("abc"));
        assert_eq!(engine.stats().transport_errors, 5);
        assert!(engine.stats().write_stalls >= 3);
    }

    #[test]
    fn prefill_avoids_allocation() {
        let config = EngineConfig {
            prefill_messages: 2,
            prefill_packets: 4,
            ..EngineConfig::default()
        };
        let mut engine = Engine::with_config(MemoryTransport::loopback(64), config);

        for round in 0..3u8 {
            let msg = engine.compose(round, 2);
            engine.enqueue_send(msg).unwrap();
            let received = run_until_received(&mut engine, 64);
            engine.recycle_received(received);
        }

        let census = engine.census();
        assert_eq!(census.packets_allocated, 4);
        assert_eq!(
            census.packets_allocated,
            census.packets_pooled + census.packets_held
        );
    }

    #[test]
    fn dropped_received_messages_return_packets() {
        let mut engine = Engine::new(MemoryTransport::loopback(64));
        let mut allocated_after_first = None;

        for round in 0..3u8 {
            let mut msg = engine.compose(round, 2);
            msg.packet_mut(0).unwrap().set_str("drop").unwrap();
            msg.packet_mut(1).unwrap().set_i32s(&[i32::from(round)]).unwrap();
            engine.enqueue_send(msg).unwrap();

            let received = run_until_received(&mut engine, 64);
            assert_eq!(received.packets()[1].i32s().next(), Some(i32::from(round)));
            drop(received);

            let census = engine.census();
            assert_eq!(
                census.packets_allocated,
                census.packets_pooled + census.packets_held
            );
            match allocated_after_first {
                None => allocated_after_first = Some(census.packets_allocated),
                Some(first) => assert_eq!(census.packets_allocated, first),
            }
        }

        let census = engine.census();
        assert_eq!(census.packets_allocated, 4);
        assert_eq!(census.packets_pooled, 2);
        assert_eq!(census.packets_held, 2);
    }

    #[test]
    fn debug_shows_phases() {
        let engine = Engine::new(MemoryTransport::loopback(8));
        let text = format!("{engine:?}");
        assert!(text.contains("Idle"));
    }
}
