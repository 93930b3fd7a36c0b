//! In-memory transport for tests, demos and loopback wiring.
//!
//! Each direction is a bounded byte ring. A loopback transport shares one
//! ring between its outbound and inbound sides; a pair cross-connects two
//! endpoints. Everything is single-threaded (`Rc<RefCell<_>>`), matching the
//! cooperative polling model of the engine.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Default ring capacity per direction.
pub const DEFAULT_RING_CAPACITY: usize = 64;

#[derive(Debug)]
struct Ring {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl Ring {
    fn shared(capacity: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }))
    }

    fn free(&self) -> usize {
        self.capacity.saturating_sub(self.bytes.len())
    }
}

/// A bounded, single-threaded in-memory transport with fault injection.
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: Rc<RefCell<Ring>>,
    inbound: Rc<RefCell<Ring>>,
    writes_paused: bool,
    reads_paused: bool,
    max_chunk: Option<usize>,
    failing_writes: usize,
    failing_reads: usize,
}

impl MemoryTransport {
    fn with_rings(outbound: Rc<RefCell<Ring>>, inbound: Rc<RefCell<Ring>>) -> Self {
        Self {
            outbound,
            inbound,
            writes_paused: false,
            reads_paused: false,
            max_chunk: None,
            failing_writes: 0,
            failing_reads: 0,
        }
    }

    /// A transport whose writes come back out of its own reads.
    pub fn loopback(capacity: usize) -> Self {
        let ring = Ring::shared(capacity);
        Self::with_rings(Rc::clone(&ring), ring)
    }

    /// Two endpoints wired to each other: what one writes, the other reads.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let a_to_b = Ring::shared(capacity);
        let b_to_a = Ring::shared(capacity);
        let a = Self::with_rings(Rc::clone(&a_to_b), Rc::clone(&b_to_a));
        let b = Self::with_rings(b_to_a, a_to_b);
        (a, b)
    }

    /// Make `can_write` report false until [`resume_writes`](Self::resume_writes).
    pub fn pause_writes(&mut self) {
        self.writes_paused = true;
    }

    pub fn resume_writes(&mut self) {
        self.writes_paused = false;
    }

    /// Make `can_read` report false until [`resume_reads`](Self::resume_reads).
    pub fn pause_reads(&mut self) {
        self.reads_paused = true;
    }

    pub fn resume_reads(&mut self) {
        self.reads_paused = false;
    }

    /// Cap the number of bytes moved by a single call. `None` removes the cap.
    pub fn set_max_chunk(&mut self, max_chunk: Option<usize>) {
        self.max_chunk = max_chunk.map(|n| n.max(1));
    }

    /// Fail the next `count` calls to `write_some`.
    pub fn fail_next_writes(&mut self, count: usize) {
        self.failing_writes = count;
    }

    /// Fail the next `count` calls to `read_some`.
    pub fn fail_next_reads(&mut self, count: usize) {
        self.failing_reads = count;
    }

    /// Bytes written but not yet read by the other side.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.borrow().bytes.len()
    }

    /// Bytes available to read.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.borrow().bytes.len()
    }

    /// Push raw bytes onto the inbound side, ignoring the ring capacity.
    pub fn inject_inbound(&mut self, bytes: &[u8]) {
        self.inbound.borrow_mut().bytes.extend(bytes.iter().copied());
    }

    /// Take every byte currently queued on the outbound side.
    pub fn drain_outbound(&mut self) -> Vec<u8> {
        self.outbound.borrow_mut().bytes.drain(..).collect()
    }

    fn chunk_limit(&self, requested: usize) -> usize {
        match self.max_chunk {
            Some(max) => requested.min(max),
            None => requested,
        }
    }
}

impl Transport for MemoryTransport {
    fn can_write(&self) -> bool {
        !self.writes_paused && self.outbound.borrow().free() > 0
    }

    fn can_read(&self) -> bool {
        !self.reads_paused && !self.inbound.borrow().bytes.is_empty()
    }

    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(TransportError::Fault("injected write failure"));
        }
        if self.writes_paused {
            return Ok(0);
        }

        let limit = self.chunk_limit(buf.len());
        let mut ring = self.outbound.borrow_mut();
        let n = limit.min(ring.free());
        ring.bytes.extend(buf[..n].iter().copied());
        trace!(requested = buf.len(), written = n, "memory write");
        Ok(n)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(TransportError::Fault("injected read failure"));
        }
        if self.reads_paused {
            return Ok(0);
        }

        let limit = self.chunk_limit(buf.len());
        let mut ring = self.inbound.borrow_mut();
        let n = limit.min(ring.bytes.len());
        for (slot, byte) in buf[..n].iter_mut().zip(ring.bytes.drain(..n)) {
            *slot = byte;
        }
        trace!(requested = buf.len(), read = n, "memory read");
        Ok(n)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::loopback(DEFAULT_RING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_reads_back_writes() {
        let mut t = MemoryTransport::loopback(16);
        assert!(t.can_write());
        assert!(!t.can_read());

        assert_eq!(t.write_some(b"abc").unwrap(), 3);
        assert!(t.can_read());

        let mut buf = [0u8; 8];
        let n = t.read_some(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"abc");
        assert!(!t.can_read());
    }

    #[test]
    fn pair_is_cross_connected() {
        let (mut a, mut b) = MemoryTransport::pair(16);
        a.write_some(b"ping").unwrap();
        b.write_some(b"pong").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(b.read_some(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ping");
        assert_eq!(a.read_some(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn writes_are_bounded_by_capacity() {
        let mut t = MemoryTransport::loopback(4);
        assert_eq!(t.write_some(b"abcdef").unwrap(), 4);
        assert!(!t.can_write());
        assert_eq!(t.write_some(b"g").unwrap(), 0);
    }

    #[test]
    fn max_chunk_limits_each_call() {
        let mut t = MemoryTransport::loopback(16);
        t.set_max_chunk(Some(2));
        assert_eq!(t.write_some(b"abcde").unwrap(), 2);
        assert_eq!(t.write_some(b"cde").unwrap(), 2);

        let mut buf = [0u8; 8];
        assert_eq!(t.read_some(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ab");
    }

    #[test]
    fn paused_directions_report_no_capacity() {
        let mut t = MemoryTransport::loopback(16);
        t.write_some(b"x").unwrap();

        t.pause_writes();
        t.pause_reads();
        assert!(!t.can_write());
        assert!(!t.can_read());
        assert_eq!(t.write_some(b"y").unwrap(), 0);

        t.resume_writes();
        t.resume_reads();
        assert!(t.can_write());
        assert!(t.can_read());
    }

    #[test]
    fn injected_failures_are_reported_then_cleared() {
        let mut t = MemoryTransport::loopback(16);
        t.fail_next_writes(1);
        t.fail_next_reads(1);

        assert!(matches!(t.write_some(b"a"), Err(TransportError::Fault(_))));
        assert_eq!(t.write_some(b"a").unwrap(), 1);

        let mut buf = [0u8; 1];
        assert!(matches!(t.read_some(&mut buf), Err(TransportError::Fault(_))));
        assert_eq!(t.read_some(&mut buf).unwrap(), 1);
    }

    #[test]
    fn inject_and_drain_bypass_the_other_side() {
        let (mut a, b) = MemoryTransport::pair(4);
        a.inject_inbound(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(a.pending_inbound(), 6);

        assert_eq!(a.write_some(&[9, 9]).unwrap(), 2);
        assert_eq!(a.pending_outbound(), 2);
        assert_eq!(b.pending_inbound(), 2);
        assert_eq!(a.drain_outbound(), vec![9, 9]);
        assert_eq!(b.pending_inbound(), 0);
    }
}
