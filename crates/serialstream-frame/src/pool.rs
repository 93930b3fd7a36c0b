//! LIFO free-lists for packet and message reuse.
//!
//! Checkout pops the most recently released instance or allocates a fresh
//! one; release pushes. Pools never shrink, so after warm-up the steady
//! state allocates nothing.
//!
//! The packet pool is a shared handle: every message that draws from it
//! keeps a clone and hands its packets back when dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::message::Message;
use crate::packet::Packet;

/// A last-in-first-out free-list of reusable values.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
    allocated: usize,
}

/// Free-list of messages for one direction.
pub type MessagePool = Pool<Message>;

impl<T: Default> Pool<T> {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            allocated: 0,
        }
    }

    /// Create a pool already holding `count` fresh instances.
    pub fn with_prefill(count: usize) -> Self {
        let mut free = Vec::with_capacity(count);
        free.resize_with(count, T::default);
        Self {
            free,
            allocated: count,
        }
    }

    /// Take the most recently released value, or allocate one.
    pub fn checkout(&mut self) -> T {
        match self.free.pop() {
            Some(item) => item,
            None => {
                self.allocated += 1;
                trace!(
                    kind = std::any::type_name::<T>(),
                    allocated = self.allocated,
                    "pool empty; allocating"
                );
                T::default()
            }
        }
    }

    /// Return a value for reuse.
    pub fn release(&mut self, item: T) {
        self.free.push(item);
    }

    /// Values currently waiting for reuse.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Total values this pool has ever allocated.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.free.iter()
    }
}

impl<T: Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Free-list of packets, shared by every message of one engine.
///
/// Clones are handles to the same free-list.
#[derive(Debug, Clone, Default)]
pub struct PacketPool {
    shared: Arc<Mutex<Pool<Packet>>>,
}

impl PacketPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool already holding `count` fresh packets.
    pub fn with_prefill(count: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Pool::with_prefill(count))),
        }
    }

    /// Take the most recently released packet, or allocate one.
    pub fn checkout(&self) -> Packet {
        self.lock().checkout()
    }

    /// Return a packet for reuse.
    pub fn release(&self, packet: Packet) {
        self.lock().release(packet);
    }

    /// Return every packet from `packets` for reuse.
    pub fn release_all(&self, packets: impl IntoIterator<Item = Packet>) {
        let mut pool = self.lock();
        for packet in packets {
            pool.release(packet);
        }
    }

    /// Packets currently waiting for reuse.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total packets this pool has ever allocated.
    pub fn allocated(&self) -> usize {
        self.lock().allocated()
    }

    /// Whether both handles refer to the same free-list.
    pub fn same_pool(&self, other: &PacketPool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn lock(&self) -> MutexGuard<'_, Pool<Packet>> {
        // A poisoned free-list is still consistent.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_allocates_when_empty() {
        let mut pool: Pool<Vec<u8>> = Pool::new();
        assert!(pool.is_empty());

        let _a = pool.checkout();
        let _b = pool.checkout();
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn reuse_is_last_in_first_out() {
        let mut pool: Pool<Vec<u8>> = Pool::new();
        pool.release(vec![1]);
        pool.release(vec![2]);

        assert_eq!(pool.checkout(), vec![2]);
        assert_eq!(pool.checkout(), vec![1]);
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn prefill_counts_as_allocated() {
        let mut pool: Pool<Packet> = Pool::with_prefill(4);
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.allocated(), 4);

        let p = pool.checkout();
        assert_eq!(pool.allocated(), 4);
        pool.release(p);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn packet_pool_clones_share_one_free_list() {
        let pool = PacketPool::with_prefill(1);
        let handle = pool.clone();
        assert!(pool.same_pool(&handle));
        assert!(!pool.same_pool(&PacketPool::new()));

        let packet = handle.checkout();
        assert_eq!(pool.len(), 0);
        pool.release_all([packet, Packet::new()]);
        assert_eq!(handle.len(), 2);
        assert_eq!(handle.allocated(), 1);
    }
}
