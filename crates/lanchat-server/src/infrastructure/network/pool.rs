//! The server's admission-controlled connection pool.
//!
//! The pool is an arena of slots indexed by [`SlotIndex`].  A slot is never
//! removed; once its connection closes it becomes *free* and is handed out
//! again before the pool grows:
//!
//! ```text
//! max_clients = 3
//!
//! [open, closed, open]   reserve() -> Some(1)   (reuse)
//! [open, open]           reserve() -> Some(2)   (append)
//! [open, open, open]     reserve() -> None      (full: stop accepting)
//! ```
//!
//! The pool is generic over [`PooledConnection`] so the admission rules can
//! be tested with plain flags instead of sockets.

use std::sync::Arc;

use lanchat_core::{Connection, SlotIndex};

/// What the pool needs to know about a slot's occupant.
pub trait PooledConnection {
    fn is_open(&self) -> bool;
}

impl PooledConnection for Arc<Connection> {
    fn is_open(&self) -> bool {
        Connection::is_open(self)
    }
}

/// Bounded arena of connections.
#[derive(Debug)]
pub struct SlotPool<C> {
    slots: Vec<C>,
    max_clients: usize,
}

impl<C: PooledConnection + Clone> SlotPool<C> {
    pub fn new(max_clients: usize) -> Self {
        Self {
            slots: Vec::with_capacity(max_clients),
            max_clients,
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Number of slots ever allocated.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots whose connection is open.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|c| c.is_open()).count()
    }

    /// The slot the next accepted connection should go to, if any.
    ///
    /// The first slot whose connection is not open wins; otherwise the next
    /// index past the end, as long as the pool is below `max_clients`.
    pub fn reserve(&self) -> Option<SlotIndex> {
        if let Some(free) = self.slots.iter().position(|c| !c.is_open()) {
            return Some(free);
        }
        (self.slots.len() < self.max_clients).then_some(self.slots.len())
    }

    /// `true` if another connection could be admitted right now.
    pub fn has_free_capacity(&self) -> bool {
        self.reserve().is_some()
    }

    /// Puts `conn` into `slot`, replacing a closed occupant or appending.
    ///
    /// `slot` must come from [`reserve`](Self::reserve) with no intervening
    /// install.
    pub fn install(&mut self, slot: SlotIndex, conn: C) {
        if slot < self.slots.len() {
            self.slots[slot] = conn;
        } else {
            debug_assert_eq!(slot, self.slots.len(), "slots are appended in order");
            self.slots.push(conn);
        }
    }

    pub fn get(&self, slot: SlotIndex) -> Option<&C> {
        self.slots.get(slot)
    }

    /// Every open connection with its index.
    pub fn open_connections(&self) -> Vec<(SlotIndex, C)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_open())
            .map(|(i, c)| (i, c.clone()))
            .collect()
    }

    /// Every connection, open or not, with its index.
    pub fn all(&self) -> Vec<(SlotIndex, C)> {
        self.slots.iter().cloned().enumerate().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone)]
    struct Flag(Arc<AtomicBool>);

    impl Flag {
        fn open() -> Self {
            Self(Arc::new(AtomicBool::new(true)))
        }
        fn close(&self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }

    impl PooledConnection for Flag {
        fn is_open(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn filled(n: usize, max: usize) -> (SlotPool<Flag>, Vec<Flag>) {
        let mut pool = SlotPool::new(max);
        let mut flags = Vec::new();
        for _ in 0..n {
            let slot = pool.reserve().expect("room");
            let flag = Flag::open();
            pool.install(slot, flag.clone());
            flags.push(flag);
        }
        (pool, flags)
    }

    #[test]
    fn test_empty_pool_reserves_slot_zero() {
        let pool: SlotPool<Flag> = SlotPool::new(2);
        assert_eq!(pool.reserve(), Some(0));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_full_pool_declines() {
        // Arrange
        let (pool, _flags) = filled(2, 2);

        // Act / Assert
        assert_eq!(pool.reserve(), None);
        assert!(!pool.has_free_capacity());
        assert_eq!(pool.open_count(), 2);
    }

    #[test]
    fn test_closed_slot_is_reused_before_append() {
        // Arrange
        let (mut pool, flags) = filled(2, 3);
        flags[0].close();

        // Act
        let slot = pool.reserve();
        pool.install(slot.unwrap(), Flag::open());

        // Assert
        assert_eq!(slot, Some(0));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.open_count(), 2);
    }

    #[test]
    fn test_open_connections_skips_closed_slots() {
        let (pool, flags) = filled(3, 3);
        flags[1].close();
        let open: Vec<SlotIndex> = pool.open_connections().into_iter().map(|(i, _)| i).collect();
        assert_eq!(open, vec![0, 2]);
        assert_eq!(pool.all().len(), 3);
    }

    #[test]
    fn test_zero_capacity_pool_never_admits() {
        let pool: SlotPool<Flag> = SlotPool::new(0);
        assert_eq!(pool.reserve(), None);
    }
}
