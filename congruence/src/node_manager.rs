use std::collections::{BTreeSet, BinaryHeap};

use crate::error::{CongruenceError, Result};
use crate::ids::{NodeId, ROOT};

/// Allocates, activates and recycles coset ids.
///
/// Inactive ids are returned from a max-heap so that the next id handed out
/// by [`NodeManager::allocate`] is the *largest* previously-deactivated one,
/// keeping the active range as small as possible (a LIFO-biased free list).
/// This plays the same role as `tc_collections::heap::IdxHeap` in the
/// teacher crate's decision-variable queue, but the free list's priority
/// never changes after an id is created, so a plain `BinaryHeap<NodeId>` is
/// simpler and sufficient - there is no need for `IdxHeap`'s machinery for
/// externally-mutable priorities.
///
/// The active set itself is a `BTreeSet<NodeId>` rather than
/// `tc_collections::set::RefSet`'s bitset: §4.1 requires `next_active` to
/// find the next larger active id in O(log n), and a bitset has no
/// word-level skip-ahead in this crate's dependency set to make that true,
/// whereas `BTreeSet::range` walks straight to it.
#[derive(Debug, Clone)]
pub struct NodeManager {
    capacity: usize,
    active: BTreeSet<NodeId>,
    free: BinaryHeap<NodeId>,
    active_count: usize,
}

impl Default for NodeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeManager {
    pub fn new() -> Self {
        let mut m = NodeManager {
            capacity: 0,
            active: BTreeSet::new(),
            free: BinaryHeap::new(),
            active_count: 0,
        };
        let root = m.allocate().expect("capacity 0 never overflows u32");
        debug_assert_eq!(root, ROOT);
        m.activate(root);
        m
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn is_active(&self, id: NodeId) -> bool {
        self.active.contains(&id)
    }

    /// Returns an id that is not currently active: either one returned by a
    /// previous [`NodeManager::deactivate`], or a freshly extended one.
    ///
    /// Fails with [`CongruenceError::CapacityExceeded`] rather than wrapping
    /// or panicking if the node id space (`NodeId` is backed by a `NonZeroU32`,
    /// so `u32::MAX` ids) is exhausted.
    pub fn allocate(&mut self) -> Result<NodeId> {
        if let Some(id) = self.free.pop() {
            Ok(id)
        } else {
            if self.capacity >= u32::MAX as usize {
                return Err(CongruenceError::CapacityExceeded(
                    "node id space exhausted: reached u32::MAX active+free ids".into(),
                ));
            }
            let id = NodeId::from_u32(self.capacity as u32);
            self.capacity += 1;
            Ok(id)
        }
    }

    pub fn activate(&mut self, id: NodeId) {
        debug_assert!(!self.active.contains(&id));
        self.active.insert(id);
        self.active_count += 1;
    }

    /// Deactivates `id`, returning it to the free list. `id` must be active
    /// and must not be [`ROOT`]: the initial class is never recycled.
    pub fn deactivate(&mut self, id: NodeId) {
        debug_assert_ne!(id, ROOT);
        debug_assert!(self.active.contains(&id));
        self.active.remove(&id);
        self.active_count -= 1;
        self.free.push(id);
    }

    /// Returns the smallest active id strictly greater than `cursor`, or
    /// `None` if `cursor` was the last active id. `BTreeSet::range` walks
    /// the tree directly to the successor of `cursor` in O(log n), rather
    /// than scanning every id between `cursor` and `capacity`.
    pub fn next_active(&self, cursor: NodeId) -> Option<NodeId> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.active.range((Excluded(cursor), Unbounded)).next().copied()
    }

    /// Iterates active ids in ascending order, starting from (and
    /// including) [`ROOT`].
    pub fn active_iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.active.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_active_on_creation() {
        let m = NodeManager::new();
        assert!(m.is_active(ROOT));
        assert_eq!(m.active_count(), 1);
    }

    #[test]
    fn allocate_extends_capacity_when_free_list_empty() {
        let mut m = NodeManager::new();
        let a = m.allocate().unwrap();
        let b = m.allocate().unwrap();
        assert_ne!(a, b);
        assert_eq!(m.capacity(), 3);
    }

    #[test]
    fn deactivate_recycles_largest_id_first() {
        let mut m = NodeManager::new();
        let a = m.allocate().unwrap();
        m.activate(a);
        let b = m.allocate().unwrap();
        m.activate(b);
        m.deactivate(a);
        m.deactivate(b);
        // b > a, so b should come back out first.
        let reused = m.allocate().unwrap();
        assert_eq!(reused, b);
    }

    #[test]
    fn next_active_skips_gaps() {
        let mut m = NodeManager::new();
        let a = m.allocate().unwrap();
        m.activate(a);
        let b = m.allocate().unwrap();
        m.activate(b);
        m.deactivate(a);
        assert_eq!(m.next_active(ROOT), Some(b));
    }

    #[test]
    fn allocate_fails_once_the_u32_id_space_is_exhausted() {
        let mut m = NodeManager::new();
        m.capacity = u32::MAX as usize;
        assert!(matches!(m.allocate(), Err(CongruenceError::CapacityExceeded(_))));
    }
}
