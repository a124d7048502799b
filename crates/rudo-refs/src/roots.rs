//! The lock-free root list.
//!
//! Every node with a positive count is linked into an intrusive singly
//! linked list running from `roots_head` to `roots_tail`. Mutators only ever
//! insert at the head. The collector walks the list and unlinks entries whose
//! count dropped to zero; if a concurrent retain revived an entry it just
//! unlinked, the entry goes back at the head. The walk only meets it again
//! while it is still standing on the head sentinel, so it terminates.

use std::ptr;
use std::sync::atomic::{fence, Ordering};

use crossbeam::utils::Backoff;
use parking_lot::MutexGuard;

use crate::assert::runtime_assert;
use crate::node::Node;
use crate::object::ObjRef;
use crate::registry::SpecialRefRegistry;
use crate::sync::{LockGuard, LockOrder};
use crate::tracing::internal::{log_root_reinserted, next_scan_id, ScanId};

// ============================================================================
// Root-list primitives
// ============================================================================

impl SpecialRefRegistry {
    #[inline]
    pub(crate) fn roots_tail_ptr(&self) -> *mut Node {
        self.roots_tail.as_ptr()
    }

    /// Links `node` right after the head sentinel.
    ///
    /// Returns `false` without doing anything if the node is already linked
    /// or a concurrent retain is linking it.
    pub(crate) fn insert_into_roots_head(&self, node: &Node) -> bool {
        let head = &self.roots_head;
        let mut next = head.next_root.load(Ordering::Acquire);
        if node
            .next_root
            .compare_exchange(ptr::null_mut(), next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let backoff = Backoff::new();
        while let Err(actual) = head.next_root.compare_exchange_weak(
            next,
            node.as_ptr(),
            Ordering::Release,
            Ordering::Acquire,
        ) {
            next = actual;
            node.next_root.store(next, Ordering::Relaxed);
            backoff.spin();
        }
        true
    }

    /// Returns the first live root after `current`, unlinking stale entries
    /// on the way. Returns the tail sentinel at the end of the list.
    ///
    /// Collector only, under a [`ScanStep`](crate::registry::ScanStep).
    pub(crate) fn next_root(&self, current: &Node, scan_id: ScanId) -> *mut Node {
        let tail = self.roots_tail_ptr();
        loop {
            let candidate = current.next_root.load(Ordering::Acquire);
            runtime_assert!(!candidate.is_null(), "walked off the root list");
            if candidate == tail {
                return tail;
            }
            // SAFETY: linked nodes are never freed, and `candidate` is linked
            // behind `current`.
            let node = unsafe { &*candidate };
            if node.ref_count() > 0 {
                // Make writes before the 0→1 retain visible to the collector.
                fence(Ordering::Acquire);
                return candidate;
            }
            #[cfg(test)]
            crate::test_support::pause_at(crate::test_support::PausePoint::BeforeUnlink, node);
            self.erase_from_roots(current, node);
            self.counters().record_root_erased();
            #[cfg(test)]
            crate::test_support::pause_at(crate::test_support::PausePoint::AfterUnlink, node);
            // Either we see the retain's increment, or the retain sees the
            // null link and relinks the node itself.
            fence(Ordering::SeqCst);
            if node.ref_count() > 0 && self.insert_into_roots_head(node) {
                self.counters().record_root_reinserted();
                log_root_reinserted(scan_id);
            }
        }
    }

    /// Unlinks `node`, starting the search for its predecessor at `prev`.
    fn erase_from_roots(&self, prev: &Node, node: &Node) {
        let target = node.as_ptr();
        let next = node.next_root.load(Ordering::Acquire);
        runtime_assert!(!next.is_null(), "erasing a node that is not linked");
        let mut prev = prev;
        let backoff = Backoff::new();
        loop {
            let mut prev_next = prev.next_root.load(Ordering::Acquire);
            // Only head insertions can land between `prev` and `node`.
            while prev_next != target {
                runtime_assert!(
                    !prev_next.is_null() && prev_next != self.roots_tail_ptr(),
                    "node vanished from the root list during erase"
                );
                // SAFETY: linked nodes are never freed.
                prev = unsafe { &*prev_next };
                prev_next = prev.next_root.load(Ordering::Acquire);
            }
            if prev
                .next_root
                .compare_exchange(target, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
            backoff.spin();
        }
        node.next_root.store(ptr::null_mut(), Ordering::Release);
    }

    /// Starts a scan of the root set.
    ///
    /// The scan runs concurrently with mutators. It yields each object whose
    /// node was a root when the scan reached it; roots created after the scan
    /// passed their position may be missed and are seen by the next scan.
    /// Only one scan runs at a time; a second call blocks until the first
    /// iterator is dropped.
    #[must_use]
    pub fn roots(&self) -> RootsIter<'_> {
        let order = LockGuard::new(LockOrder::Scanner);
        let scanner = self.scanner.lock();
        self.counters().record_root_scan();
        let scan_id = next_scan_id();
        RootsIter {
            registry: self,
            current: self.roots_head.as_ptr(),
            scan_id,
            #[cfg(feature = "tracing")]
            _span: crate::tracing::internal::trace_root_scan(scan_id),
            _scanner: scanner,
            _order: order,
        }
    }
}

// ============================================================================
// RootsIter - collector view of the root set
// ============================================================================

/// Iterator over the objects of the current root set.
///
/// Created by [`SpecialRefRegistry::roots`].
pub struct RootsIter<'a> {
    registry: &'a SpecialRefRegistry,
    /// Last returned root, or a sentinel.
    current: *mut Node,
    scan_id: ScanId,
    #[cfg(feature = "tracing")]
    _span: tracing::span::EnteredSpan,
    _scanner: MutexGuard<'a, ()>,
    _order: LockGuard,
}

impl RootsIter<'_> {
    /// Identifier correlating this scan's tracing events.
    #[must_use]
    pub const fn scan_id(&self) -> ScanId {
        self.scan_id
    }
}

impl Iterator for RootsIter<'_> {
    type Item = ObjRef;

    fn next(&mut self) -> Option<ObjRef> {
        let tail = self.registry.roots_tail_ptr();
        while self.current != tail {
            let _step = self.registry.scan_step();
            // SAFETY: `current` is the head sentinel or a root returned
            // earlier. It stays linked, and linked nodes are never freed.
            let current = unsafe { &*self.current };
            self.current = self.registry.next_root(current, self.scan_id);
            if self.current == tail {
                break;
            }
            // SAFETY: `self.current` is linked.
            if let Some(obj) = unsafe { &*self.current }.object() {
                return Some(obj);
            }
        }
        None
    }
}

impl std::fmt::Debug for RootsIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootsIter")
            .field("scan_id", &self.scan_id)
            .field("done", &(self.current == self.registry.roots_tail_ptr()))
            .finish_non_exhaustive()
    }
}
