//! Registry statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a registry's cumulative counters.
///
/// # Example
///
/// ```
/// use rudo_refs::{RegistryConfig, SpecialRefRegistry};
///
/// let registry = SpecialRefRegistry::new(RegistryConfig::default());
/// let stats = registry.stats();
/// assert_eq!(stats.nodes_created, 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Nodes allocated for new handles.
    pub nodes_created: u64,
    /// Nodes moved from thread-local queues into the canonical list.
    pub nodes_published: u64,
    /// Disposed nodes freed straight out of their owning thread's queue.
    pub nodes_deleted_locally: u64,
    /// Disposed nodes freed while walking the canonical list.
    pub nodes_swept: u64,
    /// Stale entries unlinked from the root list by a scan.
    pub roots_erased: u64,
    /// Unlinked entries put back because a concurrent retain revived them.
    pub roots_reinserted: u64,
    /// Root scans started.
    pub root_scans: u64,
    /// Lock-held walks of the canonical list started.
    pub full_iterations: u64,
}

/// Cumulative counters owned by a registry.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    nodes_created: AtomicU64,
    nodes_published: AtomicU64,
    nodes_deleted_locally: AtomicU64,
    nodes_swept: AtomicU64,
    roots_erased: AtomicU64,
    roots_reinserted: AtomicU64,
    root_scans: AtomicU64,
    full_iterations: AtomicU64,
}

impl StatsCounters {
    #[inline]
    pub(crate) fn record_created(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_published(&self, count: usize) {
        self.nodes_published
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deleted_locally(&self) {
        self.nodes_deleted_locally.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_swept(&self, count: usize) {
        self.nodes_swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_root_erased(&self) {
        self.roots_erased.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_root_reinserted(&self) {
        self.roots_reinserted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_root_scan(&self) {
        self.root_scans.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_full_iteration(&self) {
        self.full_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            nodes_published: self.nodes_published.load(Ordering::Relaxed),
            nodes_deleted_locally: self.nodes_deleted_locally.load(Ordering::Relaxed),
            nodes_swept: self.nodes_swept.load(Ordering::Relaxed),
            roots_erased: self.roots_erased.load(Ordering::Relaxed),
            roots_reinserted: self.roots_reinserted.load(Ordering::Relaxed),
            root_scans: self.root_scans.load(Ordering::Relaxed),
            full_iterations: self.full_iterations.load(Ordering::Relaxed),
        }
    }
}
