//! Registry tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! tracing spans and events for the registry's slow paths: publishing a
//! thread queue, scanning the root list and sweeping the canonical list.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    /// Stable identifier for a root scan.
    ///
    /// Correlates the events emitted while one [`RootsIter`](crate::RootsIter)
    /// is alive. Starts at 1 and increases monotonically.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScanId(pub u64);

    static NEXT_SCAN_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique scan ID.
    pub fn next_scan_id() -> ScanId {
        ScanId(NEXT_SCAN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a span covering one root scan.
    pub fn trace_root_scan(scan_id: ScanId) -> span::EnteredSpan {
        span!(Level::DEBUG, "root_scan", scan_id = scan_id.0).entered()
    }

    /// Create a span covering one lock-held walk of the canonical list.
    pub fn trace_sweep(published: usize) -> span::EnteredSpan {
        span!(Level::DEBUG, "special_ref_sweep", published).entered()
    }

    /// Log a thread queue being spliced into the canonical list.
    pub fn log_publish(queue_id: u64, nodes: usize) {
        tracing::debug!(queue_id, nodes, "publish");
    }

    /// Log a node put back at the root-list head after a racing retain.
    pub fn log_root_reinserted(scan_id: ScanId) {
        tracing::trace!(scan_id = scan_id.0, "root_reinserted");
    }

    /// Log the end of a canonical-list walk.
    pub fn log_sweep_end(swept: usize, remaining: usize) {
        tracing::debug!(swept, remaining, "sweep_end");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScanId(pub u64);

    /// Stub function when tracing is disabled.
    pub const fn next_scan_id() -> ScanId {
        ScanId(0)
    }

    /// Stub function when tracing is disabled.
    pub const fn log_publish(_queue_id: u64, _nodes: usize) {}

    /// Stub function when tracing is disabled.
    pub const fn log_root_reinserted(_scan_id: ScanId) {}

    /// Stub function when tracing is disabled.
    pub const fn log_sweep_end(_swept: usize, _remaining: usize) {}
}

pub use internal::ScanId;
