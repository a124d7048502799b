//! The special-reference registry.
//!
//! The registry owns the canonical list of every published node and the
//! sentinels of the lock-free root list. Retain and release never touch a
//! lock here; only publishing, full iteration and root-scan steps do.
//!
//! # Global instance
//!
//! A runtime normally has exactly one registry. [`init_global`] creates it at
//! startup, [`global`] returns it (creating a default one on first use), and
//! [`shutdown_global`] tears it down. Standalone registries made with
//! [`SpecialRefRegistry::new`] work the same way and are handy in tests.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::RegistryConfig;
use crate::hooks::{GcHooks, NoopHooks};
use crate::metrics::{RegistryStats, StatsCounters};
use crate::node::{free_node, Node};
use crate::queue::ThreadQueue;
use crate::sync::{LockGuard, LockOrder};

/// Process-wide bookkeeping of every externally visible managed reference.
pub struct SpecialRefRegistry {
    pub(crate) roots_head: Node,
    pub(crate) roots_tail: Node,
    /// Canonical list of published nodes. The registry frees them.
    pub(crate) list: Mutex<Vec<NonNull<Node>>>,
    /// Held by the single active root scan.
    pub(crate) scanner: Mutex<()>,
    /// Write side: one root-scan step. Read side: anything that may make a
    /// node leave the root set or free it.
    release_guard: RwLock<()>,
    config: RegistryConfig,
    hooks: Arc<dyn GcHooks>,
    stats: StatsCounters,
}

// SAFETY: the raw node pointers in `list` are only dereferenced under the
// list lock or through atomics, and nodes themselves are `Sync`.
unsafe impl Send for SpecialRefRegistry {}
// SAFETY: see `Send`.
unsafe impl Sync for SpecialRefRegistry {}

/// Read side of the release guard.
pub(crate) struct ReleaseGuardRead<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    _order: LockGuard,
}

/// Write side of the release guard, held for one root-scan step.
pub(crate) struct ScanStep<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
    _order: LockGuard,
}

impl SpecialRefRegistry {
    /// Creates a registry for a collector that needs no hooks.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        Self::with_hooks(config, Arc::new(NoopHooks))
    }

    /// Creates a registry that consults `hooks` for permanence and weak reads.
    #[must_use]
    pub fn with_hooks(config: RegistryConfig, hooks: Arc<dyn GcHooks>) -> Arc<Self> {
        let registry = Arc::new(Self {
            roots_head: Node::sentinel(),
            roots_tail: Node::sentinel(),
            list: Mutex::new(Vec::new()),
            scanner: Mutex::new(()),
            release_guard: RwLock::new(()),
            config,
            hooks,
            stats: StatsCounters::default(),
        });
        registry
            .roots_head
            .next_root
            .store(registry.roots_tail.as_ptr(), Ordering::Release);
        registry
    }

    /// Returns the configuration the registry was created with.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the collector hooks.
    #[must_use]
    pub fn hooks(&self) -> &dyn GcHooks {
        &*self.hooks
    }

    /// Creates a queue for new nodes made on the calling thread.
    ///
    /// The queue publishes its nodes when dropped, so drop it before the
    /// thread detaches from the runtime.
    #[must_use]
    pub fn thread_queue(self: &Arc<Self>) -> ThreadQueue {
        ThreadQueue::new(Arc::clone(self))
    }

    /// Returns a snapshot of the registry's counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.stats.snapshot()
    }

    /// Number of nodes in the canonical list, disposed ones included.
    #[must_use]
    pub fn published_len(&self) -> usize {
        let _order = LockGuard::new(LockOrder::List);
        self.list.lock().len()
    }

    #[inline]
    pub(crate) const fn counters(&self) -> &StatsCounters {
        &self.stats
    }

    /// Splices `nodes` onto the tail of the canonical list.
    pub(crate) fn publish_nodes(&self, nodes: &mut Vec<NonNull<Node>>) {
        if nodes.is_empty() {
            return;
        }
        let count = nodes.len();
        {
            let _order = LockGuard::new(LockOrder::List);
            let mut list = self.list.lock();
            list.append(nodes);
        }
        self.stats.record_published(count);
    }

    pub(crate) fn release_guard(&self) -> ReleaseGuardRead<'_> {
        let order = LockGuard::new(LockOrder::ReleaseGuard);
        ReleaseGuardRead {
            _guard: self.release_guard.read(),
            _order: order,
        }
    }

    pub(crate) fn scan_step(&self) -> ScanStep<'_> {
        let order = LockGuard::new(LockOrder::ReleaseGuard);
        ScanStep {
            _guard: self.release_guard.write(),
            _order: order,
        }
    }
}

impl Drop for SpecialRefRegistry {
    fn drop(&mut self) {
        for node in self.list.get_mut().drain(..) {
            // SAFETY: undisposed nodes keep the registry alive, so every node
            // left here is disposed and no handle or queue reaches it.
            unsafe { free_node(node) };
        }
    }
}

impl fmt::Debug for SpecialRefRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecialRefRegistry")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

static GLOBAL: RwLock<Option<Arc<SpecialRefRegistry>>> = parking_lot::const_rwlock(None);

/// Creates the process-wide registry.
///
/// # Panics
///
/// Panics if the global registry is already initialized.
pub fn init_global(config: RegistryConfig, hooks: Arc<dyn GcHooks>) -> Arc<SpecialRefRegistry> {
    let mut global = GLOBAL.write();
    assert!(global.is_none(), "global special-ref registry already initialized");
    let registry = SpecialRefRegistry::with_hooks(config, hooks);
    *global = Some(Arc::clone(&registry));
    registry
}

/// Returns the process-wide registry, creating a default one on first use.
#[must_use]
pub fn global() -> Arc<SpecialRefRegistry> {
    if let Some(registry) = GLOBAL.read().as_ref() {
        return Arc::clone(registry);
    }
    let mut global = GLOBAL.write();
    Arc::clone(global.get_or_insert_with(|| SpecialRefRegistry::new(RegistryConfig::default())))
}

/// Tears down the process-wide registry.
///
/// Threads that still hold a queue keep the old registry alive until they
/// detach. Returns the registry that was installed, if any.
pub fn shutdown_global() -> Option<Arc<SpecialRefRegistry>> {
    GLOBAL.write().take()
}
