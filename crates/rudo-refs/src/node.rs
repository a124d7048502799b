//! The registry node backing one special reference.
//!
//! A node holds the external reference count, the referenced object and the
//! root-list link. Handles own the disposal obligation for their node; the
//! registry's lists only link to it.
//!
//! An undisposed node owns a strong count of its registry, so the registry
//! outlives every handle still pointing into it. Disposal hands that count
//! back to the caller, which drops it once it is done with the node.

use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicI32, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::assert::runtime_assert;
use crate::config::ReleaseGuard;
use crate::object::ObjRef;
use crate::registry::SpecialRefRegistry;
use crate::thread_state::{current_thread_state, ThreadState};

/// External reference count of a node.
pub type Rc = i32;

/// Reference count of a disposed node. Once set, the count is never touched
/// again.
pub const DISPOSED_MARKER: Rc = Rc::MIN;

/// Queue id meaning "already in the canonical list".
pub(crate) const NO_OWNER: u64 = 0;

pub(crate) struct Node {
    obj: AtomicPtr<u8>,
    rc: AtomicI32,
    /// Successor in the root list. Null iff the node is not linked.
    pub(crate) next_root: AtomicPtr<Node>,
    /// From `Arc::into_raw`; a strong count until the node is disposed.
    registry: *const SpecialRefRegistry,
    /// Id of the thread queue holding the node, or [`NO_OWNER`].
    /// Only read and written by the owning thread.
    pub(crate) owner: AtomicU64,
    /// Index inside the owning queue.
    pub(crate) slot: AtomicUsize,
}

// SAFETY: every field is either atomic or the registry pointer, which refers
// to a `Sync` registry kept alive by the node or by whoever reaches it.
unsafe impl Send for Node {}
// SAFETY: see `Send`.
unsafe impl Sync for Node {}

impl Node {
    pub(crate) fn new(registry: &Arc<SpecialRefRegistry>, obj: ObjRef, rc: Rc, owner: u64) -> Self {
        Self {
            obj: AtomicPtr::new(obj.as_ptr()),
            rc: AtomicI32::new(rc),
            next_root: AtomicPtr::new(ptr::null_mut()),
            registry: Arc::into_raw(Arc::clone(registry)),
            owner: AtomicU64::new(owner),
            slot: AtomicUsize::new(0),
        }
    }

    /// A root-list sentinel. Never retained, released or disposed.
    pub(crate) const fn sentinel() -> Self {
        Self {
            obj: AtomicPtr::new(ptr::null_mut()),
            rc: AtomicI32::new(0),
            next_root: AtomicPtr::new(ptr::null_mut()),
            registry: ptr::null(),
            owner: AtomicU64::new(NO_OWNER),
            slot: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut Self {
        ptr::from_ref(self).cast_mut()
    }

    #[inline]
    pub(crate) fn registry(&self) -> &SpecialRefRegistry {
        runtime_assert!(!self.registry.is_null(), "sentinel nodes have no registry");
        // SAFETY: an undisposed node holds a strong count of its registry.
        // Disposed nodes are only reached from inside the registry.
        unsafe { &*self.registry }
    }

    #[inline]
    pub(crate) fn ref_count(&self) -> Rc {
        self.rc.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn is_disposed(&self) -> bool {
        self.ref_count() == DISPOSED_MARKER
    }

    #[inline]
    pub(crate) fn is_linked(&self) -> bool {
        !self.next_root.load(Ordering::Acquire).is_null()
    }

    #[inline]
    pub(crate) fn object(&self) -> Option<ObjRef> {
        ObjRef::from_ptr(self.obj.load(Ordering::Acquire))
    }

    /// Relaxed read used on the retain path.
    #[inline]
    pub(crate) fn has_object(&self) -> bool {
        !self.obj.load(Ordering::Relaxed).is_null()
    }

    /// Nulls the object pointer. Collector only, once the object is dead.
    #[inline]
    pub(crate) fn clear_object(&self) {
        self.obj.store(ptr::null_mut(), Ordering::Release);
    }

    /// Increments the count, linking the node into the root list on 0→1.
    ///
    /// The caller must keep the object reachable some other way across a
    /// 0→1 transition.
    pub(crate) fn retain(&self) {
        let before = self.rc.fetch_add(1, Ordering::Relaxed);
        runtime_assert!(before >= 0, "retaining a disposed node (rc={before})");
        if before == 0 {
            if !self.has_object() {
                // Already being torn down by the collector.
                return;
            }
            // Pairs with the fence between unlink and recheck in `next_root`.
            fence(Ordering::SeqCst);
            self.registry().insert_into_roots_head(self);
        }
    }

    /// Increments the count unless the object is already dead.
    ///
    /// A positive count keeps the object a root, so only a retain from zero
    /// has to prove the object alive through a weak read. If the collector
    /// clears the object before the increment lands, the increment is undone.
    pub(crate) fn try_retain(&self) -> bool {
        let mut rc = self.ref_count();
        while rc > 0 {
            match self
                .rc
                .compare_exchange_weak(rc, rc + 1, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => rc = actual,
            }
        }
        if self.try_object_ref().is_none() {
            return false;
        }
        #[cfg(test)]
        crate::test_support::pause_at(crate::test_support::PausePoint::TryRetain, self);
        self.retain();
        if self.has_object() {
            return true;
        }
        self.release();
        false
    }

    /// Decrements the count. The count must be positive.
    pub(crate) fn release(&self) {
        let registry = self.registry();
        let guarded = registry.config().release_guard == ReleaseGuard::Enabled;
        let mut rc = self.rc.load(Ordering::Relaxed);
        loop {
            runtime_assert!(rc > 0, "releasing a node without references (rc={rc})");
            if rc == 1 && guarded {
                // The node may be leaving the root set; do not let that
                // happen in the middle of a scan step looking at it.
                let _guard = registry.release_guard();
                let before = self.rc.fetch_sub(1, Ordering::Relaxed);
                runtime_assert!(before > 0, "releasing a node without references (rc={before})");
                return;
            }
            match self
                .rc
                .compare_exchange_weak(rc, rc - 1, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => rc = actual,
            }
        }
    }

    /// Marks the node dead. Must follow the last `release`.
    ///
    /// Returns the registry count the node held. Once it is dropped the
    /// registry, and with it a published node, may be freed, so the caller
    /// drops it after its last use of the node.
    pub(crate) fn dispose(&self) -> Option<Arc<SpecialRefRegistry>> {
        let before = self.rc.swap(DISPOSED_MARKER, Ordering::Release);
        runtime_assert!(before != DISPOSED_MARKER, "node disposed twice");
        runtime_assert!(
            before <= 0,
            "disposing a node with {before} outstanding references"
        );
        // SAFETY: `registry` came from `Arc::into_raw`, and only the first
        // dispose takes the count back.
        (before != DISPOSED_MARKER).then(|| unsafe { Arc::from_raw(self.registry) })
    }

    /// Returns the object of a node the caller knows to be retained.
    pub(crate) fn object_ref(&self) -> ObjRef {
        let rc = self.ref_count();
        runtime_assert!(rc > 0, "object_ref on a node that is not a root (rc={rc})");
        match ObjRef::from_ptr(self.obj.load(Ordering::Relaxed)) {
            Some(obj) => obj,
            None => panic!("retained special reference lost its object"),
        }
    }

    /// Returns the object unless the collector has cleared or is clearing it.
    pub(crate) fn try_object_ref(&self) -> Option<ObjRef> {
        runtime_assert!(
            current_thread_state() == ThreadState::Runnable,
            "weak reads require a runnable thread"
        );
        let obj = self.object()?;
        if self.ref_count() > 0 {
            return Some(obj);
        }
        let hooks = self.registry().hooks();
        if !hooks.weak_read_barrier_active() {
            return Some(obj);
        }
        let obj = hooks.weak_read(obj)?;
        // The collector may have invalidated the node while we asked.
        (self.obj.load(Ordering::Acquire) == obj.as_ptr()).then_some(obj)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("obj", &self.obj.load(Ordering::Relaxed))
            .field("rc", &self.ref_count())
            .field("linked", &self.is_linked())
            .finish_non_exhaustive()
    }
}

/// Frees a node allocated by a thread queue.
///
/// # Safety
///
/// `node` must have come from `Box::into_raw`, be disposed, unlinked from
/// the root list, and unreachable from any list.
pub(crate) unsafe fn free_node(node: NonNull<Node>) {
    // SAFETY: guaranteed by the caller.
    drop(unsafe { Box::from_raw(node.as_ptr()) });
}

#[cfg(test)]
mod tests {
    use crate::config::{RegistryConfig, ReleaseGuard};
    use crate::node::DISPOSED_MARKER;
    use crate::registry::SpecialRefRegistry;
    use crate::test_support::TestObject;

    #[test]
    fn test_retain_links_on_zero_to_one() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        let node = queue.create_node(obj.obj(), 0);
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { node.as_ref() };
        assert!(!node.is_linked());

        node.retain();
        assert!(node.is_linked());
        assert_eq!(node.ref_count(), 1);

        node.retain();
        node.release();
        node.release();
        assert_eq!(node.ref_count(), 0);
        // Unlinking is the scan's job.
        assert!(node.is_linked());

        node.dispose();
        assert_eq!(node.ref_count(), DISPOSED_MARKER);
    }

    #[test]
    fn test_retain_skips_cleared_object() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { queue.create_node(obj.obj(), 0).as_ref() };
        node.clear_object();
        node.retain();
        assert!(!node.is_linked());
        node.release();
        node.dispose();
    }

    #[test]
    fn test_unguarded_release() {
        let config = RegistryConfig {
            release_guard: ReleaseGuard::Disabled,
            ..RegistryConfig::default()
        };
        let registry = SpecialRefRegistry::new(config);
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { queue.create_node(obj.obj(), 1).as_ref() };
        node.release();
        assert_eq!(node.ref_count(), 0);
        node.dispose();
    }

    #[test]
    fn test_object_ref_of_root() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { queue.create_node(obj.obj(), 1).as_ref() };
        assert_eq!(node.object_ref(), obj.obj());
        assert_eq!(node.try_object_ref(), Some(obj.obj()));
        node.release();
        node.dispose();
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore = "runtime asserts are compiled out")]
    #[should_panic(expected = "outstanding references")]
    fn test_dispose_with_outstanding_references() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { queue.create_node(obj.obj(), 1).as_ref() };
        node.dispose();
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore = "runtime asserts are compiled out")]
    #[should_panic(expected = "disposed twice")]
    fn test_double_dispose() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { queue.create_node(obj.obj(), 0).as_ref() };
        node.dispose();
        node.dispose();
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore = "runtime asserts are compiled out")]
    #[should_panic(expected = "retaining a disposed node")]
    fn test_retain_after_dispose() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { queue.create_node(obj.obj(), 0).as_ref() };
        node.dispose();
        node.retain();
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore = "runtime asserts are compiled out")]
    #[should_panic(expected = "not a root")]
    fn test_object_ref_requires_root() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { queue.create_node(obj.obj(), 0).as_ref() };
        let _ = node.object_ref();
    }
}
