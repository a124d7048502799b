//! Thread-local queues of freshly created nodes.
//!
//! New nodes are not put into the canonical list right away: each mutator
//! thread collects them in its own queue and splices the whole queue in at a
//! publish point. Root-list visibility does not depend on this, a node
//! created with a positive count is linked into the root list immediately.
//!
//! A node disposed on the thread that still queues it, and not linked into
//! the root list at that point, is freed on the spot without ever being
//! published.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::assert::runtime_assert;
use crate::node::{free_node, Node, Rc, NO_OWNER};
use crate::object::ObjRef;
use crate::registry::{self, SpecialRefRegistry};
use crate::sync::enter_thread_shutdown;
use crate::tracing::internal::log_publish;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(NO_OWNER + 1);

/// A mutator thread's queue of unpublished nodes.
///
/// Queues are bound to one registry and one thread. Dropping a queue
/// publishes whatever it still holds.
pub struct ThreadQueue {
    registry: Arc<SpecialRefRegistry>,
    id: u64,
    nodes: Vec<NonNull<Node>>,
    _not_send: PhantomData<*const ()>,
}

impl ThreadQueue {
    pub(crate) fn new(registry: Arc<SpecialRefRegistry>) -> Self {
        let capacity = registry.config().queue_capacity;
        Self {
            registry,
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::with_capacity(capacity),
            _not_send: PhantomData,
        }
    }

    /// The registry this queue publishes into.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SpecialRefRegistry> {
        &self.registry
    }

    /// Number of nodes waiting to be published.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if there is nothing to publish.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocates a node for `obj` with the given initial count.
    ///
    /// A node created with a positive count is a root right away.
    pub(crate) fn create_node(&mut self, obj: ObjRef, rc: Rc) -> NonNull<Node> {
        runtime_assert!(rc >= 0, "new nodes start with a non-negative count (rc={rc})");
        let node = Box::new(Node::new(&self.registry, obj, rc, self.id));
        node.slot.store(self.nodes.len(), Ordering::Relaxed);
        if rc > 0 {
            self.registry.insert_into_roots_head(&node);
        }
        // SAFETY: `Box::into_raw` never returns null.
        let node = unsafe { NonNull::new_unchecked(Box::into_raw(node)) };
        self.nodes.push(node);
        self.registry.counters().record_created();
        node
    }

    /// Moves every queued node into the registry's canonical list.
    pub fn publish(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        for node in &self.nodes {
            // SAFETY: queued nodes are alive; only this thread touches `owner`.
            unsafe { node.as_ref() }.owner.store(NO_OWNER, Ordering::Relaxed);
        }
        log_publish(self.id, self.nodes.len());
        self.registry.publish_nodes(&mut self.nodes);
    }

    /// Disposes `node`, freeing it right away if this queue still holds it
    /// and it is not linked into the root list. Returns `true` if the node
    /// was freed.
    pub(crate) fn dispose_node(&mut self, node: NonNull<Node>) -> bool {
        // SAFETY: the caller owns the disposal obligation, so the node is
        // alive until it is disposed below.
        let node_ref = unsafe { node.as_ref() };
        // Read before disposing: once a published node is disposed a sweep
        // may free it at any time.
        let local = node_ref.owner.load(Ordering::Relaxed) == self.id;
        // `self.registry` outlives the count handed back here.
        drop(node_ref.dispose());
        if !local {
            return false;
        }
        {
            let _guard = self.registry.release_guard();
            if node_ref.is_linked() {
                return false;
            }
        }
        let slot = node_ref.slot.load(Ordering::Relaxed);
        runtime_assert!(
            self.nodes.get(slot) == Some(&node),
            "queued node is not at its recorded slot"
        );
        self.nodes.swap_remove(slot);
        if let Some(moved) = self.nodes.get(slot) {
            // SAFETY: queued nodes are alive.
            unsafe { moved.as_ref() }.slot.store(slot, Ordering::Relaxed);
        }
        // SAFETY: disposed, unlinked and no longer in any list. Queued nodes
        // are not in the canonical list, so no sweep can race us.
        unsafe { free_node(node) };
        self.registry.counters().record_deleted_locally();
        true
    }
}

impl Drop for ThreadQueue {
    fn drop(&mut self) {
        self.publish();
    }
}

impl fmt::Debug for ThreadQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadQueue")
            .field("id", &self.id)
            .field("len", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Thread-local queue of the global registry
// ============================================================================

struct CurrentQueue(RefCell<Option<ThreadQueue>>);

impl Drop for CurrentQueue {
    fn drop(&mut self) {
        enter_thread_shutdown();
        drop(self.0.get_mut().take());
    }
}

thread_local! {
    static CURRENT: CurrentQueue = const { CurrentQueue(RefCell::new(None)) };
}

/// Runs `f` with the calling thread's queue for the global registry.
///
/// # Panics
///
/// Panics if called while the thread's thread-locals are being destroyed,
/// or reentrantly from inside `f`.
pub(crate) fn with_current_queue<R>(f: impl FnOnce(&mut ThreadQueue) -> R) -> R {
    CURRENT.with(|current| {
        let mut slot = current.0.borrow_mut();
        let global = registry::global();
        let stale = slot
            .as_ref()
            .is_some_and(|queue| !Arc::ptr_eq(queue.registry(), &global));
        if stale {
            // The global registry was replaced; flush into the old one.
            drop(slot.take());
        }
        let queue = slot.get_or_insert_with(|| ThreadQueue::new(global));
        f(queue)
    })
}

/// Disposes `node` through the calling thread's global queue, which frees
/// it on the spot if the queue still holds it.
pub(crate) fn dispose_with_current_queue(node: NonNull<Node>) {
    let handled = CURRENT
        .try_with(|current| {
            let Ok(mut slot) = current.0.try_borrow_mut() else {
                return false;
            };
            slot.as_mut().is_some_and(|queue| {
                queue.dispose_node(node);
                true
            })
        })
        .unwrap_or(false);
    if !handled {
        // SAFETY: the caller owns the disposal obligation.
        let registry = unsafe { node.as_ref() }.dispose();
        // Last use of the node; dropping the count may free the registry.
        drop(registry);
    }
}

/// Publishes the calling thread's queue for the global registry and drops
/// it.
///
/// Call this before a thread detaches from the runtime. Thread exit does the
/// same automatically.
pub fn detach_current_thread() {
    let _ = CURRENT.try_with(|current| {
        let queue = current.0.borrow_mut().take();
        drop(queue);
    });
}

#[cfg(test)]
mod tests {
    use crate::config::RegistryConfig;
    use crate::registry::SpecialRefRegistry;
    use crate::test_support::TestObject;

    #[test]
    fn test_publish_moves_nodes() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        queue.create_node(obj.obj(), 0);
        queue.create_node(obj.obj(), 0);
        assert_eq!(queue.len(), 2);
        assert_eq!(registry.published_len(), 0);

        queue.publish();
        assert!(queue.is_empty());
        assert_eq!(registry.published_len(), 2);

        for view in &mut registry.lock_for_iter() {
            assert_eq!(view.object(), Some(obj.obj()));
        }
    }

    #[test]
    fn test_strong_node_is_root_before_publish() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        // SAFETY: the node stays alive inside the queue.
        let node = unsafe { queue.create_node(obj.obj(), 1).as_ref() };
        assert_eq!(registry.roots().collect::<Vec<_>>(), vec![obj.obj()]);
        assert_eq!(registry.lock_for_iter().iter().count(), 0);
        node.release();
        node.dispose();
    }

    #[test]
    fn test_local_delete_of_unlinked_node() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        let first = queue.create_node(obj.obj(), 0);
        let second = queue.create_node(obj.obj(), 0);
        let third = queue.create_node(obj.obj(), 0);

        assert!(queue.dispose_node(first));
        assert_eq!(queue.len(), 2);

        // `third` moved into the freed slot and can still be found.
        assert!(queue.dispose_node(third));
        assert!(queue.dispose_node(second));
        assert!(queue.is_empty());
        assert_eq!(registry.stats().nodes_deleted_locally, 3);
    }

    #[test]
    fn test_local_delete_skips_linked_node() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        let node = queue.create_node(obj.obj(), 1);
        // SAFETY: the node stays alive inside the queue.
        let node_ref = unsafe { node.as_ref() };
        node_ref.release();
        assert!(!queue.dispose_node(node));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_local_delete_skips_published_node() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let mut queue = registry.thread_queue();
        let obj = TestObject::new();
        let node = queue.create_node(obj.obj(), 0);
        queue.publish();
        assert!(!queue.dispose_node(node));
        assert_eq!(registry.lock_for_iter().iter().count(), 0);
        assert_eq!(registry.published_len(), 0);
    }

    #[test]
    fn test_other_queue_does_not_delete() {
        let registry = SpecialRefRegistry::new(RegistryConfig::default());
        let owner = {
            let mut owner = registry.thread_queue();
            let mut other = registry.thread_queue();
            let obj = TestObject::new();
            let node = owner.create_node(obj.obj(), 0);
            assert!(!other.dispose_node(node));
            owner
        };
        assert_eq!(owner.len(), 1);
        drop(owner);
        assert_eq!(registry.lock_for_iter().iter().count(), 0);
        assert_eq!(registry.published_len(), 0);
    }
}
