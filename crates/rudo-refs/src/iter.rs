//! Lock-held iteration over every published node.
//!
//! The collector uses this during its exclusive phases, for example to null
//! out weak references to dead objects. Walking the list also compacts it:
//! disposed nodes that have left the root list are freed on the way. A
//! disposed node that is still linked is skipped but kept, because a root
//! scan may still step through it.

use std::fmt;
use std::ptr::NonNull;

use parking_lot::MutexGuard;

use crate::node::{free_node, Node, Rc};
use crate::object::ObjRef;
use crate::registry::SpecialRefRegistry;
use crate::sync::{LockGuard, LockOrder};
use crate::tracing::internal::log_sweep_end;

impl SpecialRefRegistry {
    /// Locks the canonical list for iteration.
    ///
    /// Only published nodes are visible. The lock blocks publishing threads
    /// for as long as the returned value is alive, but never blocks retain
    /// or release.
    #[must_use]
    pub fn lock_for_iter(&self) -> LockedNodes<'_> {
        let order = LockGuard::new(LockOrder::List);
        let nodes = self.list.lock();
        self.counters().record_full_iteration();
        LockedNodes {
            registry: self,
            nodes,
            _order: order,
        }
    }

    /// Frees `node` if it is disposed and no longer linked. Returns `true`
    /// if the node is gone.
    fn sweep_if_dead(&self, node: NonNull<Node>) -> bool {
        // SAFETY: nodes in the canonical list are valid until freed here.
        let node_ref = unsafe { node.as_ref() };
        if !node_ref.is_disposed() {
            return false;
        }
        {
            let _guard = self.release_guard();
            if node_ref.is_linked() {
                return false;
            }
        }
        // SAFETY: disposed, unlinked and (by the list lock) unreachable from
        // any other iterator. No scan step can be looking at it: scans only
        // reach linked nodes.
        unsafe { free_node(node) };
        true
    }
}

/// The canonical node list, locked for iteration.
///
/// Created by [`SpecialRefRegistry::lock_for_iter`]. Iterate with
/// [`LockedNodes::iter`] or a `for` loop over `&mut LockedNodes`.
pub struct LockedNodes<'a> {
    registry: &'a SpecialRefRegistry,
    nodes: MutexGuard<'a, Vec<NonNull<Node>>>,
    _order: LockGuard,
}

impl LockedNodes<'_> {
    /// Walks the live nodes, freeing dead ones.
    pub fn iter(&mut self) -> NodesIter<'_> {
        #[cfg(feature = "tracing")]
        let span = crate::tracing::internal::trace_sweep(self.nodes.len());
        NodesIter {
            registry: self.registry,
            nodes: &mut *self.nodes,
            read: 0,
            write: 0,
            swept: 0,
            #[cfg(feature = "tracing")]
            _span: span,
        }
    }

    /// Number of nodes in the list, dead ones not yet swept included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing has been published or everything was swept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<'g> IntoIterator for &'g mut LockedNodes<'_> {
    type Item = NodeView<'g>;
    type IntoIter = NodesIter<'g>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for LockedNodes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedNodes")
            .field("len", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

/// Iterator over live published nodes. Compacts the list as it goes.
pub struct NodesIter<'a> {
    registry: &'a SpecialRefRegistry,
    nodes: &'a mut Vec<NonNull<Node>>,
    /// Next slot to look at.
    read: usize,
    /// Next slot to keep a node in; `write <= read`.
    write: usize,
    swept: usize,
    #[cfg(feature = "tracing")]
    _span: tracing::span::EnteredSpan,
}

impl NodesIter<'_> {
    /// Skips disposed nodes, freeing those that left the root list, and
    /// returns the next node that is not disposed.
    fn find_alive_node(&mut self) -> Option<NonNull<Node>> {
        while let Some(&node) = self.nodes.get(self.read) {
            self.read += 1;
            if self.registry.sweep_if_dead(node) {
                self.swept += 1;
                continue;
            }
            self.nodes[self.write] = node;
            self.write += 1;
            // SAFETY: kept nodes stay valid while the list is locked.
            if !unsafe { node.as_ref() }.is_disposed() {
                return Some(node);
            }
        }
        None
    }
}

impl<'a> Iterator for NodesIter<'a> {
    type Item = NodeView<'a>;

    fn next(&mut self) -> Option<NodeView<'a>> {
        let node = self.find_alive_node()?;
        // SAFETY: the node is not freed while the list lock is held, which
        // outlives `'a`.
        Some(NodeView {
            node: unsafe { &*node.as_ptr() },
        })
    }
}

impl Drop for NodesIter<'_> {
    fn drop(&mut self) {
        let len = self.nodes.len();
        self.nodes.copy_within(self.read..len, self.write);
        self.nodes.truncate(self.write + (len - self.read));
        self.registry.counters().record_swept(self.swept);
        log_sweep_end(self.swept, self.nodes.len());
    }
}

/// Collector view of one published node.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    node: &'a Node,
}

impl NodeView<'_> {
    /// The referenced object, or `None` once the collector cleared it.
    #[must_use]
    pub fn object(&self) -> Option<ObjRef> {
        self.node.object()
    }

    /// Current external reference count.
    #[must_use]
    pub fn ref_count(&self) -> Rc {
        self.node.ref_count()
    }

    /// Returns `true` if the node currently keeps its object alive.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.ref_count() > 0
    }

    /// Invalidates the reference after its object died.
    ///
    /// Weak reads return `None` afterwards, and a retain no longer links the
    /// node into the root list. Only call this for objects the collector
    /// found unreachable.
    pub fn clear_object(&self) {
        self.node.clear_object();
    }
}

impl fmt::Debug for NodeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeView")
            .field("object", &self.object())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
