//! Move-only handles over registry nodes.
//!
//! Three handle kinds share the same node and differ only in how they use
//! its count:
//!
//! | Handle        | Initial count | Keeps the object alive            |
//! |---------------|---------------|-----------------------------------|
//! | [`StableRef`] | 1             | always, until disposed            |
//! | [`WeakRef`]   | 0             | never                             |
//! | [`BridgeRef`] | 1             | while externally retained         |
//!
//! Handles are not destroyed implicitly. Each one must be consumed by its
//! `dispose` method; dropping a handle leaks its node, and checked builds
//! panic. An undisposed handle keeps its registry alive, so a handle may be
//! used after every other reference to the registry is gone.
//!
//! Handles made with `create` go through the calling thread's queue for the
//! global registry. The `*_in` variants take an explicit [`ThreadQueue`].

mod bridge;
mod stable;
mod weak;

pub use bridge::BridgeRef;
pub use stable::StableRef;
pub use weak::WeakRef;

use crate::assert::runtime_asserts_enabled;
use crate::node::{Node, Rc};
use crate::object::{ObjRef, RawRef, Referent};
use crate::queue::{self, ThreadQueue};

/// Allocates the handle word for `obj`. Permanent objects get no node.
fn new_raw(queue: &mut ThreadQueue, obj: ObjRef, rc: Rc) -> RawRef {
    if queue.registry().hooks().is_permanent(obj) {
        return RawRef::permanent(obj);
    }
    RawRef::from_node(queue.create_node(obj, rc))
}

/// Returns the node behind a handle word, or `None` for permanent objects.
///
/// # Safety
///
/// The handle owning `raw` must not have been disposed.
unsafe fn node_of<'a>(raw: RawRef) -> Option<&'a Node> {
    match raw.referent() {
        // SAFETY: an undisposed handle keeps its node alive.
        Referent::Node(node) => Some(unsafe { &*node.as_ptr() }),
        Referent::Permanent(_) => None,
    }
}

/// Disposes the node behind `raw`, if any.
fn dispose_raw(raw: RawRef, queue: Option<&mut ThreadQueue>) {
    let Referent::Node(node) = raw.referent() else {
        return;
    };
    match queue {
        Some(queue) => {
            queue.dispose_node(node);
        }
        None => queue::dispose_with_current_queue(node),
    }
}

/// Called from a handle's `Drop`, which only runs for undisposed handles.
fn report_leak(kind: &str) {
    if runtime_asserts_enabled() && !std::thread::panicking() {
        panic!("{kind} dropped without dispose");
    }
}
