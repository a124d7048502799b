//! Never-strong handles.

use std::fmt;
use std::mem::ManuallyDrop;

use super::{dispose_raw, new_raw, report_leak};
use crate::object::{ObjRef, RawRef, Referent};
use crate::queue::{with_current_queue, ThreadQueue};

/// A handle that observes its object without keeping it alive.
///
/// The node's count stays at zero, so it never joins the root set. Once the
/// collector decides the object is dead and clears the node,
/// [`WeakRef::try_get`] returns `None`.
#[must_use = "a WeakRef must be disposed"]
pub struct WeakRef {
    raw: RawRef,
}

// SAFETY: the node is only touched through atomics.
unsafe impl Send for WeakRef {}
// SAFETY: see `Send`.
unsafe impl Sync for WeakRef {}

impl WeakRef {
    /// Creates a handle in the global registry.
    pub fn create(obj: ObjRef) -> Self {
        with_current_queue(|queue| Self::create_in(queue, obj))
    }

    /// Creates a handle whose node is queued on `queue`.
    pub fn create_in(queue: &mut ThreadQueue, obj: ObjRef) -> Self {
        Self {
            raw: new_raw(queue, obj, 0),
        }
    }

    /// Returns the object if it is still alive.
    ///
    /// While the collector's weak read barrier is raised, the object is
    /// checked through [`GcHooks::weak_read`](crate::GcHooks::weak_read).
    ///
    /// # Panics
    ///
    /// In checked builds, panics unless the calling thread is
    /// [`ThreadState::Runnable`](crate::ThreadState::Runnable).
    #[must_use]
    pub fn try_get(&self) -> Option<ObjRef> {
        match self.raw.referent() {
            Referent::Permanent(obj) => Some(obj),
            // SAFETY: `self` is not disposed.
            Referent::Node(node) => unsafe { node.as_ref() }.try_object_ref(),
        }
    }

    /// Disposes the handle's node.
    pub fn dispose(self) {
        dispose_raw(ManuallyDrop::new(self).raw, None);
    }

    /// Like [`WeakRef::dispose`], freeing the node right away if `queue`
    /// still holds it.
    pub fn dispose_in(self, queue: &mut ThreadQueue) {
        dispose_raw(ManuallyDrop::new(self).raw, Some(queue));
    }
}

impl Drop for WeakRef {
    fn drop(&mut self) {
        report_leak("WeakRef");
    }
}

impl fmt::Debug for WeakRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRef").field("raw", &self.raw).finish()
    }
}
