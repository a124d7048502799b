//! Handles whose strength is toggled from outside.
//!
//! A bridge handle backs a reference held by a foreign object, for example a
//! native wrapper that points back into the managed heap. The foreign side
//! retains the handle while it needs the object kept alive and releases it
//! when the object may die, any number of times. A released bridge handle
//! behaves like a weak handle.

use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;

use super::{dispose_raw, new_raw, node_of, report_leak};
use crate::node::{Node, Rc};
use crate::object::{ObjRef, RawRef, Referent};
use crate::queue::{with_current_queue, ThreadQueue};

/// A handle with an externally managed count.
///
/// Created retained, with a count of one. Every [`BridgeRef::retain`] must be
/// matched by a [`BridgeRef::release`], and the count must be back at zero
/// when the handle is disposed.
///
/// # Example
///
/// ```
/// use std::ptr::NonNull;
/// use rudo_refs::{BridgeRef, ObjRef, RegistryConfig, SpecialRefRegistry};
///
/// let registry = SpecialRefRegistry::new(RegistryConfig::default());
/// let mut queue = registry.thread_queue();
///
/// let mut object = 0u64;
/// let obj = ObjRef::new(NonNull::from(&mut object).cast());
/// let bridge = BridgeRef::create_in(&mut queue, obj);
///
/// bridge.release();
/// assert_eq!(registry.roots().count(), 0);
/// assert!(bridge.try_retain());
/// assert_eq!(registry.roots().collect::<Vec<_>>(), vec![obj]);
///
/// bridge.release();
/// bridge.dispose_in(&mut queue);
/// ```
#[must_use = "a BridgeRef must be disposed"]
pub struct BridgeRef {
    raw: RawRef,
}

// SAFETY: the node is only touched through atomics.
unsafe impl Send for BridgeRef {}
// SAFETY: see `Send`.
unsafe impl Sync for BridgeRef {}

impl BridgeRef {
    /// Creates a retained handle in the global registry.
    pub fn create(obj: ObjRef) -> Self {
        with_current_queue(|queue| Self::create_in(queue, obj))
    }

    /// Creates a retained handle whose node is queued on `queue`.
    pub fn create_in(queue: &mut ThreadQueue, obj: ObjRef) -> Self {
        Self {
            raw: new_raw(queue, obj, 1),
        }
    }

    /// Adds a reference, making the object a root if the count was zero.
    ///
    /// On a 0→1 transition the caller must keep the object reachable some
    /// other way until the call returns. When that cannot be guaranteed use
    /// [`BridgeRef::try_retain`].
    pub fn retain(&self) {
        // SAFETY: `self` is not disposed.
        if let Some(node) = unsafe { node_of(self.raw) } {
            node.retain();
        }
    }

    /// Drops a reference. The count must be positive.
    pub fn release(&self) {
        // SAFETY: `self` is not disposed.
        if let Some(node) = unsafe { node_of(self.raw) } {
            node.release();
        }
    }

    /// Retains the handle unless its object is already dead.
    ///
    /// Returns `false`, leaving the count unchanged, if a weak read of the
    /// object fails or the collector clears it while the handle is being
    /// retained.
    #[must_use]
    pub fn try_retain(&self) -> bool {
        // SAFETY: `self` is not disposed.
        unsafe { node_of(self.raw) }.is_none_or(Node::try_retain)
    }

    /// Returns the object of a retained handle.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if the handle is not retained.
    #[must_use]
    pub fn get(&self) -> ObjRef {
        match self.raw.referent() {
            Referent::Permanent(obj) => obj,
            // SAFETY: `self` is not disposed.
            Referent::Node(node) => unsafe { node.as_ref() }.object_ref(),
        }
    }

    /// Returns the object if it is still alive, retained or not.
    #[must_use]
    pub fn try_get(&self) -> Option<ObjRef> {
        match self.raw.referent() {
            Referent::Permanent(obj) => Some(obj),
            // SAFETY: `self` is not disposed.
            Referent::Node(node) => unsafe { node.as_ref() }.try_object_ref(),
        }
    }

    /// Current count. Permanent objects report one.
    #[must_use]
    pub fn ref_count(&self) -> Rc {
        // SAFETY: `self` is not disposed.
        unsafe { node_of(self.raw) }.map_or(1, Node::ref_count)
    }

    /// Disposes the handle. Every reference must have been released.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if the count is not zero.
    pub fn dispose(self) {
        dispose_raw(ManuallyDrop::new(self).raw, None);
    }

    /// Like [`BridgeRef::dispose`], freeing the node right away if `queue`
    /// still holds it.
    pub fn dispose_in(self, queue: &mut ThreadQueue) {
        dispose_raw(ManuallyDrop::new(self).raw, Some(queue));
    }

    /// Converts the handle into an opaque pointer for native code.
    #[must_use = "the handle leaks unless the pointer is turned back into a BridgeRef"]
    pub fn into_raw(self) -> *mut c_void {
        ManuallyDrop::new(self).raw.into_opaque()
    }

    /// Rebuilds a handle from [`BridgeRef::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`BridgeRef::into_raw`] and be used at most once.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Self {
        Self {
            // SAFETY: guaranteed by the caller.
            raw: unsafe { RawRef::from_opaque(ptr) },
        }
    }
}

impl Drop for BridgeRef {
    fn drop(&mut self) {
        report_leak("BridgeRef");
    }
}

impl fmt::Debug for BridgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRef")
            .field("raw", &self.raw)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
