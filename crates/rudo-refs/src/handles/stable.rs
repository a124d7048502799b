//! Always-strong handles.

use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;

use super::{dispose_raw, new_raw, node_of, report_leak};
use crate::object::{ObjRef, RawRef, Referent};
use crate::queue::{with_current_queue, ThreadQueue};

/// A handle that keeps its object alive until it is disposed.
///
/// The node is created with a count of one and becomes a root immediately,
/// before it is even published.
///
/// # Example
///
/// ```
/// use std::ptr::NonNull;
/// use rudo_refs::{ObjRef, RegistryConfig, SpecialRefRegistry, StableRef};
///
/// let registry = SpecialRefRegistry::new(RegistryConfig::default());
/// let mut queue = registry.thread_queue();
///
/// let mut object = 0u64;
/// let obj = ObjRef::new(NonNull::from(&mut object).cast());
/// let handle = StableRef::create_in(&mut queue, obj);
///
/// assert_eq!(registry.roots().collect::<Vec<_>>(), vec![obj]);
/// assert_eq!(handle.get(), obj);
/// handle.dispose_in(&mut queue);
/// ```
#[must_use = "a StableRef must be disposed"]
pub struct StableRef {
    raw: RawRef,
}

// SAFETY: the node is only touched through atomics.
unsafe impl Send for StableRef {}
// SAFETY: see `Send`.
unsafe impl Sync for StableRef {}

impl StableRef {
    /// Creates a handle in the global registry.
    pub fn create(obj: ObjRef) -> Self {
        with_current_queue(|queue| Self::create_in(queue, obj))
    }

    /// Creates a handle whose node is queued on `queue`.
    pub fn create_in(queue: &mut ThreadQueue, obj: ObjRef) -> Self {
        Self {
            raw: new_raw(queue, obj, 1),
        }
    }

    /// Returns the object. Never fails while the handle exists.
    #[must_use]
    pub fn get(&self) -> ObjRef {
        match self.raw.referent() {
            Referent::Permanent(obj) => obj,
            // SAFETY: `self` is not disposed.
            Referent::Node(node) => unsafe { node.as_ref() }.object_ref(),
        }
    }

    /// Releases the handle's reference and disposes its node.
    pub fn dispose(self) {
        self.finish(None);
    }

    /// Like [`StableRef::dispose`], freeing the node right away if `queue`
    /// still holds it.
    pub fn dispose_in(self, queue: &mut ThreadQueue) {
        self.finish(Some(queue));
    }

    fn finish(self, queue: Option<&mut ThreadQueue>) {
        let this = ManuallyDrop::new(self);
        // SAFETY: not disposed yet.
        if let Some(node) = unsafe { node_of(this.raw) } {
            node.release();
        }
        dispose_raw(this.raw, queue);
    }

    /// Converts the handle into an opaque pointer for native code.
    ///
    /// The disposal obligation moves with it; turn it back with
    /// [`StableRef::from_raw`] eventually.
    #[must_use = "the handle leaks unless the pointer is turned back into a StableRef"]
    pub fn into_raw(self) -> *mut c_void {
        ManuallyDrop::new(self).raw.into_opaque()
    }

    /// Rebuilds a handle from [`StableRef::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`StableRef::into_raw`] and be used at most once.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Self {
        Self {
            // SAFETY: guaranteed by the caller.
            raw: unsafe { RawRef::from_opaque(ptr) },
        }
    }
}

impl Drop for StableRef {
    fn drop(&mut self) {
        report_leak("StableRef");
    }
}

impl fmt::Debug for StableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StableRef").field("raw", &self.raw).finish()
    }
}
