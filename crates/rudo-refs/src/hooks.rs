//! Collector-supplied callbacks.
//!
//! The registry does not know the object layout or the collector's phases.
//! Whatever it needs from them is asked through [`GcHooks`].

use crate::object::ObjRef;

/// Callbacks the collector and object model provide to the registry.
///
/// Every method has a default so a collector only overrides what it uses.
pub trait GcHooks: Send + Sync {
    /// Returns `true` if `obj` is permanently allocated.
    ///
    /// Handles to permanent objects never allocate a node; the object
    /// address is stored in the handle with the low bit set, so such objects
    /// must be at least 2-byte aligned.
    fn is_permanent(&self, obj: ObjRef) -> bool {
        let _ = obj;
        false
    }

    /// Returns `true` while the collector is nulling out dying objects.
    ///
    /// While this is raised, weak reads go through [`GcHooks::weak_read`]
    /// instead of returning the stored pointer directly.
    fn weak_read_barrier_active(&self) -> bool {
        false
    }

    /// Weak read barrier: returns `None` if `obj` is about to be collected.
    fn weak_read(&self, obj: ObjRef) -> Option<ObjRef> {
        Some(obj)
    }
}

/// Hooks for a collector that has no permanent objects and never needs a
/// weak read barrier.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl GcHooks for NoopHooks {}
