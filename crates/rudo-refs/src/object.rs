//! Opaque managed-object pointers and the tagged handle word.
//!
//! The registry never looks inside a managed object. It stores addresses and
//! hands them back to the collector. Permanent (immortal) objects never get a
//! [`Node`](crate::node::Node): their handle word is the object address with
//! the low bit set.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::assert::runtime_assert;
use crate::node::Node;

/// Low bit set on a handle word that carries a permanent object address.
pub(crate) const PERMANENT_TAG: usize = 1;

/// An opaque pointer to a managed object.
///
/// `ObjRef` is `Copy` and compares by address. Holding one does not keep the
/// object alive; use a [`StableRef`](crate::StableRef) for that.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjRef(NonNull<u8>);

// SAFETY: `ObjRef` is an address. The registry never dereferences it, and the
// collector that does is responsible for synchronizing access to the object.
unsafe impl Send for ObjRef {}
// SAFETY: see `Send`.
unsafe impl Sync for ObjRef {}

impl ObjRef {
    /// Wraps a non-null object address.
    #[inline]
    #[must_use]
    pub const fn new(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Wraps a raw object address, returning `None` for null.
    #[inline]
    #[must_use]
    pub fn from_ptr(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Returns the raw object address.
    #[inline]
    #[must_use]
    pub const fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Returns the object address as an integer.
    #[inline]
    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr().addr()
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:p})", self.0)
    }
}

/// What a handle word points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Referent {
    /// A registry node tracking the object.
    Node(NonNull<Node>),
    /// A permanent object that bypasses the registry.
    Permanent(ObjRef),
}

/// The pointer-sized word stored inside every handle.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct RawRef(NonNull<u8>);

impl RawRef {
    #[inline]
    pub(crate) const fn from_node(node: NonNull<Node>) -> Self {
        Self(node.cast())
    }

    #[inline]
    pub(crate) fn permanent(obj: ObjRef) -> Self {
        runtime_assert!(
            obj.addr() & PERMANENT_TAG == 0,
            "permanent object {obj:?} is not aligned enough to be tagged"
        );
        let tagged = obj.as_ptr().map_addr(|addr| addr | PERMANENT_TAG);
        // SAFETY: setting the low bit of a non-null address keeps it non-null.
        Self(unsafe { NonNull::new_unchecked(tagged) })
    }

    #[inline]
    pub(crate) fn referent(self) -> Referent {
        let ptr = self.0.as_ptr();
        if ptr.addr() & PERMANENT_TAG == 0 {
            Referent::Node(self.0.cast())
        } else {
            let untagged = ptr.map_addr(|addr| addr & !PERMANENT_TAG);
            // SAFETY: the tagged word was built from a non-null, 2-aligned
            // address, so clearing the tag leaves it non-null.
            Referent::Permanent(ObjRef(unsafe { NonNull::new_unchecked(untagged) }))
        }
    }

    #[inline]
    pub(crate) fn into_opaque(self) -> *mut c_void {
        self.0.as_ptr().cast()
    }

    /// # Safety
    ///
    /// `ptr` must come from [`RawRef::into_opaque`].
    #[inline]
    pub(crate) const unsafe fn from_opaque(ptr: *mut c_void) -> Self {
        // SAFETY: guaranteed by the caller.
        Self(unsafe { NonNull::new_unchecked(ptr.cast()) })
    }
}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.referent() {
            Referent::Node(node) => write!(f, "RawRef::Node({node:p})"),
            Referent::Permanent(obj) => write!(f, "RawRef::Permanent({obj:?})"),
        }
    }
}
