//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rudo_refs::{GcHooks, ObjRef};

/// A heap allocation standing in for a managed object.
pub struct FakeObject(Box<u64>);

impl FakeObject {
    pub fn new(value: u64) -> Self {
        Self(Box::new(value))
    }

    pub fn obj(&self) -> ObjRef {
        ObjRef::new(NonNull::from(&*self.0).cast())
    }
}

/// A pool of fake objects that outlives every handle in a test.
pub fn objects(count: usize) -> Vec<FakeObject> {
    (0..count as u64).map(FakeObject::new).collect()
}

/// Hooks driven by the test: objects can be marked permanent or dying, and
/// the weak read barrier can be raised.
#[derive(Default)]
pub struct ScriptedHooks {
    barrier: AtomicBool,
    dying: Mutex<HashSet<usize>>,
    permanent: Mutex<HashSet<usize>>,
}

impl ScriptedHooks {
    pub fn mark_dying(&self, obj: ObjRef) {
        self.dying.lock().insert(obj.addr());
    }

    pub fn mark_permanent(&self, obj: ObjRef) {
        self.permanent.lock().insert(obj.addr());
    }

    pub fn set_barrier(&self, active: bool) {
        self.barrier.store(active, Ordering::SeqCst);
    }
}

impl GcHooks for ScriptedHooks {
    fn is_permanent(&self, obj: ObjRef) -> bool {
        self.permanent.lock().contains(&obj.addr())
    }

    fn weak_read_barrier_active(&self) -> bool {
        self.barrier.load(Ordering::SeqCst)
    }

    fn weak_read(&self, obj: ObjRef) -> Option<ObjRef> {
        (!self.dying.lock().contains(&obj.addr())).then_some(obj)
    }
}
