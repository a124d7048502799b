//! Fake managed objects, hooks and pause points for unit tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::hooks::GcHooks;
use crate::node::Node;
use crate::object::ObjRef;

/// A heap word standing in for a managed object.
pub struct TestObject(Box<u64>);

impl TestObject {
    pub fn new() -> Self {
        Self(Box::new(0))
    }

    pub fn obj(&self) -> ObjRef {
        ObjRef::new(NonNull::from(&*self.0).cast())
    }
}

/// Hooks with a switchable weak read barrier.
#[derive(Default)]
pub struct TestHooks {
    pub barrier: AtomicBool,
    dying: Mutex<HashSet<usize>>,
    permanent: Mutex<HashSet<usize>>,
}

impl TestHooks {
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

impl GcHooks for TestHooks {
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

/// Places inside registry operations where a test can step in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PausePoint {
    /// `Node::try_retain`, after the weak read and before the increment.
    TryRetain,
    /// A root scan found a zero count and is about to unlink the node.
    BeforeUnlink,
    /// A root scan unlinked a node and has not rechecked its count yet.
    AfterUnlink,
}

type PauseAction = Box<dyn FnOnce(&Node)>;

thread_local! {
    static PAUSES: RefCell<Vec<(PausePoint, PauseAction)>> = const { RefCell::new(Vec::new()) };
}

/// Runs `action` the next time the calling thread reaches `point`.
pub(crate) fn on_pause(point: PausePoint, action: impl FnOnce(&Node) + 'static) {
    PAUSES.with(|pauses| pauses.borrow_mut().push((point, Box::new(action))));
}

pub(crate) fn pause_at(point: PausePoint, node: &Node) {
    let action = PAUSES.with(|pauses| {
        let mut pauses = pauses.borrow_mut();
        let at = pauses.iter().position(|(p, _)| *p == point)?;
        Some(pauses.remove(at).1)
    });
    if let Some(action) = action {
        action(node);
    }
}
