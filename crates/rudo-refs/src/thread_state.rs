//! Per-thread execution state.
//!
//! The full safepoint machinery lives outside this crate. The registry only
//! needs to know whether the calling thread may observe the live object
//! graph, which is what [`WeakRef::try_get`](crate::WeakRef::try_get) checks.

use std::cell::Cell;
use std::marker::PhantomData;

/// Execution state of a mutator thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Running managed code; safe to read object references.
    #[default]
    Runnable,
    /// Running native code; the collector may treat the thread as parked.
    Native,
}

thread_local! {
    static STATE: Cell<ThreadState> = const { Cell::new(ThreadState::Runnable) };
}

/// Returns the calling thread's current state.
#[must_use]
pub fn current_thread_state() -> ThreadState {
    STATE.try_with(Cell::get).unwrap_or(ThreadState::Native)
}

/// Switches the calling thread into a state for a scope.
///
/// The previous state is restored on drop.
///
/// # Example
///
/// ```
/// use rudo_refs::{current_thread_state, ThreadState, ThreadStateGuard};
///
/// {
///     let _native = ThreadStateGuard::native();
///     assert_eq!(current_thread_state(), ThreadState::Native);
/// }
/// assert_eq!(current_thread_state(), ThreadState::Runnable);
/// ```
#[must_use = "the previous state is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ThreadStateGuard {
    previous: ThreadState,
    _not_send: PhantomData<*const ()>,
}

impl ThreadStateGuard {
    /// Enters `state` until the guard is dropped.
    pub fn new(state: ThreadState) -> Self {
        let previous = STATE.with(|cell| cell.replace(state));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Enters [`ThreadState::Native`] until the guard is dropped.
    pub fn native() -> Self {
        Self::new(ThreadState::Native)
    }

    /// Enters [`ThreadState::Runnable`] until the guard is dropped.
    pub fn runnable() -> Self {
        Self::new(ThreadState::Runnable)
    }
}

impl Drop for ThreadStateGuard {
    fn drop(&mut self) {
        let _ = STATE.try_with(|cell| cell.set(self.previous));
    }
}
