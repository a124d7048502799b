//! # Lock Ordering Discipline
//!
//! The registry keeps retain/release lock-free. Three locks exist for the
//! slow paths, and they must be acquired in increasing level:
//!
//! | Level | Lock            | Held by                                         |
//! |-------|-----------------|-------------------------------------------------|
//! | 1     | `Scanner`       | a [`RootsIter`](crate::RootsIter) for its lifetime |
//! | 2     | `List`          | publish, and [`LockedNodes`](crate::LockedNodes) |
//! | 3     | `ReleaseGuard`  | one root-scan step (write), 1→0 releases and node deletion (read) |
//!
//! ## Forbidden Patterns
//!
//! - Never start a root scan while holding the canonical list.
//! - Never publish a thread queue from inside a release guard.
//!
//! In debug builds every acquisition goes through [`LockGuard::new`], which
//! panics on a downgrade.

use std::cell::{Cell, RefCell};

const MAX_LOCK_DEPTH: usize = 8;

struct LockOrderState {
    stack: RefCell<Vec<u8>>,
    is_shutdown: Cell<bool>,
}

thread_local!(static LOCK_ORDER_STATE: LockOrderState = LockOrderState {
    stack: RefCell::new(Vec::with_capacity(MAX_LOCK_DEPTH)),
    is_shutdown: Cell::new(false),
});

/// Lock order tags for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LockOrder {
    /// Exclusive right to scan the root list (level 1).
    Scanner = 1,
    /// Canonical node list (level 2).
    List = 2,
    /// Root-scan step exclusion (level 3).
    ReleaseGuard = 3,
}

impl LockOrder {
    /// Get the conceptual lock level for this lock type.
    #[must_use]
    pub const fn level(self) -> u8 {
        self as u8
    }

    const fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Scanner),
            2 => Some(Self::List),
            3 => Some(Self::ReleaseGuard),
            _ => None,
        }
    }
}

/// Debug-only marker that a lock of the given order is held.
#[must_use = "LockGuard must be held for the duration of the critical section"]
#[derive(Debug)]
pub struct LockGuard {
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    tag: LockOrder,
}

impl LockGuard {
    /// Validates that `tag` may be acquired now and records it as held.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if a lock of a higher level is already held.
    #[inline]
    pub fn new(tag: LockOrder) -> Self {
        #[cfg(debug_assertions)]
        {
            if let Some(held) = highest_held_lock() {
                validate_lock_order(tag, held);
            }
            push_lock(tag);
        }
        Self { tag }
    }
}

#[cfg(debug_assertions)]
impl Drop for LockGuard {
    fn drop(&mut self) {
        let tag = self.tag.level();
        let _ = LOCK_ORDER_STATE.try_with(|state| {
            if !state.is_shutdown.get() {
                let mut stack = state.stack.borrow_mut();
                if let Some(pos) = stack.iter().rposition(|&level| level == tag) {
                    stack.remove(pos);
                }
            }
        });
    }
}

/// Mark the current thread as shutting down.
///
/// After calling this function, lock order tracking is disabled for the
/// thread. Thread-local destructors that may take registry locks call this
/// first, since the tracking state may already be gone.
#[inline]
#[allow(clippy::missing_const_for_fn)]
pub fn enter_thread_shutdown() {
    #[cfg(debug_assertions)]
    {
        let _ = LOCK_ORDER_STATE.try_with(|state| {
            state.is_shutdown.set(true);
        });
    }
}

/// Panics if `tag` would be acquired below an already held level.
///
/// Reacquiring the same level is a violation too: none of the registry locks
/// are reentrant.
#[inline]
#[allow(clippy::format_in_format_args)]
#[cfg(debug_assertions)]
pub fn validate_lock_order(tag: LockOrder, held: LockOrder) {
    assert!(
        tag.level() > held.level(),
        "Lock ordering violation: {} (level {}) cannot be acquired while holding {} (level {})",
        format!("{tag:?}"),
        tag.level(),
        format!("{held:?}"),
        held.level()
    );
}

#[cfg(debug_assertions)]
fn push_lock(order: LockOrder) {
    let _ = LOCK_ORDER_STATE.try_with(|state| {
        if state.is_shutdown.get() {
            return;
        }
        state.stack.borrow_mut().push(order.level());
    });
}

/// Get the highest lock level currently held by this thread.
#[cfg(debug_assertions)]
#[must_use]
pub fn highest_held_lock() -> Option<LockOrder> {
    LOCK_ORDER_STATE
        .try_with(|state| {
            if state.is_shutdown.get() {
                return None;
            }
            let stack = state.stack.borrow();
            stack
                .iter()
                .copied()
                .max()
                .and_then(LockOrder::from_level)
        })
        .unwrap_or(None)
}
