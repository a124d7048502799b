//! Invariant checks.
//!
//! Violated invariants in the registry are programmer errors and there is no
//! layer above that could recover from them, so they are fatal. Checks are
//! active in debug builds and when the `runtime-asserts` feature is enabled.

/// Returns `true` if [`runtime_assert!`] checks are compiled in.
#[inline]
#[must_use]
pub const fn runtime_asserts_enabled() -> bool {
    cfg!(any(debug_assertions, feature = "runtime-asserts"))
}

/// `assert!` that is compiled out unless runtime asserts are enabled.
macro_rules! runtime_assert {
    ($cond:expr, $($arg:tt)+) => {
        if $crate::assert::runtime_asserts_enabled() {
            assert!($cond, $($arg)+);
        }
    };
}

pub(crate) use runtime_assert;
