//! Special-reference registry for a concurrent garbage collector.
//!
//! `rudo-refs` tracks managed objects that are referenced from outside the
//! managed heap: native code, foreign wrappers, long-lived runtime tables.
//! Every such reference is backed by a registry node carrying an external
//! reference count. Nodes with a positive count form the **root set**, which
//! the collector scans concurrently with running mutators.
//!
//! The hot path (retain and release) is a single atomic operation on the
//! node. Locks are only taken when a thread publishes its new nodes, when
//! the collector walks every node, and for the brief window where a node
//! leaves the root set during a scan.
//!
//! # Handles
//!
//! - [`StableRef`]: keeps its object alive until disposed.
//! - [`WeakRef`]: observes its object without keeping it alive.
//! - [`BridgeRef`]: toggled between the two by an external owner.
//!
//! Handles are move-only and must be consumed by `dispose`.
//!
//! # Quick Start
//!
//! ```
//! use std::ptr::NonNull;
//! use rudo_refs::{ObjRef, RegistryConfig, SpecialRefRegistry, StableRef, WeakRef};
//!
//! let registry = SpecialRefRegistry::new(RegistryConfig::default());
//! let mut queue = registry.thread_queue();
//!
//! let mut a = 0u64;
//! let mut b = 0u64;
//! let a = ObjRef::new(NonNull::from(&mut a).cast());
//! let b = ObjRef::new(NonNull::from(&mut b).cast());
//!
//! let strong = StableRef::create_in(&mut queue, a);
//! let weak = WeakRef::create_in(&mut queue, b);
//! queue.publish();
//!
//! // Concurrent root scan.
//! assert_eq!(registry.roots().collect::<Vec<_>>(), vec![a]);
//!
//! // Exclusive phase: invalidate references to objects found dead.
//! for node in &mut registry.lock_for_iter() {
//!     if node.object() == Some(b) {
//!         node.clear_object();
//!     }
//! }
//! assert_eq!(weak.try_get(), None);
//!
//! strong.dispose();
//! weak.dispose();
//! ```
//!
//! # Collector integration
//!
//! The registry knows nothing about object layout. Permanent objects and the
//! weak read barrier are provided through [`GcHooks`]. Most runtimes install
//! one process-wide registry with [`init_global`]; handles made with
//! `create` use it through a per-thread [`ThreadQueue`].

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod assert;
mod config;
mod handles;
mod hooks;
mod iter;
mod metrics;
mod node;
mod object;
mod queue;
mod registry;
mod roots;
mod sync;
mod thread_state;
mod tracing;

#[cfg(test)]
mod test_support;

// Re-export public API
pub use assert::runtime_asserts_enabled;
pub use config::{RegistryConfig, ReleaseGuard, DEFAULT_QUEUE_CAPACITY};
pub use handles::{BridgeRef, StableRef, WeakRef};
pub use hooks::{GcHooks, NoopHooks};
pub use iter::{LockedNodes, NodeView, NodesIter};
pub use metrics::RegistryStats;
pub use node::{Rc, DISPOSED_MARKER};
pub use object::ObjRef;
pub use queue::{detach_current_thread, ThreadQueue};
pub use registry::{global, init_global, shutdown_global, SpecialRefRegistry};
pub use roots::RootsIter;
pub use thread_state::{current_thread_state, ThreadState, ThreadStateGuard};
pub use self::tracing::ScanId;
