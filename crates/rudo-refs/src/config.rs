//! Registry configuration.

/// Initial capacity of a thread-local queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Whether 1→0 releases synchronize with a concurrent root scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseGuard {
    /// The collector scans roots while mutators run. A release that drops a
    /// node's count to zero waits for any in-flight root-scan step.
    #[default]
    Enabled,
    /// Roots are only scanned while mutators are stopped.
    Disabled,
}

/// Configuration for a [`SpecialRefRegistry`](crate::SpecialRefRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Synchronization of 1→0 releases with root scans.
    pub release_guard: ReleaseGuard,
    /// Initial capacity of each thread-local queue.
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            release_guard: ReleaseGuard::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
