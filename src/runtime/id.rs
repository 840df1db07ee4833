//! Context ID generation

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique context IDs
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a device context
///
/// Buffers record the ID of the context that allocated them so that
/// cross-context operations can be rejected. IDs are unique within a
/// process lifetime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Create a new unique context ID
    #[inline]
    pub fn new() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Context({})", self.0)
    }
}
