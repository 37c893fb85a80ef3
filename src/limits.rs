//! Resource limits for sandboxed execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource limits for one evaluation.
///
/// The timeout budget is the single piece of external configuration the
/// engine consumes; everything else about an invocation is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum wall-clock evaluation time before forced termination.
    pub max_duration: Duration,

    /// V8 heap limit in bytes.
    pub max_heap_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_millis(5_000),
            max_heap_bytes: 100 * 1024 * 1024, // V8 needs a reasonable heap
        }
    }
}

impl ResourceLimits {
    /// Tight limits for hostile code.
    pub fn strict() -> Self {
        Self {
            max_duration: Duration::from_millis(1_000),
            max_heap_bytes: 16 * 1024 * 1024,
        }
    }

    /// Generous limits for trusted workloads.
    pub fn permissive() -> Self {
        Self {
            max_duration: Duration::from_secs(30),
            max_heap_bytes: 500 * 1024 * 1024,
        }
    }

    /// Set the timeout budget.
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Set the heap limit.
    pub fn with_max_heap_bytes(mut self, max_heap_bytes: usize) -> Self {
        self.max_heap_bytes = max_heap_bytes;
        self
    }
}
