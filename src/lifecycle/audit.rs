//! Post-shutdown buffer accounting.
//!
//! Buffers live outside normal ownership tracking once handed to a
//! listener, so a missing return would otherwise go unnoticed. After
//! teardown every buffer the pool owns must be back in the free list.

use serde::Serialize;

/// Point-in-time buffer counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceAccounting {
    /// Buffers the pool currently owns, on loan or free.
    pub allocated: usize,
    /// Buffers currently sitting in the free list.
    pub free: usize,
}

impl ResourceAccounting {
    /// Buffers handed out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.allocated.saturating_sub(self.free)
    }
}

/// Anything that can report buffer counters.
pub trait BufferStats {
    fn stats(&self) -> ResourceAccounting;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Clean(ResourceAccounting),
    Leaked(ResourceAccounting),
}

impl AuditOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, AuditOutcome::Clean(_))
    }
}

/// Compare allocated against free and log a mismatch. Never fails.
pub fn audit_buffers(source: &impl BufferStats) -> AuditOutcome {
    let stats = source.stats();
    crate::observability::metrics::record_buffer_stats(stats);

    if stats.allocated == stats.free {
        tracing::debug!(buffers = stats.allocated, "All buffers returned to the pool");
        AuditOutcome::Clean(stats)
    } else {
        tracing::error!(
            expected = stats.allocated,
            got = stats.free,
            outstanding = stats.outstanding(),
            "Number of free buffers do not match"
        );
        AuditOutcome::Leaked(stats)
    }
}
