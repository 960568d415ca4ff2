//! Round-robin proxy selection strategy

use std::sync::atomic::{AtomicUsize, Ordering};

use super::ProxySelector;
use crate::models::ProxyRecord;

/// Selects proxies in round-robin order, unhealthy ones included
///
/// Uses atomic operations for lock-free index tracking. Concurrent callers
/// may interleave, so rotation is approximate under contention.
pub struct RoundRobinSelector {
    index: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            index: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxySelector for RoundRobinSelector {
    fn select(&self, candidates: &[&ProxyRecord]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        Some(self.index.fetch_add(1, Ordering::Relaxed) % candidates.len())
    }

    fn strategy_name(&self) -> &'static str {
        "next"
    }
}
