//! Round-robin over proxies not known to be unhealthy

use std::sync::atomic::{AtomicUsize, Ordering};

use super::ProxySelector;
use crate::models::ProxyRecord;

/// Cycles through healthy and untested proxies, skipping unhealthy ones
///
/// The cursor indexes the usable subset, so it stays fair as proxies change
/// state. When nothing is usable it cycles through every candidate.
pub struct HealthyRoundRobinSelector {
    index: AtomicUsize,
}

impl HealthyRoundRobinSelector {
    pub fn new() -> Self {
        Self {
            index: AtomicUsize::new(0),
        }
    }
}

impl Default for HealthyRoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxySelector for HealthyRoundRobinSelector {
    fn select(&self, candidates: &[&ProxyRecord]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        let usable: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, p)| p.health.is_usable())
            .map(|(idx, _)| idx)
            .collect();

        let cursor = self.index.fetch_add(1, Ordering::Relaxed);
        if usable.is_empty() {
            Some(cursor % candidates.len())
        } else {
            Some(usable[cursor % usable.len()])
        }
    }

    fn strategy_name(&self) -> &'static str {
        "next_healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthState;
    use crate::proxy::rotation::test_support::proxy;

    #[test]
    fn test_healthy_round_robin_skips_unhealthy() {
        let selector = HealthyRoundRobinSelector::new();
        let proxies = vec![
            proxy("a", HealthState::Healthy, 10),
            proxy("b", HealthState::Unhealthy, 0),
            proxy("c", HealthState::Untested, 0),
        ];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();

        let picks: Vec<usize> = (0..4)
            .map(|_| selector.select(&candidates).unwrap())
            .collect();
        assert_eq!(picks, vec![0, 2, 0, 2]);
    }

    #[test]
    fn test_healthy_round_robin_all_unhealthy_cycles_everything() {
        let selector = HealthyRoundRobinSelector::new();
        let proxies = vec![
            proxy("a", HealthState::Unhealthy, 0),
            proxy("b", HealthState::Unhealthy, 0),
        ];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();

        assert_eq!(selector.select(&candidates), Some(0));
        assert_eq!(selector.select(&candidates), Some(1));
        assert_eq!(selector.select(&candidates), Some(0));
    }

    #[test]
    fn test_healthy_round_robin_empty() {
        assert_eq!(HealthyRoundRobinSelector::new().select(&[]), None);
    }
}
