//! Random proxy selection strategy

use rand::Rng;

use super::ProxySelector;
use crate::models::ProxyRecord;

/// Selects a random proxy, preferring ones not known to be unhealthy
///
/// Falls back to the whole candidate list when every proxy is unhealthy.
pub struct RandomSelector;

impl RandomSelector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxySelector for RandomSelector {
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

        let mut rng = rand::thread_rng();
        if usable.is_empty() {
            Some(rng.gen_range(0..candidates.len()))
        } else {
            Some(usable[rng.gen_range(0..usable.len())])
        }
    }

    fn strategy_name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthState;
    use crate::proxy::rotation::test_support::proxy;

    #[test]
    fn test_random_selector_empty() {
        let selector = RandomSelector::new();
        assert_eq!(selector.select(&[]), None);
    }

    #[test]
    fn test_random_selector_single_proxy() {
        let selector = RandomSelector::new();
        let proxies = vec![proxy("a", HealthState::Untested, 0)];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();

        assert_eq!(selector.select(&candidates), Some(0));
    }

    #[test]
    fn test_random_selector_skips_unhealthy() {
        let selector = RandomSelector::new();
        let proxies = vec![
            proxy("a", HealthState::Unhealthy, 0),
            proxy("b", HealthState::Healthy, 30),
            proxy("c", HealthState::Unhealthy, 0),
            proxy("d", HealthState::Untested, 0),
        ];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();

        for _ in 0..200 {
            let idx = selector.select(&candidates).unwrap();
            assert!(idx == 1 || idx == 3, "picked unhealthy proxy {}", idx);
        }
    }

    #[test]
    fn test_random_selector_all_unhealthy_falls_back() {
        let selector = RandomSelector::new();
        let proxies = vec![
            proxy("a", HealthState::Unhealthy, 0),
            proxy("b", HealthState::Unhealthy, 0),
        ];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();

        for _ in 0..20 {
            let idx = selector.select(&candidates).unwrap();
            assert!(idx < 2);
        }
    }
}
