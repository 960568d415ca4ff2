//! Lowest-latency proxy selection strategy

use super::{ProxySelector, RandomSelector};
use crate::models::ProxyRecord;

/// Selects the usable proxy with the lowest measured response time
///
/// Ties go to the higher uptime, then to load order. Without any measured,
/// usable proxy this behaves exactly like [`RandomSelector`].
pub struct FastestSelector {
    fallback: RandomSelector,
}

impl FastestSelector {
    pub fn new() -> Self {
        Self {
            fallback: RandomSelector::new(),
        }
    }
}

impl Default for FastestSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxySelector for FastestSelector {
    fn select(&self, candidates: &[&ProxyRecord]) -> Option<usize> {
        let fastest = candidates
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_measured())
            .min_by(|(ia, a), (ib, b)| {
                a.response_time_ms
                    .cmp(&b.response_time_ms)
                    .then_with(|| b.uptime.total_cmp(&a.uptime))
                    .then_with(|| ia.cmp(ib))
            })
            .map(|(idx, _)| idx);

        fastest.or_else(|| self.fallback.select(candidates))
    }

    fn strategy_name(&self) -> &'static str {
        "fastest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthState;
    use crate::proxy::rotation::test_support::proxy;

    #[test]
    fn test_fastest_empty() {
        assert_eq!(FastestSelector::new().select(&[]), None);
    }

    #[test]
    fn test_fastest_ignores_unhealthy_and_unmeasured() {
        let proxies = vec![
            proxy("a", HealthState::Healthy, 100),
            proxy("b", HealthState::Healthy, 50),
            proxy("c", HealthState::Unhealthy, 10),
            proxy("d", HealthState::Untested, 0),
        ];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();

        assert_eq!(FastestSelector::new().select(&candidates), Some(1));
    }

    #[test]
    fn test_fastest_untested_with_history_counts() {
        let proxies = vec![
            proxy("a", HealthState::Healthy, 100),
            proxy("b", HealthState::Untested, 40),
        ];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();

        assert_eq!(FastestSelector::new().select(&candidates), Some(1));
    }

    #[test]
    fn test_fastest_tie_breaks_on_uptime() {
        let proxies = vec![
            proxy("a", HealthState::Healthy, 50).with_uptime(90.0),
            proxy("b", HealthState::Healthy, 50).with_uptime(99.5),
            proxy("c", HealthState::Healthy, 50).with_uptime(99.5),
        ];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();

        assert_eq!(FastestSelector::new().select(&candidates), Some(1));
    }

    #[test]
    fn test_fastest_without_measurements_behaves_like_random() {
        let proxies = vec![
            proxy("a", HealthState::Unhealthy, 10),
            proxy("b", HealthState::Untested, 0),
            proxy("c", HealthState::Unhealthy, 0),
            proxy("d", HealthState::Healthy, 0),
        ];
        let candidates: Vec<&ProxyRecord> = proxies.iter().collect();
        let selector = FastestSelector::new();

        for _ in 0..100 {
            let idx = selector.select(&candidates).unwrap();
            assert!(idx == 1 || idx == 3);
        }
    }
}
