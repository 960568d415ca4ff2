//! Proxy selection strategies
//!
//! Each strategy picks one entry from an already-filtered candidate list.
//! [`PoolSelector`] composes them with the store and the type/country filters.

mod fastest;
mod healthy_round_robin;
mod random;
mod round_robin;

pub use fastest::FastestSelector;
pub use healthy_round_robin::HealthyRoundRobinSelector;
pub use random::RandomSelector;
pub use round_robin::RoundRobinSelector;

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{ProxyFilter, ProxyRecord};
use crate::proxy::store::ProxyStore;

/// Policy used to pick a proxy for one request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Cycle through every proxy, healthy or not
    RoundRobin,
    #[default]
    Random,
    Fastest,
    /// Cycle through proxies that are not known to be unhealthy
    HealthyRoundRobin,
    /// A specific `host:port` from the pool
    Explicit { host: String, port: u16 },
}

impl SelectionPolicy {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "next" | "round_robin" | "roundrobin" | "round-robin" => Self::RoundRobin,
            "fastest" => Self::Fastest,
            "next_healthy" | "next-healthy" | "healthy" => Self::HealthyRoundRobin,
            _ => Self::Random,
        }
    }

    /// Parse `host:port` (IPv6 hosts in brackets) into an explicit policy
    pub fn explicit(address: &str) -> Option<Self> {
        let (host, port) = address.trim().rsplit_once(':')?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        let port = port.parse::<u16>().ok().filter(|p| *p != 0)?;
        Some(Self::Explicit {
            host: host.to_string(),
            port,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "next",
            Self::Random => "random",
            Self::Fastest => "fastest",
            Self::HealthyRoundRobin => "next_healthy",
            Self::Explicit { .. } => "explicit",
        }
    }
}

/// Trait for proxy selection strategies
///
/// Implementations never mutate the records they are given; any state they
/// keep (such as a cursor) is their own.
pub trait ProxySelector: Send + Sync {
    /// Pick a position in `candidates`, or `None` when nothing can be chosen
    fn select(&self, candidates: &[&ProxyRecord]) -> Option<usize>;

    /// Get the strategy name
    fn strategy_name(&self) -> &'static str;
}

/// Create a selector for a strategy policy.
///
/// Returns `None` for [`SelectionPolicy::Explicit`], which is a lookup rather
/// than a strategy.
pub fn create_selector(policy: &SelectionPolicy) -> Option<Box<dyn ProxySelector>> {
    match policy {
        SelectionPolicy::RoundRobin => Some(Box::new(RoundRobinSelector::new())),
        SelectionPolicy::Random => Some(Box::new(RandomSelector::new())),
        SelectionPolicy::Fastest => Some(Box::new(FastestSelector::new())),
        SelectionPolicy::HealthyRoundRobin => Some(Box::new(HealthyRoundRobinSelector::new())),
        SelectionPolicy::Explicit { .. } => None,
    }
}

/// Selects proxies from a shared store according to a per-request policy
pub struct PoolSelector {
    store: Arc<ProxyStore>,
    /// One selector per strategy, keyed by strategy name
    strategies: HashMap<&'static str, Box<dyn ProxySelector>>,
}

impl PoolSelector {
    pub fn new(store: Arc<ProxyStore>) -> Self {
        let strategies = [
            SelectionPolicy::RoundRobin,
            SelectionPolicy::Random,
            SelectionPolicy::Fastest,
            SelectionPolicy::HealthyRoundRobin,
        ]
        .iter()
        .filter_map(create_selector)
        .map(|selector| (selector.strategy_name(), selector))
        .collect();

        Self { store, strategies }
    }

    pub fn store(&self) -> &Arc<ProxyStore> {
        &self.store
    }

    /// Pick a proxy; `None` means no proxy is available, which is not an error
    pub fn select(&self, policy: &SelectionPolicy, filter: &ProxyFilter) -> Option<ProxyRecord> {
        let strategy = match policy {
            SelectionPolicy::Explicit { host, port } => {
                return self.store.find(host, *port).filter(|p| filter.matches(p));
            }
            strategy => self.strategies.get(strategy.as_str())?,
        };

        self.store.read(|records| {
            let candidates: Vec<&ProxyRecord> =
                records.iter().filter(|p| filter.matches(p)).collect();
            strategy
                .select(&candidates)
                .and_then(|idx| candidates.get(idx))
                .map(|p| (*p).clone())
        })
    }
}
