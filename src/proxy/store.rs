//! In-memory proxy pool
//!
//! Holds the configured proxies in load order. Records are never added or
//! removed after construction; `mark_outcome` is the only write path.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::models::{HealthReport, PoolStats, ProxyFilter, ProxyRecord, ProxyType, ProxyView};

/// Shared store of proxy records
pub struct ProxyStore {
    records: RwLock<Vec<ProxyRecord>>,
    /// (lowercased host, port) -> position in `records`
    index: HashMap<(String, u16), usize>,
}

impl ProxyStore {
    /// Build a store, keeping the first record for each (host, port)
    pub fn new(proxies: Vec<ProxyRecord>) -> Self {
        let mut records = Vec::with_capacity(proxies.len());
        let mut index = HashMap::with_capacity(proxies.len());

        for proxy in proxies {
            let key = identity(&proxy.host, proxy.port);
            if index.contains_key(&key) {
                warn!(proxy = %proxy.address(), "Dropping duplicate proxy entry");
                continue;
            }
            index.insert(key, records.len());
            records.push(proxy);
        }

        Self {
            records: RwLock::new(records),
            index,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Snapshot of every record in load order
    pub fn all(&self) -> Vec<ProxyRecord> {
        self.records.read().clone()
    }

    /// Snapshot of the records matching `filter`
    pub fn filtered(&self, filter: &ProxyFilter) -> Vec<ProxyRecord> {
        self.records
            .read()
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    pub fn by_type(&self, proxy_type: ProxyType) -> Vec<ProxyRecord> {
        self.filtered(&ProxyFilter::by_type(proxy_type))
    }

    pub fn by_country(&self, country: &str) -> Vec<ProxyRecord> {
        self.filtered(&ProxyFilter::by_country(country))
    }

    pub fn find(&self, host: &str, port: u16) -> Option<ProxyRecord> {
        let idx = *self.index.get(&identity(host, port))?;
        self.records.read().get(idx).cloned()
    }

    /// Record at a load-order position
    pub fn get(&self, position: usize) -> Option<ProxyRecord> {
        self.records.read().get(position).cloned()
    }

    /// Apply a health observation to one proxy.
    ///
    /// Returns `false` when the proxy is not in the pool. Writers are
    /// serialized by the lock, so readers only ever see whole records.
    pub fn mark_outcome(&self, host: &str, port: u16, report: &HealthReport) -> bool {
        let Some(&idx) = self.index.get(&identity(host, port)) else {
            debug!(host, port, "Ignoring outcome for unknown proxy");
            return false;
        };

        let mut records = self.records.write();
        match records.get_mut(idx) {
            Some(record) => {
                record.apply(report);
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats::from_records(self.records.read().iter())
    }

    /// Public views of the records matching `filter`
    pub fn list(&self, filter: &ProxyFilter) -> Vec<ProxyView> {
        self.records
            .read()
            .iter()
            .filter(|p| filter.matches(p))
            .map(ProxyView::from)
            .collect()
    }

    /// Run `f` against the current records without copying them
    pub(crate) fn read<R>(&self, f: impl FnOnce(&[ProxyRecord]) -> R) -> R {
        let records = self.records.read();
        f(&records)
    }
}

impl Default for ProxyStore {
    fn default() -> Self {
        Self::empty()
    }
}

fn identity(host: &str, port: u16) -> (String, u16) {
    (host.to_ascii_lowercase(), port)
}
