//! Counter collection
//!
//! A small named-counter service registered as `metrics.collector`. The
//! engine bumps workflow counters; the broker's drop counts are folded in
//! on snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Shared counter collector
#[derive(Default)]
pub struct MetricsCollector {
    counters: RwLock<BTreeMap<String, AtomicU64>>,
}

impl MetricsCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one
    pub fn incr(&self, name: &str) {
        self.add(name, 1);
    }

    /// Increment a counter by `delta`
    pub fn add(&self, name: &str, delta: u64) {
        {
            let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
            if let Some(counter) = counters.get(name) {
                counter.fetch_add(delta, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value of one counter
    #[must_use]
    pub fn get(&self, name: &str) -> u64 {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        counters
            .get(name)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    /// Snapshot of every counter
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        counters
            .iter()
            .map(|(name, counter)| (name.clone(), counter.load(Ordering::Relaxed)))
            .collect()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("counters", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incr_and_snapshot() {
        let metrics = MetricsCollector::new();
        metrics.incr("workflow.started");
        metrics.incr("workflow.started");
        metrics.add("broker.dropped", 5);

        assert_eq!(metrics.get("workflow.started"), 2);
        assert_eq!(metrics.get("broker.dropped"), 5);
        assert_eq!(metrics.get("unknown"), 0);
        assert_eq!(metrics.snapshot().len(), 2);
    }
}
