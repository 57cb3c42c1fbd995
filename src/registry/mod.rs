//! Collector Registry
//!
//! Aggregation point for every metric source in the process. Collectors are
//! registered during startup and called, in registration order, on every
//! scrape.
//!
//! # Lifecycle
//!
//! ```text
//! startup:  register(a) ─▶ register(b) ─▶ ...      (writes)
//! serving:  collect() ─▶ a.collect() ++ b.collect()  (reads, per request)
//! ```
//!
//! Registration publishes a new immutable collector list, so a scrape that
//! races with a late `register` sees either the old or the new list, never a
//! partially updated one.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{MetricFamily, Snapshot};

// =============================================================================
// Collector
// =============================================================================

/// A metric source.
///
/// Implementations build fresh families on every call and handle their own
/// internal synchronization.
pub trait Collector: Send + Sync {
    /// Produce this collector's families
    fn collect(&self) -> Result<Vec<MetricFamily>>;

    /// Short description used in logs
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<F> Collector for F
where
    F: Fn() -> Result<Vec<MetricFamily>> + Send + Sync,
{
    fn collect(&self) -> Result<Vec<MetricFamily>> {
        self()
    }

    fn describe(&self) -> String {
        "closure".to_string()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Ordered set of registered collectors
pub struct Registry {
    collectors: RwLock<Arc<[Arc<dyn Collector>]>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            collectors: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Add a collector. It will be called after every collector registered before it.
    pub fn register(&self, collector: Arc<dyn Collector>) {
        let description = collector.describe();
        let mut collectors = self.collectors.write();
        let mut next = Vec::with_capacity(collectors.len() + 1);
        next.extend(collectors.iter().cloned());
        next.push(collector);
        *collectors = Arc::from(next);

        info!(
            collector = %description,
            total = collectors.len(),
            "Registered collector"
        );
    }

    /// Number of registered collectors
    pub fn len(&self) -> usize {
        self.collectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every collector in registration order and concatenate their families.
    ///
    /// The first collector error is returned as-is; families gathered so far
    /// are discarded.
    pub fn collect(&self) -> Result<Snapshot> {
        // clone the list so no lock is held while collectors run
        let collectors = self.collectors.read().clone();

        let mut snapshot = Snapshot::new();
        for collector in collectors.iter() {
            snapshot.extend(collector.collect()?);
        }

        debug!(
            collectors = collectors.len(),
            families = snapshot.len(),
            "Collected snapshot"
        );
        Ok(snapshot)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("collectors", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{MetricType, Sample};
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCollector {
        names: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedCollector {
        fn new(names: Vec<&'static str>) -> Self {
            Self {
                names,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Collector for FixedCollector {
        fn collect(&self) -> Result<Vec<MetricFamily>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self
                .names
                .iter()
                .map(|name| {
                    MetricFamily::new(*name, "fixed", MetricType::Gauge)
                        .with_sample(Sample::new(*name, 1.0))
                })
                .collect())
        }
    }

    struct FailingCollector;

    impl Collector for FailingCollector {
        fn collect(&self) -> Result<Vec<MetricFamily>> {
            Err(Error::Collector {
                collector: "failing".to_string(),
                reason: "source unavailable".to_string(),
            })
        }
    }

    fn family_names(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_empty_registry() {
        let registry = Registry::new();
        assert!(registry.is_empty());

        let snapshot = registry.collect().unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_collect_in_registration_order() {
        let registry = Registry::new();
        registry.register(Arc::new(FixedCollector::new(vec!["b", "a"])));
        registry.register(Arc::new(FixedCollector::new(vec!["c"])));

        let snapshot = registry.collect().unwrap();
        assert_eq!(family_names(&snapshot), vec!["b", "a", "c"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_every_collect_calls_collectors_again() {
        let registry = Registry::new();
        let collector = Arc::new(FixedCollector::new(vec!["up"]));
        registry.register(collector.clone());

        registry.collect().unwrap();
        registry.collect().unwrap();

        assert_eq!(collector.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_collector_failure_propagates() {
        let registry = Registry::new();
        let after = Arc::new(FixedCollector::new(vec!["after"]));
        registry.register(Arc::new(FixedCollector::new(vec!["before"])));
        registry.register(Arc::new(FailingCollector));
        registry.register(after.clone());

        assert_matches!(
            registry.collect(),
            Err(Error::Collector { ref reason, .. }) if reason == "source unavailable"
        );
        // no collector after the failing one is called
        assert_eq!(after.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_closure_collector() {
        let registry = Registry::new();
        registry.register(Arc::new(|| -> Result<Vec<MetricFamily>> {
            Ok(vec![MetricFamily::new("from_closure", "", MetricType::Counter)])
        }));

        let snapshot = registry.collect().unwrap();
        assert_eq!(family_names(&snapshot), vec!["from_closure"]);
    }

    #[test]
    fn test_register_while_collecting_from_other_threads() {
        let registry = Arc::new(Registry::new());
        registry.register(Arc::new(FixedCollector::new(vec!["base"])));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let snapshot = registry.collect().unwrap();
                        assert_eq!(snapshot.families()[0].name, "base");
                    }
                })
            })
            .collect();

        for _ in 0..10 {
            registry.register(Arc::new(FixedCollector::new(vec!["extra"])));
        }
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(registry.collect().unwrap().len(), 11);
    }
}
