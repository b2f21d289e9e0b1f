//! Operation metrics.
//!
//! Every client operation reports one latency observation and, when it fails, one
//! error-counter increment. Both metrics carry the labels `target`, `command`, `db`
//! and `collection`.
//!
//! Metrics live in a [`MetricsRegistry`]. Registration is lookup-or-register: several
//! clients sharing a prometheus registry share the same collectors, however many
//! wrappers of that registry they were built from.

use std::{
    any::Any,
    collections::HashMap,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, core::Collector,
};

use crate::error::{DocGateError, DocGateResult};

pub const METRIC_NAMESPACE: &str = "docgate";
pub const LATENCY_METRIC: &str = "client_command_latency";
pub const ERROR_METRIC: &str = "client_command_error";
pub const LABEL_NAMES: [&str; 4] = ["target", "command", "db", "collection"];

/// Latency histogram buckets, in milliseconds.
pub const LATENCY_BUCKETS: [f64; 11] = [
    5.0, 15.0, 30.0, 50.0, 100.0, 300.0, 600.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Every live wrapper. A prometheus registry is wrapped at most once at a time.
static WRAPPED: Mutex<Vec<Weak<RegistryInner>>> = Mutex::new(Vec::new());

/// A prometheus [`Registry`] plus the collectors already registered through it.
///
/// Wrapping a registry that is already wrapped returns a handle to the existing
/// wrapper. Collectors are unregistered once the last handle, including the ones
/// held by clients, is dropped.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    registry: Registry,
    collectors: Mutex<HashMap<String, Registered>>,
}

struct Registered {
    typed: Box<dyn Any + Send + Sync>,
    collector: Box<dyn Collector>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for (_, registered) in self.collectors.get_mut().drain() {
            let _ = self.registry.unregister(registered.collector);
        }
    }
}

impl MetricsRegistry {
    /// Creates an empty, private registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Wraps an existing prometheus registry, reusing the wrapper other handles to the
    /// same registry already use.
    pub fn with_registry(registry: Registry) -> Self {
        let mut wrapped = WRAPPED.lock();
        wrapped.retain(|inner| inner.strong_count() > 0);

        let existing = wrapped
            .iter()
            .filter_map(Weak::upgrade)
            .find(|inner| same_registry(&inner.registry, &registry));
        if let Some(inner) = existing {
            return Self { inner };
        }

        let inner = Arc::new(RegistryInner {
            registry,
            collectors: Mutex::new(HashMap::new()),
        });
        wrapped.push(Arc::downgrade(&inner));

        Self { inner }
    }

    /// The process-wide registry, backed by [`prometheus::default_registry`].
    pub fn global() -> &'static MetricsRegistry {
        static GLOBAL: OnceLock<MetricsRegistry> = OnceLock::new();

        GLOBAL.get_or_init(|| MetricsRegistry::with_registry(prometheus::default_registry().clone()))
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Returns the collector registered under `name`, registering the one built by
    /// `create` if there is none yet.
    ///
    /// # Errors
    ///
    /// Returns [`DocGateError::Metrics`] if `name` is already registered as a different
    /// collector type, or if the prometheus registry refuses the new collector.
    pub fn get_or_register<C, F>(&self, name: &str, create: F) -> DocGateResult<C>
    where
        C: Collector + Clone + 'static,
        F: FnOnce() -> DocGateResult<C>,
    {
        let mut collectors = self.inner.collectors.lock();

        if let Some(existing) = collectors.get(name) {
            return existing.typed.downcast_ref::<C>().cloned().ok_or_else(|| {
                DocGateError::Metrics(format!(
                    "metric {name} is already registered with a different type, wanted {}",
                    std::any::type_name::<C>(),
                ))
            });
        }

        let collector = create()?;
        self.inner.registry.register(Box::new(collector.clone()))?;
        collectors.insert(
            name.to_string(),
            Registered {
                typed: Box::new(collector.clone()),
                collector: Box::new(collector.clone()),
            },
        );

        Ok(collector)
    }

    fn same_as(&self, other: &MetricsRegistry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Whether two handles point at the same prometheus registry.
///
/// `Registry` exposes no identity, so a uniquely named gauge is registered in `a` and
/// `b` is asked to register it too; only the same registry refuses it as a duplicate.
/// The gauge is removed from both before returning.
fn same_registry(a: &Registry, b: &Registry) -> bool {
    static NEXT: AtomicU64 = AtomicU64::new(0);

    let name = format!("{METRIC_NAMESPACE}_registry_marker_{}", NEXT.fetch_add(1, Ordering::Relaxed));
    let Ok(marker) = IntGauge::new(name, "Registry identity marker") else {
        return false;
    };
    if a.register(Box::new(marker.clone())).is_err() {
        return false;
    }

    let same = match b.register(Box::new(marker.clone())) {
        Err(prometheus::Error::AlreadyReg) => true,
        Ok(()) => {
            let _ = b.unregister(Box::new(marker.clone()));
            false
        }
        Err(_) => false,
    };
    let _ = a.unregister(Box::new(marker));

    same
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("collectors", &self.inner.collectors.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Label values for one operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationLabels<'a> {
    pub target: &'a str,
    pub command: &'a str,
    pub db: &'a str,
    pub collection: &'a str,
}

impl<'a> OperationLabels<'a> {
    fn values(&self) -> [&'a str; 4] {
        [self.target, self.command, self.db, self.collection]
    }
}

/// The latency histogram and error counter shared by all operations.
///
/// Holds its [`MetricsRegistry`] so the collectors stay registered while in use.
#[derive(Clone)]
pub struct OperationMetrics {
    latency: HistogramVec,
    errors: IntCounterVec,
    registry: MetricsRegistry,
}

impl std::fmt::Debug for OperationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationMetrics")
            .field("latency", &LATENCY_METRIC)
            .field("errors", &ERROR_METRIC)
            .finish()
    }
}

impl OperationMetrics {
    /// Looks up or registers the operation metrics in `registry`.
    pub fn register(registry: &MetricsRegistry) -> DocGateResult<Self> {
        let latency = registry.get_or_register(LATENCY_METRIC, || {
            Ok(HistogramVec::new(
                HistogramOpts::new(LATENCY_METRIC, "Latency of document-store commands in milliseconds")
                    .namespace(METRIC_NAMESPACE)
                    .buckets(LATENCY_BUCKETS.to_vec()),
                &LABEL_NAMES,
            )?)
        })?;

        let errors = registry.get_or_register(ERROR_METRIC, || {
            Ok(IntCounterVec::new(
                Opts::new(ERROR_METRIC, "Count of failed document-store commands")
                    .namespace(METRIC_NAMESPACE),
                &LABEL_NAMES,
            )?)
        })?;

        Ok(Self {
            latency,
            errors,
            registry: registry.clone(),
        })
    }

    /// Records one completed operation.
    pub fn observe(&self, labels: OperationLabels<'_>, elapsed_ms: f64, failed: bool) {
        let values = labels.values();

        if failed {
            self.errors.with_label_values(&values).inc();
        }
        self.latency.with_label_values(&values).observe(elapsed_ms);
    }

    /// Whether these metrics were registered through `registry`.
    pub fn registered_in(&self, registry: &MetricsRegistry) -> bool {
        self.registry.same_as(registry)
    }

    pub fn latency(&self) -> &HistogramVec {
        &self.latency
    }

    pub fn errors(&self) -> &IntCounterVec {
        &self.errors
    }
}

/// Start time and name of an in-flight operation.
///
/// The default context is empty and records nothing when finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationMetricContext {
    started: Option<Instant>,
    command: &'static str,
}

impl OperationMetricContext {
    pub fn start(command: &'static str) -> Self {
        Self {
            started: Some(Instant::now()),
            command,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.started.is_none() || self.command.is_empty()
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    /// Milliseconds since [`start`](Self::start), or `None` for an empty context.
    pub fn elapsed_ms(&self) -> Option<f64> {
        self.started
            .filter(|_| !self.command.is_empty())
            .map(|started| started.elapsed().as_millis() as f64)
    }
}

#[cfg(test)]
mod tests {
    use prometheus::IntCounter;

    use super::*;

    fn labels() -> OperationLabels<'static> {
        OperationLabels {
            target: "app/main.rs:10",
            command: "find",
            db: "app",
            collection: "users",
        }
    }

    #[test]
    fn registering_twice_reuses_collectors() {
        let registry = MetricsRegistry::new();
        let first = OperationMetrics::register(&registry).unwrap();
        let second = OperationMetrics::register(&registry).unwrap();

        first.observe(labels(), 3.0, true);

        let values = labels().values();
        assert_eq!(second.latency().with_label_values(&values).get_sample_count(), 1);
        assert_eq!(second.errors().with_label_values(&values).get(), 1);
    }

    #[test]
    fn wrappers_of_one_registry_share_collectors() {
        let prometheus = Registry::new();
        let first = OperationMetrics::register(&MetricsRegistry::with_registry(prometheus.clone())).unwrap();
        let second = OperationMetrics::register(&MetricsRegistry::with_registry(prometheus.clone())).unwrap();

        first.observe(labels(), 3.0, false);
        second.observe(labels(), 4.0, false);

        let values = labels().values();
        assert_eq!(first.latency().with_label_values(&values).get_sample_count(), 2);

        let other = OperationMetrics::register(&MetricsRegistry::new()).unwrap();
        assert_eq!(other.latency().with_label_values(&values).get_sample_count(), 0);
        assert!(!other.registered_in(&MetricsRegistry::with_registry(prometheus)));
    }

    #[test]
    fn global_shares_the_default_registry() {
        let wrapped = MetricsRegistry::with_registry(prometheus::default_registry().clone());
        assert!(MetricsRegistry::global().same_as(&wrapped));

        OperationMetrics::register(&wrapped).unwrap();
        OperationMetrics::register(MetricsRegistry::global()).unwrap();
    }

    #[test]
    fn dropping_the_last_handle_unregisters() {
        let prometheus = Registry::new();
        let metrics = OperationMetrics::register(&MetricsRegistry::with_registry(prometheus.clone())).unwrap();
        metrics.observe(labels(), 1.0, false);
        assert!(!prometheus.gather().is_empty());

        drop(metrics);
        assert!(prometheus.gather().is_empty());

        OperationMetrics::register(&MetricsRegistry::with_registry(prometheus)).unwrap();
    }

    #[test]
    fn same_name_with_other_type_is_an_error() {
        let registry = MetricsRegistry::new();
        OperationMetrics::register(&registry).unwrap();

        let conflict = registry.get_or_register(LATENCY_METRIC, || {
            Ok(IntCounter::new("unrelated", "unrelated")?)
        });

        assert!(matches!(conflict, Err(DocGateError::Metrics(_))));
    }

    #[test]
    fn success_does_not_touch_error_counter() {
        let registry = MetricsRegistry::new();
        let metrics = OperationMetrics::register(&registry).unwrap();

        metrics.observe(labels(), 12.0, false);

        let values = labels().values();
        assert_eq!(metrics.latency().with_label_values(&values).get_sample_count(), 1);
        assert_eq!(metrics.errors().with_label_values(&values).get(), 0);
    }

    #[test]
    fn empty_context_has_no_elapsed_time() {
        assert!(OperationMetricContext::default().is_empty());
        assert_eq!(OperationMetricContext::default().elapsed_ms(), None);

        let context = OperationMetricContext::start("count");
        assert!(!context.is_empty());
        assert!(context.elapsed_ms().is_some());
    }
}
