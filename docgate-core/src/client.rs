//! The instrumented document-store client.
//!
//! A [`Client`] owns one driver handle together with the request timeout, the metric
//! target identity and the label converters used by every operation. It is built once
//! at startup and shared by reference (usually behind an `Arc`).
//!
//! # Example
//!
//! ```ignore
//! use docgate::{client::ClientBuilder, config::Config};
//! use docgate::mongodb::MongoDriverBuilder;
//!
//! let client = ClientBuilder::new(Config::new("mongodb://127.0.0.1:27017"))
//!     .connect(MongoDriverBuilder::new())
//!     .await?;
//!
//! client.add_label_converter(docgate::labels::shard_suffix('_'));
//! let users = client.typed_collection::<User>("app", "users");
//! ```

use std::{panic::Location, time::Duration};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::{
    collection::{Collection, TypedCollection},
    config::Config,
    cursor,
    driver::{DocumentCursor, Driver, DriverBuilder},
    error::{DocGateError, DocGateResult},
    labels::LabelConverters,
    metrics::{MetricsRegistry, OperationLabels, OperationMetricContext, OperationMetrics},
};

/// Configures and connects a [`Client`].
///
/// The source location that calls [`ClientBuilder::new`] becomes the client's metric
/// target. Connection strings may embed credentials and are never used as a label.
#[derive(Debug)]
pub struct ClientBuilder {
    config: Config,
    metric_target: String,
    registry: Option<MetricsRegistry>,
}

impl ClientBuilder {
    #[track_caller]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            metric_target: caller_target(Location::caller()),
            registry: None,
        }
    }

    /// Registers the client's metrics in `registry` instead of the process-wide one.
    pub fn metrics_registry(mut self, registry: &MetricsRegistry) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    /// Overrides the metric target derived from the construction site.
    pub fn metric_target(mut self, target: impl Into<String>) -> Self {
        self.metric_target = target.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connects a driver, verifies the connection with a ping and builds the client.
    ///
    /// Both steps are bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DocGateError::Initialization`] when the configuration is invalid, the
    /// driver cannot connect, or the ping fails.
    pub async fn connect<B>(self, builder: B) -> DocGateResult<Client<B::Driver>>
    where
        B: DriverBuilder,
    {
        self.config.validate()?;

        let timeout = self.config.effective_timeout();
        let options = self.config.connect_options();
        let max_pool_size = options.max_pool_size;

        let driver = tokio::time::timeout(timeout, builder.connect(options))
            .await
            .map_err(|_| DocGateError::Initialization(format!("connect timed out after {timeout:?}")))?
            .map_err(initialization)?;

        tokio::time::timeout(timeout, driver.ping())
            .await
            .map_err(|_| DocGateError::Initialization(format!("ping timed out after {timeout:?}")))?
            .map_err(initialization)?;

        info!(
            metric_target = %self.metric_target,
            ?timeout,
            max_pool_size,
            secondary_preferred = self.config.secondary_preferred,
            "document store client connected",
        );

        self.with_driver(driver)
    }

    /// Builds a client around an already connected driver.
    pub fn with_driver<D: Driver>(self, driver: D) -> DocGateResult<Client<D>> {
        let registry = self.registry.unwrap_or_else(|| MetricsRegistry::global().clone());

        Ok(Client {
            driver,
            timeout: self.config.effective_timeout(),
            metric_target: self.metric_target,
            converters: LabelConverters::new(),
            metrics: OperationMetrics::register(&registry)?,
        })
    }
}

/// A long-lived handle to a document store.
#[derive(Debug)]
pub struct Client<D: Driver> {
    driver: D,
    timeout: Duration,
    metric_target: String,
    converters: LabelConverters,
    metrics: OperationMetrics,
}

impl<D: Driver> Client<D> {
    /// The underlying driver, for operations this client does not wrap.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The per-operation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn metric_target(&self) -> &str {
        &self.metric_target
    }

    pub fn metrics(&self) -> &OperationMetrics {
        &self.metrics
    }

    /// Returns an untyped handle to `database.collection`.
    pub fn collection<'a>(&'a self, database: &str, collection: &str) -> Collection<'a, D> {
        Collection::new(self, database.to_string(), collection.to_string())
    }

    /// Returns a handle to `database.collection` whose reads decode into `T`.
    pub fn typed_collection<'a, T>(&'a self, database: &str, collection: &str) -> TypedCollection<'a, D, T> {
        TypedCollection::new(self.collection(database, collection))
    }

    /// Materializes `cursor` into `dest`; see [`cursor::scan_cursor`].
    pub async fn scan_cursor<C, T>(&self, cursor: C, dest: &mut Vec<T>) -> DocGateResult<()>
    where
        C: DocumentCursor,
        T: DeserializeOwned,
    {
        cursor::scan_cursor(cursor, dest).await
    }

    /// Adds a rule for collapsing database and collection names into metric labels.
    ///
    /// Rules run in the order they were added; the first one returning a non-empty
    /// label wins.
    pub fn add_label_converter<F>(&self, converter: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.converters.add(converter);
    }

    pub fn convert_label(&self, label: &str) -> String {
        self.converters.convert(label)
    }

    /// Records the outcome of an operation started with [`OperationMetricContext::start`].
    ///
    /// An empty context records nothing.
    pub fn end_metric(&self, context: OperationMetricContext, database: &str, collection: &str, failed: bool) {
        let Some(elapsed_ms) = context.elapsed_ms() else {
            return;
        };

        let db = self.convert_label(database);
        let collection = self.convert_label(collection);

        self.metrics.observe(
            OperationLabels {
                target: &self.metric_target,
                command: context.command(),
                db: &db,
                collection: &collection,
            },
            elapsed_ms,
            failed,
        );
    }

    /// Runs `unit` in a transaction: committed when it returns `Ok`, aborted otherwise.
    ///
    /// Commit and retry are left to the driver's transaction primitive, which may run
    /// `unit` again after a transient failure. Every operation inside `unit` must go
    /// through the session it receives.
    ///
    /// ```ignore
    /// client.do_transaction(|session| Box::pin(async move {
    ///     let ns = Namespace::new("bank", "accounts");
    ///     session.update_one(ns, doc! { "_id": from }, doc! { "$inc": { "balance": -10 } }, Default::default()).await?;
    ///     session.update_one(ns, doc! { "_id": to }, doc! { "$inc": { "balance": 10 } }, Default::default()).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Failures are wrapped in [`DocGateError::Transaction`] naming the step that failed.
    pub async fn do_transaction<R, F>(&self, unit: F) -> DocGateResult<R>
    where
        R: Send,
        F: for<'s> FnMut(&'s mut D::Session) -> BoxFuture<'s, DocGateResult<R>> + Send,
    {
        self.driver
            .with_transaction(Box::new(unit))
            .await
            .map_err(|err| match err {
                err @ DocGateError::Transaction { .. } => err,
                err => DocGateError::transaction("with_transaction", err),
            })
    }
}

fn initialization(err: DocGateError) -> DocGateError {
    match err {
        err @ DocGateError::Initialization(_) => err,
        err => DocGateError::Initialization(err.to_string()),
    }
}

/// `parent/file.rs:line`, keeping only the last two path segments.
fn caller_target(location: &Location<'_>) -> String {
    let segments: Vec<&str> = location.file().split(['/', '\\']).collect();
    let file = match segments.as_slice() {
        [.., parent, file] => format!("{parent}/{file}"),
        _ => location.file().to_string(),
    };

    format!("{file}:{}", location.line())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_target_is_the_construction_site() {
        let line = line!() + 1;
        let builder = ClientBuilder::new(Config::new("mongodb://user:secret@db"));

        assert_eq!(builder.metric_target, format!("src/client.rs:{line}"));
        assert!(!builder.metric_target.contains("secret"));
    }

    #[test]
    fn metric_target_override() {
        let builder = ClientBuilder::new(Config::default()).metric_target("orders-service");

        assert_eq!(builder.metric_target, "orders-service");
    }
}
