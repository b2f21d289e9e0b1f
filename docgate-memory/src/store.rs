//! In-memory driver implementation.
//!
//! This module provides a driver that keeps every collection as an ordered list of BSON
//! documents behind an async-safe read-write lock. It implements the whole [`Driver`]
//! surface, so the access layer above it behaves exactly as it does against a server.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use tracing::debug;

use docgate_core::{
    driver::{
        AggregateOptions, BulkWriteResult, ConnectOptions, CountOptions, Driver, DriverBuilder,
        FindOneAndDeleteOptions, FindOneAndReplaceOptions, FindOneAndUpdateOptions, FindOneOptions,
        FindOptions, Namespace, SessionWork, UpdateOptions, UpdateResult, WriteModel,
    },
    error::{DocGateError, DocGateResult},
};

use crate::{
    cursor::MemoryCursor,
    session::MemorySession,
    state::{Collections, Modification},
};

/// How many times a transaction runs before a write conflict is reported.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Thread-safe in-memory document-store driver.
///
/// `MemoryDriver` is cloneable and uses an `Arc`-wrapped internal state, allowing it
/// to be shared across async tasks. Clones share the same data.
///
/// Queries scan the whole collection (there are no indexes). It is meant for tests
/// and development, not for large data sets.
///
/// # Example
///
/// ```ignore
/// use docgate_memory::MemoryDriver;
/// use docgate::driver::{Driver, Namespace};
/// use bson::doc;
///
/// let driver = MemoryDriver::new();
/// let ns = Namespace::new("app", "users");
///
/// let id = driver.insert_one(ns, doc! { "name": "Alice" }).await?;
/// let found = driver.find_one(ns, doc! { "_id": id }, Default::default()).await?;
/// assert!(found.is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryDriver {
    collections: Arc<RwLock<Collections>>,
    /// Simulated round-trip time added to every operation.
    latency: Option<Duration>,
}

impl MemoryDriver {
    /// Creates a new empty driver with no simulated latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing a `MemoryDriver` with custom options.
    pub fn builder() -> MemoryDriverBuilder {
        MemoryDriverBuilder::default()
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub(crate) fn collections(&self) -> &RwLock<Collections> {
        &self.collections
    }

    pub(crate) async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn read<R>(&self, op: impl FnOnce(&Collections) -> DocGateResult<R> + Send) -> DocGateResult<R> {
        self.delay().await;
        op(&*self.collections.read().await)
    }

    async fn write<R>(&self, op: impl FnOnce(&mut Collections) -> DocGateResult<R> + Send) -> DocGateResult<R> {
        self.delay().await;
        op(&mut *self.collections.write().await)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Cursor = MemoryCursor;
    type Session = MemorySession;

    async fn ping(&self) -> DocGateResult<()> {
        self.delay().await;
        Ok(())
    }

    async fn find(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOptions,
    ) -> DocGateResult<Self::Cursor> {
        let documents = self
            .read(|state| {
                state.find(
                    ns,
                    &filter,
                    options.sort.as_ref(),
                    options.skip,
                    options.limit,
                    options.projection.as_ref(),
                )
            })
            .await?;

        Ok(MemoryCursor::new(documents, self.latency))
    }

    async fn find_one(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOneOptions,
    ) -> DocGateResult<Option<Document>> {
        self.read(|state| {
            let mut found = state.find(
                ns,
                &filter,
                options.sort.as_ref(),
                options.skip,
                Some(1),
                options.projection.as_ref(),
            )?;
            Ok(found.pop())
        })
        .await
    }

    async fn find_one_and_update(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocGateResult<Option<Document>> {
        self.write(|state| {
            state.find_and_modify(
                ns,
                &filter,
                options.sort.as_ref(),
                Modification::Update(&update),
                options.upsert.unwrap_or(false),
                options.return_document.unwrap_or_default(),
                options.projection.as_ref(),
            )
        })
        .await
    }

    async fn find_one_and_replace(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        replacement: Document,
        options: FindOneAndReplaceOptions,
    ) -> DocGateResult<Option<Document>> {
        self.write(|state| {
            state.find_and_modify(
                ns,
                &filter,
                options.sort.as_ref(),
                Modification::Replace(&replacement),
                options.upsert.unwrap_or(false),
                options.return_document.unwrap_or_default(),
                options.projection.as_ref(),
            )
        })
        .await
    }

    async fn find_one_and_delete(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> DocGateResult<Option<Document>> {
        self.write(|state| {
            state.find_and_modify(
                ns,
                &filter,
                options.sort.as_ref(),
                Modification::Delete,
                false,
                Default::default(),
                options.projection.as_ref(),
            )
        })
        .await
    }

    async fn insert_one(&self, ns: Namespace<'_>, document: Document) -> DocGateResult<Bson> {
        self.write(|state| state.insert(ns, document)).await
    }

    async fn insert_many(
        &self,
        ns: Namespace<'_>,
        documents: Vec<Document>,
    ) -> DocGateResult<Vec<Bson>> {
        self.write(|state| state.insert_many(ns, documents)).await
    }

    async fn update_one(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult> {
        let upsert = options.upsert.unwrap_or(false);

        self.write(|state| state.update(ns, &filter, &update, upsert, false))
            .await
    }

    async fn update_many(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult> {
        let upsert = options.upsert.unwrap_or(false);

        self.write(|state| state.update(ns, &filter, &update, upsert, true))
            .await
    }

    async fn delete_one(&self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64> {
        self.write(|state| state.delete(ns, &filter, false)).await
    }

    async fn delete_many(&self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64> {
        self.write(|state| state.delete(ns, &filter, true)).await
    }

    async fn count(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: CountOptions,
    ) -> DocGateResult<u64> {
        self.read(|state| state.count(ns, &filter, options.skip, options.limit))
            .await
    }

    async fn estimated_count(&self, ns: Namespace<'_>) -> DocGateResult<u64> {
        self.read(|state| Ok(state.len(ns))).await
    }

    async fn distinct(
        &self,
        ns: Namespace<'_>,
        field: &str,
        filter: Document,
    ) -> DocGateResult<Vec<Bson>> {
        self.read(|state| state.distinct(ns, field, &filter)).await
    }

    async fn aggregate(
        &self,
        ns: Namespace<'_>,
        pipeline: Vec<Document>,
        _options: AggregateOptions,
    ) -> DocGateResult<Self::Cursor> {
        let documents = self
            .read(|state| state.aggregate(ns, &pipeline))
            .await?;

        Ok(MemoryCursor::new(documents, self.latency))
    }

    async fn bulk_write(
        &self,
        ns: Namespace<'_>,
        models: Vec<WriteModel<Document>>,
    ) -> DocGateResult<BulkWriteResult> {
        self.write(|state| state.bulk_write(ns, models)).await
    }

    async fn with_session<R: Send>(&self, mut unit: SessionWork<'_, Self::Session, R>) -> DocGateResult<R> {
        let mut session = MemorySession::new(self.clone());

        unit(&mut session).await
    }

    /// Runs `unit` on a snapshot and publishes it on success.
    ///
    /// A commit that loses a write conflict runs `unit` again on a fresh snapshot, up to
    /// [`MAX_TRANSACTION_ATTEMPTS`] times.
    async fn with_transaction<R: Send>(
        &self,
        mut unit: SessionWork<'_, Self::Session, R>,
    ) -> DocGateResult<R> {
        let mut attempt = 1;

        loop {
            let mut session = MemorySession::transactional(self.clone()).await;

            let value = match unit(&mut session).await {
                Ok(value) => value,
                Err(err) => {
                    debug!(error = %err, attempt, "aborting memory transaction");
                    return Err(err);
                }
            };

            match session.commit().await {
                Ok(()) => return Ok(value),
                Err(err) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    debug!(error = %err, attempt, "retrying memory transaction");
                    attempt += 1;
                }
                Err(err) => return Err(DocGateError::transaction("commit_transaction", err)),
            }
        }
    }
}

/// Builder for constructing [`MemoryDriver`] instances.
///
/// Connection options are accepted so the driver plugs into the same client
/// construction path as a real server; only the URI is logged, nothing is dialled.
///
/// # Example
///
/// ```ignore
/// use docgate::{client::ClientBuilder, config::Config, memory::MemoryDriver};
///
/// let client = ClientBuilder::new(Config::new("memory:27017"))
///     .connect(MemoryDriver::builder())
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryDriverBuilder {
    latency: Option<Duration>,
    collections: Option<Arc<RwLock<Collections>>>,
}

impl MemoryDriverBuilder {
    /// Adds a simulated round trip to every operation and cursor batch.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Shares data with an existing driver instead of starting empty.
    pub fn shared_with(mut self, driver: &MemoryDriver) -> Self {
        self.collections = Some(driver.collections.clone());
        self
    }

    pub fn build(self) -> MemoryDriver {
        MemoryDriver {
            collections: self.collections.unwrap_or_default(),
            latency: self.latency,
        }
    }
}

#[async_trait]
impl DriverBuilder for MemoryDriverBuilder {
    type Driver = MemoryDriver;

    async fn connect(self, options: ConnectOptions) -> DocGateResult<Self::Driver> {
        debug!(uri = %options.uri, max_pool_size = options.max_pool_size, "opening memory driver");

        Ok(self.build())
    }
}
