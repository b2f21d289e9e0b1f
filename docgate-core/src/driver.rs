//! Document-store driver abstraction.
//!
//! The access layer never talks to a database directly. Every request goes through a
//! [`Driver`], which exposes collection-scoped CRUD, aggregation, bulk writes and
//! session-scoped units of work, all addressed by a [`Namespace`] and plain BSON
//! documents.
//!
//! # Traits
//!
//! - [`Driver`]: The collection-scoped operation set
//! - [`DocumentCursor`]: A forward-only result cursor
//! - [`DriverSession`]: Operations available inside a session or transaction
//! - [`DriverBuilder`]: Factory trait for connecting a driver
//!
//! # Examples
//!
//! ```ignore
//! use docgate::driver::{Driver, FindOptions, Namespace};
//! use bson::doc;
//!
//! let ns = Namespace::new("app", "users");
//! let mut cursor = driver.find(ns, doc! { "active": true }, FindOptions::default()).await?;
//! while cursor.advance().await? {
//!     println!("{}", cursor.current()?);
//! }
//! cursor.close().await?;
//! # Ok::<(), docgate::error::DocGateError>(())
//! ```

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use bson::{Bson, Document, ser::serialize_to_document};
use futures::future::BoxFuture;
use serde::Serialize;

use crate::{error::DocGateResult, update::Update};

/// The (database, collection) pair an operation is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace<'a> {
    pub database: &'a str,
    pub collection: &'a str,
}

impl<'a> Namespace<'a> {
    pub fn new(database: &'a str, collection: &'a str) -> Self {
        Self { database, collection }
    }
}

impl std::fmt::Display for Namespace<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Options for multi-document reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
    pub batch_size: Option<u32>,
}

/// Options for single-document reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub projection: Option<Document>,
}

/// Which version of a document a find-and-modify operation returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    pub sort: Option<Document>,
    pub upsert: Option<bool>,
    pub return_document: Option<ReturnDocument>,
    pub projection: Option<Document>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndReplaceOptions {
    pub sort: Option<Document>,
    pub upsert: Option<bool>,
    pub return_document: Option<ReturnDocument>,
    pub projection: Option<Document>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndDeleteOptions {
    pub sort: Option<Document>,
    pub projection: Option<Document>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub upsert: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    pub batch_size: Option<u32>,
    pub allow_disk_use: Option<bool>,
}

/// Outcome of an update operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    /// The `_id` of the document created by an upsert, if one was created.
    pub upserted_id: Option<Bson>,
}

/// Aggregate counts for a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub upserted_count: u64,
}

/// One write inside a bulk write.
///
/// Callers build models with [`Update`](crate::update::Update) values; the client
/// validates and renders them into `WriteModel<Document>` before handing them to the
/// driver.
#[derive(Debug)]
pub enum WriteModel<U = Update> {
    InsertOne { document: Document },
    UpdateOne { filter: Document, update: U, upsert: bool },
    UpdateMany { filter: Document, update: U, upsert: bool },
    ReplaceOne { filter: Document, replacement: Document, upsert: bool },
    DeleteOne { filter: Document },
    DeleteMany { filter: Document },
}

impl WriteModel {
    pub fn insert_one<T: Serialize + ?Sized>(document: &T) -> DocGateResult<Self> {
        Ok(WriteModel::InsertOne { document: serialize_to_document(document)? })
    }

    pub fn update_one(filter: Document, update: impl Into<Update>, upsert: bool) -> Self {
        WriteModel::UpdateOne { filter, update: update.into(), upsert }
    }

    pub fn update_many(filter: Document, update: impl Into<Update>, upsert: bool) -> Self {
        WriteModel::UpdateMany { filter, update: update.into(), upsert }
    }

    pub fn replace_one<T: Serialize + ?Sized>(filter: Document, replacement: &T, upsert: bool) -> DocGateResult<Self> {
        Ok(WriteModel::ReplaceOne {
            filter,
            replacement: serialize_to_document(replacement)?,
            upsert,
        })
    }

    pub fn delete_one(filter: Document) -> Self {
        WriteModel::DeleteOne { filter }
    }

    pub fn delete_many(filter: Document) -> Self {
        WriteModel::DeleteMany { filter }
    }
}

/// Connection settings handed to a [`DriverBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Connection string, e.g. `mongodb://10.0.0.5:27017`.
    pub uri: String,
    /// `(username, password)`, applied only when a username is configured.
    pub credential: Option<(String, String)>,
    pub max_pool_size: u32,
    pub connect_timeout: Duration,
    pub max_idle_time: Duration,
    /// Route reads to secondaries when available.
    pub secondary_preferred: bool,
}

/// A forward-only cursor over driver results.
///
/// The cursor is advanced with [`advance`](DocumentCursor::advance) and the current
/// document read with [`current`](DocumentCursor::current). Callers must
/// [`close`](DocumentCursor::close) it when done, even after an error.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Moves to the next document. Returns `false` once the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Returns a driver error when fetching the next batch fails, including when the
    /// enclosing operation was cancelled.
    async fn advance(&mut self) -> DocGateResult<bool>;

    /// Returns the document the cursor is positioned on.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor is not positioned on a document.
    fn current(&self) -> DocGateResult<Document>;

    /// Releases server-side resources held by the cursor.
    async fn close(&mut self) -> DocGateResult<()>;
}

/// A unit of work run inside a driver session.
///
/// Transactions may run the unit more than once, so it must not consume what it
/// captured.
pub type SessionWork<'u, S, R> =
    Box<dyn for<'s> FnMut(&'s mut S) -> BoxFuture<'s, DocGateResult<R>> + Send + 'u>;

/// Boxes a closure as a [`SessionWork`].
///
/// Closures returning a future that borrows their argument only infer the right
/// signature when passed to a function with the `for<'s>` bound spelled out.
pub fn session_work<'u, S, R, F>(unit: F) -> SessionWork<'u, S, R>
where
    F: for<'s> FnMut(&'s mut S) -> BoxFuture<'s, DocGateResult<R>> + Send + 'u,
{
    Box::new(unit)
}

/// Operations available to a unit of work running inside a session or transaction.
///
/// Multi-document reads are collected eagerly because session cursors borrow the
/// session for their whole lifetime.
#[async_trait]
pub trait DriverSession: Send {
    async fn find(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOptions,
    ) -> DocGateResult<Vec<Document>>;

    async fn find_one(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOneOptions,
    ) -> DocGateResult<Option<Document>>;

    async fn insert_one(&mut self, ns: Namespace<'_>, document: Document) -> DocGateResult<Bson>;

    async fn update_one(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult>;

    async fn delete_one(&mut self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64>;

    async fn count(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        options: CountOptions,
    ) -> DocGateResult<u64>;
}

/// Abstract interface for document-store drivers.
///
/// Implementations are required to be thread-safe; a single driver handle is shared by
/// every task using the client. Results and errors are reported verbatim: drivers do
/// not retry, and "no matching document" is `None` or a zero count, never an error.
#[async_trait]
pub trait Driver: Send + Sync + Debug + 'static {
    type Cursor: DocumentCursor + 'static;
    type Session: DriverSession + 'static;

    /// Round-trips to the server to verify connectivity.
    async fn ping(&self) -> DocGateResult<()>;

    async fn find(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOptions,
    ) -> DocGateResult<Self::Cursor>;

    async fn find_one(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOneOptions,
    ) -> DocGateResult<Option<Document>>;

    async fn find_one_and_update(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocGateResult<Option<Document>>;

    async fn find_one_and_replace(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        replacement: Document,
        options: FindOneAndReplaceOptions,
    ) -> DocGateResult<Option<Document>>;

    async fn find_one_and_delete(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> DocGateResult<Option<Document>>;

    /// Inserts one document and returns its `_id`.
    async fn insert_one(&self, ns: Namespace<'_>, document: Document) -> DocGateResult<Bson>;

    /// Inserts documents in order and returns their `_id`s in the same order.
    async fn insert_many(
        &self,
        ns: Namespace<'_>,
        documents: Vec<Document>,
    ) -> DocGateResult<Vec<Bson>>;

    async fn update_one(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult>;

    async fn update_many(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult>;

    /// Deletes at most one document and returns the deleted count.
    async fn delete_one(&self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64>;

    async fn delete_many(&self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64>;

    async fn count(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: CountOptions,
    ) -> DocGateResult<u64>;

    /// Returns the collection size from metadata, without scanning.
    async fn estimated_count(&self, ns: Namespace<'_>) -> DocGateResult<u64>;

    async fn distinct(
        &self,
        ns: Namespace<'_>,
        field: &str,
        filter: Document,
    ) -> DocGateResult<Vec<Bson>>;

    async fn aggregate(
        &self,
        ns: Namespace<'_>,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> DocGateResult<Self::Cursor>;

    /// Applies the models in order, stopping at the first failure. The failure is a
    /// [`DocGateError::BulkWrite`](crate::error::DocGateError::BulkWrite) carrying the
    /// counts of the models applied before it.
    async fn bulk_write(
        &self,
        ns: Namespace<'_>,
        models: Vec<WriteModel<Document>>,
    ) -> DocGateResult<BulkWriteResult>;

    /// Runs `unit` inside a session. The session ends on every path.
    async fn with_session<R: Send>(&self, unit: SessionWork<'_, Self::Session, R>) -> DocGateResult<R>;

    /// Runs `unit` inside a transaction: committed when it returns `Ok`, aborted
    /// otherwise. The session ends on every path.
    ///
    /// Retries follow the driver's transaction primitive: a transient failure or a
    /// lost write conflict starts a fresh transaction and runs `unit` again.
    async fn with_transaction<R: Send>(
        &self,
        unit: SessionWork<'_, Self::Session, R>,
    ) -> DocGateResult<R>;
}

/// Factory trait for connecting a [`Driver`].
#[async_trait]
pub trait DriverBuilder: Send {
    type Driver: Driver;

    async fn connect(self, options: ConnectOptions) -> DocGateResult<Self::Driver>;
}
