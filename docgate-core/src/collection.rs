//! Collection handles.
//!
//! Every public operation on a [`Collection`] is instrumented the same way: it runs
//! inside a tracing span named `db|<database>.<collection>`, is bounded by the client
//! timeout, and reports one latency observation (plus one error increment on failure)
//! tagged with its own operation name.
//!
//! # Collection Types
//!
//! - [`Collection`] - Untyped handle; the decode target is chosen per call
//! - [`TypedCollection`] - Handle bound to an entity type `T`
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! let posts = client.collection("blog", "posts");
//!
//! let mut top: Vec<Post> = Vec::with_capacity(10);
//! posts.find(doc! { "draft": false }, &mut top, &["-likes", "_id"], 0, 10, None).await?;
//!
//! let mut post = Post::default();
//! if posts.find_id(post_id, &mut post, None).await? {
//!     println!("{}", post.title);
//! }
//! ```

use std::{future::Future, marker::PhantomData};

use bson::{Bson, Document, de::deserialize_from_document, ser::serialize_to_document};
use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{Instrument, Span, info_span, warn};

use crate::{
    client::Client,
    cursor::{DeadlineCursor, scan_cursor},
    driver::{
        AggregateOptions, BulkWriteResult, CountOptions, Driver, FindOneAndDeleteOptions,
        FindOneAndReplaceOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, Namespace,
        ReturnDocument, UpdateOptions, UpdateResult, WriteModel,
    },
    error::{DocGateError, DocGateResult},
    guard::{check_replacement, check_update},
    metrics::OperationMetricContext,
    query::{id_filter, sort_document},
    update::Update,
};

/// An untyped handle to one collection.
///
/// Cheap to create: it holds a client reference and two names.
#[derive(Debug)]
pub struct Collection<'a, D: Driver> {
    client: &'a Client<D>,
    database: String,
    collection: String,
}

impl<'a, D: Driver> Collection<'a, D> {
    pub(crate) fn new(client: &'a Client<D>, database: String, collection: String) -> Self {
        Self { client, database, collection }
    }

    pub fn client(&self) -> &'a Client<D> {
        self.client
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.collection
    }

    pub fn namespace(&self) -> Namespace<'_> {
        Namespace::new(&self.database, &self.collection)
    }

    /// Translates prefixed sort keys (`-field` descending, `+field` or `field`
    /// ascending) into a sort document.
    pub fn sort_document(&self, sort: &[&str]) -> Document {
        sort_document(sort)
    }

    /// Opens a raw driver cursor.
    ///
    /// Only opening the cursor is instrumented and bounded by the client timeout;
    /// iterating it is not. Use this for reads too large to materialize within the
    /// timeout, and [`Client::scan_cursor`] to decode it.
    ///
    /// # Arguments
    ///
    /// * `filter` - Query filter
    /// * `sort` - Prefixed sort keys; empty leaves `options.sort` untouched
    /// * `skip` - Documents to skip; `0` leaves `options.skip` untouched
    /// * `limit` - Maximum documents; `0` leaves `options.limit` untouched
    /// * `options` - Driver options; the positional arguments take precedence
    pub async fn find_cursor(
        &self,
        filter: Document,
        sort: &[&str],
        skip: u64,
        limit: i64,
        options: Option<FindOptions>,
    ) -> DocGateResult<D::Cursor> {
        let options = find_options(options, sort, skip, limit);

        self.instrumented("find_cursor", self.driver().find(self.namespace(), filter, options))
            .await
    }

    /// Runs a query and decodes every result into `dest`.
    ///
    /// `dest` keeps its allocation: existing elements are overwritten in place and the
    /// vector is truncated to the number of results. Arguments are as for
    /// [`find_cursor`](Self::find_cursor).
    ///
    /// # Errors
    ///
    /// Returns a driver, decode or timeout error. On a decode error `dest` holds the
    /// documents decoded before the failure.
    pub async fn find<T>(
        &self,
        filter: Document,
        dest: &mut Vec<T>,
        sort: &[&str],
        skip: u64,
        limit: i64,
        options: Option<FindOptions>,
    ) -> DocGateResult<()>
    where
        T: DeserializeOwned,
    {
        let options = find_options(options, sort, skip, limit);

        self.observed("find", async {
            let deadline = self.deadline();
            let cursor = self
                .before(deadline, "find", self.driver().find(self.namespace(), filter, options))
                .await?;

            scan_cursor(self.bounded(cursor, deadline, "find"), dest).await
        })
        .await
    }

    /// Decodes the first matching document into `result`.
    ///
    /// Returns `false`, leaving `result` untouched, when nothing matches.
    pub async fn find_one<T>(
        &self,
        filter: Document,
        result: &mut T,
        sort: &[&str],
        skip: u64,
        options: Option<FindOneOptions>,
    ) -> DocGateResult<bool>
    where
        T: DeserializeOwned,
    {
        let mut options = options.unwrap_or_default();
        if !sort.is_empty() {
            options.sort = Some(sort_document(sort));
        }
        if skip > 0 {
            options.skip = Some(skip);
        }

        self.instrumented("find_one", async {
            decode_into(self.driver().find_one(self.namespace(), filter, options).await?, result)
        })
        .await
    }

    /// Decodes the document with `_id == id` into `result`.
    pub async fn find_id<T>(
        &self,
        id: impl Into<Bson>,
        result: &mut T,
        options: Option<FindOneOptions>,
    ) -> DocGateResult<bool>
    where
        T: DeserializeOwned,
    {
        let filter = id_filter(id);
        let options = options.unwrap_or_default();

        self.instrumented("find_id", async {
            decode_into(self.driver().find_one(self.namespace(), filter, options).await?, result)
        })
        .await
    }

    /// Applies `update` to the first matching document and decodes it into `result`.
    ///
    /// With `return_new` the updated document is returned, otherwise the original.
    /// Returns `false` when no document was returned, which includes an upsert with
    /// `return_new == false`.
    ///
    /// # Errors
    ///
    /// Returns [`DocGateError::UnsafeUpdate`] or [`DocGateError::InvalidArgument`],
    /// without contacting the store, when `update` fails the mutation guard.
    #[allow(clippy::too_many_arguments)]
    pub async fn find_one_and_update<T>(
        &self,
        filter: Document,
        update: impl Into<Update>,
        result: &mut T,
        sort: &[&str],
        upsert: bool,
        return_new: bool,
        options: Option<FindOneAndUpdateOptions>,
    ) -> DocGateResult<bool>
    where
        T: DeserializeOwned,
    {
        let update = guarded(update.into())?;

        let mut options = options.unwrap_or_default();
        if !sort.is_empty() {
            options.sort = Some(sort_document(sort));
        }
        options.upsert = Some(upsert);
        options.return_document = Some(return_document(return_new));

        self.instrumented("find_one_and_update", async {
            decode_into(
                self.driver()
                    .find_one_and_update(self.namespace(), filter, update, options)
                    .await?,
                result,
            )
        })
        .await
    }

    /// Replaces the first matching document with `replacement` and decodes the
    /// returned version into `result`.
    #[allow(clippy::too_many_arguments)]
    pub async fn find_one_and_replace<R, T>(
        &self,
        filter: Document,
        replacement: &R,
        result: &mut T,
        sort: &[&str],
        upsert: bool,
        return_new: bool,
        options: Option<FindOneAndReplaceOptions>,
    ) -> DocGateResult<bool>
    where
        R: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let replacement = serialize_to_document(replacement)?;
        check_replacement(&replacement)?;

        let mut options = options.unwrap_or_default();
        if !sort.is_empty() {
            options.sort = Some(sort_document(sort));
        }
        options.upsert = Some(upsert);
        options.return_document = Some(return_document(return_new));

        self.instrumented("find_one_and_replace", async {
            decode_into(
                self.driver()
                    .find_one_and_replace(self.namespace(), filter, replacement, options)
                    .await?,
                result,
            )
        })
        .await
    }

    /// Deletes the first matching document and decodes it into `result`.
    pub async fn find_one_and_delete<T>(
        &self,
        filter: Document,
        result: &mut T,
        sort: &[&str],
        options: Option<FindOneAndDeleteOptions>,
    ) -> DocGateResult<bool>
    where
        T: DeserializeOwned,
    {
        let mut options = options.unwrap_or_default();
        if !sort.is_empty() {
            options.sort = Some(sort_document(sort));
        }

        self.instrumented("find_one_and_delete", async {
            decode_into(
                self.driver()
                    .find_one_and_delete(self.namespace(), filter, options)
                    .await?,
                result,
            )
        })
        .await
    }

    /// Inserts one document and returns its `_id`.
    pub async fn insert_one<T>(&self, document: &T) -> DocGateResult<Bson>
    where
        T: Serialize + ?Sized,
    {
        let document = serialize_to_document(document)?;

        self.instrumented("insert_one", self.driver().insert_one(self.namespace(), document))
            .await
    }

    /// Inserts documents in order and returns their `_id`s.
    ///
    /// Accepts any iterator of serializable values, including `slice.iter()`, so
    /// elements are never copied.
    ///
    /// # Errors
    ///
    /// Returns [`DocGateError::InvalidArgument`] for an empty input.
    pub async fn insert_many<I>(&self, documents: I) -> DocGateResult<Vec<Bson>>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let documents = documents
            .into_iter()
            .map(|document| serialize_to_document(&document))
            .collect::<Result<Vec<_>, _>>()?;

        if documents.is_empty() {
            return Err(DocGateError::InvalidArgument("insert_many needs at least one document".into()));
        }

        self.instrumented("insert_many", self.driver().insert_many(self.namespace(), documents))
            .await
    }

    /// Applies `update` to the first matching document.
    ///
    /// # Errors
    ///
    /// Returns [`DocGateError::UnsafeUpdate`] or [`DocGateError::InvalidArgument`],
    /// without contacting the store, when `update` fails the mutation guard.
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<Update>,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        let update = guarded(update.into())?;

        self.instrumented(
            "update_one",
            self.driver()
                .update_one(self.namespace(), filter, update, upsert_options(upsert)),
        )
        .await
    }

    /// Applies `update` to the document with `_id == id`.
    pub async fn update_id(
        &self,
        id: impl Into<Bson>,
        update: impl Into<Update>,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        let update = guarded(update.into())?;

        self.instrumented(
            "update_id",
            self.driver()
                .update_one(self.namespace(), id_filter(id), update, upsert_options(upsert)),
        )
        .await
    }

    /// Applies `update` to every matching document.
    pub async fn update_many(
        &self,
        filter: Document,
        update: impl Into<Update>,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        let update = guarded(update.into())?;

        self.instrumented(
            "update_many",
            self.driver()
                .update_many(self.namespace(), filter, update, upsert_options(upsert)),
        )
        .await
    }

    /// Counts matching documents. A `limit` of `0` counts all of them.
    pub async fn count(&self, filter: Document, skip: u64, limit: u64) -> DocGateResult<u64> {
        let options = CountOptions {
            skip: Some(skip),
            limit: (limit > 0).then_some(limit),
        };

        self.instrumented("count", self.driver().count(self.namespace(), filter, options))
            .await
    }

    /// Returns the collection size from metadata, without scanning documents.
    pub async fn estimated_count(&self) -> DocGateResult<u64> {
        self.instrumented("estimated_count", self.driver().estimated_count(self.namespace()))
            .await
    }

    /// Deletes the first matching document. Returns whether one was deleted.
    pub async fn delete_one(&self, filter: Document) -> DocGateResult<bool> {
        self.instrumented("delete_one", async {
            Ok(self.driver().delete_one(self.namespace(), filter).await? > 0)
        })
        .await
    }

    /// Deletes the document with `_id == id`. Returns whether it existed.
    pub async fn delete_id(&self, id: impl Into<Bson>) -> DocGateResult<bool> {
        let filter = id_filter(id);

        self.instrumented("delete_id", async {
            Ok(self.driver().delete_one(self.namespace(), filter).await? > 0)
        })
        .await
    }

    /// Deletes every matching document and returns how many were deleted.
    pub async fn delete_many(&self, filter: Document) -> DocGateResult<u64> {
        self.instrumented("delete_many", self.driver().delete_many(self.namespace(), filter))
            .await
    }

    /// Returns the distinct values of `field` among matching documents.
    pub async fn distinct(&self, field: &str, filter: Document) -> DocGateResult<Vec<Bson>> {
        self.instrumented("distinct", self.driver().distinct(self.namespace(), field, filter))
            .await
    }

    /// Runs an aggregation pipeline and decodes every output document into `dest`,
    /// with the same slot reuse as [`find`](Self::find).
    pub async fn aggregate<T>(
        &self,
        pipeline: Vec<Document>,
        dest: &mut Vec<T>,
        options: Option<AggregateOptions>,
    ) -> DocGateResult<()>
    where
        T: DeserializeOwned,
    {
        let options = options.unwrap_or_default();

        self.observed("aggregate", async {
            let deadline = self.deadline();
            let cursor = self
                .before(
                    deadline,
                    "aggregate",
                    self.driver().aggregate(self.namespace(), pipeline, options),
                )
                .await?;

            scan_cursor(self.bounded(cursor, deadline, "aggregate"), dest).await
        })
        .await
    }

    /// Applies `models` in order, stopping at the first failure.
    ///
    /// Update models pass through the mutation guard and replacements must not contain
    /// operators; a rejected model fails the whole batch before anything is sent.
    pub async fn bulk_write(&self, models: Vec<WriteModel>) -> DocGateResult<BulkWriteResult> {
        if models.is_empty() {
            return Err(DocGateError::InvalidArgument("bulk_write needs at least one model".into()));
        }

        let models = models
            .into_iter()
            .map(render_model)
            .collect::<DocGateResult<Vec<_>>>()?;

        self.instrumented("bulk_write", self.driver().bulk_write(self.namespace(), models))
            .await
    }

    /// Runs `unit` inside a driver session.
    ///
    /// The whole unit is one instrumented operation bounded by the client timeout.
    /// Operations inside it must go through the session it receives; see
    /// [`SessionCollection`](crate::session::SessionCollection).
    pub async fn use_session<R, F>(&self, unit: F) -> DocGateResult<R>
    where
        R: Send,
        F: for<'s> FnMut(&'s mut D::Session) -> BoxFuture<'s, DocGateResult<R>> + Send,
    {
        self.instrumented("use_session", self.driver().with_session(Box::new(unit)))
            .await
    }

    fn driver(&self) -> &'a D {
        self.client.driver()
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.client.timeout()
    }

    fn bounded<C>(&self, cursor: C, deadline: Instant, command: &'static str) -> DeadlineCursor<C>
    where
        C: crate::driver::DocumentCursor,
    {
        DeadlineCursor::new(cursor, deadline, command, self.client.timeout())
    }

    fn span(&self, command: &'static str) -> Span {
        let name = format!("db|{}.{}", self.database, self.collection);

        info_span!(
            "db",
            otel.name = %name,
            db.name = %self.database,
            db.collection = %self.collection,
            command,
        )
    }

    fn timed_out(&self, command: &'static str) -> DocGateError {
        DocGateError::Timeout {
            command,
            timeout: self.client.timeout(),
        }
    }

    async fn before<R, F>(&self, deadline: Instant, command: &'static str, operation: F) -> DocGateResult<R>
    where
        F: Future<Output = DocGateResult<R>>,
    {
        timeout_at(deadline, operation)
            .await
            .unwrap_or_else(|_| Err(self.timed_out(command)))
    }

    /// Runs `operation` inside the operation span and records its metrics.
    async fn observed<R, F>(&self, command: &'static str, operation: F) -> DocGateResult<R>
    where
        F: Future<Output = DocGateResult<R>>,
    {
        let context = OperationMetricContext::start(command);
        let result = operation.instrument(self.span(command)).await;

        if let Err(DocGateError::Timeout { timeout, .. }) = &result {
            warn!(
                db = %self.database,
                collection = %self.collection,
                command,
                ?timeout,
                "document store operation timed out",
            );
        }

        self.client
            .end_metric(context, &self.database, &self.collection, result.is_err());

        result
    }

    /// [`observed`](Self::observed), bounded by the client timeout.
    async fn instrumented<R, F>(&self, command: &'static str, operation: F) -> DocGateResult<R>
    where
        F: Future<Output = DocGateResult<R>>,
    {
        let limit = self.client.timeout();

        self.observed(command, async move {
            timeout(limit, operation)
                .await
                .unwrap_or_else(|_| Err(self.timed_out(command)))
        })
        .await
    }
}

/// A collection handle bound to the entity type `T`.
///
/// Every method delegates to [`Collection`]; reads decode into `T` and single-document
/// reads return `Option<T>` instead of a found flag.
#[derive(Debug)]
pub struct TypedCollection<'a, D: Driver, T> {
    inner: Collection<'a, D>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, D: Driver, T> TypedCollection<'a, D, T> {
    pub(crate) fn new(inner: Collection<'a, D>) -> Self {
        Self { inner, _marker: PhantomData }
    }

    /// The untyped handle to the same collection.
    pub fn untyped(&self) -> &Collection<'a, D> {
        &self.inner
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn database(&self) -> &str {
        self.inner.database()
    }

    /// Rebinds the handle to a different entity type.
    pub fn with_type<U>(&self) -> TypedCollection<'a, D, U> {
        TypedCollection::new(Collection::new(
            self.inner.client,
            self.inner.database.clone(),
            self.inner.collection.clone(),
        ))
    }

    pub fn sort_document(&self, sort: &[&str]) -> Document {
        self.inner.sort_document(sort)
    }

    pub async fn find_cursor(
        &self,
        filter: Document,
        sort: &[&str],
        skip: u64,
        limit: i64,
        options: Option<FindOptions>,
    ) -> DocGateResult<D::Cursor> {
        self.inner.find_cursor(filter, sort, skip, limit, options).await
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<Update>,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        self.inner.update_one(filter, update, upsert).await
    }

    pub async fn update_id(
        &self,
        id: impl Into<Bson>,
        update: impl Into<Update>,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        self.inner.update_id(id, update, upsert).await
    }

    pub async fn update_many(
        &self,
        filter: Document,
        update: impl Into<Update>,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        self.inner.update_many(filter, update, upsert).await
    }

    pub async fn count(&self, filter: Document, skip: u64, limit: u64) -> DocGateResult<u64> {
        self.inner.count(filter, skip, limit).await
    }

    pub async fn estimated_count(&self) -> DocGateResult<u64> {
        self.inner.estimated_count().await
    }

    pub async fn delete_one(&self, filter: Document) -> DocGateResult<bool> {
        self.inner.delete_one(filter).await
    }

    pub async fn delete_id(&self, id: impl Into<Bson>) -> DocGateResult<bool> {
        self.inner.delete_id(id).await
    }

    pub async fn delete_many(&self, filter: Document) -> DocGateResult<u64> {
        self.inner.delete_many(filter).await
    }

    pub async fn distinct(&self, field: &str, filter: Document) -> DocGateResult<Vec<Bson>> {
        self.inner.distinct(field, filter).await
    }

    pub async fn bulk_write(&self, models: Vec<WriteModel>) -> DocGateResult<BulkWriteResult> {
        self.inner.bulk_write(models).await
    }

    pub async fn use_session<R, F>(&self, unit: F) -> DocGateResult<R>
    where
        R: Send,
        F: for<'s> FnMut(&'s mut D::Session) -> BoxFuture<'s, DocGateResult<R>> + Send,
    {
        self.inner.use_session(unit).await
    }
}

impl<'a, D: Driver, T: DeserializeOwned> TypedCollection<'a, D, T> {
    pub async fn find(
        &self,
        filter: Document,
        sort: &[&str],
        skip: u64,
        limit: i64,
        options: Option<FindOptions>,
    ) -> DocGateResult<Vec<T>> {
        let mut result = Vec::new();
        self.inner
            .find(filter, &mut result, sort, skip, limit, options)
            .await?;

        Ok(result)
    }

    pub async fn find_one(
        &self,
        filter: Document,
        sort: &[&str],
        skip: u64,
        options: Option<FindOneOptions>,
    ) -> DocGateResult<Option<T>> {
        let mut result = None;
        self.inner
            .find_one(filter, &mut result, sort, skip, options)
            .await?;

        Ok(result)
    }

    pub async fn find_id(&self, id: impl Into<Bson>, options: Option<FindOneOptions>) -> DocGateResult<Option<T>> {
        let mut result = None;
        self.inner.find_id(id, &mut result, options).await?;

        Ok(result)
    }

    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: impl Into<Update>,
        sort: &[&str],
        upsert: bool,
        return_new: bool,
        options: Option<FindOneAndUpdateOptions>,
    ) -> DocGateResult<Option<T>> {
        let mut result = None;
        self.inner
            .find_one_and_update(filter, update, &mut result, sort, upsert, return_new, options)
            .await?;

        Ok(result)
    }

    pub async fn find_one_and_delete(
        &self,
        filter: Document,
        sort: &[&str],
        options: Option<FindOneAndDeleteOptions>,
    ) -> DocGateResult<Option<T>> {
        let mut result = None;
        self.inner
            .find_one_and_delete(filter, &mut result, sort, options)
            .await?;

        Ok(result)
    }

    pub async fn aggregate(&self, pipeline: Vec<Document>, options: Option<AggregateOptions>) -> DocGateResult<Vec<T>> {
        let mut result = Vec::new();
        self.inner.aggregate(pipeline, &mut result, options).await?;

        Ok(result)
    }
}

impl<'a, D: Driver, T: Serialize> TypedCollection<'a, D, T> {
    pub async fn insert_one(&self, document: &T) -> DocGateResult<Bson> {
        self.inner.insert_one(document).await
    }

    /// Inserts borrowed documents without copying them.
    pub async fn insert_many(&self, documents: &[T]) -> DocGateResult<Vec<Bson>> {
        self.inner.insert_many(documents.iter()).await
    }
}

impl<'a, D: Driver, T: Serialize + DeserializeOwned> TypedCollection<'a, D, T> {
    pub async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: &T,
        sort: &[&str],
        upsert: bool,
        return_new: bool,
        options: Option<FindOneAndReplaceOptions>,
    ) -> DocGateResult<Option<T>> {
        let mut result = None;
        self.inner
            .find_one_and_replace(filter, replacement, &mut result, sort, upsert, return_new, options)
            .await?;

        Ok(result)
    }
}

fn find_options(options: Option<FindOptions>, sort: &[&str], skip: u64, limit: i64) -> FindOptions {
    let mut options = options.unwrap_or_default();

    if !sort.is_empty() {
        options.sort = Some(sort_document(sort));
    }
    if skip > 0 {
        options.skip = Some(skip);
    }
    if limit != 0 {
        options.limit = Some(limit);
    }

    options
}

fn upsert_options(upsert: bool) -> UpdateOptions {
    UpdateOptions { upsert: Some(upsert) }
}

fn return_document(return_new: bool) -> ReturnDocument {
    if return_new {
        ReturnDocument::After
    } else {
        ReturnDocument::Before
    }
}

fn guarded(update: Update) -> DocGateResult<Document> {
    check_update(Some(&update))?;
    update.to_document()
}

fn decode_into<T: DeserializeOwned>(document: Option<Document>, result: &mut T) -> DocGateResult<bool> {
    match document {
        Some(document) => {
            *result = deserialize_from_document(document)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn render_model(model: WriteModel) -> DocGateResult<WriteModel<Document>> {
    Ok(match model {
        WriteModel::InsertOne { document } => WriteModel::InsertOne { document },
        WriteModel::UpdateOne { filter, update, upsert } => WriteModel::UpdateOne {
            filter,
            update: guarded(update)?,
            upsert,
        },
        WriteModel::UpdateMany { filter, update, upsert } => WriteModel::UpdateMany {
            filter,
            update: guarded(update)?,
            upsert,
        },
        WriteModel::ReplaceOne { filter, replacement, upsert } => {
            check_replacement(&replacement)?;
            WriteModel::ReplaceOne { filter, replacement, upsert }
        }
        WriteModel::DeleteOne { filter } => WriteModel::DeleteOne { filter },
        WriteModel::DeleteMany { filter } => WriteModel::DeleteMany { filter },
    })
}
