use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::FutureExt;
use mongodb::{Client, Collection, options::ClientOptions, results::UpdateResult as MongoUpdateResult};
use tracing::{debug, info};

use docgate_core::{
    driver::{
        AggregateOptions, BulkWriteResult, ConnectOptions, CountOptions, Driver, DriverBuilder,
        FindOneAndDeleteOptions, FindOneAndReplaceOptions, FindOneAndUpdateOptions, FindOneOptions,
        FindOptions, Namespace, SessionWork, UpdateOptions, UpdateResult, WriteModel,
    },
    error::{DocGateError, DocGateResult},
};

use crate::{cursor::MongoCursor, options, session::MongoSession};

pub(crate) fn update_result(result: MongoUpdateResult) -> UpdateResult {
    UpdateResult {
        matched_count: result.matched_count,
        modified_count: result.modified_count,
        upserted_count: result.upserted_id.is_some() as u64,
        upserted_id: result.upserted_id,
    }
}

fn stage(stage: &'static str) -> impl FnOnce(mongodb::error::Error) -> DocGateError {
    move |err| DocGateError::transaction(stage, DocGateError::driver(err))
}

/// A [`Driver`] over the official `mongodb` client.
///
/// Cloning is cheap: `mongodb::Client` is a handle to a shared connection pool.
#[derive(Debug, Clone)]
pub struct MongoDriver {
    client: Client,
}

impl MongoDriver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn builder() -> MongoDriverBuilder {
        MongoDriverBuilder::default()
    }

    /// The underlying `mongodb::Client`.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, ns: Namespace<'_>) -> Collection<Document> {
        self.client
            .database(ns.database)
            .collection(ns.collection)
    }

    /// Shuts the connection pool down, waiting for checked-out connections to return.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }

    async fn apply(&self, ns: Namespace<'_>, model: WriteModel<Document>, result: &mut BulkWriteResult) -> DocGateResult<()> {
        let collection = self.collection(ns);

        let updated = match model {
            WriteModel::InsertOne { document } => {
                collection
                    .insert_one(document)
                    .await
                    .map_err(DocGateError::driver)?;
                result.inserted_count += 1;
                return Ok(());
            }
            WriteModel::DeleteOne { filter } => {
                let deleted = collection.delete_one(filter).await.map_err(DocGateError::driver)?;
                result.deleted_count += deleted.deleted_count;
                return Ok(());
            }
            WriteModel::DeleteMany { filter } => {
                let deleted = collection.delete_many(filter).await.map_err(DocGateError::driver)?;
                result.deleted_count += deleted.deleted_count;
                return Ok(());
            }
            WriteModel::UpdateOne { filter, update, upsert } => collection
                .update_one(filter, update)
                .upsert(upsert)
                .await,
            WriteModel::UpdateMany { filter, update, upsert } => collection
                .update_many(filter, update)
                .upsert(upsert)
                .await,
            WriteModel::ReplaceOne { filter, replacement, upsert } => collection
                .replace_one(filter, replacement)
                .upsert(upsert)
                .await,
        }
        .map_err(DocGateError::driver)?;

        result.matched_count += updated.matched_count;
        result.modified_count += updated.modified_count;
        result.upserted_count += updated.upserted_id.is_some() as u64;

        Ok(())
    }
}

#[async_trait]
impl Driver for MongoDriver {
    type Cursor = MongoCursor;
    type Session = MongoSession;

    async fn ping(&self) -> DocGateResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(DocGateError::driver)?;

        Ok(())
    }

    async fn find(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOptions,
    ) -> DocGateResult<Self::Cursor> {
        let cursor = self
            .collection(ns)
            .find(filter)
            .with_options(options::find(options))
            .await
            .map_err(DocGateError::driver)?;

        Ok(MongoCursor::new(cursor))
    }

    async fn find_one(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOneOptions,
    ) -> DocGateResult<Option<Document>> {
        self.collection(ns)
            .find_one(filter)
            .with_options(options::find_one(options))
            .await
            .map_err(DocGateError::driver)
    }

    async fn find_one_and_update(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocGateResult<Option<Document>> {
        self.collection(ns)
            .find_one_and_update(filter, update)
            .with_options(options::find_one_and_update(options))
            .await
            .map_err(DocGateError::driver)
    }

    async fn find_one_and_replace(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        replacement: Document,
        options: FindOneAndReplaceOptions,
    ) -> DocGateResult<Option<Document>> {
        self.collection(ns)
            .find_one_and_replace(filter, replacement)
            .with_options(options::find_one_and_replace(options))
            .await
            .map_err(DocGateError::driver)
    }

    async fn find_one_and_delete(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> DocGateResult<Option<Document>> {
        self.collection(ns)
            .find_one_and_delete(filter)
            .with_options(options::find_one_and_delete(options))
            .await
            .map_err(DocGateError::driver)
    }

    async fn insert_one(&self, ns: Namespace<'_>, document: Document) -> DocGateResult<Bson> {
        let result = self
            .collection(ns)
            .insert_one(document)
            .await
            .map_err(DocGateError::driver)?;

        Ok(result.inserted_id)
    }

    async fn insert_many(
        &self,
        ns: Namespace<'_>,
        documents: Vec<Document>,
    ) -> DocGateResult<Vec<Bson>> {
        let count = documents.len();
        let mut result = self
            .collection(ns)
            .insert_many(documents)
            .await
            .map_err(DocGateError::driver)?;

        // The driver reports ids keyed by input position.
        Ok((0..count)
            .filter_map(|index| result.inserted_ids.remove(&index))
            .collect())
    }

    async fn update_one(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult> {
        self.collection(ns)
            .update_one(filter, update)
            .upsert(options.upsert.unwrap_or(false))
            .await
            .map(update_result)
            .map_err(DocGateError::driver)
    }

    async fn update_many(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult> {
        self.collection(ns)
            .update_many(filter, update)
            .upsert(options.upsert.unwrap_or(false))
            .await
            .map(update_result)
            .map_err(DocGateError::driver)
    }

    async fn delete_one(&self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64> {
        self.collection(ns)
            .delete_one(filter)
            .await
            .map(|result| result.deleted_count)
            .map_err(DocGateError::driver)
    }

    async fn delete_many(&self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64> {
        self.collection(ns)
            .delete_many(filter)
            .await
            .map(|result| result.deleted_count)
            .map_err(DocGateError::driver)
    }

    async fn count(
        &self,
        ns: Namespace<'_>,
        filter: Document,
        options: CountOptions,
    ) -> DocGateResult<u64> {
        self.collection(ns)
            .count_documents(filter)
            .with_options(options::count(options))
            .await
            .map_err(DocGateError::driver)
    }

    async fn estimated_count(&self, ns: Namespace<'_>) -> DocGateResult<u64> {
        self.collection(ns)
            .estimated_document_count()
            .await
            .map_err(DocGateError::driver)
    }

    async fn distinct(
        &self,
        ns: Namespace<'_>,
        field: &str,
        filter: Document,
    ) -> DocGateResult<Vec<Bson>> {
        self.collection(ns)
            .distinct(field, filter)
            .await
            .map_err(DocGateError::driver)
    }

    async fn aggregate(
        &self,
        ns: Namespace<'_>,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> DocGateResult<Self::Cursor> {
        let cursor = self
            .collection(ns)
            .aggregate(pipeline)
            .with_options(options::aggregate(options))
            .await
            .map_err(DocGateError::driver)?;

        Ok(MongoCursor::new(cursor))
    }

    /// Applies the models one at a time. Collection-level bulk writes would need a
    /// homogeneous model list, and client-level bulk writes a recent server. A failing
    /// model reports the counts applied before it.
    async fn bulk_write(
        &self,
        ns: Namespace<'_>,
        models: Vec<WriteModel<Document>>,
    ) -> DocGateResult<BulkWriteResult> {
        let mut result = BulkWriteResult::default();

        for (index, model) in models.into_iter().enumerate() {
            if let Err(err) = self.apply(ns, model, &mut result).await {
                return Err(DocGateError::bulk_write(index, result, err));
            }
        }

        Ok(result)
    }

    async fn with_session<R: Send>(&self, mut unit: SessionWork<'_, Self::Session, R>) -> DocGateResult<R> {
        let session = self
            .client
            .start_session()
            .await
            .map_err(stage("start_session"))?;
        let mut session = MongoSession::new(session);

        unit(&mut session).await
    }

    /// Runs `unit` through the driver's convenient transaction API, which retries the
    /// whole unit on `TransientTransactionError` and the commit on
    /// `UnknownTransactionCommitResult`.
    async fn with_transaction<R: Send>(
        &self,
        unit: SessionWork<'_, Self::Session, R>,
    ) -> DocGateResult<R> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(stage("start_session"))?;
        let mut run = TransactionRun { unit, failure: None };

        let result = session
            .start_transaction()
            .and_run(&mut run, |session, run| {
                async move {
                    run.failure = None;
                    let outcome = (run.unit)(MongoSession::from_mut(session)).await;
                    outcome.map_err(|err| run.escalate(err))
                }
                .boxed()
            })
            .await;

        match (result, run.failure.take()) {
            (Ok(value), _) => Ok(value),
            (Err(_), Some(err)) => {
                debug!(error = %err, "transaction aborted by its unit of work");
                Err(err)
            }
            (Err(err), None) => Err(DocGateError::transaction("run_transaction", DocGateError::driver(err))),
        }
    }
}

/// A unit of work and the last error it returned, shared across transaction attempts.
struct TransactionRun<'u, R> {
    unit: SessionWork<'u, MongoSession, R>,
    failure: Option<DocGateError>,
}

impl<R> TransactionRun<'_, R> {
    /// Hands a unit failure to the transaction runner.
    ///
    /// Driver errors go back as they are so their labels decide whether the runner
    /// retries. Anything else aborts the transaction.
    fn escalate(&mut self, err: DocGateError) -> mongodb::error::Error {
        let returned = match &err {
            DocGateError::Driver(source) => source.downcast_ref::<mongodb::error::Error>().cloned(),
            _ => None,
        };
        self.failure = Some(err);

        returned.unwrap_or_else(|| mongodb::error::Error::custom(UnitFailed))
    }
}

/// Marks a transaction aborted by a non-driver error from its unit of work.
#[derive(Debug, Clone, Copy)]
struct UnitFailed;

type Customize = Box<dyn FnOnce(&mut ClientOptions) + Send>;

/// Connects a [`MongoDriver`] from [`ConnectOptions`].
///
/// # Example
///
/// ```ignore
/// use docgate::{client::ClientBuilder, config::Config, mongodb::MongoDriver};
///
/// let client = ClientBuilder::new(Config::new("10.0.0.5:27017"))
///     .connect(MongoDriver::builder().app_name("orders-api"))
///     .await?;
/// ```
#[derive(Default)]
pub struct MongoDriverBuilder {
    app_name: Option<String>,
    customize: Option<Customize>,
}

impl MongoDriverBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Adjusts the parsed `ClientOptions` after the connect options were applied.
    pub fn customize(mut self, customize: impl FnOnce(&mut ClientOptions) + Send + 'static) -> Self {
        self.customize = Some(Box::new(customize));
        self
    }
}

impl std::fmt::Debug for MongoDriverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDriverBuilder")
            .field("app_name", &self.app_name)
            .field("customize", &self.customize.is_some())
            .finish()
    }
}

#[async_trait]
impl DriverBuilder for MongoDriverBuilder {
    type Driver = MongoDriver;

    async fn connect(self, options: ConnectOptions) -> DocGateResult<Self::Driver> {
        let mut client_options = ClientOptions::parse(&options.uri)
            .await
            .map_err(|err| DocGateError::Initialization(err.to_string()))?;

        options::apply_connect_options(&mut client_options, &options);
        if self.app_name.is_some() {
            client_options.app_name = self.app_name;
        }
        if let Some(customize) = self.customize {
            customize(&mut client_options);
        }

        info!(
            max_pool_size = options.max_pool_size,
            secondary_preferred = options.secondary_preferred,
            "connecting mongodb driver"
        );

        let client = Client::with_options(client_options)
            .map_err(|err| DocGateError::Initialization(err.to_string()))?;

        Ok(MongoDriver::new(client))
    }
}
