use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::{ClientSession, Collection};

use docgate_core::{
    driver::{CountOptions, DriverSession, FindOneOptions, FindOptions, Namespace, UpdateOptions, UpdateResult},
    error::{DocGateError, DocGateResult},
};

use crate::options;

/// A `mongodb::ClientSession`, optionally inside a transaction.
#[repr(transparent)]
pub struct MongoSession {
    inner: ClientSession,
}

impl MongoSession {
    pub(crate) fn new(inner: ClientSession) -> Self {
        Self { inner }
    }

    /// Views a session borrowed from the driver's transaction runner as a `MongoSession`.
    pub(crate) fn from_mut(inner: &mut ClientSession) -> &mut MongoSession {
        // SAFETY: `MongoSession` is `repr(transparent)` over `ClientSession`, so both
        // types share layout and the borrow keeps the same lifetime.
        unsafe { &mut *(inner as *mut ClientSession).cast::<MongoSession>() }
    }

    /// The wrapped driver session, for operations the access layer does not expose.
    pub fn client_session(&mut self) -> &mut ClientSession {
        &mut self.inner
    }

    fn collection(&self, ns: Namespace<'_>) -> Collection<Document> {
        self.inner
            .client()
            .database(ns.database)
            .collection(ns.collection)
    }
}

impl std::fmt::Debug for MongoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoSession")
            .field("id", self.inner.id())
            .finish()
    }
}

#[async_trait]
impl DriverSession for MongoSession {
    async fn find(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOptions,
    ) -> DocGateResult<Vec<Document>> {
        let mut cursor = self
            .collection(ns)
            .find(filter)
            .with_options(options::find(options))
            .session(&mut self.inner)
            .await
            .map_err(DocGateError::driver)?;

        cursor
            .stream(&mut self.inner)
            .try_collect()
            .await
            .map_err(DocGateError::driver)
    }

    async fn find_one(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOneOptions,
    ) -> DocGateResult<Option<Document>> {
        self.collection(ns)
            .find_one(filter)
            .with_options(options::find_one(options))
            .session(&mut self.inner)
            .await
            .map_err(DocGateError::driver)
    }

    async fn insert_one(&mut self, ns: Namespace<'_>, document: Document) -> DocGateResult<Bson> {
        let result = self
            .collection(ns)
            .insert_one(document)
            .session(&mut self.inner)
            .await
            .map_err(DocGateError::driver)?;

        Ok(result.inserted_id)
    }

    async fn update_one(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult> {
        let result = self
            .collection(ns)
            .update_one(filter, update)
            .upsert(options.upsert.unwrap_or(false))
            .session(&mut self.inner)
            .await
            .map_err(DocGateError::driver)?;

        Ok(crate::store::update_result(result))
    }

    async fn delete_one(&mut self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64> {
        let result = self
            .collection(ns)
            .delete_one(filter)
            .session(&mut self.inner)
            .await
            .map_err(DocGateError::driver)?;

        Ok(result.deleted_count)
    }

    async fn count(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        options: CountOptions,
    ) -> DocGateResult<u64> {
        self.collection(ns)
            .count_documents(filter)
            .with_options(options::count(options))
            .session(&mut self.inner)
            .await
            .map_err(DocGateError::driver)
    }
}
