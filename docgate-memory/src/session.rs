use async_trait::async_trait;
use bson::{Bson, Document};
use tracing::debug;

use docgate_core::{
    driver::{CountOptions, DriverSession, FindOneOptions, FindOptions, Namespace, UpdateOptions, UpdateResult},
    error::{DocGateError, DocGateResult},
};

use crate::{state::Collections, store::MemoryDriver};

/// A session over a [`MemoryDriver`].
///
/// Outside a transaction every operation goes straight to the shared collections.
/// Inside one, operations work on a private snapshot taken when the transaction
/// started; [`commit`](MemorySession::commit) publishes it unless another writer got
/// there first.
#[derive(Debug)]
pub struct MemorySession {
    driver: MemoryDriver,
    staged: Option<Collections>,
    base_version: u64,
}

impl MemorySession {
    pub(crate) fn new(driver: MemoryDriver) -> Self {
        Self {
            driver,
            staged: None,
            base_version: 0,
        }
    }

    pub(crate) async fn transactional(driver: MemoryDriver) -> Self {
        let snapshot = driver.collections().read().await.clone();

        Self {
            driver,
            base_version: snapshot.version(),
            staged: Some(snapshot),
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    async fn read<R>(&self, op: impl FnOnce(&Collections) -> DocGateResult<R> + Send) -> DocGateResult<R> {
        self.driver.delay().await;

        match &self.staged {
            Some(staged) => op(staged),
            None => op(&*self.driver.collections().read().await),
        }
    }

    async fn write<R>(&mut self, op: impl FnOnce(&mut Collections) -> DocGateResult<R> + Send) -> DocGateResult<R> {
        self.driver.delay().await;

        match &mut self.staged {
            Some(staged) => op(staged),
            None => op(&mut *self.driver.collections().write().await),
        }
    }

    /// Publishes the staged writes.
    ///
    /// # Errors
    ///
    /// Fails with a write conflict when the shared collections changed after the
    /// transaction started; nothing is published in that case.
    pub(crate) async fn commit(self) -> DocGateResult<()> {
        let Some(staged) = self.staged else {
            return Ok(());
        };

        let mut shared = self.driver.collections().write().await;
        if shared.version() != self.base_version {
            debug!(
                base_version = self.base_version,
                current_version = shared.version(),
                "memory transaction lost a write conflict"
            );
            return Err(DocGateError::driver("WriteConflict: collections changed during the transaction"));
        }
        if staged.version() != self.base_version {
            *shared = staged;
        }

        Ok(())
    }
}

#[async_trait]
impl DriverSession for MemorySession {
    async fn find(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        options: FindOptions,
    ) -> DocGateResult<Vec<Document>> {
        self.read(|state| {
            state.find(
                ns,
                &filter,
                options.sort.as_ref(),
                options.skip,
                options.limit,
                options.projection.as_ref(),
            )
        })
        .await
    }

    async fn find_one(
        &mut self,
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

    async fn insert_one(&mut self, ns: Namespace<'_>, document: Document) -> DocGateResult<Bson> {
        self.write(|state| state.insert(ns, document)).await
    }

    async fn update_one(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocGateResult<UpdateResult> {
        let upsert = options.upsert.unwrap_or(false);

        self.write(|state| state.update(ns, &filter, &update, upsert, false))
            .await
    }

    async fn delete_one(&mut self, ns: Namespace<'_>, filter: Document) -> DocGateResult<u64> {
        self.write(|state| state.delete(ns, &filter, false)).await
    }

    async fn count(
        &mut self,
        ns: Namespace<'_>,
        filter: Document,
        options: CountOptions,
    ) -> DocGateResult<u64> {
        self.read(|state| state.count(ns, &filter, options.skip, options.limit))
            .await
    }
}
