//! Typed, guarded access to a collection from inside a session or transaction.
//!
//! ```ignore
//! client.do_transaction(|session| Box::pin(async move {
//!     let mut orders = SessionCollection::new(session, "shop", "orders");
//!     orders.insert_one(&order).await?;
//!     orders.update_one(doc! { "_id": cart_id }, doc! { "$set": { "closed": true } }, false).await?;
//!     Ok(())
//! })).await?;
//! ```

use bson::{Bson, Document, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    driver::{CountOptions, DriverSession, FindOneOptions, FindOptions, Namespace, UpdateOptions, UpdateResult},
    error::{DocGateError, DocGateResult},
    guard::check_update,
    query::sort_document,
    update::Update,
};

/// A collection handle borrowing a driver session.
///
/// Not instrumented on its own: the enclosing `use_session` call is the measured
/// operation.
pub struct SessionCollection<'s, S: DriverSession> {
    session: &'s mut S,
    database: String,
    collection: String,
}

impl<'s, S: DriverSession> SessionCollection<'s, S> {
    pub fn new(session: &'s mut S, database: &str, collection: &str) -> Self {
        Self {
            session,
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }

    pub fn session(&mut self) -> &mut S {
        &mut *self.session
    }

    fn namespace(&self) -> Namespace<'_> {
        Namespace::new(&self.database, &self.collection)
    }

    pub async fn find<T: DeserializeOwned>(
        &mut self,
        filter: Document,
        sort: &[&str],
        skip: u64,
        limit: i64,
    ) -> DocGateResult<Vec<T>> {
        let options = FindOptions {
            sort: (!sort.is_empty()).then(|| sort_document(sort)),
            skip: (skip > 0).then_some(skip),
            limit: (limit != 0).then_some(limit),
            ..Default::default()
        };
        let ns = Namespace::new(&self.database, &self.collection);

        self.session
            .find(ns, filter, options)
            .await?
            .into_iter()
            .map(|document| deserialize_from_document(document).map_err(DocGateError::from))
            .collect()
    }

    pub async fn find_one<T: DeserializeOwned>(&mut self, filter: Document) -> DocGateResult<Option<T>> {
        let ns = Namespace::new(&self.database, &self.collection);

        match self.session.find_one(ns, filter, FindOneOptions::default()).await? {
            Some(document) => Ok(Some(deserialize_from_document(document)?)),
            None => Ok(None),
        }
    }

    pub async fn insert_one<T: Serialize + ?Sized>(&mut self, document: &T) -> DocGateResult<Bson> {
        let document = serialize_to_document(document)?;
        let ns = Namespace::new(&self.database, &self.collection);

        self.session.insert_one(ns, document).await
    }

    /// Applies `update` to the first matching document, after the mutation guard.
    pub async fn update_one(
        &mut self,
        filter: Document,
        update: impl Into<Update>,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        let update = update.into();
        check_update(Some(&update))?;
        let update = update.to_document()?;
        let ns = Namespace::new(&self.database, &self.collection);

        self.session
            .update_one(ns, filter, update, UpdateOptions { upsert: Some(upsert) })
            .await
    }

    pub async fn delete_one(&mut self, filter: Document) -> DocGateResult<bool> {
        let ns = Namespace::new(&self.database, &self.collection);

        Ok(self.session.delete_one(ns, filter).await? > 0)
    }

    pub async fn count(&mut self, filter: Document) -> DocGateResult<u64> {
        let ns = Namespace::new(&self.database, &self.collection);

        self.session.count(ns, filter, CountOptions::default()).await
    }
}

impl<S: DriverSession> std::fmt::Debug for SessionCollection<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCollection")
            .field("namespace", &self.namespace())
            .finish()
    }
}
