//! The collection data shared by the driver and its sessions.

use std::collections::HashMap;

use bson::{Bson, Document, oid::ObjectId};

use docgate_core::{
    driver::{BulkWriteResult, Namespace, ReturnDocument, UpdateResult, WriteModel},
    error::{DocGateError, DocGateResult},
};

use crate::evaluator::{
    apply_update, compare_by, lookup, matches, project, run_pipeline, upsert_seed, validate_update,
};

/// What a find-and-modify does to the document it selects.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Modification<'a> {
    Update(&'a Document),
    Replace(&'a Document),
    Delete,
}

/// Every collection, keyed by `"database.collection"`, in insertion order.
///
/// `version` is bumped on every write so a transaction can detect that its snapshot
/// went stale before it commits.
#[derive(Debug, Clone, Default)]
pub(crate) struct Collections {
    data: HashMap<String, Vec<Document>>,
    version: u64,
}

impl Collections {
    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    fn documents(&self, ns: Namespace<'_>) -> &[Document] {
        self.data
            .get(&ns.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn documents_mut(&mut self, ns: Namespace<'_>) -> &mut Vec<Document> {
        self.data.entry(ns.to_string()).or_default()
    }

    /// Indexes of matching documents, ordered by `sort` when given.
    fn select(&self, ns: Namespace<'_>, filter: &Document, sort: Option<&Document>) -> DocGateResult<Vec<usize>> {
        let documents = self.documents(ns);
        let mut selected = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if matches(document, filter)? {
                selected.push(index);
            }
        }

        if let Some(sort) = sort {
            selected.sort_by(|a, b| compare_by(sort, &documents[*a], &documents[*b]));
        }

        Ok(selected)
    }

    pub(crate) fn find(
        &self,
        ns: Namespace<'_>,
        filter: &Document,
        sort: Option<&Document>,
        skip: Option<u64>,
        limit: Option<i64>,
        projection: Option<&Document>,
    ) -> DocGateResult<Vec<Document>> {
        let documents = self.documents(ns);
        // A negative limit asks for a single batch of that size.
        let limit = match limit {
            Some(n) if n != 0 => n.unsigned_abs() as usize,
            _ => usize::MAX,
        };

        Ok(self
            .select(ns, filter, sort)?
            .into_iter()
            .skip(skip.unwrap_or(0) as usize)
            .take(limit)
            .map(|index| {
                let document = documents[index].clone();
                match projection {
                    Some(projection) => project(document, projection),
                    None => document,
                }
            })
            .collect())
    }

    pub(crate) fn count(
        &self,
        ns: Namespace<'_>,
        filter: &Document,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> DocGateResult<u64> {
        let matched = self.select(ns, filter, None)?.len() as u64;
        let remaining = matched.saturating_sub(skip.unwrap_or(0));

        Ok(match limit {
            Some(limit) if limit > 0 => remaining.min(limit),
            _ => remaining,
        })
    }

    pub(crate) fn len(&self, ns: Namespace<'_>) -> u64 {
        self.documents(ns).len() as u64
    }

    pub(crate) fn distinct(&self, ns: Namespace<'_>, field: &str, filter: &Document) -> DocGateResult<Vec<Bson>> {
        let documents = self.documents(ns);
        let mut values: Vec<Bson> = Vec::new();

        for index in self.select(ns, filter, None)? {
            let found = match lookup(&documents[index], field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in found {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }

        Ok(values)
    }

    pub(crate) fn aggregate(&self, ns: Namespace<'_>, pipeline: &[Document]) -> DocGateResult<Vec<Document>> {
        run_pipeline(self.documents(ns).to_vec(), pipeline)
    }

    pub(crate) fn insert(&mut self, ns: Namespace<'_>, document: Document) -> DocGateResult<Bson> {
        let document = if document.contains_key("_id") {
            document
        } else {
            let mut with_id = Document::new();
            with_id.insert("_id", ObjectId::new());
            for (key, value) in document {
                with_id.insert(key, value);
            }
            with_id
        };
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        let documents = self.documents_mut(ns);
        if documents.iter().any(|existing| existing.get("_id") == Some(&id)) {
            return Err(DocGateError::driver(format!(
                "E11000 duplicate key error collection: {ns} index: _id_ dup key: {{ _id: {id} }}"
            )));
        }

        documents.push(document);
        self.version += 1;

        Ok(id)
    }

    pub(crate) fn insert_many(&mut self, ns: Namespace<'_>, documents: Vec<Document>) -> DocGateResult<Vec<Bson>> {
        documents
            .into_iter()
            .map(|document| self.insert(ns, document))
            .collect()
    }

    pub(crate) fn update(
        &mut self,
        ns: Namespace<'_>,
        filter: &Document,
        update: &Document,
        upsert: bool,
        multi: bool,
    ) -> DocGateResult<UpdateResult> {
        validate_update(update)?;

        let mut selected = self.select(ns, filter, None)?;
        if !multi {
            selected.truncate(1);
        }

        if selected.is_empty() {
            return self.upsert(ns, filter, Modification::Update(update), upsert);
        }

        let mut result = UpdateResult {
            matched_count: selected.len() as u64,
            ..Default::default()
        };

        let documents = self.documents_mut(ns);
        let mut changed = Vec::with_capacity(selected.len());
        for index in selected {
            let mut document = documents[index].clone();
            apply_update(&mut document, update, false)?;
            if document != documents[index] {
                changed.push((index, document));
            }
        }

        // Applied only after every document updated cleanly.
        result.modified_count = changed.len() as u64;
        for (index, document) in changed {
            documents[index] = document;
        }
        if result.modified_count > 0 {
            self.version += 1;
        }

        Ok(result)
    }

    pub(crate) fn replace(
        &mut self,
        ns: Namespace<'_>,
        filter: &Document,
        replacement: &Document,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        match self.select(ns, filter, None)?.first() {
            Some(&index) => {
                let modified = self.replace_at(ns, index, replacement)?;
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: modified as u64,
                    ..Default::default()
                })
            }
            None => self.upsert(ns, filter, Modification::Replace(replacement), upsert),
        }
    }

    fn replace_at(&mut self, ns: Namespace<'_>, index: usize, replacement: &Document) -> DocGateResult<bool> {
        let documents = self.documents_mut(ns);
        let id = documents[index].get("_id").cloned().unwrap_or(Bson::Null);

        if replacement.get("_id").is_some_and(|other| other != &id) {
            return Err(DocGateError::driver("the _id field is immutable"));
        }

        let mut document = Document::new();
        document.insert("_id", id);
        for (key, value) in replacement.iter().filter(|(key, _)| key.as_str() != "_id") {
            document.insert(key.as_str(), value.clone());
        }

        if documents[index] == document {
            return Ok(false);
        }

        documents[index] = document;
        self.version += 1;

        Ok(true)
    }

    fn upsert(
        &mut self,
        ns: Namespace<'_>,
        filter: &Document,
        modification: Modification<'_>,
        upsert: bool,
    ) -> DocGateResult<UpdateResult> {
        if !upsert {
            return Ok(UpdateResult::default());
        }

        let id = self.insert(ns, seed(filter, modification)?)?;

        Ok(UpdateResult {
            upserted_count: 1,
            upserted_id: Some(id),
            ..Default::default()
        })
    }

    pub(crate) fn delete(&mut self, ns: Namespace<'_>, filter: &Document, multi: bool) -> DocGateResult<u64> {
        let mut selected = self.select(ns, filter, None)?;
        if !multi {
            selected.truncate(1);
        }
        if selected.is_empty() {
            return Ok(0);
        }

        let documents = self.documents_mut(ns);
        // Indexes come back in ascending order; remove from the back.
        for index in selected.iter().rev() {
            documents.remove(*index);
        }
        self.version += 1;

        Ok(selected.len() as u64)
    }

    /// Selects the first document by `sort`, modifies it and returns either version.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn find_and_modify(
        &mut self,
        ns: Namespace<'_>,
        filter: &Document,
        sort: Option<&Document>,
        modification: Modification<'_>,
        upsert: bool,
        return_document: ReturnDocument,
        projection: Option<&Document>,
    ) -> DocGateResult<Option<Document>> {
        if let Modification::Update(update) = modification {
            validate_update(update)?;
        }

        let selected = self.select(ns, filter, sort)?.first().copied();
        let returned = match selected {
            Some(index) => {
                let before = self.documents(ns)[index].clone();

                match modification {
                    Modification::Delete => {
                        self.documents_mut(ns).remove(index);
                        self.version += 1;
                        Some(before)
                    }
                    Modification::Update(update) => {
                        let mut after = before.clone();
                        apply_update(&mut after, update, false)?;
                        if after != before {
                            self.documents_mut(ns)[index] = after.clone();
                            self.version += 1;
                        }
                        Some(pick(before, after, return_document))
                    }
                    Modification::Replace(replacement) => {
                        self.replace_at(ns, index, replacement)?;
                        let after = self.documents(ns)[index].clone();
                        Some(pick(before, after, return_document))
                    }
                }
            }
            None if upsert && !matches!(modification, Modification::Delete) => {
                let id = self.insert(ns, seed(filter, modification)?)?;
                match return_document {
                    ReturnDocument::Before => None,
                    ReturnDocument::After => self
                        .documents(ns)
                        .iter()
                        .find(|document| document.get("_id") == Some(&id))
                        .cloned(),
                }
            }
            None => None,
        };

        Ok(match (returned, projection) {
            (Some(document), Some(projection)) => Some(project(document, projection)),
            (returned, _) => returned,
        })
    }

    /// Applies the models in order and stops at the first failure.
    /// Applies the models in order. Writes made before a failing model stay applied.
    pub(crate) fn bulk_write(&mut self, ns: Namespace<'_>, models: Vec<WriteModel<Document>>) -> DocGateResult<BulkWriteResult> {
        let mut result = BulkWriteResult::default();

        for (index, model) in models.into_iter().enumerate() {
            if let Err(err) = self.apply(ns, model, &mut result) {
                return Err(DocGateError::bulk_write(index, result, err));
            }
        }

        Ok(result)
    }

    fn apply(&mut self, ns: Namespace<'_>, model: WriteModel<Document>, result: &mut BulkWriteResult) -> DocGateResult<()> {
        let updated = match model {
            WriteModel::InsertOne { document } => {
                self.insert(ns, document)?;
                result.inserted_count += 1;
                return Ok(());
            }
            WriteModel::DeleteOne { filter } => {
                result.deleted_count += self.delete(ns, &filter, false)?;
                return Ok(());
            }
            WriteModel::DeleteMany { filter } => {
                result.deleted_count += self.delete(ns, &filter, true)?;
                return Ok(());
            }
            WriteModel::UpdateOne { filter, update, upsert } => self.update(ns, &filter, &update, upsert, false)?,
            WriteModel::UpdateMany { filter, update, upsert } => self.update(ns, &filter, &update, upsert, true)?,
            WriteModel::ReplaceOne { filter, replacement, upsert } => self.replace(ns, &filter, &replacement, upsert)?,
        };

        result.matched_count += updated.matched_count;
        result.modified_count += updated.modified_count;
        result.upserted_count += updated.upserted_count;

        Ok(())
    }
}

fn pick(before: Document, after: Document, return_document: ReturnDocument) -> Document {
    match return_document {
        ReturnDocument::Before => before,
        ReturnDocument::After => after,
    }
}

/// The document an upsert inserts when nothing matched.
fn seed(filter: &Document, modification: Modification<'_>) -> DocGateResult<Document> {
    match modification {
        Modification::Update(update) => {
            let mut document = upsert_seed(filter)?;
            apply_update(&mut document, update, true)?;
            Ok(document)
        }
        Modification::Replace(replacement) => {
            let mut document = replacement.clone();
            if !document.contains_key("_id") {
                if let Some(id) = upsert_seed(filter)?.get("_id") {
                    document.insert("_id", id.clone());
                }
            }
            Ok(document)
        }
        Modification::Delete => Ok(Document::new()),
    }
}
