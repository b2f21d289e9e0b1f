//! Query, sort, projection and update evaluation over in-memory BSON documents.
//!
//! Supports the subset of the server's query language exercised by the access layer:
//! equality and range operators on dotted paths (matching array elements), `$in`,
//! `$nin`, `$exists`, `$not`, `$size` and the `$and`/`$or`/`$nor` combinators. Updates
//! support `$set`, `$unset`, `$inc`, `$push` and `$setOnInsert`; pipelines support
//! `$match`, `$sort`, `$skip`, `$limit`, `$project`, `$unset` and `$count`.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, DateTime, Document, oid::ObjectId};

use docgate_core::error::{DocGateError, DocGateResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so `Int32(1)` and `Double(1.0)` compare equal,
/// matching the server's comparison rules.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values compared by plain BSON equality only (binaries, regexes, timestamps...).
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

/// Range comparisons only succeed between values of the same type.
impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Total order used for sorting: values of different types order by type.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.sort_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self
                .rank()
                .cmp(&other.rank())
                .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal)),
        }
    }
}

fn unsupported(operator: &str) -> DocGateError {
    DocGateError::driver(format!("unknown operator: {operator}"))
}

fn bad_value(message: String) -> DocGateError {
    DocGateError::driver(message)
}

/// Server truthiness for projection flags and `$exists`.
pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn as_count(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

/// Resolves a dotted path. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DocGateResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(bad_value(format!("cannot create field {rest} in non-document {head}"))),
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Returns whether `document` satisfies `filter`.
pub(crate) fn matches(document: &Document, filter: &Document) -> DocGateResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(document, key, condition)?,
            "$nor" => !any_clause(document, key, condition)?,
            operator if operator.starts_with('$') => return Err(unsupported(operator)),
            path => matches_field(lookup(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn clauses<'a>(key: &str, condition: &'a Bson) -> DocGateResult<Vec<&'a Document>> {
    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_document()
                    .ok_or_else(|| bad_value(format!("{key} entries must be documents")))
            })
            .collect(),
        _ => Err(bad_value(format!("{key} needs a non-empty array"))),
    }
}

fn any_clause(document: &Document, key: &str, condition: &Bson) -> DocGateResult<bool> {
    for clause in clauses(key, condition)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn is_operator_document(document: &Document) -> bool {
    document
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

fn matches_field(value: Option<&Bson>, condition: &Bson) -> DocGateResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(operators) => {
            for (operator, operand) in operators {
                if !apply_operator(value, operator, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(value, condition)),
    }
}

/// Equality with the server's array semantics: an array field matches when the whole
/// array or any element equals the operand. A missing field equals `null`.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let Some(value) = value else {
        return matches!(expected, Bson::Null);
    };

    let expected = Comparable::from(expected);
    let actual = Comparable::from(value);

    if actual == expected {
        return true;
    }

    match &actual {
        Comparable::Array(items) => items.iter().any(|item| item == &expected),
        _ => false,
    }
}

fn in_range(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };

    let operand = Comparable::from(operand);
    let check = |candidate: &Comparable<'_>| {
        candidate
            .partial_cmp(&operand)
            .is_some_and(accept)
    };

    match Comparable::from(value) {
        Comparable::Array(items) => items.iter().any(check),
        scalar => check(&scalar),
    }
}

fn is_in(value: Option<&Bson>, operator: &str, operand: &Bson) -> DocGateResult<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates.iter().any(|candidate| equals(value, candidate))),
        _ => Err(bad_value(format!("{operator} needs an array"))),
    }
}

fn apply_operator(value: Option<&Bson>, operator: &str, operand: &Bson) -> DocGateResult<bool> {
    match operator {
        "$eq" => Ok(equals(value, operand)),
        "$ne" => Ok(!equals(value, operand)),
        "$gt" => Ok(in_range(value, operand, Ordering::is_gt)),
        "$gte" => Ok(in_range(value, operand, Ordering::is_ge)),
        "$lt" => Ok(in_range(value, operand, Ordering::is_lt)),
        "$lte" => Ok(in_range(value, operand, Ordering::is_le)),
        "$in" => is_in(value, operator, operand),
        "$nin" => Ok(!is_in(value, operator, operand)?),
        "$exists" => Ok(value.is_some() == truthy(operand)),
        "$not" => match operand {
            Bson::Document(inner) if is_operator_document(inner) => Ok(!matches_field(value, operand)?),
            _ => Err(bad_value("$not needs an operator document".to_string())),
        },
        "$size" => {
            let expected = as_count(operand)
                .ok_or_else(|| bad_value("$size needs a number".to_string()))?;
            Ok(matches!(value, Some(Bson::Array(items)) if items.len() as i64 == expected))
        }
        other => Err(unsupported(other)),
    }
}

/// Orders two documents by a sort specification such as `{ "likes": -1, "_id": 1 }`.
pub(crate) fn compare_by(sort: &Document, a: &Document, b: &Document) -> Ordering {
    for (field, direction) in sort {
        let left = lookup(a, field).map(Comparable::from).unwrap_or(Comparable::Null);
        let right = lookup(b, field).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = left.sort_cmp(&right);
        let ordering = match as_count(direction) {
            Some(n) if n < 0 => ordering.reverse(),
            _ => ordering,
        };

        if ordering.is_ne() {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies a top-level inclusion or exclusion projection.
pub(crate) fn project(document: Document, projection: &Document) -> Document {
    let inclusion = projection
        .iter()
        .any(|(key, flag)| key != "_id" && truthy(flag));

    if inclusion {
        let keep_id = projection.get("_id").is_none_or(truthy);

        document
            .into_iter()
            .filter(|(key, _)| {
                if key == "_id" {
                    keep_id
                } else {
                    projection.get(key).is_some_and(truthy)
                }
            })
            .collect()
    } else {
        document
            .into_iter()
            .filter(|(key, _)| projection.get(key).is_none_or(truthy))
            .collect()
    }
}

const UPDATE_OPERATORS: &[&str] = &["$set", "$unset", "$inc", "$push", "$setOnInsert"];

/// Rejects replacement-style or unknown update documents before anything is touched.
pub(crate) fn validate_update(update: &Document) -> DocGateResult<()> {
    if update.is_empty() {
        return Err(bad_value("update document must not be empty".to_string()));
    }

    for (operator, fields) in update {
        if !operator.starts_with('$') {
            return Err(bad_value(format!(
                "update document requires atomic operators, found {operator}"
            )));
        }
        if !UPDATE_OPERATORS.contains(&operator.as_str()) {
            return Err(unsupported(operator));
        }
        if !matches!(fields, Bson::Document(_)) {
            return Err(bad_value(format!("{operator} needs a document")));
        }
    }

    Ok(())
}

fn increment(current: Option<&Bson>, delta: &Bson, path: &str) -> DocGateResult<Bson> {
    let sum = match (current, delta) {
        (None, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => delta.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(n) => Bson::Int32(n),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(checked_sum(i64::from(*a), *b, path)?),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(checked_sum(*a, i64::from(*b), path)?),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(checked_sum(*a, *b, path)?),
        (Some(current), delta) => match (as_float(current), as_float(delta)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => return Err(bad_value(format!("cannot apply $inc to non-numeric field {path}"))),
        },
        (None, _) => return Err(bad_value(format!("$inc on {path} needs a number"))),
    };

    Ok(sum)
}

fn checked_sum(a: i64, b: i64, path: &str) -> DocGateResult<i64> {
    a.checked_add(b)
        .ok_or_else(|| bad_value(format!("$inc overflow on {path}")))
}

fn as_float(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Applies an operator update in place. `inserting` enables `$setOnInsert`.
///
/// The update must have passed [`validate_update`].
pub(crate) fn apply_update(document: &mut Document, update: &Document, inserting: bool) -> DocGateResult<()> {
    let original_id = document.get("_id").cloned();

    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            continue;
        };

        for (path, value) in fields {
            match operator.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" if inserting => set_path(document, path, value.clone())?,
                "$setOnInsert" => {}
                "$unset" => remove_path(document, path),
                "$inc" => {
                    let sum = increment(lookup(document, path), value, path)?;
                    set_path(document, path, sum)?;
                }
                "$push" => {
                    let mut items = match lookup(document, path) {
                        None => Vec::new(),
                        Some(Bson::Array(items)) => items.clone(),
                        Some(_) => return Err(bad_value(format!("cannot $push to non-array field {path}"))),
                    };
                    items.push(value.clone());
                    set_path(document, path, Bson::Array(items))?;
                }
                other => return Err(unsupported(other)),
            }
        }
    }

    if original_id.is_some() && document.get("_id") != original_id.as_ref() {
        return Err(bad_value("the _id field is immutable".to_string()));
    }

    Ok(())
}

/// Seeds an upserted document from the equality clauses of its filter.
pub(crate) fn upsert_seed(filter: &Document) -> DocGateResult<Document> {
    let mut seed = Document::new();
    seed_into(&mut seed, filter)?;
    Ok(seed)
}

fn seed_into(seed: &mut Document, filter: &Document) -> DocGateResult<()> {
    for (key, condition) in filter {
        if key == "$and" {
            for clause in clauses(key, condition)? {
                seed_into(seed, clause)?;
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }

        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                if let Some(value) = operators.get("$eq") {
                    set_path(seed, key, value.clone())?;
                }
            }
            value => set_path(seed, key, value.clone())?,
        }
    }

    Ok(())
}

fn stage_count(stage: &str, value: &Bson) -> DocGateResult<usize> {
    as_count(value)
        .filter(|n| *n >= 0)
        .map(|n| n as usize)
        .ok_or_else(|| bad_value(format!("{stage} needs a non-negative integer")))
}

/// Runs an aggregation pipeline over `documents`.
pub(crate) fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Document]) -> DocGateResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(bad_value("a pipeline stage must have exactly one field".to_string()));
        };

        documents = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => {
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            ("$sort", Bson::Document(sort)) => {
                documents.sort_by(|a, b| compare_by(sort, a, b));
                documents
            }
            ("$skip", value) => {
                let skip = stage_count(name, value)?;
                documents.into_iter().skip(skip).collect()
            }
            ("$limit", value) => {
                let limit = stage_count(name, value)?;
                documents.truncate(limit);
                documents
            }
            ("$project", Bson::Document(projection)) => documents
                .into_iter()
                .map(|document| project(document, projection))
                .collect(),
            ("$unset", Bson::String(field)) => {
                for document in &mut documents {
                    remove_path(document, field);
                }
                documents
            }
            ("$unset", Bson::Array(fields)) => {
                for document in &mut documents {
                    for field in fields.iter().filter_map(Bson::as_str) {
                        remove_path(document, field);
                    }
                }
                documents
            }
            ("$count", Bson::String(field)) => {
                let mut counted = Document::new();
                counted.insert(field.as_str(), documents.len() as i64);
                vec![counted]
            }
            (other, _) => return Err(unsupported(other)),
        };
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn post() -> Document {
        doc! {
            "_id": 1,
            "title": "hello",
            "likes": 3,
            "tags": ["rust", "db"],
            "author": { "name": "ana", "age": 31 },
        }
    }

    #[test]
    fn test_equality_and_dotted_paths() {
        let post = post();

        assert!(matches(&post, &doc! { "title": "hello" }).unwrap());
        assert!(matches(&post, &doc! { "author.name": "ana" }).unwrap());
        assert!(matches(&post, &doc! { "likes": 3.0 }).unwrap());
        assert!(matches(&post, &doc! { "tags": "db" }).unwrap());
        assert!(matches(&post, &doc! { "missing": null }).unwrap());
        assert!(!matches(&post, &doc! { "title": "bye" }).unwrap());
    }

    #[test]
    fn test_operators() {
        let post = post();

        assert!(matches(&post, &doc! { "likes": { "$gte": 3, "$lt": 10 } }).unwrap());
        assert!(!matches(&post, &doc! { "likes": { "$gt": 3 } }).unwrap());
        assert!(matches(&post, &doc! { "tags": { "$in": ["go", "rust"] } }).unwrap());
        assert!(matches(&post, &doc! { "title": { "$nin": ["bye"] } }).unwrap());
        assert!(matches(&post, &doc! { "draft": { "$exists": false } }).unwrap());
        assert!(matches(&post, &doc! { "tags": { "$size": 2 } }).unwrap());
        assert!(matches(&post, &doc! { "likes": { "$not": { "$gt": 5 } } }).unwrap());
        assert!(matches(&post, &doc! { "$or": [{ "likes": 0 }, { "author.age": { "$gt": 30 } }] }).unwrap());
        assert!(!matches(&post, &doc! { "$nor": [{ "title": "hello" }] }).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        assert!(matches(&post(), &doc! { "likes": { "$near": 1 } }).is_err());
        assert!(matches(&post(), &doc! { "$where": "true" }).is_err());
    }

    #[test]
    fn test_sort_orders_by_type_then_value() {
        let mut documents = vec![
            doc! { "n": "b" },
            doc! { "n": 2 },
            doc! {},
            doc! { "n": 1.5 },
        ];
        documents.sort_by(|a, b| compare_by(&doc! { "n": 1 }, a, b));

        let order: Vec<_> = documents.iter().map(|d| d.get("n").cloned()).collect();
        assert_eq!(
            order,
            vec![None, Some(Bson::Double(1.5)), Some(Bson::Int32(2)), Some(Bson::String("b".into()))]
        );
    }

    #[test]
    fn test_projection() {
        let included = project(post(), &doc! { "title": 1 });
        assert_eq!(included, doc! { "_id": 1, "title": "hello" });

        let excluded = project(doc! { "_id": 1, "a": 1, "b": 2 }, &doc! { "b": 0 });
        assert_eq!(excluded, doc! { "_id": 1, "a": 1 });
    }

    #[test]
    fn test_apply_update() {
        let mut post = post();
        let update = doc! {
            "$set": { "author.name": "bo", "meta.views": 1 },
            "$unset": { "tags": "" },
            "$inc": { "likes": 2 },
            "$setOnInsert": { "created": true },
        };
        validate_update(&update).unwrap();
        apply_update(&mut post, &update, false).unwrap();

        assert_eq!(lookup(&post, "author.name"), Some(&Bson::String("bo".into())));
        assert_eq!(lookup(&post, "meta.views"), Some(&Bson::Int32(1)));
        assert_eq!(post.get("likes"), Some(&Bson::Int32(5)));
        assert!(post.get("tags").is_none());
        assert!(post.get("created").is_none());
    }

    #[test]
    fn test_inc_overflow_is_rejected() {
        let mut counter = doc! { "n": i64::MAX };
        let err = apply_update(&mut counter, &doc! { "$inc": { "n": 1 } }, false).unwrap_err();
        assert!(err.to_string().contains("$inc overflow on n"));
        assert_eq!(counter, doc! { "n": i64::MAX });

        let mut counter = doc! { "n": i64::MIN };
        assert!(apply_update(&mut counter, &doc! { "$inc": { "n": -1_i32 } }, false).is_err());

        let mut counter = doc! { "n": i32::MAX };
        apply_update(&mut counter, &doc! { "$inc": { "n": 1 } }, false).unwrap();
        assert_eq!(counter, doc! { "n": i64::from(i32::MAX) + 1 });
    }

    #[test]
    fn test_update_validation() {
        assert!(validate_update(&doc! { "title": "x" }).is_err());
        assert!(validate_update(&doc! { "$rename": { "a": "b" } }).is_err());
        assert!(validate_update(&doc! {}).is_err());

        let mut post = post();
        assert!(apply_update(&mut post, &doc! { "$set": { "_id": 2 } }, false).is_err());
    }

    #[test]
    fn test_upsert_seed() {
        let seed = upsert_seed(&doc! {
            "slug": "a",
            "likes": { "$gt": 1 },
            "$and": [{ "author.name": { "$eq": "ana" } }],
        })
        .unwrap();

        assert_eq!(seed, doc! { "slug": "a", "author": { "name": "ana" } });
    }

    #[test]
    fn test_pipeline() {
        let documents = (1..=5).map(|n| doc! { "n": n, "even": n % 2 == 0 }).collect();
        let out = run_pipeline(
            documents,
            &[
                doc! { "$match": { "even": false } },
                doc! { "$sort": { "n": -1 } },
                doc! { "$skip": 1 },
                doc! { "$project": { "_id": 0, "n": 1 } },
            ],
        )
        .unwrap();
        assert_eq!(out, vec![doc! { "n": 3 }, doc! { "n": 1 }]);

        let counted = run_pipeline(out, &[doc! { "$count": "total" }]).unwrap();
        assert_eq!(counted, vec![doc! { "total": 2_i64 }]);
    }
}
