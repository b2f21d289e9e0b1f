//! Sort-key translation and small filter helpers.
//!
//! Sort specifications are written as ordered field names, each optionally prefixed
//! with `-` (descending) or `+` (ascending, the default):
//!
//! ```ignore
//! use docgate::query::{parse_sort, SortDirection};
//!
//! let keys = parse_sort(&["-score", "+likes", "_id"]);
//! assert_eq!(keys[0].field, "score");
//! assert_eq!(keys[0].direction, SortDirection::Desc);
//! ```

use bson::{Bson, Document, doc};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The numeric form used in sort documents: `1` or `-1`.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Translates prefixed sort keys into ordered [`Sort`] entries.
///
/// Duplicate keys are kept, in order.
pub fn parse_sort(keys: &[&str]) -> Vec<Sort> {
    keys.iter()
        .map(|&key| match key.strip_prefix('-') {
            Some(field) => Sort::desc(field),
            None => Sort::asc(key.strip_prefix('+').unwrap_or(key)),
        })
        .collect()
}

/// Builds the sort document handed to the driver.
///
/// A BSON document cannot hold the same key twice, so a repeated field keeps its
/// first occurrence only. Later occurrences compare values that are already equal
/// and can never change the order.
pub fn sort_document(keys: &[&str]) -> Document {
    parse_sort(keys)
        .into_iter()
        .fold(Document::new(), |mut document, sort| {
            if !document.contains_key(&sort.field) {
                document.insert(sort.field, sort.direction.as_i32());
            }
            document
        })
}

/// Filter matching a single document by `_id`.
pub fn id_filter(id: impl Into<Bson>) -> Document {
    doc! { "_id": id.into() }
}
