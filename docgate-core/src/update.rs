//! Update specifications and the field metadata the mutation guard inspects.
//!
//! An [`Update`] is either an operator document ([`UpdateDocument`]) or an aggregation
//! pipeline. Operator values are plain BSON, or records: structs deriving
//! [`UpdateFields`](crate::update::UpdateFields) whose field shapes are known at
//! compile time.
//!
//! ```ignore
//! use docgate::prelude::*;
//! use serde::Serialize;
//!
//! #[derive(Debug, Serialize, UpdateFields)]
//! struct ProfilePatch {
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     nickname: Option<String>,
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     likes: Option<i64>,
//! }
//!
//! let update = UpdateDocument::new()
//!     .set_record(ProfilePatch { nickname: Some("kit".into()), likes: None })
//!     .operator("$inc", doc! { "visits": 1 });
//! ```

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    fmt::Debug,
    sync::Arc,
};

use bson::{Bson, Document, oid::ObjectId, ser::serialize_to_bson};
use serde::Serialize;

use crate::error::{DocGateError, DocGateResult};

/// The broad category of a field's value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Numbers, strings, booleans, ids, timestamps and other leaf values.
    Scalar,
    /// Arrays and sets.
    Sequence,
    /// A struct serialized as an embedded document.
    Record,
    /// An associative map serialized as an embedded document.
    Map,
    /// A value whose shape is only known at runtime (`Bson`, `serde_json::Value`).
    Dynamic,
}

/// Whether a field holds its value directly or behind an `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShape {
    Value(ValueKind),
    Optional(ValueKind),
}

impl FieldShape {
    pub const fn kind(self) -> ValueKind {
        match self {
            FieldShape::Value(kind) | FieldShape::Optional(kind) => kind,
        }
    }

    pub const fn is_optional(self) -> bool {
        matches!(self, FieldShape::Optional(_))
    }
}

/// Compile-time shape of a type used as a record field.
///
/// Implemented for common leaf, collection and map types. Structs deriving
/// `UpdateFields` implement it as [`ValueKind::Record`]; other user types can opt in
/// with [`impl_scalar_field_type!`](crate::impl_scalar_field_type).
pub trait FieldType {
    const SHAPE: FieldShape;
}

/// Metadata for one field of a record, generated by `#[derive(UpdateFields)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// The Rust field name.
    pub ident: &'static str,
    /// The serialized field name.
    pub name: &'static str,
    pub shape: FieldShape,
    /// `#[serde(skip)]` or `#[serde(skip_serializing)]` is present.
    pub skipped: bool,
    /// `#[serde(skip_serializing_if = "...")]` is present.
    pub omit_empty: bool,
}

/// Types whose serialized fields can be inspected by the mutation guard.
///
/// Derive it with `#[derive(UpdateFields)]`; hand-written impls must describe every
/// serialized field.
pub trait UpdateFields {
    fn update_fields() -> Cow<'static, [FieldSpec]>;
}

/// Type-erased record stored inside an [`UpdateDocument`].
pub trait UpdateRecord: Send + Sync + Debug {
    fn record_name(&self) -> &'static str;

    fn fields(&self) -> Cow<'static, [FieldSpec]>;

    fn to_bson(&self) -> DocGateResult<Bson>;
}

impl<T> UpdateRecord for T
where
    T: UpdateFields + Serialize + Send + Sync + Debug,
{
    fn record_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn fields(&self) -> Cow<'static, [FieldSpec]> {
        T::update_fields()
    }

    fn to_bson(&self) -> DocGateResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }
}

/// The value of one update operator.
#[derive(Debug)]
pub enum OperatorValue {
    /// A BSON value, usually an embedded document. Never inspected field by field.
    Value(Bson),
    /// A record whose fields are checked by the mutation guard.
    Record(Box<dyn UpdateRecord>),
}

impl OperatorValue {
    pub fn record<R: UpdateRecord + 'static>(record: R) -> Self {
        OperatorValue::Record(Box::new(record))
    }

    fn to_bson(&self) -> DocGateResult<Bson> {
        match self {
            OperatorValue::Value(value) => Ok(value.clone()),
            OperatorValue::Record(record) => match record.to_bson()? {
                document @ Bson::Document(_) => Ok(document),
                other => Err(DocGateError::InvalidArgument(format!(
                    "record {} serialized to {:?}, expected a document",
                    record.record_name(),
                    other.element_type(),
                ))),
            },
        }
    }
}

impl From<Document> for OperatorValue {
    fn from(document: Document) -> Self {
        OperatorValue::Value(Bson::Document(document))
    }
}

impl From<Bson> for OperatorValue {
    fn from(value: Bson) -> Self {
        OperatorValue::Value(value)
    }
}

impl<R: UpdateRecord + 'static> From<Box<R>> for OperatorValue {
    fn from(record: Box<R>) -> Self {
        OperatorValue::Record(record)
    }
}

/// A map-shaped update: operator name to operator value, in insertion order.
#[derive(Debug, Default)]
pub struct UpdateDocument {
    operators: Vec<(String, OperatorValue)>,
}

impl UpdateDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing an earlier value for the same operator in place.
    pub fn operator(mut self, name: impl Into<String>, value: impl Into<OperatorValue>) -> Self {
        let name = name.into();
        let value = value.into();

        match self.operators.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.operators.push((name, value)),
        }

        self
    }

    pub fn set(self, value: impl Into<OperatorValue>) -> Self {
        self.operator("$set", value)
    }

    pub fn unset(self, value: impl Into<OperatorValue>) -> Self {
        self.operator("$unset", value)
    }

    pub fn set_record<R: UpdateRecord + 'static>(self, record: R) -> Self {
        self.operator("$set", OperatorValue::record(record))
    }

    pub fn unset_record<R: UpdateRecord + 'static>(self, record: R) -> Self {
        self.operator("$unset", OperatorValue::record(record))
    }

    pub fn get(&self, name: &str) -> Option<&OperatorValue> {
        self.operators
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OperatorValue)> {
        self.operators.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Renders the update into the document sent to the driver.
    pub fn to_document(&self) -> DocGateResult<Document> {
        self.operators
            .iter()
            .map(|(name, value)| Ok((name.clone(), value.to_bson()?)))
            .collect()
    }
}

impl From<Document> for UpdateDocument {
    fn from(document: Document) -> Self {
        Self {
            operators: document
                .into_iter()
                .map(|(name, value)| (name, OperatorValue::Value(value)))
                .collect(),
        }
    }
}

/// A partial-update specification.
#[derive(Debug)]
pub enum Update {
    /// An operator document such as `{"$set": {...}, "$inc": {...}}`.
    Document(UpdateDocument),
    /// An aggregation-pipeline update. Not map-shaped, so the mutation guard refuses it.
    Pipeline(Vec<Document>),
}

impl Update {
    /// Renders the update for the driver. Pipelines have no document form.
    pub fn to_document(&self) -> DocGateResult<Document> {
        match self {
            Update::Document(document) => document.to_document(),
            Update::Pipeline(_) => Err(DocGateError::InvalidArgument(
                "pipeline updates cannot be rendered as an operator document".into(),
            )),
        }
    }
}

impl From<UpdateDocument> for Update {
    fn from(document: UpdateDocument) -> Self {
        Update::Document(document)
    }
}

impl From<Document> for Update {
    fn from(document: Document) -> Self {
        Update::Document(document.into())
    }
}

impl From<Vec<Document>> for Update {
    fn from(pipeline: Vec<Document>) -> Self {
        Update::Pipeline(pipeline)
    }
}

/// Implements [`FieldType`] as [`ValueKind::Scalar`] for the listed types.
///
/// Useful for enums and newtypes that serialize to a single value.
#[macro_export]
macro_rules! impl_scalar_field_type {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::update::FieldType for $ty {
                const SHAPE: $crate::update::FieldShape =
                    $crate::update::FieldShape::Value($crate::update::ValueKind::Scalar);
            }
        )+
    };
}

impl_scalar_field_type!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, str, ObjectId, bson::DateTime, bson::Timestamp, bson::Binary, bson::Decimal128,
    bson::Uuid, uuid::Uuid, chrono::NaiveDate, chrono::NaiveDateTime,
);

impl<Tz: chrono::TimeZone> FieldType for chrono::DateTime<Tz> {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Scalar);
}

impl FieldType for Bson {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Dynamic);
}

impl FieldType for serde_json::Value {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Dynamic);
}

impl FieldType for Document {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Map);
}

impl<K, V, S> FieldType for HashMap<K, V, S> {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Map);
}

impl<K, V> FieldType for BTreeMap<K, V> {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Map);
}

impl<T> FieldType for Vec<T> {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Sequence);
}

impl<T> FieldType for VecDeque<T> {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Sequence);
}

impl<T, S> FieldType for HashSet<T, S> {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Sequence);
}

impl<T> FieldType for BTreeSet<T> {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Sequence);
}

impl<T> FieldType for [T] {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Sequence);
}

impl<T, const N: usize> FieldType for [T; N] {
    const SHAPE: FieldShape = FieldShape::Value(ValueKind::Sequence);
}

// Optional wrappers collapse: `Option<Option<T>>` is still a single optional level.
impl<T: FieldType> FieldType for Option<T> {
    const SHAPE: FieldShape = FieldShape::Optional(T::SHAPE.kind());
}

// Smart pointers are transparent to serialization.
impl<T: FieldType + ?Sized> FieldType for Box<T> {
    const SHAPE: FieldShape = T::SHAPE;
}

impl<T: FieldType + ?Sized> FieldType for Arc<T> {
    const SHAPE: FieldShape = T::SHAPE;
}

impl<T: FieldType + ?Sized> FieldType for &T {
    const SHAPE: FieldShape = T::SHAPE;
}

impl<T: FieldType + ToOwned + ?Sized> FieldType for Cow<'_, T> {
    const SHAPE: FieldShape = T::SHAPE;
}
