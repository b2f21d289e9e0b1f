//! Mutation guard for partial updates.
//!
//! A record used as the value of `$set` or `$unset` must only touch the fields the
//! caller actually filled in. Every serialized field therefore has to be an `Option`,
//! has to be dropped from the output when `None`, and must not hold a nested record or
//! map (which would overwrite the whole sub-document).

use bson::Document;
use tracing::debug;

use crate::{
    error::{DocGateError, DocGateResult},
    update::{FieldShape, FieldSpec, OperatorValue, Update, UpdateRecord, ValueKind},
};

const GUARDED_OPERATORS: [&str; 2] = ["$set", "$unset"];

/// Validates an update before it is sent to the driver.
///
/// # Errors
///
/// - [`DocGateError::InvalidArgument`] when the update is not an operator document.
/// - [`DocGateError::UnsafeUpdate`] when a `$set` or `$unset` record has a field that
///   could overwrite data the caller did not set.
pub fn check_update(update: Option<&Update>) -> DocGateResult<()> {
    let document = match update {
        None => return Ok(()),
        Some(Update::Document(document)) => document,
        Some(Update::Pipeline(_)) => {
            debug!("rejected pipeline update");
            return Err(DocGateError::InvalidArgument(
                "update must be an operator document".into(),
            ));
        }
    };

    for operator in GUARDED_OPERATORS {
        if let Some(OperatorValue::Record(record)) = document.get(operator) {
            check_record(operator, record.as_ref())?;
        }
    }

    Ok(())
}

/// Validates a whole-document replacement: operator keys are not allowed at the top level.
pub fn check_replacement(replacement: &Document) -> DocGateResult<()> {
    match replacement.keys().find(|key| key.starts_with('$')) {
        Some(key) => Err(DocGateError::InvalidArgument(format!(
            "replacement document must not contain update operator {key}"
        ))),
        None => Ok(()),
    }
}

fn check_record(operator: &str, record: &dyn UpdateRecord) -> DocGateResult<()> {
    let fields = record.fields();

    for field in fields.iter().filter(|field| !field.skipped) {
        if let Err(reason) = check_field(field) {
            debug!(
                operator,
                record = record.record_name(),
                field = field.ident,
                reason = %reason,
                "rejected unsafe update",
            );

            return Err(DocGateError::UnsafeUpdate {
                operator: operator.to_string(),
                reason,
            });
        }
    }

    Ok(())
}

fn check_field(field: &FieldSpec) -> Result<(), String> {
    let kind = match field.shape {
        FieldShape::Value(kind) => {
            return Err(format!(
                "field {} must be an Option, found a {} value",
                field.ident,
                kind_name(kind),
            ));
        }
        FieldShape::Optional(kind) => kind,
    };

    if matches!(kind, ValueKind::Record | ValueKind::Map) {
        return Err(format!(
            "field {} must not hold a {}, found Option<{}>",
            field.ident,
            kind_name(kind),
            kind_name(kind),
        ));
    }

    if !field.omit_empty {
        return Err(format!(
            "field {} (serialized as {:?}) needs #[serde(skip_serializing_if = \"Option::is_none\")]",
            field.ident, field.name,
        ));
    }

    Ok(())
}

fn kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Scalar => "scalar",
        ValueKind::Sequence => "sequence",
        ValueKind::Record => "record",
        ValueKind::Map => "map",
        ValueKind::Dynamic => "dynamic",
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use bson::doc;
    use serde::Serialize;

    use super::*;
    use crate::update::{UpdateDocument, UpdateFields};

    #[derive(Debug, Serialize)]
    struct Patch {
        a: Option<i64>,
    }

    thread_local! {
        static SPECS: std::cell::RefCell<Vec<FieldSpec>> = const { std::cell::RefCell::new(Vec::new()) };
    }

    impl UpdateFields for Patch {
        fn update_fields() -> Cow<'static, [FieldSpec]> {
            Cow::Owned(SPECS.with(|specs| specs.borrow().clone()))
        }
    }

    fn spec(shape: FieldShape, skipped: bool, omit_empty: bool) -> FieldSpec {
        FieldSpec { ident: "a", name: "a", shape, skipped, omit_empty }
    }

    fn check_with(fields: Vec<FieldSpec>, operator: &str) -> DocGateResult<()> {
        SPECS.with(|specs| *specs.borrow_mut() = fields);
        let update = UpdateDocument::new().operator(operator, OperatorValue::record(Patch { a: None }));
        check_update(Some(&update.into()))
    }

    #[test]
    fn passes_conforming_fields() {
        let fields = vec![
            spec(FieldShape::Optional(ValueKind::Scalar), false, true),
            spec(FieldShape::Optional(ValueKind::Sequence), false, true),
            spec(FieldShape::Optional(ValueKind::Dynamic), false, true),
        ];

        assert!(check_with(fields, "$set").is_ok());
    }

    #[test]
    fn ignores_skipped_fields() {
        let fields = vec![spec(FieldShape::Value(ValueKind::Map), true, false)];

        assert!(check_with(fields, "$unset").is_ok());
    }

    #[test]
    fn rejects_in_rule_order() {
        let err = check_with(vec![spec(FieldShape::Value(ValueKind::Record), false, false)], "$set")
            .unwrap_err();
        assert!(matches!(&err, DocGateError::UnsafeUpdate { reason, .. } if reason.contains("must be an Option")));

        let err = check_with(vec![spec(FieldShape::Optional(ValueKind::Map), false, false)], "$unset")
            .unwrap_err();
        assert!(matches!(
            &err,
            DocGateError::UnsafeUpdate { operator, reason } if operator == "$unset" && reason.contains("map")
        ));

        let err = check_with(vec![spec(FieldShape::Optional(ValueKind::Scalar), false, false)], "$set")
            .unwrap_err();
        assert!(matches!(&err, DocGateError::UnsafeUpdate { reason, .. } if reason.contains("skip_serializing_if")));
    }

    #[test]
    fn other_operators_are_not_inspected() {
        let fields = vec![spec(FieldShape::Value(ValueKind::Scalar), false, false)];

        assert!(check_with(fields, "$setOnInsert").is_ok());
    }

    #[test]
    fn document_values_and_missing_update_pass() {
        assert!(check_update(None).is_ok());
        assert!(check_update(Some(&doc! { "$set": { "a": 1 }, "$unset": { "b": "" } }.into())).is_ok());
    }

    #[test]
    fn pipeline_is_invalid_argument() {
        let update = Update::Pipeline(vec![doc! { "$set": { "a": 1 } }]);

        assert!(matches!(check_update(Some(&update)), Err(DocGateError::InvalidArgument(_))));
    }

    #[test]
    fn replacement_rejects_operators() {
        assert!(check_replacement(&doc! { "name": "a" }).is_ok());
        assert!(check_replacement(&doc! { "$set": { "name": "a" } }).is_err());
    }
}
