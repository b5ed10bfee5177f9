//! Filter matching and sort ordering over stored documents.

use application::{Filters, SortBy, SortOrder};
use domain::Document;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::trace;

/// Helper function to check if a document matches the provided filters.
/// A path holding several values (through an embedded array) matches when
/// any of them does.
pub(crate) fn check_doc_matches_filters(doc: &Document, filters: &Filters) -> bool {
    for (path, condition) in filters {
        let values = doc.values_at(path);
        let matched = if condition.is_null() {
            values.is_empty() || values.iter().any(|value| value.is_null())
        } else {
            values.iter().any(|value| match_value(value, condition))
        };
        if !matched {
            trace!(doc_id = %doc.id(), filter_field = %path, "Filter condition not met, skipping doc.");
            return false;
        }
    }
    true
}

/// Matches a document value against a filter value/condition.
fn match_value(doc_value: &Value, condition: &Value) -> bool {
    match condition {
        // Case 1: simple value -> equality
        Value::String(filter_str) => doc_value
            .as_str()
            .is_some_and(|doc_str| doc_str == filter_str),
        Value::Number(_) => numbers_equal(doc_value, condition),
        Value::Bool(filter_bool) => doc_value
            .as_bool()
            .is_some_and(|doc_bool| doc_bool == *filter_bool),

        // Case 2: array -> document value is IN the array
        Value::Array(candidates) => candidates
            .iter()
            .any(|candidate| match_value(doc_value, candidate)),

        // Case 3: object -> range operators (gte, lte, gt, lt) and ne
        Value::Object(filter_ops) => filter_ops.iter().all(|(op, op_value)| {
            let ordering = compare_json_values(doc_value, op_value);
            let comparable = comparable(doc_value, op_value);
            match op.as_str() {
                "gte" => comparable && ordering != Ordering::Less,
                "lte" => comparable && ordering != Ordering::Greater,
                "gt" => comparable && ordering == Ordering::Greater,
                "lt" => comparable && ordering == Ordering::Less,
                "ne" => !match_value(doc_value, op_value),
                _ => {
                    trace!("Unsupported filter operator: {}", op);
                    false
                }
            }
        }),

        Value::Null => doc_value.is_null(),
    }
}

fn numbers_equal(a: &Value, b: &Value) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a
            .as_f64()
            .zip(b.as_f64())
            .is_some_and(|(x, y)| (x - y).abs() < f64::EPSILON),
    }
}

/// Range operators only compare numbers with numbers and text with text
/// (RFC 3339 timestamps order correctly as text).
fn comparable(a: &Value, b: &Value) -> bool {
    (a.is_number() && b.is_number()) || (a.is_string() && b.is_string())
}

/// Orders two documents by the sort criteria, first criterion first.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &[SortBy]) -> Ordering {
    for sort_by in sort {
        let val_a = a.values_at(&sort_by.field).into_iter().next();
        let val_b = b.values_at(&sort_by.field).into_iter().next();
        let comparison = compare_option_json_values(val_a, val_b);
        let result = match sort_by.order {
            SortOrder::Asc => comparison,
            SortOrder::Desc => comparison.reverse(),
        };
        if result != Ordering::Equal {
            return result;
        }
    }
    Ordering::Equal
}

/// Helper function to compare Option<Value> for sorting
fn compare_option_json_values(opt_a: Option<&Value>, opt_b: Option<&Value>) -> Ordering {
    match (opt_a, opt_b) {
        (Some(a), Some(b)) => compare_json_values(a, b),
        (Some(_), None) => Ordering::Greater, // Values > missing/null
        (None, Some(_)) => Ordering::Less,    // missing/null < Values
        (None, None) => Ordering::Equal,
    }
}

/// Compares two non-optional &Value based on their underlying type.
fn compare_json_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(int_a), Some(int_b)) = (a.as_i64(), b.as_i64()) {
        return int_a.cmp(&int_b);
    }
    if let (Some(num_a), Some(num_b)) = (a.as_f64(), b.as_f64()) {
        return num_a.partial_cmp(&num_b).unwrap_or(Ordering::Equal);
    }
    if let (Some(str_a), Some(str_b)) = (a.as_str(), b.as_str()) {
        return str_a.cmp(str_b);
    }
    if let (Some(bool_a), Some(bool_b)) = (a.as_bool(), b.as_bool()) {
        return bool_a.cmp(&bool_b);
    }
    if a.is_null() && b.is_null() {
        return Ordering::Equal;
    }
    if a.is_null() {
        return Ordering::Less;
    } // nulls first
    if b.is_null() {
        return Ordering::Greater;
    }
    Ordering::Equal // Fallback for mismatched/unhandled types
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CollectionSchema, DocumentId, FieldDefinition};
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        let schema = CollectionSchema::new(
            "items",
            vec![
                FieldDefinition::text("name"),
                FieldDefinition::number("rank"),
                FieldDefinition::embedded("tags", vec![FieldDefinition::text("label")]),
            ],
        )
        .build()
        .unwrap();
        let Value::Object(map) = fields else { panic!("object expected") };
        Document::new(DocumentId::new(id), map, &schema).unwrap()
    }

    fn filters(value: Value) -> Filters {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn equality_and_in_filters() {
        let d = doc("a", json!({"name": "alpha", "rank": 3}));
        assert!(check_doc_matches_filters(&d, &filters(json!({"name": "alpha"}))));
        assert!(!check_doc_matches_filters(&d, &filters(json!({"name": "beta"}))));
        assert!(check_doc_matches_filters(&d, &filters(json!({"rank": 3.0}))));
        assert!(check_doc_matches_filters(&d, &filters(json!({"rank": [1, 3]}))));
        assert!(!check_doc_matches_filters(&d, &filters(json!({"rank": {"ne": 3}}))));
    }

    #[test]
    fn range_filters_need_comparable_types() {
        let d = doc("a", json!({"name": "alpha", "rank": 3}));
        assert!(check_doc_matches_filters(&d, &filters(json!({"rank": {"gte": 3, "lt": 4}}))));
        assert!(!check_doc_matches_filters(&d, &filters(json!({"rank": {"gt": 3}}))));
        assert!(!check_doc_matches_filters(&d, &filters(json!({"rank": {"gt": "1"}}))));
        assert!(!check_doc_matches_filters(&d, &filters(json!({"rank": {"between": 1}}))));
    }

    #[test]
    fn null_filter_matches_missing_fields() {
        let d = doc("a", json!({"name": "alpha"}));
        assert!(check_doc_matches_filters(&d, &filters(json!({"rank": null}))));
        assert!(!check_doc_matches_filters(&d, &filters(json!({"name": null}))));
    }

    #[test]
    fn dotted_paths_match_any_embedded_element() {
        let d = doc("a", json!({"tags": [{"label": "x"}, {"label": "y"}]}));
        assert!(check_doc_matches_filters(&d, &filters(json!({"tags.label": "y"}))));
        assert!(!check_doc_matches_filters(&d, &filters(json!({"tags.label": "z"}))));
    }

    #[test]
    fn sorting_uses_criteria_in_order() {
        let a = doc("a", json!({"name": "b", "rank": 1}));
        let b = doc("b", json!({"name": "a", "rank": 1}));
        let c = doc("c", json!({"name": "c"}));
        let sort = vec![SortBy::desc("rank"), SortBy::asc("name")];
        assert_eq!(compare_documents(&a, &b, &sort), Ordering::Greater);
        assert_eq!(compare_documents(&c, &a, &sort), Ordering::Greater);
        assert_eq!(compare_documents(&a, &a, &sort), Ordering::Equal);
    }
}
