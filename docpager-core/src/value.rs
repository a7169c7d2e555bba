//! Ordering and path utilities over BSON values.
//!
//! Every backend that evaluates queries in process (and the materialized result set)
//! needs to compare heterogeneous BSON values the way a document database does. Values
//! of different kinds are ordered by a fixed type rank; values of the same kind are
//! ordered naturally, with every numeric type compared as a number.

use bson::{Bson, Document};
use std::cmp::Ordering;

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Compares two values of the same kind, or returns `None` when their kinds differ.
///
/// Range operators use this so that `{ age: { $gt: 5 } }` never matches a string.
pub fn compare_same_kind(a: &Bson, b: &Bson) -> Option<Ordering> {
    if type_rank(a) != type_rank(b) {
        return None;
    }

    Some(compare_values(a, b))
}

/// Total order over BSON values.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(a), Bson::String(b)) | (Bson::Symbol(a), Bson::Symbol(b)) => a.cmp(b),
        (Bson::String(a), Bson::Symbol(b)) | (Bson::Symbol(a), Bson::String(b)) => a.cmp(b),
        (Bson::Document(a), Bson::Document(b)) => compare_documents(a, b),
        (Bson::Array(a), Bson::Array(b)) => compare_sequences(a, b),
        (Bson::Binary(a), Bson::Binary(b)) => a
            .bytes
            .len()
            .cmp(&b.bytes.len())
            .then_with(|| a.bytes.cmp(&b.bytes)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.timestamp_millis().cmp(&b.timestamp_millis()),
        (Bson::Timestamp(a), Bson::Timestamp(b)) => (a.time, a.increment).cmp(&(b.time, b.increment)),
        _ => match (as_number(a), as_number(b)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

/// Value equality under [`compare_values`], so `Int32(1)` equals `Double(1.0)`.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    compare_values(a, b) == Ordering::Equal
}

fn compare_sequences(a: &[Bson], b: &[Bson]) -> Ordering {
    for (left, right) in a.iter().zip(b.iter()) {
        let ordering = compare_values(left, right);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.len().cmp(&b.len())
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((left_key, left), (right_key, right)) in a.iter().zip(b.iter()) {
        let ordering = compare_values(left, right).then_with(|| left_key.cmp(right_key));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.len().cmp(&b.len())
}

/// Resolves a dotted field path against a document.
///
/// A key that literally contains the dots wins over a nested walk. Numeric path
/// components index into arrays. Returns `None` as soon as a component is missing.
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if let Some(value) = doc.get(path) {
        return Some(value);
    }

    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;

    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Collects the leaf values found at `path`, spreading arrays into their elements.
pub fn values_at_path<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    match lookup_path(doc, path) {
        Some(Bson::Array(items)) => items.iter().collect(),
        Some(value) => vec![value],
        None => Vec::new(),
    }
}

/// Flattens nested documents and arrays into dotted keys.
///
/// Intermediate keys are kept alongside their children, so `{a: {b: 1}}` becomes
/// `{a: {b: 1}, "a.b": 1}` and a dotted lookup on the flat form finds the same value as a
/// nested walk on the original.
pub fn flatten_document(doc: &Document) -> Document {
    let mut flat = Document::new();
    for (key, value) in doc {
        flatten_into(&mut flat, key, value);
    }
    flat
}

fn flatten_into(flat: &mut Document, prefix: &str, value: &Bson) {
    flat.insert(prefix, value.clone());

    match value {
        Bson::Document(inner) => {
            for (key, child) in inner {
                flatten_into(flat, &format!("{prefix}.{key}"), child);
            }
        }
        Bson::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(flat, &format!("{prefix}.{index}"), child);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use rstest::rstest;

    #[rstest]
    #[case(Bson::Int32(1), Bson::Double(1.0), Ordering::Equal)]
    #[case(Bson::Int64(2), Bson::Int32(10), Ordering::Less)]
    #[case(Bson::Null, Bson::Int32(0), Ordering::Less)]
    #[case(Bson::String("a".into()), Bson::Int32(100), Ordering::Greater)]
    #[case(Bson::ObjectId(ObjectId::from_bytes([0; 12])), Bson::Boolean(false), Ordering::Less)]
    #[case(Bson::String("apple".into()), Bson::String("banana".into()), Ordering::Less)]
    fn test_compare_values(#[case] a: Bson, #[case] b: Bson, #[case] expected: Ordering) {
        assert_eq!(compare_values(&a, &b), expected);
    }

    #[rstest]
    fn test_compare_same_kind_refuses_mixed_kinds() {
        assert_eq!(compare_same_kind(&Bson::Int32(1), &Bson::from("1")), None);
        assert_eq!(
            compare_same_kind(&Bson::Int32(1), &Bson::Double(2.5)),
            Some(Ordering::Less)
        );
    }

    #[rstest]
    #[case("a.b", Some(Bson::Int32(1)))]
    #[case("a.c.1", Some(Bson::from("y")))]
    #[case("a.c.9", None)]
    #[case("a.b.x", None)]
    #[case("missing.path", None)]
    #[case("dotted.key", Some(Bson::Boolean(true)))]
    fn test_lookup_path(#[case] path: &str, #[case] expected: Option<Bson>) {
        // Arrange
        let doc = doc! {
            "a": { "b": 1, "c": ["x", "y"] },
            "dotted.key": true,
        };

        // Act & Assert
        assert_eq!(lookup_path(&doc, path).cloned(), expected);
    }

    #[rstest]
    fn test_flatten_keeps_intermediate_keys() {
        // Arrange
        let doc = doc! { "a": { "b": { "c": 1 } }, "tags": ["x"], "n": 2 };

        // Act
        let flat = flatten_document(&doc);

        // Assert
        assert_eq!(flat.get("a.b"), Some(&Bson::Document(doc! { "c": 1 })));
        assert_eq!(flat.get("a.b.c"), Some(&Bson::Int32(1)));
        assert_eq!(flat.get("tags.0"), Some(&Bson::from("x")));
        assert_eq!(flat.get("n"), Some(&Bson::Int32(2)));
        assert_eq!(lookup_path(&flat, "a.b.c"), lookup_path(&doc, "a.b.c"));
    }
}
