//! Typed values and self-describing documents
//!
//! The structured database exchanges schemas, entries, selectors and rows
//! as self-describing binary documents: ordered lists of named, typed
//! fields. [`Value`] is the unified value enum; [`Document`] preserves field
//! insertion order, which schema equality and row encoding depend on.
//!
//! Documents are encoded with MessagePack (`rmp-serde`); the enum tagging
//! keeps every value unambiguous on the wire.

use crate::error::{Error, Result};
use crate::types::FieldType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Unified value type for database fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / unset field
    Null,
    /// Signed 32-bit integer
    I32(i32),
    /// Unsigned 32-bit integer
    U32(u32),
    /// Signed 64-bit integer
    I64(i64),
    /// Unsigned 64-bit integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// UTF-8 string
    Str(String),
    /// Opaque blob
    Blob(Vec<u8>),
    /// Row id chosen by the backend
    Id(u64),
    /// Nested document
    Doc(Document),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// The field type this value satisfies, if any.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Value::I32(_) => Some(FieldType::Sint32),
            Value::U32(_) => Some(FieldType::Uint32),
            Value::I64(_) => Some(FieldType::Sint64),
            Value::U64(_) => Some(FieldType::Uint64),
            Value::F32(_) => Some(FieldType::Float32),
            Value::F64(_) => Some(FieldType::Float64),
            Value::Str(_) => Some(FieldType::String),
            Value::Blob(_) => Some(FieldType::Blob),
            Value::Id(_) => Some(FieldType::Id),
            Value::Null | Value::Doc(_) | Value::Array(_) => None,
        }
    }

    /// Whether this value may be stored in a field of the given type.
    /// `Null` matches every type (unset field).
    pub fn matches(&self, ty: FieldType) -> bool {
        matches!(self, Value::Null) || self.field_type() == Some(ty)
    }

    /// Compare two values of the same type.
    ///
    /// String comparison is byte-wise; blob comparison is length-first,
    /// then byte-wise; numeric comparisons use the declared numeric type.
    /// Returns `None` for mismatched types, NaN, and non-comparable
    /// variants.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::I32(a), Value::I32(b)) => Some(a.cmp(b)),
            (Value::U32(a), Value::U32(b)) => Some(a.cmp(b)),
            (Value::I64(a), Value::I64(b)) => Some(a.cmp(b)),
            (Value::U64(a), Value::U64(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
            (Value::F32(a), Value::F32(b)) => a.partial_cmp(b),
            (Value::F64(a), Value::F64(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Blob(a), Value::Blob(b)) => {
                Some(a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            }
            _ => None,
        }
    }
}

/// A self-describing document: named values in insertion order.
///
/// Unlike a map, a document preserves order and permits cheap positional
/// iteration, which row encoding relies on. Lookups are linear; documents
/// stay small (schema fields, selector leaves).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Replaces the value if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Look up a field, failing with `Protocol` if it is absent.
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| Error::Protocol(format!("document field missing: {name}")))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Encode with MessagePack.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Decode from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_preserved() {
        let mut doc = Document::new();
        doc.insert("b", Value::I32(1));
        doc.insert("a", Value::I32(2));
        doc.insert("c", Value::I32(3));
        let names: Vec<_> = doc.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut doc = Document::new();
        doc.insert("a", Value::I32(1));
        doc.insert("b", Value::I32(2));
        doc.insert("a", Value::I32(9));
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("a"), Some(&Value::I32(9)));
        let names: Vec<_> = doc.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut inner = Document::new();
        inner.insert("x", Value::F64(1.5));
        let mut doc = Document::new();
        doc.insert("i", Value::I32(-7));
        doc.insert("u", Value::U64(u64::MAX));
        doc.insert("s", Value::Str("hello".into()));
        doc.insert("blob", Value::Blob(vec![0, 1, 2]));
        doc.insert("id", Value::Id(42));
        doc.insert("nested", Value::Doc(inner));
        doc.insert("arr", Value::Array(vec![Value::Null, Value::I64(1)]));

        let bytes = doc.to_bytes().unwrap();
        let restored = Document::from_bytes(&bytes).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn typed_comparisons() {
        assert_eq!(
            Value::Str("abc".into()).compare(&Value::Str("abd".into())),
            Some(Ordering::Less)
        );
        // blob: length first
        assert_eq!(
            Value::Blob(vec![9]).compare(&Value::Blob(vec![0, 0])),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::F64(2.0).compare(&Value::F64(2.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::F64(f64::NAN).compare(&Value::F64(1.0)), None);
        // mismatched types never compare
        assert_eq!(Value::I32(1).compare(&Value::I64(1)), None);
    }

    #[test]
    fn type_matching() {
        assert!(Value::I32(5).matches(FieldType::Sint32));
        assert!(!Value::I32(5).matches(FieldType::Sint64));
        assert!(Value::Null.matches(FieldType::Blob));
    }
}
