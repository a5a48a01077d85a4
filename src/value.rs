//! Row values.
//!
//! A [`Row`] is an unordered mapping from field name to [`Value`]. Nulls are
//! a distinct variant rather than key-absence, per SPEC_FULL.md §3 ("Nulls
//! are distinguished from absence").

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single scalar cell. `BigIntStr` and `Str` are kept as separate variants
/// (rather than one `String` variant) so enum-ordinal resolution can tell a
/// declared-bigint field from a declared-text field even though both carry
/// a string payload — see `schema::DataType`. `Enum` carries its ordinal
/// alongside the raw value, resolved once at parse time (`protocol::parse_value`)
/// against the declaring `EnumType` so ordinal comparisons never need to
/// rescan the enum's value list per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    BigIntStr(String),
    Str(String),
    Enum { value: String, ordinal: usize },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// This value's pre-resolved enum ordinal, if it is an `Enum` value.
    pub fn enum_ordinal(&self) -> Option<usize> {
        match self {
            Value::Enum { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::BigIntStr(s) => Some(s.as_str()),
            Value::Enum { value, .. } => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::BigIntStr(s) | Value::Str(s) => write!(f, "{s}"),
            Value::Enum { value, .. } => write!(f, "{value}"),
        }
    }
}

/// An unordered mapping from field name to value.
pub type Row = HashMap<String, Value>;

/// A hashable primary-key value, used as the `Cache`'s map key.
///
/// `Value` itself isn't `Eq`/`Hash` because of the `Float` variant; `Key`
/// normalizes a float's bit pattern so floating-point primary keys are still
/// usable (spec.md §4.2: "any hashable scalar"), while the common cases
/// (int, string, bigint-as-string) hash exactly as expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    FloatBits(u64),
    Str(String),
}

impl Key {
    /// Builds the cache key for a row's primary-key value. Returns `None`
    /// for null (callers must have already checked `primary_key_of`).
    pub fn from_value(v: &Value) -> Option<Key> {
        match v {
            Value::Null => None,
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Float(f) => Some(Key::FloatBits(f.to_bits())),
            Value::BigIntStr(s) | Value::Str(s) => Some(Key::Str(s.clone())),
            Value::Enum { value, .. } => Some(Key::Str(value.clone())),
        }
    }
}

/// Extracts the primary-key value out of a row, returning `None` if the
/// field is missing or null (SPEC_FULL.md §4.4 step 3: "If missing/null, log
/// and skip").
pub fn primary_key_of<'a>(row: &'a Row, pk_field: &str) -> Option<&'a Value> {
    match row.get(pk_field) {
        Some(v) if !v.is_null() => Some(v),
        _ => None,
    }
}

/// The set of field names whose values differ between `old` and `new`,
/// including fields present in only one of the two rows (spec.md §4.4 step
/// 4: "compute the set of fields whose values differ from the existing
/// row").
pub fn changed_fields(old: &Row, new: &Row) -> HashSet<String> {
    let mut changed = HashSet::new();
    for (field, new_value) in new {
        if old.get(field) != Some(new_value) {
            changed.insert(field.clone());
        }
    }
    for field in old.keys() {
        if !new.contains_key(field) {
            changed.insert(field.clone());
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_ordinal_lookup() {
        let high = Value::Enum { value: "high".to_string(), ordinal: 2 };
        assert_eq!(high.enum_ordinal(), Some(2));
        assert_eq!(Value::Str("unknown".to_string()).enum_ordinal(), None);
        assert_eq!(Value::Int(1).enum_ordinal(), None);
    }

    #[test]
    fn changed_fields_detects_differing_and_missing() {
        let mut old: Row = HashMap::new();
        old.insert("id".to_string(), Value::Int(1));
        old.insert("px".to_string(), Value::Float(1.0));

        let mut new: Row = HashMap::new();
        new.insert("id".to_string(), Value::Int(1));
        new.insert("px".to_string(), Value::Float(2.0));

        let changed = changed_fields(&old, &new);
        assert_eq!(changed.len(), 1);
        assert!(changed.contains("px"));
    }

    #[test]
    fn primary_key_absent_or_null_is_none() {
        let mut row: Row = HashMap::new();
        assert!(primary_key_of(&row, "id").is_none());
        row.insert("id".to_string(), Value::Null);
        assert!(primary_key_of(&row, "id").is_none());
        row.insert("id".to_string(), Value::Int(1));
        assert_eq!(primary_key_of(&row, "id"), Some(&Value::Int(1)));
    }
}
