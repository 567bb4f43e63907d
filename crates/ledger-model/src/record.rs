use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::FieldValue;

/// One row's data as an insertion-ordered field-name → value mapping.
///
/// Field names are unique within a record; inserting an existing name
/// replaces the value in place. Lookups by name are the single code path for
/// missing-field behavior: the typed accessors treat an absent field as the
/// documented blank/zero default instead of panicking, because source data is
/// known to be incomplete in practice.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Insert or replace a field, preserving first-insertion order.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Value for `name`, with [`FieldValue::Empty`] standing in for a missing
    /// field.
    pub fn value(&self, name: &str) -> &FieldValue {
        static EMPTY: FieldValue = FieldValue::Empty;
        self.get(name).unwrap_or(&EMPTY)
    }

    /// Text accessor; missing and non-text fields degrade to their display
    /// string (`""` for missing).
    pub fn text(&self, name: &str) -> String {
        self.value(name).display()
    }

    /// Numeric accessor; missing fields and unparseable text count as `0.0`.
    pub fn number(&self, name: &str) -> f64 {
        match self.value(name) {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().parse().unwrap_or(0.0),
            FieldValue::Bool(_) | FieldValue::Empty => 0.0,
        }
    }

    /// Boolean-like accessor; see [`FieldValue::is_truthy`]. A missing field
    /// reads as false.
    pub fn bool_like(&self, name: &str) -> bool {
        self.value(name).is_truthy()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// A copy of this record with every field name prefixed, e.g.
    /// `orderKey` → `orders_orderKey`. This is how raw source fields take on
    /// their merged-sheet column names.
    pub fn qualified(&self, prefix: &str) -> Record {
        let mut out = Record::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            out.insert(format!("{prefix}{name}"), value.clone());
        }
        out
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to field values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
                let mut record = Record::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, FieldValue>()? {
                    record.insert(name, value);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}
