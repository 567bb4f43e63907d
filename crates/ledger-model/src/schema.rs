use std::collections::HashMap;

use crate::FieldValue;

/// Field-name → column mapping derived once per run from the destination
/// header row.
///
/// This is the only path from field names to column indices; per-column
/// constants are never hard-coded at use sites, so the registry cannot drift
/// from the actual header layout. Duplicate header names keep their first
/// column (matching spreadsheet `indexOf` lookups).
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    fields: Vec<String>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Build a registry from the header row's cell values.
    pub fn from_header_row(header: &[FieldValue]) -> Self {
        Self::from_fields(header.iter().map(FieldValue::display))
    }

    pub fn from_fields(fields: impl IntoIterator<Item = String>) -> Self {
        let fields: Vec<String> = fields.into_iter().collect();
        let mut index = HashMap::with_capacity(fields.len());
        for (column, name) in fields.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            index.entry(name.clone()).or_insert(column);
        }
        Self { fields, index }
    }

    /// 0-based column index for `field`, if the header row defines it.
    pub fn column_of(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    /// Field name at a 0-based column (empty string for unnamed columns).
    pub fn field_at(&self, column: usize) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Number of columns covered by the header row.
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// The header row as grid cell values.
    pub fn header_row(&self) -> Vec<FieldValue> {
        self.fields
            .iter()
            .map(|name| {
                if name.is_empty() {
                    FieldValue::Empty
                } else {
                    FieldValue::Text(name.clone())
                }
            })
            .collect()
    }

    /// The order-level fields that belong on an entry's header row, read from
    /// a flag row beneath the header: a column is selected when its flag cell
    /// is true. Returns `None` when the flag row selects nothing (callers
    /// fall back to the built-in allow-list).
    pub fn main_entry_fields(&self, flag_row: &[FieldValue]) -> Option<Vec<String>> {
        let selected: Vec<String> = self
            .fields
            .iter()
            .zip(flag_row.iter())
            .filter(|(name, flag)| !name.is_empty() && flag.is_truthy())
            .map(|(name, _)| name.clone())
            .collect();
        if selected.is_empty() {
            None
        } else {
            Some(selected)
        }
    }
}
