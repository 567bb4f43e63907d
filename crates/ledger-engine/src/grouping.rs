//! Grouping and indexing of projected records by a key field.

use std::collections::HashMap;

use ledger_model::Record;

/// Group records by the display value of `key_field`, preserving input order
/// within each group.
///
/// Records whose key is blank or absent are excluded: blank source rows must
/// never produce a group. Callers iterate groups without relying on group
/// order.
pub fn group_by(records: Vec<Record>, key_field: &str) -> HashMap<String, Vec<Record>> {
    let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
    for record in records {
        let key = record.text(key_field);
        if key.is_empty() {
            continue;
        }
        groups.entry(key).or_default().push(record);
    }
    groups
}

/// 1:1 index of records by `key_field`; the last record with a given key
/// wins. Used for lookup tables whose uniqueness the domain guarantees
/// (e.g. store id → store name).
pub fn index_by(records: Vec<Record>, key_field: &str) -> HashMap<String, Record> {
    let mut index = HashMap::new();
    for record in records {
        let key = record.text(key_field);
        if key.is_empty() {
            continue;
        }
        index.insert(key, record);
    }
    index
}

/// Group row *positions* by key, for datasets whose records must stay
/// addressable by their original row (the existing merged snapshot). Same
/// blank-key exclusion as [`group_by`].
pub fn group_indices_by(records: &[Record], key_field: &str) -> HashMap<String, Vec<usize>> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let key = record.text(key_field);
        if key.is_empty() {
            continue;
        }
        groups.entry(key).or_default().push(index);
    }
    groups
}
