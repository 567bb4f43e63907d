//! Row projection: rectangular cell blocks ⇄ ordered records.
//!
//! Field identity is the header text, matched exactly; nothing here trims,
//! case-folds, or otherwise normalizes names.

use ledger_model::{FieldValue, Record, SchemaRegistry};

/// Project a block of data rows into records, zipping each row's cells
/// positionally against the header row's field names.
///
/// A cell is empty iff its value is blank (unset or `""`). With
/// `keep_blanks = false`, empty cells are omitted from the record and a row
/// with no non-empty cells is dropped entirely. With `keep_blanks = true`,
/// empty cells are retained as empty-string fields and no row is dropped, so
/// output indices stay aligned with input rows.
///
/// Columns with no header text never contribute a field.
pub fn project_rows(
    header: &[FieldValue],
    data: &[Vec<FieldValue>],
    keep_blanks: bool,
) -> Vec<Record> {
    let names: Vec<String> = header.iter().map(FieldValue::display).collect();
    let mut records = Vec::with_capacity(data.len());
    for row in data {
        let mut record = Record::with_capacity(names.len());
        let mut has_data = false;
        for (name, cell) in names.iter().zip(row.iter()) {
            if name.is_empty() {
                continue;
            }
            if cell.is_blank() {
                if keep_blanks {
                    record.insert(name.clone(), FieldValue::Text(String::new()));
                }
                continue;
            }
            record.insert(name.clone(), cell.clone());
            has_data = true;
        }
        if has_data || keep_blanks {
            records.push(record);
        }
    }
    records
}

/// Serialize records back into a rectangular block against a destination
/// schema: for each header field the record's non-empty value is emitted,
/// otherwise the cell is blank. Record fields not present in the header are
/// silently dropped; the destination's schema is authoritative.
pub fn serialize_records(schema: &SchemaRegistry, records: &[Record]) -> Vec<Vec<FieldValue>> {
    records
        .iter()
        .map(|record| serialize_record(schema, record))
        .collect()
}

/// Single-record form of [`serialize_records`].
pub fn serialize_record(schema: &SchemaRegistry, record: &Record) -> Vec<FieldValue> {
    (0..schema.width())
        .map(|column| {
            let name = schema.field_at(column).unwrap_or("");
            if name.is_empty() {
                return FieldValue::Empty;
            }
            let value = record.value(name);
            if value.is_blank() {
                FieldValue::Empty
            } else {
                value.clone()
            }
        })
        .collect()
}
