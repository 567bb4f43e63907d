//! CSV persistence for ledger sheets.
//!
//! Sheets travel as plain CSV: every cell is a string, a leading `=` marks a
//! formula cell, `TRUE`/`FALSE` read as booleans, and numeric text reads as
//! numbers. Decoding accepts UTF-8 with a Windows-1252 fallback per field,
//! matching how spreadsheet exports commonly arrive.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::ByteRecord;
use encoding_rs::WINDOWS_1252;
use ledger_model::{CellContent, FieldValue, GridError, GridStore, MemoryGrid, SheetId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CsvSheetError {
    #[error("csv parse error at row {row}: {reason}")]
    Parse { row: u64, reason: String },
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read a CSV stream into cell contents, one row per CSV record.
///
/// Rows may be ragged; each row keeps its own width and the grid treats the
/// missing tail as blank.
pub fn read_csv_cells<R: Read>(reader: R) -> Result<Vec<Vec<CellContent>>, CsvSheetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut record = ByteRecord::new();
    let mut row_index: u64 = 0;
    loop {
        record.clear();
        match csv_reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                row_index += 1;
                let mut cells = Vec::with_capacity(record.len());
                for (column, field) in record.iter().enumerate() {
                    let text = decode_field(field, row_index, column as u64 + 1);
                    cells.push(parse_cell(text.as_ref()));
                }
                rows.push(cells);
            }
            Err(e) => {
                return Err(CsvSheetError::Parse {
                    row: row_index + 1,
                    reason: e.to_string(),
                })
            }
        }
    }
    Ok(rows)
}

/// Load a CSV file as a new sheet in the grid.
pub fn load_csv_sheet(
    grid: &mut MemoryGrid,
    sheet: SheetId,
    name: &str,
    path: &Path,
) -> Result<(), CsvSheetError> {
    let file = File::open(path)?;
    let rows = read_csv_cells(BufReader::new(file))?;
    grid.add_sheet_with_cells(sheet, name, rows);
    Ok(())
}

/// Write a sheet back out as CSV, formulas as their text.
pub fn write_csv_sheet(
    grid: &MemoryGrid,
    sheet: SheetId,
    path: &Path,
) -> Result<(), CsvSheetError> {
    let rows = grid.last_row(sheet)?;
    let cols = grid.last_col(sheet)?;
    let mut writer = csv::Writer::from_path(path)?;
    for row in 1..=rows {
        let mut out = Vec::with_capacity(cols as usize);
        for col in 1..=cols {
            let content = grid.cell_content(sheet, row, col)?;
            out.push(render_cell(&content));
        }
        writer.write_record(&out)?;
    }
    writer.flush()?;
    Ok(())
}

fn render_cell(content: &CellContent) -> String {
    match &content.formula {
        Some(formula) => formula.clone(),
        None => content.value.display(),
    }
}

fn parse_cell(text: &str) -> CellContent {
    if text.is_empty() {
        return CellContent::default();
    }
    if text.starts_with('=') {
        return CellContent::formula(text);
    }
    if text.eq_ignore_ascii_case("true") {
        return CellContent::value(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return CellContent::value(false);
    }
    if let Ok(number) = text.trim().parse::<f64>() {
        return CellContent::value(number);
    }
    CellContent::value(FieldValue::Text(text.to_string()))
}

fn decode_field(field: &[u8], row: u64, column: u64) -> Cow<'_, str> {
    // A UTF-8 BOM commonly leads spreadsheet-exported CSVs.
    let field = if row == 1 && column == 1 && field.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &field[3..]
    } else {
        field
    };
    match std::str::from_utf8(field) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (cow, _, _) = WINDOWS_1252.decode(field);
            Cow::Owned(cow.into_owned())
        }
    }
}

impl From<csv::Error> for CsvSheetError {
    fn from(err: csv::Error) -> Self {
        if let csv::ErrorKind::Io(e) = err.into_kind() {
            return CsvSheetError::Io(e);
        }
        CsvSheetError::Parse {
            row: 0,
            reason: "csv write error".to_string(),
        }
    }
}
