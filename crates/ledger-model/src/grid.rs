use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{FieldValue, GridRegion};

/// Identifier for one sheet within a grid store.
pub type SheetId = u32;

/// Errors surfaced by grid store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("unknown sheet {0}")]
    UnknownSheet(SheetId),
    #[error("region addresses must be 1-based (got row {row}, col {col})")]
    ZeroAddress { row: u32, col: u32 },
    #[error("ragged matrix: row {row} has {got} columns, expected {expected}")]
    RaggedMatrix { row: usize, got: usize, expected: usize },
}

/// One cell's stored content: a value plus an optional formula.
///
/// The engine never evaluates formulas; it only needs to know whether a cell
/// carries one, because a formula cell is not blank for patch eligibility.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellContent {
    pub value: FieldValue,
    pub formula: Option<String>,
}

impl CellContent {
    pub fn value(value: impl Into<FieldValue>) -> Self {
        Self {
            value: value.into(),
            formula: None,
        }
    }

    pub fn formula(text: impl Into<String>) -> Self {
        Self {
            value: FieldValue::Empty,
            formula: Some(text.into()),
        }
    }

    /// Blank means no value and no formula.
    pub fn is_blank(&self) -> bool {
        self.value.is_blank() && self.formula.is_none()
    }
}

/// The external tabular grid collaborator (the spreadsheet).
///
/// All addressing at this boundary is 1-based; the engine converts its
/// 0-based indices through [`crate::ROW_INDEX_OFFSET`] /
/// [`crate::COLUMN_INDEX_OFFSET`]. The
/// formatting operations are presentation-only and carry no data-correctness
/// obligation, so their default implementations do nothing.
pub trait GridStore {
    /// 1-based index of the last row holding any content; 0 when the sheet
    /// is empty.
    fn last_row(&self, sheet: SheetId) -> Result<u32, GridError>;

    /// 1-based index of the last column holding any content; 0 when the
    /// sheet is empty.
    fn last_col(&self, sheet: SheetId) -> Result<u32, GridError>;

    /// Cell values for a region; cells beyond current content read as blank.
    fn read_region(
        &self,
        sheet: SheetId,
        region: GridRegion,
    ) -> Result<Vec<Vec<FieldValue>>, GridError>;

    /// Display-string variant of [`GridStore::read_region`].
    fn read_region_display(
        &self,
        sheet: SheetId,
        region: GridRegion,
    ) -> Result<Vec<Vec<String>>, GridError> {
        Ok(self
            .read_region(sheet, region)?
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.display()).collect())
            .collect())
    }

    /// Formula text for each cell in a region (`None` for plain cells).
    fn read_region_formulas(
        &self,
        sheet: SheetId,
        region: GridRegion,
    ) -> Result<Vec<Vec<Option<String>>>, GridError>;

    /// Overwrite a region with a rectangular matrix of values. Cells written
    /// this way lose any formula they carried.
    fn write_region(
        &mut self,
        sheet: SheetId,
        row_start: u32,
        col_start: u32,
        matrix: &[Vec<FieldValue>],
    ) -> Result<(), GridError>;

    /// Write one cell.
    fn write_cell(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        value: FieldValue,
    ) -> Result<(), GridError>;

    /// Append a matrix immediately below the last content row in one bulk
    /// operation.
    fn append_rows(&mut self, sheet: SheetId, matrix: &[Vec<FieldValue>]) -> Result<(), GridError>;

    /// Blank out a region (values and formulas).
    fn clear_region(&mut self, sheet: SheetId, region: GridRegion) -> Result<(), GridError>;

    fn set_number_format(
        &mut self,
        _sheet: SheetId,
        _region: GridRegion,
        _format: &str,
    ) -> Result<(), GridError> {
        Ok(())
    }

    fn insert_checkboxes(&mut self, _sheet: SheetId, _region: GridRegion) -> Result<(), GridError> {
        Ok(())
    }

    fn set_background(
        &mut self,
        _sheet: SheetId,
        _region: GridRegion,
        _color: &str,
    ) -> Result<(), GridError> {
        Ok(())
    }

    fn set_wrap_clip(&mut self, _sheet: SheetId, _region: GridRegion) -> Result<(), GridError> {
        Ok(())
    }
}

/// Formatting request recorded by [`MemoryGrid`] so tests can assert the
/// driver asked for presentation changes without modeling their effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FormatOp {
    NumberFormat { region: GridRegion, format: String },
    Checkboxes { region: GridRegion },
    Background { region: GridRegion, color: String },
    WrapClip { region: GridRegion },
}

#[derive(Clone, Debug, Default)]
struct MemorySheet {
    name: String,
    rows: Vec<Vec<CellContent>>,
    format_ops: Vec<FormatOp>,
}

impl MemorySheet {
    fn cell(&self, row0: usize, col0: usize) -> CellContent {
        self.rows
            .get(row0)
            .and_then(|r| r.get(col0))
            .cloned()
            .unwrap_or_default()
    }

    fn ensure(&mut self, row0: usize, col0: usize) -> &mut CellContent {
        if self.rows.len() <= row0 {
            self.rows.resize_with(row0 + 1, Vec::new);
        }
        let row = &mut self.rows[row0];
        if row.len() <= col0 {
            row.resize_with(col0 + 1, CellContent::default);
        }
        &mut row[col0]
    }

    fn last_row(&self) -> u32 {
        self.rows
            .iter()
            .rposition(|row| row.iter().any(|c| !c.is_blank()))
            .map(|i| i as u32 + 1)
            .unwrap_or(0)
    }

    fn last_col(&self) -> u32 {
        self.rows
            .iter()
            .filter_map(|row| row.iter().rposition(|c| !c.is_blank()))
            .max()
            .map(|i| i as u32 + 1)
            .unwrap_or(0)
    }
}

/// In-memory [`GridStore`] used by tests and as the CLI's working
/// representation of the on-disk CSV sheets.
#[derive(Clone, Debug, Default)]
pub struct MemoryGrid {
    sheets: HashMap<SheetId, MemorySheet>,
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sheet (replacing any sheet with the same id).
    pub fn add_sheet(&mut self, sheet: SheetId, name: impl Into<String>) {
        self.sheets.insert(
            sheet,
            MemorySheet {
                name: name.into(),
                ..MemorySheet::default()
            },
        );
    }

    /// Create a sheet pre-populated from cell contents.
    pub fn add_sheet_with_cells(
        &mut self,
        sheet: SheetId,
        name: impl Into<String>,
        rows: Vec<Vec<CellContent>>,
    ) {
        self.sheets.insert(
            sheet,
            MemorySheet {
                name: name.into(),
                rows,
                format_ops: Vec::new(),
            },
        );
    }

    pub fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.sheets.get(&sheet).map(|s| s.name.as_str())
    }

    pub fn contains_sheet(&self, sheet: SheetId) -> bool {
        self.sheets.contains_key(&sheet)
    }

    /// Raw cell content (for persistence and tests).
    pub fn cell_content(&self, sheet: SheetId, row: u32, col: u32) -> Result<CellContent, GridError> {
        let s = self.get(sheet)?;
        let (row0, col0) = to_zero_based(row, col)?;
        Ok(s.cell(row0, col0))
    }

    pub fn set_cell_content(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        content: CellContent,
    ) -> Result<(), GridError> {
        let s = self.get_mut(sheet)?;
        let (row0, col0) = to_zero_based(row, col)?;
        *s.ensure(row0, col0) = content;
        Ok(())
    }

    /// Formatting requests recorded for a sheet, in call order.
    pub fn format_ops(&self, sheet: SheetId) -> Result<&[FormatOp], GridError> {
        Ok(&self.get(sheet)?.format_ops)
    }

    fn get(&self, sheet: SheetId) -> Result<&MemorySheet, GridError> {
        self.sheets.get(&sheet).ok_or(GridError::UnknownSheet(sheet))
    }

    fn get_mut(&mut self, sheet: SheetId) -> Result<&mut MemorySheet, GridError> {
        self.sheets
            .get_mut(&sheet)
            .ok_or(GridError::UnknownSheet(sheet))
    }
}

fn to_zero_based(row: u32, col: u32) -> Result<(usize, usize), GridError> {
    if row == 0 || col == 0 {
        return Err(GridError::ZeroAddress { row, col });
    }
    Ok(((row - 1) as usize, (col - 1) as usize))
}

fn check_matrix(matrix: &[Vec<FieldValue>]) -> Result<usize, GridError> {
    let width = matrix.first().map(Vec::len).unwrap_or(0);
    for (row, values) in matrix.iter().enumerate() {
        if values.len() != width {
            return Err(GridError::RaggedMatrix {
                row,
                got: values.len(),
                expected: width,
            });
        }
    }
    Ok(width)
}

impl GridStore for MemoryGrid {
    fn last_row(&self, sheet: SheetId) -> Result<u32, GridError> {
        Ok(self.get(sheet)?.last_row())
    }

    fn last_col(&self, sheet: SheetId) -> Result<u32, GridError> {
        Ok(self.get(sheet)?.last_col())
    }

    fn read_region(
        &self,
        sheet: SheetId,
        region: GridRegion,
    ) -> Result<Vec<Vec<FieldValue>>, GridError> {
        let s = self.get(sheet)?;
        if region.is_empty() {
            return Ok(Vec::new());
        }
        let (row0, col0) = to_zero_based(region.row_start, region.col_start)?;
        let mut out = Vec::with_capacity(region.row_count as usize);
        for r in 0..region.row_count as usize {
            let mut row = Vec::with_capacity(region.col_count as usize);
            for c in 0..region.col_count as usize {
                row.push(s.cell(row0 + r, col0 + c).value);
            }
            out.push(row);
        }
        Ok(out)
    }

    fn read_region_formulas(
        &self,
        sheet: SheetId,
        region: GridRegion,
    ) -> Result<Vec<Vec<Option<String>>>, GridError> {
        let s = self.get(sheet)?;
        if region.is_empty() {
            return Ok(Vec::new());
        }
        let (row0, col0) = to_zero_based(region.row_start, region.col_start)?;
        let mut out = Vec::with_capacity(region.row_count as usize);
        for r in 0..region.row_count as usize {
            let mut row = Vec::with_capacity(region.col_count as usize);
            for c in 0..region.col_count as usize {
                row.push(s.cell(row0 + r, col0 + c).formula);
            }
            out.push(row);
        }
        Ok(out)
    }

    fn write_region(
        &mut self,
        sheet: SheetId,
        row_start: u32,
        col_start: u32,
        matrix: &[Vec<FieldValue>],
    ) -> Result<(), GridError> {
        check_matrix(matrix)?;
        let s = self.get_mut(sheet)?;
        let (row0, col0) = to_zero_based(row_start, col_start)?;
        for (r, values) in matrix.iter().enumerate() {
            for (c, value) in values.iter().enumerate() {
                *s.ensure(row0 + r, col0 + c) = CellContent::value(value.clone());
            }
        }
        Ok(())
    }

    fn write_cell(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        value: FieldValue,
    ) -> Result<(), GridError> {
        self.set_cell_content(sheet, row, col, CellContent::value(value))
    }

    fn append_rows(&mut self, sheet: SheetId, matrix: &[Vec<FieldValue>]) -> Result<(), GridError> {
        if matrix.is_empty() {
            return Ok(());
        }
        check_matrix(matrix)?;
        let first_blank = self.get(sheet)?.last_row() + 1;
        self.write_region(sheet, first_blank, 1, matrix)
    }

    fn clear_region(&mut self, sheet: SheetId, region: GridRegion) -> Result<(), GridError> {
        let s = self.get_mut(sheet)?;
        if region.is_empty() {
            return Ok(());
        }
        let (row0, col0) = to_zero_based(region.row_start, region.col_start)?;
        for r in 0..region.row_count as usize {
            let Some(row) = s.rows.get_mut(row0 + r) else {
                break;
            };
            for c in 0..region.col_count as usize {
                if let Some(cell) = row.get_mut(col0 + c) {
                    *cell = CellContent::default();
                }
            }
        }
        Ok(())
    }

    fn set_number_format(
        &mut self,
        sheet: SheetId,
        region: GridRegion,
        format: &str,
    ) -> Result<(), GridError> {
        self.get_mut(sheet)?.format_ops.push(FormatOp::NumberFormat {
            region,
            format: format.to_string(),
        });
        Ok(())
    }

    fn insert_checkboxes(&mut self, sheet: SheetId, region: GridRegion) -> Result<(), GridError> {
        self.get_mut(sheet)?
            .format_ops
            .push(FormatOp::Checkboxes { region });
        Ok(())
    }

    fn set_background(
        &mut self,
        sheet: SheetId,
        region: GridRegion,
        color: &str,
    ) -> Result<(), GridError> {
        self.get_mut(sheet)?.format_ops.push(FormatOp::Background {
            region,
            color: color.to_string(),
        });
        Ok(())
    }

    fn set_wrap_clip(&mut self, sheet: SheetId, region: GridRegion) -> Result<(), GridError> {
        self.get_mut(sheet)?
            .format_ops
            .push(FormatOp::WrapClip { region });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grid_with_sheet() -> MemoryGrid {
        let mut grid = MemoryGrid::new();
        grid.add_sheet(1, "Test");
        grid
    }

    #[test]
    fn reads_beyond_content_are_blank() {
        let grid = grid_with_sheet();
        let values = grid.read_region(1, GridRegion::new(5, 5, 2, 2)).unwrap();
        assert_eq!(values, vec![vec![FieldValue::Empty; 2]; 2]);
    }

    #[test]
    fn last_row_ignores_trailing_blanks() {
        let mut grid = grid_with_sheet();
        grid.write_region(1, 1, 1, &[vec!["a".into()], vec!["b".into()]])
            .unwrap();
        grid.clear_region(1, GridRegion::new(2, 1, 1, 1)).unwrap();
        assert_eq!(grid.last_row(1).unwrap(), 1);
    }

    #[test]
    fn append_lands_below_last_content_row() {
        let mut grid = grid_with_sheet();
        grid.write_region(1, 1, 1, &[vec!["header".into()]]).unwrap();
        grid.append_rows(1, &[vec!["x".into()], vec!["y".into()]])
            .unwrap();
        let values = grid.read_region(1, GridRegion::new(2, 1, 2, 1)).unwrap();
        assert_eq!(
            values,
            vec![vec![FieldValue::from("x")], vec![FieldValue::from("y")]]
        );
    }

    #[test]
    fn display_reads_render_values_as_the_grid_would() {
        let mut grid = grid_with_sheet();
        grid.write_region(
            1,
            1,
            1,
            &[vec![
                FieldValue::Number(10.0),
                FieldValue::Bool(true),
                FieldValue::Empty,
            ]],
        )
        .unwrap();
        let display = grid
            .read_region_display(1, GridRegion::new(1, 1, 1, 3))
            .unwrap();
        assert_eq!(display[0], ["10", "TRUE", ""]);
    }

    #[test]
    fn formula_cells_are_not_blank() {
        let mut grid = grid_with_sheet();
        grid.set_cell_content(1, 1, 1, CellContent::formula("=SUM(A2:A3)"))
            .unwrap();
        assert!(!grid.cell_content(1, 1, 1).unwrap().is_blank());
        let formulas = grid
            .read_region_formulas(1, GridRegion::cell(1, 1))
            .unwrap();
        assert_eq!(formulas[0][0].as_deref(), Some("=SUM(A2:A3)"));
    }

    #[test]
    fn write_rejects_ragged_matrices() {
        let mut grid = grid_with_sheet();
        let err = grid
            .write_region(1, 1, 1, &[vec!["a".into()], vec!["b".into(), "c".into()]])
            .unwrap_err();
        assert!(matches!(err, GridError::RaggedMatrix { .. }));
    }

    #[test]
    fn unknown_sheet_errors() {
        let grid = MemoryGrid::new();
        assert_eq!(grid.last_row(9).unwrap_err(), GridError::UnknownSheet(9));
    }
}
