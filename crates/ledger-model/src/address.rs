use serde::{Deserialize, Serialize};

/// Offset between the engine's 0-based row indices and the grid store's
/// 1-based row addresses.
pub const ROW_INDEX_OFFSET: u32 = 1;
/// Offset between the engine's 0-based column indices and the grid store's
/// 1-based column addresses.
pub const COLUMN_INDEX_OFFSET: u32 = 1;

/// Convert a 0-based row index to a 1-based store row address.
#[inline]
pub fn store_row(row: u32) -> u32 {
    row + ROW_INDEX_OFFSET
}

/// Convert a 0-based column index to a 1-based store column address.
#[inline]
pub fn store_col(col: u32) -> u32 {
    col + COLUMN_INDEX_OFFSET
}

/// A rectangular region in grid-store coordinates (1-based, inclusive start,
/// extent in rows/columns).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRegion {
    /// 1-based first row.
    pub row_start: u32,
    /// 1-based first column.
    pub col_start: u32,
    pub row_count: u32,
    pub col_count: u32,
}

impl GridRegion {
    pub const fn new(row_start: u32, col_start: u32, row_count: u32, col_count: u32) -> Self {
        Self {
            row_start,
            col_start,
            row_count,
            col_count,
        }
    }

    /// Single-cell region.
    pub const fn cell(row: u32, col: u32) -> Self {
        Self::new(row, col, 1, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.col_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_convert_zero_based_indices() {
        assert_eq!(store_row(0), 1);
        assert_eq!(store_col(25), 26);
    }
}
