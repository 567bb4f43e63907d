//! `ledger-model` defines the core data structures for the orders/shipments
//! reconciliation ledger.
//!
//! The crate is intentionally self-contained so it can be reused by:
//! - the reconciliation engine (grouping, matching, merging)
//! - CSV persistence of the source and destination sheets
//! - the CLI boundary via `serde` (JSON-safe report payloads)

mod address;
pub mod fields;
mod grid;
mod record;
mod schema;
mod value;

pub use address::{store_col, store_row, GridRegion, COLUMN_INDEX_OFFSET, ROW_INDEX_OFFSET};
pub use grid::{CellContent, FormatOp, GridError, GridStore, MemoryGrid, SheetId};
pub use record::Record;
pub use schema::SchemaRegistry;
pub use value::FieldValue;
