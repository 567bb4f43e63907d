//! Incremental reconciliation driver.
//!
//! One run walks `LOAD → RECONCILE_EXISTING → RECONCILE_NEW → WRITE → DONE`:
//! load the three datasets, back-fill shipment-derived fields into blank
//! cells of already-merged rows, build full entries for orders the merged
//! sheet has never seen, and append those in one bulk write. All decisions
//! are made against the snapshot taken at LOAD, never against intermediate
//! writes, and re-running against unchanged sources appends nothing.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use ledger_model::fields::{merged, merged_orders, source, DEFAULT_HEADER_FIELDS};
use ledger_model::{
    store_col, store_row, FieldValue, GridError, GridRegion, GridStore, Record, SchemaRegistry,
    SheetId, ROW_INDEX_OFFSET,
};
use thiserror::Error;

use crate::grouping::{group_by, group_indices_by, index_by};
use crate::lock::{LockError, StoreLock};
use crate::matching::{match_shipments, MERGED_ROW_KEYS};
use crate::merge::{build_entry, build_shipment_patch, MergeContext};
use crate::report::{DiagnosticKind, RunReport};
use crate::rows::project_rows;

/// Leading header rows on the merged sheet. Historically this drifted
/// between 1 and 5; it is configuration, never hard-coded at use sites.
pub const DEFAULT_HEADER_ROWS: u32 = 4;

/// Bounded wait for exclusive access to the destination store.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Background color requested for each entry's header row.
const SHADING_COLOR: &str = "azure";
/// Number format requested for the order-date column.
const ORDER_DATE_NUMBER_FORMAT: &str = "m/d/yyy";
/// Number format requested for the last-updated stamp cell.
const TIMESTAMP_NUMBER_FORMAT: &str = "m/d/yy h:mm";
/// Label written next to the last-updated stamp.
const TIMESTAMP_LABEL: &str = "Last updated:";

/// Which sheet each dataset lives on.
#[derive(Clone, Copy, Debug)]
pub struct DatasetIds {
    pub orders: SheetId,
    pub shipments: SheetId,
    pub merged: SheetId,
    /// Optional store-name lookup table (`storeId` / `storeName` columns).
    pub store_lookup: Option<SheetId>,
}

/// Per-run configuration.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub header_rows: u32,
    pub lock_timeout: Duration,
    /// When set, written as the last-updated stamp after a successful run.
    /// Supplied by the caller so the engine itself stays deterministic.
    pub timestamp: Option<NaiveDateTime>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            header_rows: DEFAULT_HEADER_ROWS,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            timestamp: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("merged sheet has no header row to define its schema")]
    EmptySchema,
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Everything one run reads, assembled once at LOAD and immutable for the
/// rest of the run. No component reads ambient state.
struct RunContext {
    schema: SchemaRegistry,
    header_fields: Vec<String>,
    store_names: HashMap<String, Record>,
    orders: HashMap<String, Vec<Record>>,
    shipments: HashMap<String, Vec<Record>>,
    /// Merged-sheet data rows, blank-preserving so offsets line up with
    /// store rows.
    existing: Vec<Record>,
    /// Formula text per existing cell, for patch eligibility.
    existing_formulas: Vec<Vec<Option<String>>>,
    /// Order key → offsets into `existing`.
    existing_keys: HashMap<String, Vec<usize>>,
}

impl RunContext {
    fn merge_context(&self) -> MergeContext<'_> {
        MergeContext {
            store_names: &self.store_names,
            header_fields: &self.header_fields,
        }
    }
}

/// Run one incremental reconciliation pass.
///
/// The destination lock is held for the whole run: the run is a single
/// non-reentrant unit of work and overlapping runs must serialize. A lock
/// timeout aborts before anything is read or written.
pub fn reconcile<S: GridStore>(
    lock: &StoreLock<S>,
    ids: &DatasetIds,
    config: &RunConfig,
) -> Result<RunReport, ReconcileError> {
    let mut store = lock.acquire(config.lock_timeout)?;
    let ctx = load(&*store, ids, config)?;
    let mut report = RunReport::default();

    reconcile_existing(&mut *store, ids, config, &ctx, &mut report)?;
    let staged = reconcile_new(&ctx, &mut report);

    if !staged.rows.is_empty() {
        let first_row = store.last_row(ids.merged)? + ROW_INDEX_OFFSET;
        // Formats go in before the data; checkbox insertion would otherwise
        // reset freshly written cells.
        apply_entry_formats(
            &mut *store,
            ids.merged,
            &ctx.schema,
            first_row,
            staged.rows.len() as u32,
            &staged.header_offsets,
        )?;
        store.append_rows(ids.merged, &staged.rows)?;
        report.rows_appended = staged.rows.len();
    }

    stamp_last_updated(&mut *store, ids.merged, config)?;
    Ok(report)
}

/// Rebuild the merged sheet from scratch: clear every data row below the
/// header block and rewrite all entries. Shares LOAD, matching, and merging
/// with the incremental pass, under the same lock discipline.
pub fn rebuild<S: GridStore>(
    lock: &StoreLock<S>,
    ids: &DatasetIds,
    config: &RunConfig,
) -> Result<RunReport, ReconcileError> {
    let mut store = lock.acquire(config.lock_timeout)?;
    let ctx = load(&*store, ids, config)?;
    let mut report = RunReport::default();

    let merge_ctx = ctx.merge_context();
    let mut staged = StagedRows::default();
    let mut keys: Vec<&String> = ctx.orders.keys().collect();
    keys.sort();
    for key in keys {
        stage_entry(&ctx, &merge_ctx, key, &mut staged, &mut report);
    }

    let last_row = store.last_row(ids.merged)?;
    let last_col = store.last_col(ids.merged)?;
    if last_row > config.header_rows {
        store.clear_region(
            ids.merged,
            GridRegion::new(
                config.header_rows + ROW_INDEX_OFFSET,
                1,
                last_row - config.header_rows,
                last_col,
            ),
        )?;
    }

    if !staged.rows.is_empty() {
        let first_row = config.header_rows + ROW_INDEX_OFFSET;
        apply_entry_formats(
            &mut *store,
            ids.merged,
            &ctx.schema,
            first_row,
            staged.rows.len() as u32,
            &staged.header_offsets,
        )?;
        store.write_region(ids.merged, first_row, 1, &staged.rows)?;
        report.rows_appended = staged.rows.len();
    }

    stamp_last_updated(&mut *store, ids.merged, config)?;
    Ok(report)
}

/// LOAD: three independent groupings over the same projection primitives,
/// plus the destination schema and the store-name lookup.
fn load<S: GridStore>(
    store: &S,
    ids: &DatasetIds,
    config: &RunConfig,
) -> Result<RunContext, ReconcileError> {
    let merged_width = store.last_col(ids.merged)?;
    if merged_width == 0 {
        return Err(ReconcileError::EmptySchema);
    }
    let header = store
        .read_region(ids.merged, GridRegion::new(1, 1, 1, merged_width))?
        .remove(0);
    let schema = SchemaRegistry::from_header_row(&header);
    if schema.is_empty() {
        return Err(ReconcileError::EmptySchema);
    }

    let header_fields = main_entry_fields(store, ids.merged, config, &schema)?;

    let last_row = store.last_row(ids.merged)?;
    let data_rows = last_row.saturating_sub(config.header_rows);
    let data_region = GridRegion::new(
        config.header_rows + ROW_INDEX_OFFSET,
        1,
        data_rows,
        schema.width() as u32,
    );
    let values = store.read_region(ids.merged, data_region)?;
    let existing_formulas = store.read_region_formulas(ids.merged, data_region)?;
    let existing = project_rows(&header, &values, true);
    let existing_keys = group_indices_by(&existing, merged_orders::ORDER_KEY);

    let orders = group_by(read_source_records(store, ids.orders)?, source::ORDER_KEY);
    let shipments = group_by(
        read_source_records(store, ids.shipments)?,
        source::ORDER_KEY,
    );
    let store_names = match ids.store_lookup {
        Some(sheet) => index_by(read_source_records(store, sheet)?, source::STORE_LOOKUP_ID),
        None => HashMap::new(),
    };

    Ok(RunContext {
        schema,
        header_fields,
        store_names,
        orders,
        shipments,
        existing,
        existing_formulas,
        existing_keys,
    })
}

/// Project a single-header-row source sheet into records, dropping blank
/// rows.
fn read_source_records<S: GridStore>(
    store: &S,
    sheet: SheetId,
) -> Result<Vec<Record>, ReconcileError> {
    let last_row = store.last_row(sheet)?;
    let last_col = store.last_col(sheet)?;
    if last_row < 2 || last_col == 0 {
        return Ok(Vec::new());
    }
    let header = store
        .read_region(sheet, GridRegion::new(1, 1, 1, last_col))?
        .remove(0);
    let data = store.read_region(sheet, GridRegion::new(2, 1, last_row - 1, last_col))?;
    Ok(project_rows(&header, &data, false))
}

/// The order-level fields for entry header rows: the destination's own flag
/// row when it defines one, otherwise the built-in allow-list.
fn main_entry_fields<S: GridStore>(
    store: &S,
    sheet: SheetId,
    config: &RunConfig,
    schema: &SchemaRegistry,
) -> Result<Vec<String>, ReconcileError> {
    if config.header_rows >= 2 {
        let flag_row = store
            .read_region(sheet, GridRegion::new(2, 1, 1, schema.width() as u32))?
            .remove(0);
        if let Some(fields) = schema.main_entry_fields(&flag_row) {
            return Ok(fields);
        }
    }
    Ok(DEFAULT_HEADER_FIELDS.iter().map(|f| f.to_string()).collect())
}

/// RECONCILE_EXISTING: fill shipment-derived fields into blank cells of
/// rows already on the merged sheet. Eligibility is judged against the LOAD
/// snapshot; cells holding any value or formula are never overwritten.
fn reconcile_existing<S: GridStore>(
    store: &mut S,
    ids: &DatasetIds,
    config: &RunConfig,
    ctx: &RunContext,
    report: &mut RunReport,
) -> Result<(), ReconcileError> {
    let mut keys: Vec<&String> = ctx.shipments.keys().collect();
    keys.sort();
    for key in keys {
        let Some(offsets) = ctx.existing_keys.get(key) else {
            continue;
        };
        let shipments = &ctx.shipments[key];

        // Candidate rows are the entry's item rows; the order-level header
        // row never receives shipment data.
        let candidates: Vec<usize> = offsets
            .iter()
            .copied()
            .filter(|&offset| !ctx.existing[offset].bool_like(merged::ORDER_HEADER))
            .collect();
        let candidate_records: Vec<Record> = candidates
            .iter()
            .map(|&offset| ctx.existing[offset].clone())
            .collect();

        let outcome = match_shipments(&candidate_records, shipments, &MERGED_ROW_KEYS);
        for pairing in &outcome.pairings {
            let offset = candidates[pairing.item_index];
            let patch = build_shipment_patch(&shipments[pairing.shipment_index]);
            report.cells_patched +=
                patch_existing_row(store, ids, config, ctx, offset, &patch)?;
        }
        for shipment_index in outcome.unmatched(shipments.len()) {
            let message = format!(
                "could not find a merged row for shipment {} (item {}) under order key {}",
                shipments[shipment_index].text(source::ORDER_NUMBER),
                shipments[shipment_index].text(source::SHIPMENT_ITEM_NAME),
                key,
            );
            log::warn!("{message}");
            report.push_diagnostic(DiagnosticKind::UnmatchedExistingRowPatch, message);
        }
    }
    Ok(())
}

/// Write one shipment patch into an existing row, one cell at a time,
/// skipping every cell that already holds a value or formula in the
/// snapshot. Returns the number of cells filled.
fn patch_existing_row<S: GridStore>(
    store: &mut S,
    ids: &DatasetIds,
    config: &RunConfig,
    ctx: &RunContext,
    offset: usize,
    patch: &Record,
) -> Result<usize, ReconcileError> {
    let row = store_row(config.header_rows + offset as u32);
    let mut patched = 0;
    for (field, value) in patch.iter() {
        if value.is_blank() {
            continue;
        }
        // The destination schema is authoritative; fields without a column
        // are dropped.
        let Some(column) = ctx.schema.column_of(field) else {
            continue;
        };
        if !ctx.existing[offset].value(field).is_blank() {
            continue;
        }
        let has_formula = ctx.existing_formulas[offset]
            .get(column)
            .and_then(Option::as_deref)
            .is_some_and(|f| !f.is_empty());
        if has_formula {
            continue;
        }
        store.write_cell(ids.merged, row, store_col(column as u32), value.clone())?;
        patched += 1;
    }
    Ok(patched)
}

#[derive(Default)]
struct StagedRows {
    rows: Vec<Vec<FieldValue>>,
    /// Offsets (within `rows`) of entry header rows, for shading.
    header_offsets: Vec<u32>,
}

/// RECONCILE_NEW: build full entries for orders the merged sheet has never
/// seen and stage them for the bulk append. Pure staging; no side effects.
fn reconcile_new(ctx: &RunContext, report: &mut RunReport) -> StagedRows {
    let merge_ctx = ctx.merge_context();
    let mut staged = StagedRows::default();
    let mut keys: Vec<&String> = ctx.orders.keys().collect();
    keys.sort();
    for key in keys {
        if ctx.existing_keys.contains_key(key) {
            continue;
        }
        stage_entry(ctx, &merge_ctx, key, &mut staged, report);
    }
    staged
}

fn stage_entry(
    ctx: &RunContext,
    merge_ctx: &MergeContext<'_>,
    key: &str,
    staged: &mut StagedRows,
    report: &mut RunReport,
) {
    let order_items = &ctx.orders[key];
    let shipments = ctx.shipments.get(key).map(Vec::as_slice).unwrap_or(&[]);
    let entry = build_entry(order_items, shipments, merge_ctx);
    staged.header_offsets.push(staged.rows.len() as u32);
    staged.rows.extend(entry.to_rows(&ctx.schema));
    report.orders_merged += 1;
    report.unmatched_shipments += entry.unmatched_count();
}

/// WRITE-adjacent presentation requests. These must precede the data write;
/// they carry no data-correctness obligation.
fn apply_entry_formats<S: GridStore>(
    store: &mut S,
    sheet: SheetId,
    schema: &SchemaRegistry,
    first_row: u32,
    row_count: u32,
    header_offsets: &[u32],
) -> Result<(), ReconcileError> {
    let column_region = |field: &str| {
        schema
            .column_of(field)
            .map(|col| GridRegion::new(first_row, store_col(col as u32), row_count, 1))
    };

    if let Some(region) = column_region(merged_orders::ORDER_DATE) {
        store.set_number_format(sheet, region, ORDER_DATE_NUMBER_FORMAT)?;
    }
    if let Some(region) = column_region(merged::FULFILLED) {
        store.insert_checkboxes(sheet, region)?;
    }
    if let Some(region) = column_region(merged::SHIPPED) {
        store.insert_checkboxes(sheet, region)?;
    }
    for &offset in header_offsets {
        let region = GridRegion::new(first_row + offset, 1, 1, schema.width() as u32);
        store.set_background(sheet, region, SHADING_COLOR)?;
    }
    if let Some(region) = column_region(merged_orders::ORDER_KEY) {
        store.set_wrap_clip(sheet, region)?;
    }
    Ok(())
}

/// Record when the merge last ran, in the reserved corner of the header
/// block.
fn stamp_last_updated<S: GridStore>(
    store: &mut S,
    sheet: SheetId,
    config: &RunConfig,
) -> Result<(), ReconcileError> {
    let Some(timestamp) = config.timestamp else {
        return Ok(());
    };
    let stamp = vec![vec![
        FieldValue::from(TIMESTAMP_LABEL),
        FieldValue::from(timestamp.format("%Y-%m-%d %H:%M").to_string()),
    ]];
    store.write_region(sheet, 1, 1, &stamp)?;
    store.set_number_format(sheet, GridRegion::cell(1, 2), TIMESTAMP_NUMBER_FORMAT)?;
    Ok(())
}
