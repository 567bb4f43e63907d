//! End-to-end driver runs against the in-memory grid store.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ledger_engine::{rebuild, reconcile, DatasetIds, ReconcileError, RunConfig, StoreLock};
use ledger_model::{
    FieldValue, FormatOp, GridRegion, GridStore, MemoryGrid, SchemaRegistry, SheetId,
};
use pretty_assertions::assert_eq;

const ORDERS: SheetId = 1;
const SHIPMENTS: SheetId = 2;
const MERGED: SheetId = 3;
const LOOKUP: SheetId = 4;

const MERGED_HEADERS: &[&str] = &[
    "orders_orderKey",
    "orders_orderNumber",
    "orders_orderDate",
    "merged_orderHeader",
    "merged_fulfilled",
    "merged_shipped",
    "merged_orderTotal",
    "merged_itemTotal",
    "orders_items_1_name",
    "orders_items_1_quantity",
    "orders_items_1_unitPrice",
    "merged_storeName",
    "merged_dimensions",
    "merged_weight",
    "merged_carrierUsed",
    "merged_serviceUsed",
    "merged_carrierCode",
    "merged_serviceCode",
    "merged_quarter",
    "shipments_shipDate",
    "shipments_trackingNumber",
];

fn text_row(values: &[&str]) -> Vec<FieldValue> {
    values
        .iter()
        .map(|v| {
            if v.is_empty() {
                FieldValue::Empty
            } else {
                FieldValue::from(*v)
            }
        })
        .collect()
}

fn order_row(key: &str, number: &str, status: &str, item: &str, qty: f64, price: f64) -> Vec<FieldValue> {
    vec![
        key.into(),
        number.into(),
        "2019-04-10T18:29:00".into(),
        status.into(),
        item.into(),
        qty.into(),
        price.into(),
        "42".into(),
    ]
}

fn shipment_row(key: &str, number: &str, item: &str, qty: f64, weight: f64) -> Vec<FieldValue> {
    vec![
        key.into(),
        number.into(),
        "2019-05-02".into(),
        item.into(),
        qty.into(),
        "ups_ground".into(),
        weight.into(),
        10.0.into(),
        5.0.into(),
        3.0.into(),
        "1Z999".into(),
    ]
}

/// Fresh grid with empty data regions: merged sheet holds its header row
/// plus a flag row selecting the order-level fields.
fn setup_grid() -> MemoryGrid {
    let mut grid = MemoryGrid::new();

    grid.add_sheet(ORDERS, "Orders");
    grid.write_region(
        ORDERS,
        1,
        1,
        &[text_row(&[
            "orderKey",
            "orderNumber",
            "orderDate",
            "orderStatus",
            "items_1_name",
            "items_1_quantity",
            "items_1_unitPrice",
            "advancedOptions_storeId",
        ])],
    )
    .unwrap();

    grid.add_sheet(SHIPMENTS, "Shipments");
    grid.write_region(
        SHIPMENTS,
        1,
        1,
        &[text_row(&[
            "orderKey",
            "orderNumber",
            "shipDate",
            "shipmentItems_1_name",
            "shipmentItems_1_quantity",
            "serviceCode",
            "weight_value",
            "dimensions_length",
            "dimensions_width",
            "dimensions_height",
            "trackingNumber",
        ])],
    )
    .unwrap();

    grid.add_sheet(MERGED, "Orders and Shipments");
    let mut flag_row = vec![FieldValue::Empty; MERGED_HEADERS.len()];
    flag_row[0] = FieldValue::Bool(true); // orders_orderKey
    flag_row[1] = FieldValue::Bool(true); // orders_orderNumber
    flag_row[2] = FieldValue::Bool(true); // orders_orderDate
    grid.write_region(MERGED, 1, 1, &[text_row(MERGED_HEADERS), flag_row])
        .unwrap();

    grid.add_sheet(LOOKUP, "Stores");
    grid.write_region(
        LOOKUP,
        1,
        1,
        &[
            text_row(&["storeId", "storeName"]),
            text_row(&["42", "Main Street Store"]),
        ],
    )
    .unwrap();

    grid
}

fn ids() -> DatasetIds {
    DatasetIds {
        orders: ORDERS,
        shipments: SHIPMENTS,
        merged: MERGED,
        store_lookup: Some(LOOKUP),
    }
}

fn config() -> RunConfig {
    RunConfig {
        header_rows: 2,
        lock_timeout: Duration::from_millis(200),
        timestamp: None,
    }
}

fn merged_col(field: &str) -> u32 {
    let schema = SchemaRegistry::from_fields(MERGED_HEADERS.iter().map(|f| f.to_string()));
    schema.column_of(field).expect("field in fixture schema") as u32 + 1
}

fn cell(grid: &MemoryGrid, row: u32, field: &str) -> FieldValue {
    grid.read_region(MERGED, GridRegion::cell(row, merged_col(field)))
        .unwrap()
        .remove(0)
        .remove(0)
}

#[test]
fn order_without_shipment_gets_totals_and_false_flags() {
    // Scenario A.
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K1", "100", "pending", "Widget", 2.0, 5.0)])
        .unwrap();
    let lock = StoreLock::new(grid);

    let report = reconcile(&lock, &ids(), &config()).unwrap();
    assert_eq!(report.orders_merged, 1);
    assert_eq!(report.rows_appended, 2);
    assert_eq!(report.cells_patched, 0);

    let grid = lock.into_inner().unwrap();
    // Row 3 = entry header, row 4 = the item.
    assert_eq!(cell(&grid, 3, "merged_orderHeader"), FieldValue::Bool(true));
    assert_eq!(cell(&grid, 3, "merged_fulfilled"), FieldValue::Bool(false));
    assert_eq!(cell(&grid, 3, "merged_orderTotal"), FieldValue::Number(10.0));
    assert_eq!(cell(&grid, 3, "merged_storeName"), FieldValue::from("Main Street Store"));
    assert_eq!(cell(&grid, 3, "orders_orderDate"), FieldValue::from("2019-04-10"));
    assert_eq!(cell(&grid, 4, "merged_itemTotal"), FieldValue::Number(10.0));
    assert_eq!(cell(&grid, 4, "merged_shipped"), FieldValue::Bool(false));
    assert_eq!(cell(&grid, 4, "shipments_shipDate"), FieldValue::Empty);
    assert_eq!(cell(&grid, 4, "merged_weight"), FieldValue::Empty);
}

#[test]
fn matched_shipment_enriches_item_and_fulfills_header() {
    // Scenario B.
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K1", "100", "pending", "Widget", 2.0, 5.0)])
        .unwrap();
    grid.append_rows(SHIPMENTS, &[shipment_row("K1", "100", "Widget", 2.0, 20.0)])
        .unwrap();
    let lock = StoreLock::new(grid);

    let report = reconcile(&lock, &ids(), &config()).unwrap();
    assert_eq!(report.rows_appended, 2);
    assert_eq!(report.unmatched_shipments, 0);

    let grid = lock.into_inner().unwrap();
    assert_eq!(cell(&grid, 4, "merged_weight"), FieldValue::from("1 lb 4 oz"));
    assert_eq!(cell(&grid, 4, "merged_dimensions"), FieldValue::from("10X5X3"));
    assert_eq!(cell(&grid, 4, "merged_carrierUsed"), FieldValue::from("ups"));
    assert_eq!(cell(&grid, 4, "merged_serviceUsed"), FieldValue::from("ground"));
    assert_eq!(cell(&grid, 4, "merged_quarter"), FieldValue::from("Q2 2019"));
    assert_eq!(cell(&grid, 4, "merged_shipped"), FieldValue::Bool(true));
    assert_eq!(cell(&grid, 4, "shipments_trackingNumber"), FieldValue::from("1Z999"));
    assert_eq!(cell(&grid, 3, "merged_fulfilled"), FieldValue::Bool(true));
}

#[test]
fn shipment_without_matching_item_becomes_marker_row() {
    // Scenario C: the order exists but no line item matches on name/qty.
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K2", "200", "pending", "Gadget", 1.0, 8.0)])
        .unwrap();
    grid.append_rows(SHIPMENTS, &[shipment_row("K2", "200", "Gadget", 2.0, 16.0)])
        .unwrap();
    let lock = StoreLock::new(grid);

    let report = reconcile(&lock, &ids(), &config()).unwrap();
    assert_eq!(report.rows_appended, 3);
    assert_eq!(report.unmatched_shipments, 1);

    let grid = lock.into_inner().unwrap();
    // Row 5 is the unmatched-shipment row.
    assert_eq!(
        cell(&grid, 5, "orders_items_1_name"),
        FieldValue::from("!extra shipment data: couldn't match with an order")
    );
    assert_eq!(cell(&grid, 5, "merged_shipped"), FieldValue::Bool(true));
    assert_eq!(cell(&grid, 5, "orders_orderDate"), FieldValue::from("2019-04-10"));
    assert_eq!(cell(&grid, 5, "merged_weight"), FieldValue::from("1 lb 0 oz"));
    // The genuine item row stays unshipped.
    assert_eq!(cell(&grid, 4, "merged_shipped"), FieldValue::Bool(false));
    assert_eq!(cell(&grid, 3, "merged_fulfilled"), FieldValue::Bool(false));
}

#[test]
fn existing_rows_are_patched_only_where_blank() {
    // Scenario D: merge once without the shipment, then re-run with it.
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K1", "100", "pending", "Widget", 2.0, 5.0)])
        .unwrap();
    let lock = StoreLock::new(grid);
    reconcile(&lock, &ids(), &config()).unwrap();

    {
        let mut grid = lock.acquire(Duration::from_millis(50)).unwrap();
        grid.append_rows(SHIPMENTS, &[shipment_row("K1", "100", "Widget", 2.0, 20.0)])
            .unwrap();
    }

    let report = reconcile(&lock, &ids(), &config()).unwrap();
    assert_eq!(report.rows_appended, 0, "no new orders to append");
    assert!(report.cells_patched > 0);
    assert!(report.diagnostics.is_empty());

    let grid = lock.into_inner().unwrap();
    assert_eq!(cell(&grid, 4, "merged_weight"), FieldValue::from("1 lb 4 oz"));
    assert_eq!(cell(&grid, 4, "shipments_shipDate"), FieldValue::from("2019-05-02"));
    // Pre-existing non-blank cells survive: shipped stayed FALSE from the
    // first run and the item total is untouched.
    assert_eq!(cell(&grid, 4, "merged_shipped"), FieldValue::Bool(false));
    assert_eq!(cell(&grid, 4, "merged_itemTotal"), FieldValue::Number(10.0));
}

#[test]
fn formula_cells_are_never_patched() {
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K1", "100", "pending", "Widget", 2.0, 5.0)])
        .unwrap();
    let lock = StoreLock::new(grid);
    reconcile(&lock, &ids(), &config()).unwrap();

    {
        let mut grid = lock.acquire(Duration::from_millis(50)).unwrap();
        grid.append_rows(SHIPMENTS, &[shipment_row("K1", "100", "Widget", 2.0, 20.0)])
            .unwrap();
        // The weight cell of the item row carries a formula with no value.
        let weight_col = merged_col("merged_weight");
        grid.set_cell_content(
            MERGED,
            4,
            weight_col,
            ledger_model::CellContent::formula("=B4&\" oz\""),
        )
        .unwrap();
    }

    reconcile(&lock, &ids(), &config()).unwrap();
    let grid = lock.into_inner().unwrap();
    let content = grid.cell_content(MERGED, 4, merged_col("merged_weight")).unwrap();
    assert_eq!(content.formula.as_deref(), Some("=B4&\" oz\""));
    assert!(content.value.is_blank());
}

#[test]
fn rerun_with_unchanged_sources_appends_nothing() {
    // Scenario E.
    let mut grid = setup_grid();
    grid.append_rows(
        ORDERS,
        &[
            order_row("K1", "100", "pending", "Widget", 2.0, 5.0),
            order_row("K2", "200", "shipped", "Gadget", 1.0, 8.0),
        ],
    )
    .unwrap();
    grid.append_rows(SHIPMENTS, &[shipment_row("K1", "100", "Widget", 2.0, 20.0)])
        .unwrap();
    let lock = StoreLock::new(grid);

    let first = reconcile(&lock, &ids(), &config()).unwrap();
    assert_eq!(first.orders_merged, 2);
    let rows_after_first = lock
        .acquire(Duration::from_millis(50))
        .unwrap()
        .last_row(MERGED)
        .unwrap();

    let second = reconcile(&lock, &ids(), &config()).unwrap();
    assert_eq!(second.orders_merged, 0);
    assert_eq!(second.rows_appended, 0);

    let grid = lock.into_inner().unwrap();
    assert_eq!(grid.last_row(MERGED).unwrap(), rows_after_first);
}

#[test]
fn unmatchable_shipment_under_existing_key_logs_diagnostic() {
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K2", "200", "pending", "Gadget", 1.0, 8.0)])
        .unwrap();
    let lock = StoreLock::new(grid);
    reconcile(&lock, &ids(), &config()).unwrap();

    {
        let mut grid = lock.acquire(Duration::from_millis(50)).unwrap();
        // Quantity drift: matches no merged row for K2.
        grid.append_rows(SHIPMENTS, &[shipment_row("K2", "200", "Gadget", 3.0, 16.0)])
            .unwrap();
    }

    let report = reconcile(&lock, &ids(), &config()).unwrap();
    assert_eq!(report.rows_appended, 0);
    assert_eq!(report.cells_patched, 0);
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.diagnostics[0].message.contains("K2"));
}

#[test]
fn lock_timeout_aborts_without_mutation() {
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K1", "100", "pending", "Widget", 2.0, 5.0)])
        .unwrap();
    let lock = Arc::new(StoreLock::new(grid));

    let held = lock.acquire(Duration::from_millis(50)).unwrap();
    let contender = Arc::clone(&lock);
    let result = thread::spawn(move || {
        let config = RunConfig {
            lock_timeout: Duration::from_millis(60),
            ..config()
        };
        reconcile(&contender, &ids(), &config)
    })
    .join()
    .unwrap();
    assert!(matches!(result, Err(ReconcileError::Lock(_))));

    // Nothing was read or written while the lock was held elsewhere.
    assert_eq!(held.last_row(MERGED).unwrap(), 2);
    drop(held);
    let lock = Arc::try_unwrap(lock).unwrap();
    assert_eq!(lock.into_inner().unwrap().last_row(MERGED).unwrap(), 2);
}

#[test]
fn blank_source_rows_never_become_entries() {
    let mut grid = setup_grid();
    grid.append_rows(
        ORDERS,
        &[
            vec![FieldValue::Empty; 8],
            order_row("K1", "100", "pending", "Widget", 1.0, 4.0),
        ],
    )
    .unwrap();
    let lock = StoreLock::new(grid);
    let report = reconcile(&lock, &ids(), &config()).unwrap();
    assert_eq!(report.orders_merged, 1);
    assert_eq!(report.rows_appended, 2);
}

#[test]
fn append_requests_formats_before_data() {
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K1", "100", "pending", "Widget", 2.0, 5.0)])
        .unwrap();
    let lock = StoreLock::new(grid);
    reconcile(&lock, &ids(), &config()).unwrap();

    let grid = lock.into_inner().unwrap();
    let ops = grid.format_ops(MERGED).unwrap();
    let checkbox_regions: Vec<&GridRegion> = ops
        .iter()
        .filter_map(|op| match op {
            FormatOp::Checkboxes { region } => Some(region),
            _ => None,
        })
        .collect();
    assert_eq!(checkbox_regions.len(), 2);
    assert!(checkbox_regions.iter().all(|r| r.row_start == 3 && r.row_count == 2));
    assert!(ops.iter().any(|op| matches!(
        op,
        FormatOp::Background { region, .. } if region.row_start == 3
    )));
    assert!(ops.iter().any(|op| matches!(op, FormatOp::WrapClip { .. })));
}

#[test]
fn rebuild_clears_and_rewrites_all_entries() {
    let mut grid = setup_grid();
    grid.append_rows(ORDERS, &[order_row("K1", "100", "pending", "Widget", 2.0, 5.0)])
        .unwrap();
    // Stale junk below the headers that a rebuild must discard.
    grid.write_region(MERGED, 3, 1, &[text_row(&["stale", "stale", "stale"])])
        .unwrap();
    grid.write_region(MERGED, 9, 1, &[text_row(&["more-stale"])]).unwrap();
    let lock = StoreLock::new(grid);

    let report = rebuild(&lock, &ids(), &config()).unwrap();
    assert_eq!(report.orders_merged, 1);
    assert_eq!(report.rows_appended, 2);

    let grid = lock.into_inner().unwrap();
    assert_eq!(cell(&grid, 3, "orders_orderKey"), FieldValue::from("K1"));
    assert_eq!(cell(&grid, 4, "merged_itemTotal"), FieldValue::Number(10.0));
    assert_eq!(grid.last_row(MERGED).unwrap(), 4, "junk rows are gone");
}

#[test]
fn timestamp_lands_in_reserved_header_corner() {
    // A merged layout whose first two columns are the reserved stamp corner
    // (no header text), as on the production sheet.
    let mut grid = MemoryGrid::new();
    grid.add_sheet(ORDERS, "Orders");
    grid.write_region(
        ORDERS,
        1,
        1,
        &[text_row(&["orderKey", "orderNumber", "orderDate", "items_1_name", "items_1_quantity", "items_1_unitPrice"])],
    )
    .unwrap();
    grid.append_rows(
        ORDERS,
        &[vec![
            "K1".into(),
            "100".into(),
            "2019-04-10T00:00:00".into(),
            "Widget".into(),
            1.0.into(),
            2.0.into(),
        ]],
    )
    .unwrap();
    grid.add_sheet(SHIPMENTS, "Shipments");
    grid.write_region(SHIPMENTS, 1, 1, &[text_row(&["orderKey"])]).unwrap();
    grid.add_sheet(MERGED, "Orders and Shipments");
    let mut headers = vec![FieldValue::Empty, FieldValue::Empty];
    headers.extend(text_row(&[
        "orders_orderKey",
        "orders_orderDate",
        "merged_orderHeader",
        "merged_fulfilled",
        "merged_shipped",
        "merged_itemTotal",
        "orders_items_1_name",
        "orders_items_1_quantity",
    ]));
    grid.write_region(MERGED, 1, 1, &[headers]).unwrap();
    let lock = StoreLock::new(grid);

    let config = RunConfig {
        header_rows: 1,
        lock_timeout: Duration::from_millis(100),
        timestamp: Some(
            chrono::NaiveDate::from_ymd_opt(2020, 1, 29)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
        ),
    };
    let ids = DatasetIds {
        orders: ORDERS,
        shipments: SHIPMENTS,
        merged: MERGED,
        store_lookup: None,
    };
    reconcile(&lock, &ids, &config).unwrap();

    let grid = lock.into_inner().unwrap();
    let stamp = grid.read_region(MERGED, GridRegion::new(1, 1, 1, 2)).unwrap();
    assert_eq!(stamp[0][0], FieldValue::from("Last updated:"));
    assert_eq!(stamp[0][1], FieldValue::from("2020-01-29 08:30"));
}
