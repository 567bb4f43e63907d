//! Building enriched merged records from order and shipment data.
//!
//! Derived fields are computed as plain values; the destination grid's
//! formula concept only matters when reading existing cells back for patch
//! eligibility.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use ledger_model::fields::{
    merged, merged_orders, qualify, source, ORDERS_PREFIX, SHIPMENTS_PREFIX,
};
use ledger_model::{FieldValue, Record, SchemaRegistry};

use crate::matching::{match_shipments, SOURCE_ITEM_KEYS};
use crate::rows::serialize_records;

/// Item-name text flagging a shipment row that could not be paired with any
/// order line, so it stays distinguishable from genuine matches.
pub const UNMATCHED_ITEM_MARKER: &str = "!extra shipment data: couldn't match with an order";

/// Order-status literal that marks a line item shipped even without a
/// matched shipment record. Both rules coexist historically.
pub const SHIPPED_STATUS: &str = "shipped";

/// Placeholder written into the opposite entry kind's checkbox column
/// (shipped on header rows, fulfilled on item rows) so the grid renders no
/// checkbox there.
const CHECKBOX_PLACEHOLDER: &str = " ";

/// Per-run inputs the merger needs beyond the records themselves.
#[derive(Clone, Copy, Debug)]
pub struct MergeContext<'a> {
    /// Store id → lookup record (`storeId`/`storeName` columns), built with
    /// `index_by` from the lookup sheet.
    pub store_names: &'a HashMap<String, Record>,
    /// Order-level fields copied onto each entry's header row.
    pub header_fields: &'a [String],
}

/// One order's full set of output rows: the order-level header record,
/// followed by one record per line item, followed by rows for shipment
/// installments that matched no line item.
#[derive(Clone, Debug)]
pub struct MergedEntry {
    records: Vec<Record>,
    item_count: usize,
    unmatched_count: usize,
}

impl MergedEntry {
    pub fn header(&self) -> &Record {
        &self.records[0]
    }

    pub fn items(&self) -> &[Record] {
        &self.records[1..1 + self.item_count]
    }

    pub fn unmatched_rows(&self) -> &[Record] {
        &self.records[1 + self.item_count..]
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn unmatched_count(&self) -> usize {
        self.unmatched_count
    }

    /// Serialize this entry against the destination schema, header row
    /// first.
    pub fn to_rows(&self, schema: &SchemaRegistry) -> Vec<Vec<FieldValue>> {
        serialize_records(schema, &self.records)
    }
}

/// Build the complete [`MergedEntry`] for one order: pair its shipments,
/// build item records, derive the header record, and append rows for
/// unconsumed shipments.
pub fn build_entry(
    order_items: &[Record],
    shipments: &[Record],
    ctx: &MergeContext<'_>,
) -> MergedEntry {
    let outcome = match_shipments(order_items, shipments, &SOURCE_ITEM_KEYS);
    let items: Vec<Record> = order_items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let matched = outcome.shipment_for(index).map(|s| &shipments[s]);
            build_item_record(item, matched)
        })
        .collect();

    let header = build_header_record(&order_items[0], &items, ctx);
    let fallback_date = date_prefix(&order_items[0].text(source::ORDER_DATE));
    let unmatched: Vec<Record> = outcome
        .unmatched(shipments.len())
        .into_iter()
        .map(|index| build_unmatched_shipment_row(&shipments[index], &fallback_date))
        .collect();

    let item_count = items.len();
    let unmatched_count = unmatched.len();
    let mut records = Vec::with_capacity(1 + item_count + unmatched_count);
    records.push(header);
    records.extend(items);
    records.extend(unmatched);
    MergedEntry {
        records,
        item_count,
        unmatched_count,
    }
}

/// Build an order's header record from its first item and the already-built
/// item records (`items.len()` is the entry's item count, always ≥ 1).
///
/// Copies the order-level allow-list, marks the row as a header, and
/// computes: fulfilled = AND over the item records' shipped flags, order
/// total = sum of their item totals, store name from the lookup table.
pub fn build_header_record(
    order_first_item: &Record,
    items: &[Record],
    ctx: &MergeContext<'_>,
) -> Record {
    debug_assert!(!items.is_empty(), "an order always has at least one item");

    let qualified = order_first_item.qualified(ORDERS_PREFIX);
    let mut record = Record::with_capacity(ctx.header_fields.len() + 6);
    for field in ctx.header_fields {
        if let Some(value) = qualified.get(field) {
            if !value.is_blank() {
                record.insert(field.clone(), value.clone());
            }
        }
    }
    record.insert(merged::ORDER_HEADER, true);
    record.insert(merged::SHIPPED, CHECKBOX_PLACEHOLDER);

    let store_id = order_first_item.text(source::STORE_ID);
    if let Some(entry) = ctx.store_names.get(&store_id) {
        record.insert(merged::STORE_NAME, entry.text(source::STORE_LOOKUP_NAME));
    }

    let fulfilled = items.iter().all(|item| item.bool_like(merged::SHIPPED));
    record.insert(merged::FULFILLED, fulfilled);

    let order_total: f64 = items.iter().map(|item| item.number(merged::ITEM_TOTAL)).sum();
    record.insert(merged::ORDER_TOTAL, order_total);

    insert_order_date(&mut record, order_first_item);
    record
}

/// Build one line item's record: the order item's fields, the matched
/// shipment's fields when a match exists, and the derived columns.
pub fn build_item_record(order_item: &Record, matched_shipment: Option<&Record>) -> Record {
    let mut record = order_item.qualified(ORDERS_PREFIX);
    record.insert(merged::FULFILLED, CHECKBOX_PLACEHOLDER);
    insert_order_date(&mut record, order_item);

    let quantity = order_item.number(source::ITEM_QUANTITY);
    let unit_price = order_item.number(source::ITEM_UNIT_PRICE);
    record.insert(merged::ITEM_TOTAL, quantity * unit_price);

    // Shipped if either rule says so; a matched shipment overrides below.
    let status_shipped = order_item.text(source::ORDER_STATUS) == SHIPPED_STATUS;
    record.insert(merged::SHIPPED, status_shipped);

    if let Some(shipment) = matched_shipment {
        for (name, value) in build_shipment_patch(shipment).iter() {
            record.insert(name.to_string(), value.clone());
        }
    }
    record
}

/// A row for a shipment installment with no corresponding order line: the
/// shipment's fields plus derived columns, shipped = true, fulfilled not
/// applicable, order date taken from the order the shipment was grouped
/// under, and the item name replaced by the could-not-match marker.
pub fn build_unmatched_shipment_row(shipment: &Record, order_date_fallback: &str) -> Record {
    let mut record = build_shipment_patch(shipment);
    record.insert(merged::FULFILLED, CHECKBOX_PLACEHOLDER);
    if !order_date_fallback.is_empty() {
        record.insert(merged_orders::ORDER_DATE, order_date_fallback);
    }
    record.insert(merged_orders::ITEM_NAME, UNMATCHED_ITEM_MARKER);
    record
}

/// The shipment-derived fields for one shipment record: every shipment
/// column under its `shipments_` name, the derived merged columns, and
/// shipped = true. This is both what a matched item row absorbs and what the
/// driver patches into existing merged rows.
pub fn build_shipment_patch(shipment: &Record) -> Record {
    let mut record = shipment.qualified(SHIPMENTS_PREFIX);
    add_dimensions(&mut record, shipment);
    add_weight(&mut record, shipment);
    add_carrier_service(&mut record, shipment);
    add_quarter(&mut record, shipment);
    record.insert(merged::SHIPPED, true);
    record
}

fn insert_order_date(record: &mut Record, order_item: &Record) {
    // Source order dates carry a time suffix; only the `YYYY-MM-DD` prefix
    // lands on the sheet.
    let date = date_prefix(&order_item.text(source::ORDER_DATE));
    if !date.is_empty() {
        record.insert(qualify(ORDERS_PREFIX, source::ORDER_DATE), date);
    }
}

fn add_dimensions(record: &mut Record, shipment: &Record) {
    let length = shipment.value(source::DIMENSIONS_LENGTH);
    let width = shipment.value(source::DIMENSIONS_WIDTH);
    let height = shipment.value(source::DIMENSIONS_HEIGHT);
    if length.is_blank() && width.is_blank() && height.is_blank() {
        return;
    }
    record.insert(
        merged::DIMENSIONS,
        format!("{}X{}X{}", length.display(), width.display(), height.display()),
    );
}

fn add_weight(record: &mut Record, shipment: &Record) {
    if shipment.value(source::WEIGHT_VALUE).is_blank() {
        return;
    }
    // Weights arrive in ounces; the sheet shows pounds and ounces.
    let ounces = shipment.number(source::WEIGHT_VALUE);
    let pounds = (ounces / 16.0).floor();
    let remainder = ounces % 16.0;
    record.insert(
        merged::WEIGHT,
        format!(
            "{} lb {} oz",
            FieldValue::Number(pounds).display(),
            FieldValue::Number(remainder).display()
        ),
    );
}

fn add_carrier_service(record: &mut Record, shipment: &Record) {
    let code = shipment.text(source::SERVICE_CODE);
    if code.is_empty() {
        return;
    }
    let (carrier, service) = match code.split_once('_') {
        Some((carrier, service)) => (carrier.to_string(), Some(service.to_string())),
        None => (code, None),
    };
    record.insert(merged::CARRIER_USED, carrier.clone());
    record.insert(merged::CARRIER_CODE, carrier);
    if let Some(service) = service {
        record.insert(merged::SERVICE_USED, service.clone());
        record.insert(merged::SERVICE_CODE, service);
    }
}

fn add_quarter(record: &mut Record, shipment: &Record) {
    let ship_date = date_prefix(&shipment.text(source::SHIP_DATE));
    let Ok(date) = NaiveDate::parse_from_str(&ship_date, "%Y-%m-%d") else {
        return;
    };
    let quarter = date.month().div_ceil(3);
    record.insert(merged::QUARTER, format!("Q{} {}", quarter, date.year()));
}

/// First ten characters of a date-bearing string (`2019-04-10T18:29:00` →
/// `2019-04-10`).
fn date_prefix(text: &str) -> String {
    text.chars().take(10).collect()
}
