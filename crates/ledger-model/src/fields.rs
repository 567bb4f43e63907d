//! Field-name conventions shared by the source sheets and the merged sheet.
//!
//! Source sheets carry raw property-path names (`orderKey`, `items_1_name`).
//! Merged-sheet columns qualify those with their source
//! (`orders_orderKey`, `shipments_shipDate`) and computed columns use the
//! `merged_` prefix. Header text is the single source of truth for field
//! identity; nothing here trims or case-folds.

/// Column-name prefix for order-sourced fields on the merged sheet.
pub const ORDERS_PREFIX: &str = "orders_";
/// Column-name prefix for shipment-sourced fields on the merged sheet.
pub const SHIPMENTS_PREFIX: &str = "shipments_";
/// Column-name prefix for computed fields on the merged sheet.
pub const MERGED_PREFIX: &str = "merged_";

/// Raw field names as they appear on the source sheets.
///
/// Item-level fields carry the `_1_` suffix of the latest source revision;
/// earlier unsuffixed layouts are superseded.
pub mod source {
    /// Grouping key for both datasets.
    pub const ORDER_KEY: &str = "orderKey";
    /// Order identifier used by the matcher (distinct from the grouping key).
    pub const ORDER_NUMBER: &str = "orderNumber";
    pub const ORDER_DATE: &str = "orderDate";
    pub const ORDER_STATUS: &str = "orderStatus";
    pub const ITEM_NAME: &str = "items_1_name";
    pub const ITEM_QUANTITY: &str = "items_1_quantity";
    pub const ITEM_UNIT_PRICE: &str = "items_1_unitPrice";
    pub const STORE_ID: &str = "advancedOptions_storeId";

    /// Key column of the store-name lookup table.
    pub const STORE_LOOKUP_ID: &str = "storeId";
    /// Value column of the store-name lookup table.
    pub const STORE_LOOKUP_NAME: &str = "storeName";

    pub const SHIPMENT_ITEM_NAME: &str = "shipmentItems_1_name";
    pub const SHIPMENT_ITEM_QUANTITY: &str = "shipmentItems_1_quantity";
    pub const SHIP_DATE: &str = "shipDate";
    pub const SERVICE_CODE: &str = "serviceCode";
    pub const DIMENSIONS_LENGTH: &str = "dimensions_length";
    pub const DIMENSIONS_WIDTH: &str = "dimensions_width";
    pub const DIMENSIONS_HEIGHT: &str = "dimensions_height";
    pub const WEIGHT_VALUE: &str = "weight_value";
}

/// Fully-qualified merged-sheet column names.
pub mod merged {
    /// Marker distinguishing an order's header row from its item rows.
    pub const ORDER_HEADER: &str = "merged_orderHeader";
    pub const FULFILLED: &str = "merged_fulfilled";
    pub const SHIPPED: &str = "merged_shipped";
    pub const ORDER_TOTAL: &str = "merged_orderTotal";
    pub const ITEM_TOTAL: &str = "merged_itemTotal";
    pub const STORE_NAME: &str = "merged_storeName";
    pub const DIMENSIONS: &str = "merged_dimensions";
    pub const WEIGHT: &str = "merged_weight";
    pub const CARRIER_CODE: &str = "merged_carrierCode";
    pub const SERVICE_CODE: &str = "merged_serviceCode";
    pub const CARRIER_USED: &str = "merged_carrierUsed";
    pub const SERVICE_USED: &str = "merged_serviceUsed";
    pub const QUARTER: &str = "merged_quarter";
}

/// Merged-sheet column names for order-sourced fields the engine reads back.
pub mod merged_orders {
    pub const ORDER_KEY: &str = "orders_orderKey";
    pub const ORDER_NUMBER: &str = "orders_orderNumber";
    pub const ORDER_DATE: &str = "orders_orderDate";
    pub const ITEM_NAME: &str = "orders_items_1_name";
    pub const ITEM_QUANTITY: &str = "orders_items_1_quantity";
}

/// Qualify a raw source field name with a merged-sheet prefix.
pub fn qualify(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

/// Order-level fields copied onto an entry's header row when the destination
/// sheet does not flag its own selection (see
/// `SchemaRegistry::main_entry_fields`).
pub const DEFAULT_HEADER_FIELDS: &[&str] = &[
    "orders_orderKey",
    "orders_orderNumber",
    "orders_orderDate",
    "orders_shipTo_name",
    "orders_shipTo_street1",
    "orders_shipTo_city",
    "orders_shipTo_state",
    "orders_shipTo_postalCode",
    "orders_advancedOptions_storeId",
    "orders_advancedOptions_billToAccount",
    "orders_taxAmount",
    "orders_shippingAmount",
];
