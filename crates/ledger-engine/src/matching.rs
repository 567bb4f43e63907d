//! One-to-one pairing of shipment records with order line items.
//!
//! The matcher is pure: instead of flagging shipment records in place, it
//! returns the pairings plus the set of consumed shipment indices, so the
//! same inputs always produce the same outcome and nothing upstream is
//! mutated.

use std::collections::HashSet;

use ledger_model::{fields, Record};

/// Field names the equality predicate compares, per side.
///
/// Two fixed instances exist: source order items against shipments, and
/// existing merged rows against shipments. The predicate itself is not
/// configurable beyond that.
#[derive(Clone, Copy, Debug)]
pub struct MatchKeys {
    pub left_item_name: &'static str,
    pub left_item_quantity: &'static str,
    pub shipment_item_name: &'static str,
    pub shipment_item_quantity: &'static str,
    /// Order-identifier fields compared in addition to item identity; `None`
    /// when key-grouping already pins the order (existing-row patching).
    pub order_number: Option<(&'static str, &'static str)>,
}

/// Keys for matching shipments against source order line items.
pub const SOURCE_ITEM_KEYS: MatchKeys = MatchKeys {
    left_item_name: fields::source::ITEM_NAME,
    left_item_quantity: fields::source::ITEM_QUANTITY,
    shipment_item_name: fields::source::SHIPMENT_ITEM_NAME,
    shipment_item_quantity: fields::source::SHIPMENT_ITEM_QUANTITY,
    order_number: Some((fields::source::ORDER_NUMBER, fields::source::ORDER_NUMBER)),
};

/// Keys for matching shipments against rows already on the merged sheet,
/// which carry source-qualified column names and are grouped under the same
/// order key as the shipment.
pub const MERGED_ROW_KEYS: MatchKeys = MatchKeys {
    left_item_name: fields::merged_orders::ITEM_NAME,
    left_item_quantity: fields::merged_orders::ITEM_QUANTITY,
    shipment_item_name: fields::source::SHIPMENT_ITEM_NAME,
    shipment_item_quantity: fields::source::SHIPMENT_ITEM_QUANTITY,
    order_number: None,
};

/// One established pairing, by index into the two input slices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pairing {
    pub item_index: usize,
    pub shipment_index: usize,
}

/// Result of one matching pass.
#[derive(Clone, Debug, Default)]
pub struct MatchOutcome {
    pub pairings: Vec<Pairing>,
    /// Shipment indices consumed by this pass. A consumed shipment is never
    /// paired again and is not emitted as an unmatched row.
    pub matched: HashSet<usize>,
}

impl MatchOutcome {
    /// The shipment paired with a given item, if any.
    pub fn shipment_for(&self, item_index: usize) -> Option<usize> {
        self.pairings
            .iter()
            .find(|p| p.item_index == item_index)
            .map(|p| p.shipment_index)
    }

    /// Shipment indices left unconsumed, in original order.
    pub fn unmatched(&self, shipment_count: usize) -> Vec<usize> {
        (0..shipment_count)
            .filter(|i| !self.matched.contains(i))
            .collect()
    }
}

/// Pair each item with the first not-yet-consumed shipment satisfying the
/// equality predicate: item name, item quantity, and (when configured) order
/// number all strictly equal.
///
/// Equality is exact value equality: no fuzzy matching and no numeric
/// tolerance. Formatting drift upstream therefore under-matches; that is
/// accepted domain behavior. Ties break toward the lowest shipment index,
/// and each item receives at most one shipment.
pub fn match_shipments(items: &[Record], shipments: &[Record], keys: &MatchKeys) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    for (item_index, item) in items.iter().enumerate() {
        for (shipment_index, shipment) in shipments.iter().enumerate() {
            if outcome.matched.contains(&shipment_index) {
                continue;
            }
            if shipment_matches(item, shipment, keys) {
                outcome.matched.insert(shipment_index);
                outcome.pairings.push(Pairing {
                    item_index,
                    shipment_index,
                });
                break;
            }
        }
    }
    outcome
}

fn shipment_matches(item: &Record, shipment: &Record, keys: &MatchKeys) -> bool {
    if item.value(keys.left_item_name) != shipment.value(keys.shipment_item_name) {
        return false;
    }
    if item.value(keys.left_item_quantity) != shipment.value(keys.shipment_item_quantity) {
        return false;
    }
    match keys.order_number {
        Some((left, right)) => item.value(left) == shipment.value(right),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn order_item(name: &str, qty: f64, number: &str) -> Record {
        let mut r = Record::new();
        r.insert(fields::source::ITEM_NAME, name);
        r.insert(fields::source::ITEM_QUANTITY, qty);
        r.insert(fields::source::ORDER_NUMBER, number);
        r
    }

    fn shipment(name: &str, qty: f64, number: &str) -> Record {
        let mut r = Record::new();
        r.insert(fields::source::SHIPMENT_ITEM_NAME, name);
        r.insert(fields::source::SHIPMENT_ITEM_QUANTITY, qty);
        r.insert(fields::source::ORDER_NUMBER, number);
        r
    }

    #[test]
    fn earliest_unconsumed_shipment_wins() {
        let items = vec![order_item("Widget", 2.0, "100")];
        let shipments = vec![
            shipment("Widget", 2.0, "100"),
            shipment("Widget", 2.0, "100"),
        ];
        let outcome = match_shipments(&items, &shipments, &SOURCE_ITEM_KEYS);
        assert_eq!(outcome.shipment_for(0), Some(0));
        assert_eq!(outcome.unmatched(2), vec![1]);
    }

    #[test]
    fn each_shipment_consumed_at_most_once() {
        let items = vec![
            order_item("Widget", 2.0, "100"),
            order_item("Widget", 2.0, "100"),
        ];
        let shipments = vec![shipment("Widget", 2.0, "100")];
        let outcome = match_shipments(&items, &shipments, &SOURCE_ITEM_KEYS);
        assert_eq!(outcome.pairings.len(), 1);
        assert_eq!(outcome.shipment_for(0), Some(0));
        assert_eq!(outcome.shipment_for(1), None);
    }

    #[test]
    fn equality_is_strict_per_field() {
        let items = vec![order_item("Widget", 2.0, "100")];
        // Quantity as text does not equal quantity as number.
        let mut drifted = Record::new();
        drifted.insert(fields::source::SHIPMENT_ITEM_NAME, "Widget");
        drifted.insert(fields::source::SHIPMENT_ITEM_QUANTITY, "2");
        drifted.insert(fields::source::ORDER_NUMBER, "100");
        let outcome = match_shipments(&items, &[drifted], &SOURCE_ITEM_KEYS);
        assert!(outcome.pairings.is_empty());
    }

    #[test]
    fn order_number_mismatch_blocks_source_matching() {
        let items = vec![order_item("Widget", 2.0, "100")];
        let shipments = vec![shipment("Widget", 2.0, "999")];
        let outcome = match_shipments(&items, &shipments, &SOURCE_ITEM_KEYS);
        assert!(outcome.pairings.is_empty());
    }

    #[test]
    fn matching_is_deterministic_across_passes() {
        let items = vec![
            order_item("Widget", 2.0, "100"),
            order_item("Gadget", 1.0, "100"),
        ];
        let shipments = vec![
            shipment("Gadget", 1.0, "100"),
            shipment("Widget", 2.0, "100"),
            shipment("Widget", 2.0, "100"),
        ];
        let first = match_shipments(&items, &shipments, &SOURCE_ITEM_KEYS);
        let second = match_shipments(&items, &shipments, &SOURCE_ITEM_KEYS);
        assert_eq!(first.pairings, second.pairings);
        assert_eq!(first.matched, second.matched);
    }

    #[test]
    fn merged_row_keys_skip_order_number() {
        let mut existing_row = Record::new();
        existing_row.insert(fields::merged_orders::ITEM_NAME, "Widget");
        existing_row.insert(fields::merged_orders::ITEM_QUANTITY, 2.0);
        let shipments = vec![shipment("Widget", 2.0, "anything")];
        let outcome = match_shipments(&[existing_row], &shipments, &MERGED_ROW_KEYS);
        assert_eq!(outcome.pairings.len(), 1);
    }
}
