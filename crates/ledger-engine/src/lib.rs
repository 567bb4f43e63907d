//! `ledger-engine` reconciles the orders and shipments datasets into the
//! denormalized merged ledger.
//!
//! The pipeline is leaf-first: row projection turns cell blocks into
//! records, grouping collects them per order key, the matcher pairs
//! shipment installments with order line items, the merger derives the
//! enriched output records, and the driver orchestrates one incremental
//! (or full-rebuild) pass against the destination grid under an exclusive
//! bounded-wait lock.

mod driver;
pub mod grouping;
mod lock;
pub mod matching;
pub mod merge;
mod report;
pub mod rows;

pub use driver::{
    rebuild, reconcile, DatasetIds, ReconcileError, RunConfig, DEFAULT_HEADER_ROWS,
    DEFAULT_LOCK_TIMEOUT,
};
pub use lock::{LockError, StoreLock};
pub use report::{Diagnostic, DiagnosticKind, RunReport};
