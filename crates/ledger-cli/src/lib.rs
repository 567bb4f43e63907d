//! Command-line surface for the orders/shipments merge.

pub mod cli;
