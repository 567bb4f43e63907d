use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use ledger_engine::{
    rebuild, reconcile, DatasetIds, RunConfig, RunReport, StoreLock, DEFAULT_HEADER_ROWS,
    DEFAULT_LOCK_TIMEOUT,
};
use ledger_io::{load_csv_sheet, write_csv_sheet};
use ledger_model::MemoryGrid;

const ORDERS_SHEET: ledger_model::SheetId = 1;
const SHIPMENTS_SHEET: ledger_model::SheetId = 2;
const MERGED_SHEET: ledger_model::SheetId = 3;
const LOOKUP_SHEET: ledger_model::SheetId = 4;

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// CLI arguments for the `ledger-merge` binary.
///
/// This lives in the library crate so the binary stays a thin wrapper and
/// integration tests can drive the same surface.
#[derive(Parser)]
#[command(
    about = "Merge the orders and shipments sheets into the denormalized orders-and-shipments ledger."
)]
pub struct Args {
    /// Orders dataset (CSV, header row first).
    orders: PathBuf,

    /// Shipments dataset (CSV, header row first).
    shipments: PathBuf,

    /// Merged ledger (CSV); updated in place unless --dry-run is given.
    merged: PathBuf,

    /// Store-name lookup table (CSV with storeId/storeName columns).
    #[arg(long = "store-lookup")]
    store_lookup: Option<PathBuf>,

    /// Leading header rows on the merged sheet.
    #[arg(long = "header-rows", default_value_t = DEFAULT_HEADER_ROWS)]
    header_rows: u32,

    /// Seconds to wait for exclusive access to the merged dataset.
    #[arg(long = "lock-timeout-secs", default_value_t = DEFAULT_LOCK_TIMEOUT.as_secs())]
    lock_timeout_secs: u64,

    /// Clear and rewrite every entry instead of merging incrementally.
    #[arg(long)]
    rebuild: bool,

    /// Run the merge but do not write the merged CSV back to disk.
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Skip writing the last-updated stamp into the header block.
    #[arg(long = "no-stamp")]
    no_stamp: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Exit non-zero when the run accumulated diagnostics.
    #[arg(long = "fail-on-diagnostics")]
    fail_on_diagnostics: bool,
}

#[derive(Debug, Serialize)]
struct JsonRun<'a> {
    orders: &'a str,
    shipments: &'a str,
    merged: &'a str,
    mode: &'static str,
    report: &'a RunReport,
}

pub fn run() -> Result<()> {
    run_with_args(Args::parse())
}

pub fn run_with_args(args: Args) -> Result<()> {
    let mut grid = MemoryGrid::new();
    load_csv_sheet(&mut grid, ORDERS_SHEET, "Orders", &args.orders)
        .with_context(|| format!("load orders sheet {}", args.orders.display()))?;
    load_csv_sheet(&mut grid, SHIPMENTS_SHEET, "Shipments", &args.shipments)
        .with_context(|| format!("load shipments sheet {}", args.shipments.display()))?;
    load_csv_sheet(&mut grid, MERGED_SHEET, "Orders and Shipments", &args.merged)
        .with_context(|| format!("load merged sheet {}", args.merged.display()))?;
    if let Some(path) = &args.store_lookup {
        load_csv_sheet(&mut grid, LOOKUP_SHEET, "Stores", path)
            .with_context(|| format!("load store lookup {}", path.display()))?;
    }

    let ids = DatasetIds {
        orders: ORDERS_SHEET,
        shipments: SHIPMENTS_SHEET,
        merged: MERGED_SHEET,
        store_lookup: args.store_lookup.as_ref().map(|_| LOOKUP_SHEET),
    };
    let config = RunConfig {
        header_rows: args.header_rows,
        lock_timeout: std::time::Duration::from_secs(args.lock_timeout_secs),
        timestamp: (!args.no_stamp).then(|| chrono::Local::now().naive_local()),
    };

    let lock = StoreLock::new(grid);
    let report = if args.rebuild {
        rebuild(&lock, &ids, &config).context("rebuild merged sheet")?
    } else {
        reconcile(&lock, &ids, &config).context("reconcile merged sheet")?
    };

    if !args.dry_run {
        let grid = lock
            .into_inner()
            .context("recover merged dataset from lock")?;
        write_csv_sheet(&grid, MERGED_SHEET, &args.merged)
            .with_context(|| format!("write merged sheet {}", args.merged.display()))?;
    }

    let mode = if args.rebuild { "rebuild" } else { "incremental" };
    match args.format {
        OutputFormat::Text => {
            println!("Merge run report ({mode})");
            println!("  orders:    {}", args.orders.display());
            println!("  shipments: {}", args.shipments.display());
            println!("  merged:    {}", args.merged.display());
            println!();
            println!(
                "Summary: orders-merged={} rows-appended={} cells-patched={} unmatched-shipments={}",
                report.orders_merged,
                report.rows_appended,
                report.cells_patched,
                report.unmatched_shipments
            );
            for diagnostic in &report.diagnostics {
                println!("{diagnostic}");
            }
        }
        OutputFormat::Json => {
            let orders = args.orders.to_string_lossy().into_owned();
            let shipments = args.shipments.to_string_lossy().into_owned();
            let merged = args.merged.to_string_lossy().into_owned();
            let json = JsonRun {
                orders: &orders,
                shipments: &shipments,
                merged: &merged,
                mode,
                report: &report,
            };
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer(&mut handle, &json)?;
            handle.write_all(b"\n")?;
        }
    }

    if args.fail_on_diagnostics && !report.diagnostics.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
