use anyhow::Result;

fn main() -> Result<()> {
    ledger_cli::cli::run()
}
