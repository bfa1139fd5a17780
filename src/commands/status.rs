use std::io::{self, Write};

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::ledger::Ledger;

pub fn run(args: StatusArgs) -> Result<()> {
    let ledger_path = args.resolved_ledger_path();

    info!(ledger = %ledger_path.display(), "status requested");

    if !ledger_path.exists() {
        warn!(path = %ledger_path.display(), "ledger file missing; no batch has run here yet");
        return Ok(());
    }

    let ledger = Ledger::open(&ledger_path)?;
    let summary = ledger.summary()?;
    let failures = ledger.failures()?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Ledger: {}", ledger_path.display())?;
    writeln!(output, "Documents: {}", summary.documents)?;
    writeln!(output, "\tcompleted: {}", summary.completed)?;
    writeln!(output, "\tempty: {}", summary.empty)?;
    writeln!(output, "\tfailed: {}", summary.failed)?;
    writeln!(output, "TOC entries: {}", summary.total_entries)?;
    if let Some(last) = &summary.last_processed_at {
        writeln!(output, "Last processed: {last}")?;
    }

    if !failures.is_empty() {
        writeln!(output)?;
        writeln!(output, "Failures:")?;
        for failure in &failures {
            writeln!(
                output,
                "\t{} [{}] {}",
                failure.path, failure.processed_at, failure.error
            )?;
        }
    }
    output.flush()?;

    Ok(())
}
