use anyhow::Result;
use tracing::info;

use super::pipeline::{print_entries_json, print_preview};
use crate::cli::OutlineArgs;
use crate::pdf::read_outline;

pub fn run(args: OutlineArgs) -> Result<()> {
    let entries = read_outline(&args.input)?;
    info!(input = %args.input.display(), entries = entries.len(), "read existing outline");

    if args.json {
        print_entries_json(&entries)
    } else {
        print_preview(&entries)
    }
}
