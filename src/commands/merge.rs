use anyhow::Result;
use tracing::{info, warn};

use super::pipeline::{merge_captures, print_entries_json, print_preview};
use crate::cli::MergeArgs;
use crate::model::ChunkCaptureManifest;
use crate::pdf::write_outline;
use crate::toc::{TocNormalizer, build_record};
use crate::util::{read_json, write_json_pretty};

pub fn run(args: MergeArgs) -> Result<()> {
    let manifest: ChunkCaptureManifest = read_json(&args.capture)?;
    let candidate_count = manifest
        .chunks
        .iter()
        .map(|chunk| chunk.candidates.len())
        .sum::<usize>();

    info!(
        capture = %args.capture.display(),
        source = %manifest.source,
        chunks = manifest.chunks.len(),
        candidates = candidate_count,
        "merging captured candidates"
    );

    let normalizer = TocNormalizer::new()?;
    let entries = merge_captures(&normalizer, &manifest.chunks);

    if args.json {
        print_entries_json(&entries)?;
    } else {
        print_preview(&entries)?;
    }

    if let Some(path) = &args.save_json {
        let record = build_record(&entries, Some(manifest.source.clone()));
        write_json_pretty(path, &record)?;
        info!(path = %path.display(), "saved TOC record");
    }

    if let Some(pdf) = &args.pdf {
        if entries.is_empty() {
            warn!(pdf = %pdf.display(), "no usable structure found; PDF left unchanged");
            return Ok(());
        }
        let written = write_outline(pdf, &entries, args.output.as_deref(), !args.no_backup)?;
        info!(
            output = %written.output.display(),
            entries = written.written_entries,
            "attached merged outline"
        );
    }

    Ok(())
}
