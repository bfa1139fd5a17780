use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use super::pipeline::{build_oracle, extract_outline, print_preview};
use crate::cli::IndexArgs;
use crate::model::TocEntry;
use crate::oracle::TitleOracle;
use crate::pdf::{WriteOutcome, estimate_text_size, load_document, page_count, write_outline};
use crate::toc::{TocNormalizer, build_record};
use crate::util::{is_pdf_path, write_json_pretty};

/// One document's worth of work shared by `index` and `batch`.
pub struct IndexJob<'a> {
    pub input: &'a Path,
    pub output: Option<&'a Path>,
    pub backup: bool,
    pub save_json: Option<&'a Path>,
    pub save_candidates: Option<&'a Path>,
    pub preview_only: bool,
    pub max_pages: u32,
}

pub struct IndexOutcome {
    pub entries: Vec<TocEntry>,
    pub written: Option<WriteOutcome>,
}

pub fn run(args: IndexArgs) -> Result<()> {
    let started = Instant::now();

    if !args.input.is_file() {
        bail!("{} is not a file", args.input.display());
    }
    if !is_pdf_path(&args.input) {
        warn!(input = %args.input.display(), "input does not have a .pdf extension");
    }

    let normalizer = TocNormalizer::new()?;
    let oracle = build_oracle(&args.oracle)?;

    log_text_estimate(&args.input);

    let job = IndexJob {
        input: &args.input,
        output: args.output.as_deref(),
        backup: !args.no_backup,
        save_json: args.save_json.as_deref(),
        save_candidates: args.save_candidates.as_deref(),
        preview_only: args.preview_only,
        max_pages: args.oracle.max_pages,
    };
    let outcome = index_document(&job, &oracle, &normalizer)?;

    print_preview(&outcome.entries)?;

    if let Some(written) = &outcome.written {
        info!(
            output = %written.output.display(),
            backup = %written.backup.as_deref().map(|path| path.display().to_string()).unwrap_or_default(),
            replaced_entries = written.replaced_entries,
            written_entries = written.written_entries,
            "outline attached"
        );
    }

    info!(
        input = %args.input.display(),
        entries = outcome.entries.len(),
        written = outcome.written.is_some(),
        elapsed_seconds = started.elapsed().as_secs_f64(),
        "index completed"
    );

    Ok(())
}

pub fn index_document(
    job: &IndexJob<'_>,
    oracle: &dyn TitleOracle,
    normalizer: &TocNormalizer,
) -> Result<IndexOutcome> {
    let extracted = extract_outline(job.input, oracle, normalizer, job.max_pages)?;

    if let Some(path) = job.save_candidates {
        write_json_pretty(path, &extracted.capture_manifest(job.input))?;
        info!(path = %path.display(), "saved oracle candidates");
    }

    if extracted.entries.is_empty() {
        warn!(input = %job.input.display(), "no usable structure found; PDF left unchanged");
        return Ok(IndexOutcome {
            entries: Vec::new(),
            written: None,
        });
    }

    if let Some(path) = job.save_json {
        let record = build_record(&extracted.entries, Some(job.input.display().to_string()));
        write_json_pretty(path, &record)?;
        info!(path = %path.display(), "saved TOC record");
    }

    if job.preview_only {
        info!("preview only; PDF left unchanged");
        return Ok(IndexOutcome {
            entries: extracted.entries,
            written: None,
        });
    }

    let written = write_outline(job.input, &extracted.entries, job.output, job.backup)?;
    Ok(IndexOutcome {
        entries: extracted.entries,
        written: Some(written),
    })
}

fn log_text_estimate(input: &Path) {
    let total_pages = match load_document(input) {
        Ok(document) => page_count(&document),
        Err(err) => {
            debug!(error = %err, "skipping text size estimate");
            return;
        }
    };

    match estimate_text_size(input, total_pages) {
        Ok(chars) => info!(total_pages, estimated_chars = chars, "estimated document text size"),
        Err(err) => debug!(error = %err, "text size estimate unavailable"),
    }
}
