use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::OracleArgs;
use crate::model::{ChunkCapture, ChunkCaptureManifest, TocEntry};
use crate::oracle::{ChunkRequest, GeminiConfig, GeminiOracle, TitleOracle};
use crate::pdf::{load_document, page_count, plan_ranges, split_document};
use crate::toc::{TocNormalizer, level_distribution};
use crate::util::now_utc_string;

const CAPTURE_MANIFEST_VERSION: u32 = 1;

pub struct ExtractedOutline {
    pub total_pages: u32,
    pub chunks: Vec<ChunkCapture>,
    pub entries: Vec<TocEntry>,
}

impl ExtractedOutline {
    pub fn capture_manifest(&self, source: &Path) -> ChunkCaptureManifest {
        ChunkCaptureManifest {
            manifest_version: CAPTURE_MANIFEST_VERSION,
            generated_at: now_utc_string(),
            source: source.display().to_string(),
            total_pages: self.total_pages,
            chunks: self.chunks.clone(),
        }
    }
}

pub fn build_oracle(args: &OracleArgs) -> Result<GeminiOracle> {
    GeminiOracle::new(GeminiConfig {
        api_key: args.api_key.clone().unwrap_or_default(),
        model: args.model.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    })
}

/// Splits `source`, asks the oracle about every chunk in order, and merges the answers.
///
/// A chunk whose oracle call fails contributes no candidates; the document still completes.
pub fn extract_outline(
    source: &Path,
    oracle: &dyn TitleOracle,
    normalizer: &TocNormalizer,
    max_pages: u32,
) -> Result<ExtractedOutline> {
    let document = load_document(source)?;
    let total_pages = page_count(&document);
    if total_pages == 0 {
        bail!("{} has no pages", source.display());
    }

    let ranges = plan_ranges(total_pages, max_pages);
    info!(
        source = %source.display(),
        total_pages,
        chunks = ranges.len(),
        "extracting outline"
    );

    let pdf_chunks = split_document(&document, &ranges)?;
    drop(document);

    let mut chunks = Vec::with_capacity(pdf_chunks.len());
    for (index, chunk) in pdf_chunks.iter().enumerate() {
        let request = ChunkRequest { source, chunk };
        let candidates = match oracle.extract_titles(&request) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(
                    chunk = index + 1,
                    start_page = chunk.start_page,
                    end_page = chunk.end_page,
                    error = %err,
                    "title oracle failed for chunk; continuing without it"
                );
                Vec::new()
            }
        };

        info!(
            chunk = index + 1,
            start_page = chunk.start_page,
            end_page = chunk.end_page,
            candidates = candidates.len(),
            "chunk processed"
        );

        chunks.push(ChunkCapture {
            start_page: chunk.start_page,
            end_page: chunk.end_page,
            candidates,
        });
    }

    let entries = merge_captures(normalizer, &chunks);
    Ok(ExtractedOutline {
        total_pages,
        chunks,
        entries,
    })
}

pub fn merge_captures(normalizer: &TocNormalizer, chunks: &[ChunkCapture]) -> Vec<TocEntry> {
    let candidates_per_chunk = chunks
        .iter()
        .map(|chunk| chunk.candidates.clone())
        .collect::<Vec<_>>();
    normalizer.merge(&candidates_per_chunk)
}

/// Writes the level histogram, the indented tree and the total.
pub fn render_preview<W: Write>(output: &mut W, entries: &[TocEntry]) -> io::Result<()> {
    if entries.is_empty() {
        writeln!(output, "No usable structure found.")?;
        return Ok(());
    }

    let distribution = level_distribution(entries)
        .into_iter()
        .map(|(level, count)| format!("L{level}={count}"))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(output, "Levels: {distribution}")?;
    writeln!(output)?;

    for entry in entries {
        let indent = "  ".repeat(entry.level.saturating_sub(1) as usize);
        let marker = if entry.level == 1 { "►" } else { "▪" };
        writeln!(
            output,
            "{indent}{marker} {} (p.{})",
            entry.title, entry.page
        )?;
    }

    writeln!(output)?;
    writeln!(output, "Total: {} entries", entries.len())?;
    Ok(())
}

pub fn print_preview(entries: &[TocEntry]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    render_preview(&mut output, entries)?;
    output.flush()?;
    Ok(())
}

pub fn print_entries_json(entries: &[TocEntry]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, entries)?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
