use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use lopdf::Document;
use tracing::debug;

const SIZE_SAMPLE_PAGES: u32 = 5;

/// Inclusive, 1-indexed page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }
}

/// Standalone PDF holding one page range of the source document.
#[derive(Debug, Clone)]
pub struct PdfChunk {
    pub bytes: Vec<u8>,
    pub start_page: u32,
    pub end_page: u32,
}

/// Splits `1..=total_pages` into contiguous ranges of at most `max_pages` pages.
pub fn plan_ranges(total_pages: u32, max_pages: u32) -> Vec<PageRange> {
    let max_pages = max_pages.max(1);
    let chunk_count = total_pages.div_ceil(max_pages);

    (0..chunk_count)
        .map(|index| PageRange {
            start: index * max_pages + 1,
            end: ((index + 1) * max_pages).min(total_pages),
        })
        .collect()
}

pub fn load_document(path: &Path) -> Result<Document> {
    Document::load(path).with_context(|| format!("failed to load PDF {}", path.display()))
}

pub fn page_count(document: &Document) -> u32 {
    document.get_pages().len() as u32
}

/// Serializes each range as its own document.
pub fn split_document(document: &Document, ranges: &[PageRange]) -> Result<Vec<PdfChunk>> {
    let all_pages = document.get_pages().keys().copied().collect::<Vec<u32>>();
    let mut chunks = Vec::with_capacity(ranges.len());

    for range in ranges {
        let dropped = all_pages
            .iter()
            .copied()
            .filter(|page| !range.contains(*page))
            .collect::<Vec<u32>>();

        let mut part = document.clone();
        if !dropped.is_empty() {
            part.delete_pages(&dropped);
            part.prune_objects();
        }

        let mut bytes = Vec::new();
        part.save_to(&mut bytes).with_context(|| {
            format!(
                "failed to serialize pages {}-{} as a standalone PDF",
                range.start, range.end
            )
        })?;

        debug!(
            start_page = range.start,
            end_page = range.end,
            bytes = bytes.len(),
            "split PDF chunk"
        );

        chunks.push(PdfChunk {
            bytes,
            start_page: range.start,
            end_page: range.end,
        });
    }

    Ok(chunks)
}

/// Text of pages `start_page..=end_page`, each page introduced by a `--- page N ---` marker.
pub fn extract_text(pdf_path: &Path, start_page: u32, end_page: u32) -> Result<String> {
    let pages = extract_pages_with_pdftotext(pdf_path, start_page, end_page)?;
    Ok(render_marked_pages(&pages, start_page))
}

pub fn render_marked_pages(pages: &[String], start_page: u32) -> String {
    let mut text = String::new();
    for (offset, page) in pages.iter().enumerate() {
        text.push_str(&format!("\n--- page {} ---\n", start_page + offset as u32));
        text.push_str(page);
    }
    text
}

pub fn extract_pages_with_pdftotext(
    pdf_path: &Path,
    start_page: u32,
    end_page: u32,
) -> Result<Vec<String>> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg("-f")
        .arg(start_page.to_string())
        .arg("-l")
        .arg(end_page.to_string())
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    Ok(split_form_feed_pages(&raw))
}

pub fn split_form_feed_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    pages
}

/// Rough character count of the whole document, extrapolated from the first pages.
pub fn estimate_text_size(pdf_path: &Path, total_pages: u32) -> Result<usize> {
    if total_pages == 0 {
        return Ok(0);
    }

    let sample_end = total_pages.min(SIZE_SAMPLE_PAGES);
    let pages = extract_pages_with_pdftotext(pdf_path, 1, sample_end)?;
    let sampled = pages.iter().map(|page| page.chars().count()).sum::<usize>();

    Ok(extrapolate_chars(sampled, sample_end, total_pages))
}

pub fn extrapolate_chars(sampled_chars: usize, sampled_pages: u32, total_pages: u32) -> usize {
    if sampled_pages == 0 {
        return 0;
    }
    sampled_chars * total_pages as usize / sampled_pages as usize
}
