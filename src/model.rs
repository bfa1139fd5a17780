use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Heading candidate reported by the title oracle for one chunk.
///
/// By the time a candidate reaches the normalizer its page has already been
/// remapped into the document's absolute page space and its level clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocCandidate {
    pub title: String,
    pub level: u32,
    pub page: u32,
}

impl TocCandidate {
    pub fn new(title: impl Into<String>, level: u32, page: u32) -> Self {
        Self {
            title: title.into(),
            level,
            page,
        }
    }
}

/// Finalized outline entry handed to the outline sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub level: u32,
    pub page: u32,
}

/// Ingested oracle output for one page range, kept so a run can be re-merged offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCapture {
    pub start_page: u32,
    pub end_page: u32,
    pub candidates: Vec<TocCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCaptureManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source: String,
    pub total_pages: u32,
    pub chunks: Vec<ChunkCapture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub first: u32,
    pub last: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocRecordMetadata {
    pub generated_at: String,
    pub source: Option<String>,
    pub total_entries: usize,
    pub level_distribution: BTreeMap<u32, usize>,
    pub page_range: PageSpan,
}

/// Inspection record written next to a processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocRecord {
    pub metadata: TocRecordMetadata,
    pub toc_entries: Vec<TocEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub total_toc_entries: usize,
    pub processing_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSettings {
    pub max_pages: u32,
    pub recursive: bool,
    pub skip_existing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: String,
    pub stats: BatchStats,
    pub failed_files: Vec<String>,
    pub settings: BatchSettings,
}
