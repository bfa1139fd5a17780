use std::path::Path;

use anyhow::Result;

use crate::model::TocCandidate;
use crate::pdf::PdfChunk;

mod gemini;
mod ingest;

pub use gemini::{GeminiConfig, GeminiOracle};

/// One chunk handed to the oracle, plus the document it came from for text fallback.
pub struct ChunkRequest<'a> {
    pub source: &'a Path,
    pub chunk: &'a PdfChunk,
}

/// Heading recognizer treated as a black box.
///
/// Implementations return candidates whose pages are already mapped into the document's
/// absolute page space. Errors are per chunk; callers substitute an empty list.
pub trait TitleOracle {
    fn extract_titles(&self, request: &ChunkRequest<'_>) -> Result<Vec<TocCandidate>>;
}
