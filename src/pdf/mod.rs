mod chunker;
mod outline;
#[cfg(test)]
pub(crate) mod tests;

pub use chunker::{
    PdfChunk, estimate_text_size, extract_text, load_document, page_count, plan_ranges,
    split_document,
};
pub use outline::{WriteOutcome, read_outline, write_outline};
