//! Merge and normalization of per-chunk heading candidates into one document outline.
//!
//! The pipeline is flatten → sort by `(page, level)` → deduplicate → classify and repair
//! levels → drop invalid titles → re-check continuity. Every stage is total: bad oracle
//! output only ever shrinks or reshapes the result.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use crate::model::{PageSpan, TocCandidate, TocEntry, TocRecord, TocRecordMetadata};
use crate::util::now_utc_string;

mod continuity;
mod dedup;
mod level;
mod validity;

use continuity::{enforce_continuity, repair_levels};
use dedup::Deduplicator;
use level::LevelClassifier;
use validity::{TitleFilter, Verdict};

pub struct TocNormalizer {
    dedup: Deduplicator,
    classifier: LevelClassifier,
    filter: TitleFilter,
}

impl TocNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dedup: Deduplicator::new()?,
            classifier: LevelClassifier::new()?,
            filter: TitleFilter::new()?,
        })
    }

    /// Merges candidate lists, one per chunk in chunk order, into a single outline.
    ///
    /// An empty result means no usable structure was found; it is not an error.
    pub fn merge(&self, candidates_per_chunk: &[Vec<TocCandidate>]) -> Vec<TocEntry> {
        let mut merged = candidates_per_chunk
            .iter()
            .flatten()
            .cloned()
            .collect::<Vec<TocCandidate>>();

        if merged.is_empty() {
            return Vec::new();
        }

        let input_count = merged.len();
        merged.sort_by_key(|candidate| (candidate.page, candidate.level));

        let unique = self.dedup.dedupe(merged);
        let unique_count = unique.len();

        let leveled = repair_levels(&unique, &self.classifier);

        let mut kept = Vec::with_capacity(leveled.len());
        for entry in leveled {
            match self.filter.evaluate(&entry.title) {
                Verdict::Reject(rule) => {
                    debug!(title = %entry.title, page = entry.page, rule, "dropped outline entry");
                }
                _ => kept.push(entry),
            }
        }

        let entries = enforce_continuity(kept);

        debug!(
            chunks = candidates_per_chunk.len(),
            candidates = input_count,
            unique = unique_count,
            kept = entries.len(),
            "merged outline candidates"
        );

        entries
    }
}

pub fn level_distribution(entries: &[TocEntry]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.level).or_insert(0) += 1;
    }
    counts
}

pub fn build_record(entries: &[TocEntry], source: Option<String>) -> TocRecord {
    let page_range = PageSpan {
        first: entries.iter().map(|entry| entry.page).min().unwrap_or(0),
        last: entries.iter().map(|entry| entry.page).max().unwrap_or(0),
    };

    TocRecord {
        metadata: TocRecordMetadata {
            generated_at: now_utc_string(),
            source,
            total_entries: entries.len(),
            level_distribution: level_distribution(entries),
            page_range,
        },
        toc_entries: entries.to_vec(),
    }
}
