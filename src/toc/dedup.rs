use anyhow::{Context, Result};
use regex::Regex;

use crate::model::TocCandidate;

const PAGE_TOLERANCE: u32 = 2;
const LEVEL_TOLERANCE: u32 = 1;
const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Collapses near-duplicate candidates produced by overlapping chunks or oracle noise.
///
/// Each incoming candidate is compared against the entries kept so far and the first match
/// wins, so the outcome depends on input order. Callers sort by `(page, level)` first.
pub struct Deduplicator {
    leading_marker: Regex,
    non_word: Regex,
}

impl Deduplicator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            leading_marker: Regex::new(
                r"^[\d.\s()①②③④⑤⑥⑦⑧⑨⑩ⅰⅱⅲⅳⅴⅵⅶⅷⅸⅹ一二三四五六七八九十]+",
            )
            .context("failed to compile leading enumeration regex")?,
            non_word: Regex::new(r"[^\w\x{4E00}-\x{9FFF}]")
                .context("failed to compile title punctuation regex")?,
        })
    }

    pub fn dedupe(&self, candidates: Vec<TocCandidate>) -> Vec<TocCandidate> {
        let mut kept: Vec<TocCandidate> = Vec::with_capacity(candidates.len());

        for current in candidates {
            let matched = kept
                .iter()
                .position(|existing| self.is_duplicate(&current, existing));

            match matched {
                Some(index) => {
                    if prefers_current(&current, &kept[index]) {
                        kept[index] = current;
                    }
                }
                None => kept.push(current),
            }
        }

        kept
    }

    pub fn is_duplicate(&self, a: &TocCandidate, b: &TocCandidate) -> bool {
        a.page.abs_diff(b.page) <= PAGE_TOLERANCE
            && a.level.abs_diff(b.level) <= LEVEL_TOLERANCE
            && self.title_similarity(&a.title, &b.title) > SIMILARITY_THRESHOLD
    }

    /// Position-wise character agreement between the normalized titles.
    ///
    /// An insertion near the front of one title shifts every later character out of
    /// alignment.
    pub fn title_similarity(&self, a: &str, b: &str) -> f64 {
        let left = self.normalize_title(a);
        let right = self.normalize_title(b);

        if left == right {
            return 1.0;
        }

        let left_len = left.chars().count();
        let right_len = right.chars().count();
        let max_len = left_len.max(right_len);
        if max_len == 0 {
            return 1.0;
        }

        let common = left
            .chars()
            .zip(right.chars())
            .filter(|(l, r)| l == r)
            .count();

        common as f64 / max_len as f64
    }

    pub fn normalize_title(&self, title: &str) -> String {
        let without_marker = self.leading_marker.replace(title, "");
        let stripped = self.non_word.replace_all(&without_marker, "");
        stripped.to_lowercase().trim().to_string()
    }
}

/// Longer title, then shallower level, then earlier page. Ties keep the existing entry.
fn prefers_current(current: &TocCandidate, existing: &TocCandidate) -> bool {
    let current_len = current.title.chars().count();
    let existing_len = existing.title.chars().count();
    if current_len != existing_len {
        return current_len > existing_len;
    }
    if current.level != existing.level {
        return current.level < existing.level;
    }
    current.page < existing.page
}
