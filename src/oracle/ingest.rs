use serde_json::Value;
use tracing::debug;

use crate::model::TocCandidate;

pub const MIN_TITLE_CHARS: usize = 2;
pub const MAX_TITLE_CHARS: usize = 40;
pub const MAX_CLAIMED_LEVEL: i64 = 3;

const BLOCKED_FRAGMENTS: &[&str] = &["具体而言", "根据", ".jp", ".com"];

/// Maps an oracle-reported page into the chunk's absolute page range.
///
/// Pages inside `[start, end]` are kept, pages inside `[1, end - start + 1]` are read as
/// chunk-relative, anything else falls back to `start`.
pub fn remap_page(raw_page: i64, start_page: u32, end_page: u32) -> u32 {
    let start = i64::from(start_page);
    let end = i64::from(end_page);
    let span = end - start + 1;

    let page = if (start..=end).contains(&raw_page) {
        raw_page
    } else if (1..=span).contains(&raw_page) {
        raw_page + start - 1
    } else {
        start
    };

    u32::try_from(page.max(1)).unwrap_or(start_page.max(1))
}

/// Parses an oracle response into candidates for the chunk `[start_page, end_page]`.
///
/// Never fails: unparsable responses give an empty list and malformed elements are skipped.
pub fn parse_candidates(response: &str, start_page: u32, end_page: u32) -> Vec<TocCandidate> {
    let body = strip_code_fence(response);
    if body.is_empty() {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, start_page, end_page, "oracle response is not valid json");
            return Vec::new();
        }
    };

    let Some(items) = value.as_array() else {
        debug!(start_page, end_page, "oracle response is not a json array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| candidate_from_value(item, start_page, end_page))
        .collect()
}

fn candidate_from_value(item: &Value, start_page: u32, end_page: u32) -> Option<TocCandidate> {
    let object = item.as_object()?;
    let title = object.get("title")?.as_str()?.trim();
    let level = object.get("level")?.as_i64()?;
    let raw_page = object.get("page")?.as_i64()?;

    if !title_admissible(title) {
        debug!(title, "skipping inadmissible oracle title");
        return None;
    }

    let page = remap_page(raw_page, start_page, end_page);
    if i64::from(page) != raw_page {
        debug!(title, raw_page, page, "remapped oracle page");
    }

    let level = level.clamp(1, MAX_CLAIMED_LEVEL) as u32;
    Some(TocCandidate::new(title, level, page))
}

pub fn title_admissible(title: &str) -> bool {
    let chars = title.chars().count();
    (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&chars)
        && !BLOCKED_FRAGMENTS
            .iter()
            .any(|fragment| title.contains(fragment))
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
