use crate::model::{TocCandidate, TocEntry};

use super::level::LevelClassifier;

/// Running stack of open heading levels, innermost last.
#[derive(Debug, Default)]
pub struct LevelStack {
    levels: Vec<u32>,
}

impl LevelStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level to assign given the classifier's prediction and the oracle's claim.
    ///
    /// Levels may deepen by one step at a time but may become shallower freely.
    pub fn adjust(&self, predicted: u32, claimed: u32) -> u32 {
        let mut level = if predicted > 0 { predicted } else { claimed };

        if let Some(&top) = self.levels.last() {
            if level > top + 1 {
                level = top + 1;
            }
        }

        level.max(1)
    }

    pub fn push(&mut self, level: u32) {
        while let Some(&top) = self.levels.last() {
            if top < level {
                break;
            }
            self.levels.pop();
        }
        self.levels.push(level);
    }
}

pub fn repair_levels(candidates: &[TocCandidate], classifier: &LevelClassifier) -> Vec<TocEntry> {
    let mut stack = LevelStack::new();

    candidates
        .iter()
        .map(|candidate| {
            let predicted = classifier.predict(&candidate.title);
            let level = stack.adjust(predicted, candidate.level);
            stack.push(level);

            TocEntry {
                title: candidate.title.clone(),
                level,
                page: candidate.page,
            }
        })
        .collect()
}

/// Second pass over the finished sequence: no entry may sit more than one level below
/// its predecessor, and nothing sits above level 1.
pub fn enforce_continuity(entries: Vec<TocEntry>) -> Vec<TocEntry> {
    let mut last_level = 0u32;

    entries
        .into_iter()
        .map(|mut entry| {
            entry.level = entry.level.min(last_level + 1).max(1);
            last_level = entry.level;
            entry
        })
        .collect()
}
