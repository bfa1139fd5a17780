use anyhow::{Context, Result};
use regex::Regex;

/// Level assumed when no surface pattern matches: nested rather than top-level.
pub const DEFAULT_LEVEL: u32 = 2;

// Order matters: the first matching rule decides the level.
const LEVEL_RULES: &[(&str, &str, u32)] = &[
    ("chapter_marker", r"^第[一二三四五六七八九十\d]+章", 1),
    ("cjk_numeral_prefix", r"^[一二三四五六七八九十]\s*[、.]", 1),
    ("arabic_prefix", r"^\d+\s*[、.](?:\D|$)", 1),
    ("two_part_number", r"^\d+\.\d+\s", 2),
    ("parenthesized_numeral", r"^\([一二三四五六七八九十\d]+\)", 2),
    ("circled_digit", r"^[①②③④⑤⑥⑦⑧⑨⑩]", 2),
    ("three_part_number", r"^\d+\.\d+\.\d+\s", 3),
    ("letter_paren", r"^[a-z]\)", 3),
    ("roman_numeral", r"^[ⅰⅱⅲⅳⅴⅵⅶⅷⅸⅹ]", 3),
    ("four_part_number", r"^\d+\.\d+\.\d+\.\d+\s", 4),
    ("letter_dot", r"^[a-z]\.\s", 4),
];

#[derive(Debug)]
pub struct LevelRule {
    pub name: &'static str,
    pub level: u32,
    pattern: Regex,
}

impl LevelRule {
    pub fn matches(&self, title: &str) -> bool {
        self.pattern.is_match(title)
    }
}

/// Infers heading depth from the lexical shape of a title, ignoring whatever the oracle claimed.
#[derive(Debug)]
pub struct LevelClassifier {
    rules: Vec<LevelRule>,
}

impl LevelClassifier {
    pub fn new() -> Result<Self> {
        let rules = LEVEL_RULES
            .iter()
            .map(|(name, pattern, level)| {
                Ok(LevelRule {
                    name,
                    level: *level,
                    pattern: Regex::new(pattern)
                        .with_context(|| format!("failed to compile level rule {name}"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Level of the first rule matching the trimmed title, if any.
    pub fn classify(&self, title: &str) -> Option<u32> {
        self.matching_rule(title).map(|rule| rule.level)
    }

    pub fn predict(&self, title: &str) -> u32 {
        self.classify(title).unwrap_or(DEFAULT_LEVEL)
    }

    pub fn matching_rule(&self, title: &str) -> Option<&LevelRule> {
        let trimmed = title.trim();
        self.rules.iter().find(|rule| rule.matches(trimmed))
    }
}
