use anyhow::{Context, Result};
use regex::Regex;

const MIN_TITLE_CHARS: usize = 3;
const MAX_TITLE_CHARS: usize = 50;

const SENTENCE_MARKS: &[char] = &['，', '。', '；', '：', '！', '？', '"', '\'', '（', '）'];
const MAX_SENTENCE_MARKS: usize = 2;

const EXCLUSION_PATTERNS: &[(&str, &str)] = &[
    ("figure_caption_zh", r"^图\s*\d+"),
    ("table_caption_zh", r"^表\s*\d+"),
    ("figure_caption", r"^Figure\s*\d+"),
    ("table_caption", r"^Table\s*\d+"),
    ("page_number_zh", r"第\s*\d+\s*页"),
    ("page_number", r"Page\s*\d+"),
    ("references", r"^参考文献"),
    ("acknowledgments", r"^致谢"),
    ("bare_appendix", r"^附录[A-Z]?$"),
    ("year", r"^\d{4}年"),
    ("sentence_opener", r"具体而言"),
    ("according_to", r"根据.*"),
    ("full_stop", r".*。.*"),
    ("url_fragment", r"^[a-z]+\.[a-z]+"),
    ("descriptive_bilingual", r"双语优势"),
    ("descriptive_exam", r"语言考试替代"),
    ("descriptive_course", r"课程环境"),
    ("descriptive_ability", r"能力.*的.*"),
    ("descriptive_program", r"项目.*允许"),
];

const CANONICAL_PATTERNS: &[(&str, &str)] = &[
    ("chapter_marker", r"^第[一二三四五六七八九十\d]+章"),
    ("section_marker", r"^第[一二三四五六七八九十\d]+节"),
    ("cjk_numeral_prefix", r"^[一二三四五六七八九十]\s*[、.]"),
    ("arabic_prefix", r"^\d+\s*[、.]"),
    ("dotted_number", r"^\d+\.\d+"),
    ("parenthesized_numeral", r"^\([一二三四五六七八九十\d]+\)"),
    ("circled_digit", r"^[①②③④⑤⑥⑦⑧⑨⑩]"),
];

const DESCRIPTIVE_WORDS: &[&str] = &[
    "能力", "环境", "课程", "项目", "院校", "成绩", "证明", "具备", "允许", "作为", "同时", "发展",
    "状况", "情况", "内容", "方面",
];
const MAX_DESCRIPTIVE_WORDS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(&'static str),
    Continue,
}

#[derive(Debug)]
enum TitleCheck {
    Length { min: usize, max: usize },
    RejectPattern(Regex),
    AcceptPattern(Regex),
    MarkBudget { marks: &'static [char], max: usize },
    VocabularyBudget { words: &'static [&'static str], max: usize },
}

#[derive(Debug)]
pub struct TitleRule {
    pub name: &'static str,
    check: TitleCheck,
}

impl TitleRule {
    fn new(name: &'static str, check: TitleCheck) -> Self {
        Self { name, check }
    }

    /// `title` is expected to be trimmed already.
    pub fn evaluate(&self, title: &str) -> Verdict {
        let hit = match &self.check {
            TitleCheck::Length { min, max } => {
                let chars = title.chars().count();
                chars < *min || chars > *max
            }
            TitleCheck::RejectPattern(pattern) => pattern.is_match(title),
            TitleCheck::AcceptPattern(pattern) => {
                return if pattern.is_match(title) {
                    Verdict::Accept
                } else {
                    Verdict::Continue
                };
            }
            TitleCheck::MarkBudget { marks, max } => {
                title.chars().filter(|ch| marks.contains(ch)).count() > *max
            }
            TitleCheck::VocabularyBudget { words, max } => {
                words.iter().filter(|word| title.contains(*word)).count() > *max
            }
        };

        if hit {
            Verdict::Reject(self.name)
        } else {
            Verdict::Continue
        }
    }
}

/// Rejects outline entries that read like captions, boilerplate or prose rather than headings.
///
/// Rules run in order and the first `Accept` or `Reject` is final. A title that survives every
/// rule is accepted.
#[derive(Debug)]
pub struct TitleFilter {
    rules: Vec<TitleRule>,
}

impl TitleFilter {
    pub fn new() -> Result<Self> {
        let mut rules = vec![
            TitleRule::new(
                "length",
                TitleCheck::Length {
                    min: MIN_TITLE_CHARS,
                    max: MAX_TITLE_CHARS,
                },
            ),
            TitleRule::new(
                "numeric_or_date",
                TitleCheck::RejectPattern(
                    Regex::new(r"^[\d\s.\-_年月日]+$")
                        .context("failed to compile numeric title regex")?,
                ),
            ),
            TitleRule::new(
                "sentence_terminal",
                TitleCheck::RejectPattern(
                    Regex::new(r"[。！？]$").context("failed to compile terminal mark regex")?,
                ),
            ),
            TitleRule::new(
                "punctuation_density",
                TitleCheck::MarkBudget {
                    marks: SENTENCE_MARKS,
                    max: MAX_SENTENCE_MARKS,
                },
            ),
        ];

        for (name, pattern) in EXCLUSION_PATTERNS {
            let regex = Regex::new(&format!("(?i){pattern}"))
                .with_context(|| format!("failed to compile exclusion rule {name}"))?;
            rules.push(TitleRule::new(name, TitleCheck::RejectPattern(regex)));
        }

        for (name, pattern) in CANONICAL_PATTERNS {
            let regex = Regex::new(pattern)
                .with_context(|| format!("failed to compile heading format rule {name}"))?;
            rules.push(TitleRule::new(name, TitleCheck::AcceptPattern(regex)));
        }

        rules.push(TitleRule::new(
            "descriptive_vocabulary",
            TitleCheck::VocabularyBudget {
                words: DESCRIPTIVE_WORDS,
                max: MAX_DESCRIPTIVE_WORDS,
            },
        ));

        Ok(Self { rules })
    }

    pub fn evaluate(&self, title: &str) -> Verdict {
        let trimmed = title.trim();
        for rule in &self.rules {
            match rule.evaluate(trimmed) {
                Verdict::Continue => continue,
                verdict => return verdict,
            }
        }
        Verdict::Accept
    }

    #[cfg(test)]
    pub fn is_valid(&self, title: &str) -> bool {
        matches!(self.evaluate(title), Verdict::Accept)
    }

    #[cfg(test)]
    pub fn rule(&self, name: &str) -> Option<&TitleRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }
}
