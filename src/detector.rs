//! Rule-based SEO issue detection.
//!
//! Scans a content record against a configurable rule set and emits typed
//! issues with severity, plus an aggregate compliance score in [0, 100].
//! Detection is a pure function of its inputs: no side effects, no panics,
//! and missing optional fields fail the relevant rule instead of erroring.
//!
//! Threshold defaults follow mainstream SEO-plugin conventions (meta
//! description 120–156 chars, keyword density 0.5–2.5%). They are policy,
//! not correctness requirements, and live in [`DetectorConfig`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::content::{strip_tags, Content, ContentField};

/// How much a failing rule matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Score deduction applied per issue of this severity.
    pub fn deduction(self) -> f64 {
        match self {
            Self::Critical => 30.0,
            Self::Major => 15.0,
            Self::Minor => 5.0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
        }
    }
}

/// The rule that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MetaDescriptionLength,
    MetaDescriptionKeywordMissing,
    KeywordDensityLow,
    KeywordDensityHigh,
    TitleTooLong,
    TitleKeywordMissing,
    TitleNotUnique,
    PassiveVoice,
    LongSentences,
    TransitionWords,
    ImageAltMissing,
    ImageAltPoor,
    SecondaryKeywordMissing,
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MetaDescriptionLength => "meta_description_length",
            Self::MetaDescriptionKeywordMissing => "meta_description_keyword_missing",
            Self::KeywordDensityLow => "keyword_density_low",
            Self::KeywordDensityHigh => "keyword_density_high",
            Self::TitleTooLong => "title_too_long",
            Self::TitleKeywordMissing => "title_keyword_missing",
            Self::TitleNotUnique => "title_not_unique",
            Self::PassiveVoice => "passive_voice",
            Self::LongSentences => "long_sentences",
            Self::TransitionWords => "transition_words",
            Self::ImageAltMissing => "image_alt_missing",
            Self::ImageAltPoor => "image_alt_poor",
            Self::SecondaryKeywordMissing => "secondary_keyword_missing",
        };
        write!(f, "{s}")
    }
}

/// A single failed rule check. Immutable once created; a fresh set is
/// produced by each detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub field: ContentField,
    pub message: String,
    pub current_value: String,
    pub target_value: String,
}

/// Output of one detection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub issues: Vec<Issue>,
    /// 100 minus severity-weighted deductions, clamped to [0, 100].
    pub compliance_score: f64,
}

impl DetectionReport {
    pub fn is_compliant(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Rule thresholds. Defaults mirror common SEO-plugin policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum meta description length, chars.
    pub meta_min_chars: usize,
    /// Maximum meta description length, chars.
    pub meta_max_chars: usize,
    /// Keyword density lower bound, percent of word count.
    pub density_min_pct: f64,
    /// Keyword density upper bound, percent of word count.
    pub density_max_pct: f64,
    /// Title length above this is a minor issue.
    pub title_soft_max_chars: usize,
    /// Title length above this is a major issue.
    pub title_hard_max_chars: usize,
    /// A sentence longer than this many words counts as "long".
    pub long_sentence_words: usize,
    /// Maximum tolerated ratio of long sentences.
    pub long_sentence_ratio_max: f64,
    /// Maximum tolerated ratio of passive-voice sentences.
    pub passive_ratio_max: f64,
    /// Minimum ratio of sentences containing a transition word.
    pub transition_ratio_min: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            meta_min_chars: 120,
            meta_max_chars: 156,
            density_min_pct: 0.5,
            density_max_pct: 2.5,
            title_soft_max_chars: 60,
            title_hard_max_chars: 66,
            long_sentence_words: 20,
            long_sentence_ratio_max: 0.25,
            passive_ratio_max: 0.10,
            transition_ratio_min: 0.30,
        }
    }
}

/// Transition words counted by the readability check.
const TRANSITION_WORDS: &[&str] = &[
    "however",
    "moreover",
    "therefore",
    "furthermore",
    "consequently",
    "meanwhile",
    "additionally",
    "also",
    "finally",
    "first",
    "second",
    "third",
    "next",
    "then",
    "because",
    "instead",
    "likewise",
    "similarly",
    "thus",
    "besides",
    "for example",
    "for instance",
    "in addition",
    "as a result",
    "in short",
    "above all",
];

static PASSIVE: Lazy<Regex> = Lazy::new(|| {
    // Auxiliary verb followed by a probable past participle.
    Regex::new(r"(?i)\b(?:is|are|was|were|be|been|being)\s+\w+(?:ed|en)\b").unwrap()
});

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").unwrap());

/// Count non-overlapping, case-insensitive occurrences of a keyword phrase.
fn phrase_occurrences(text: &str, phrase: &str) -> usize {
    if phrase.trim().is_empty() {
        return 0;
    }
    let pattern = format!(
        r"(?i)\b{}\b",
        phrase
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+")
    );
    match Regex::new(&pattern) {
        Ok(re) => re.find_iter(text).count(),
        Err(_) => 0,
    }
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    phrase_occurrences(text, phrase) > 0
}

/// Scans content against the rule set and scores compliance.
#[derive(Debug, Clone, Default)]
pub struct SeoIssueDetector {
    config: DetectorConfig,
    /// Existing titles to check uniqueness against (case-insensitive).
    title_corpus: Vec<String>,
}

impl SeoIssueDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            title_corpus: Vec::new(),
        }
    }

    /// Supply the corpus of existing titles for the uniqueness rule.
    pub fn with_title_corpus(mut self, corpus: Vec<String>) -> Self {
        self.title_corpus = corpus;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run every rule check and aggregate the result.
    pub fn detect_all_issues(
        &self,
        content: &Content,
        focus_keyword: &str,
        secondary_keywords: &[String],
    ) -> DetectionReport {
        let mut issues = Vec::new();

        self.check_meta_description(content, focus_keyword, &mut issues);
        self.check_keyword_density(content, focus_keyword, &mut issues);
        self.check_title(content, focus_keyword, &mut issues);
        self.check_title_uniqueness(content, &mut issues);
        self.check_readability(content, &mut issues);
        self.check_image_alts(content, focus_keyword, &mut issues);
        self.check_secondary_keywords(content, secondary_keywords, &mut issues);

        let deduction: f64 = issues.iter().map(|i| i.severity.deduction()).sum();
        let compliance_score = (100.0 - deduction).clamp(0.0, 100.0);

        tracing::debug!(
            issues = issues.len(),
            score = compliance_score,
            "detection pass complete"
        );

        DetectionReport {
            issues,
            compliance_score,
        }
    }

    fn check_meta_description(&self, content: &Content, keyword: &str, issues: &mut Vec<Issue>) {
        let meta = content.meta_description.as_deref().unwrap_or("");
        let len = meta.chars().count();

        if len < self.config.meta_min_chars || len > self.config.meta_max_chars {
            issues.push(Issue {
                issue_type: IssueType::MetaDescriptionLength,
                severity: Severity::Major,
                field: ContentField::MetaDescription,
                message: format!(
                    "meta description is {len} chars, outside [{}, {}]",
                    self.config.meta_min_chars, self.config.meta_max_chars
                ),
                current_value: format!("{len} chars"),
                target_value: format!(
                    "{}-{} chars",
                    self.config.meta_min_chars, self.config.meta_max_chars
                ),
            });
        }

        if !contains_phrase(meta, keyword) {
            issues.push(Issue {
                issue_type: IssueType::MetaDescriptionKeywordMissing,
                severity: Severity::Major,
                field: ContentField::MetaDescription,
                message: format!("meta description does not mention the focus keyword '{keyword}'"),
                current_value: meta.to_string(),
                target_value: format!("mentions '{keyword}'"),
            });
        }
    }

    fn check_keyword_density(&self, content: &Content, keyword: &str, issues: &mut Vec<Issue>) {
        let text = content.plain_text();
        let words = text.split_whitespace().count();
        let occurrences = phrase_occurrences(&text, keyword);
        let density = if words == 0 {
            0.0
        } else {
            occurrences as f64 / words as f64 * 100.0
        };

        if density < self.config.density_min_pct {
            issues.push(Issue {
                issue_type: IssueType::KeywordDensityLow,
                severity: Severity::Major,
                field: ContentField::Body,
                message: format!(
                    "keyword density {density:.2}% is below {:.1}% ({occurrences} occurrences in {words} words)",
                    self.config.density_min_pct
                ),
                current_value: format!("{density:.2}%"),
                target_value: format!(
                    "{:.1}%-{:.1}%",
                    self.config.density_min_pct, self.config.density_max_pct
                ),
            });
        } else if density > self.config.density_max_pct {
            issues.push(Issue {
                issue_type: IssueType::KeywordDensityHigh,
                severity: Severity::Major,
                field: ContentField::Body,
                message: format!(
                    "keyword density {density:.2}% exceeds {:.1}% (keyword stuffing)",
                    self.config.density_max_pct
                ),
                current_value: format!("{density:.2}%"),
                target_value: format!(
                    "{:.1}%-{:.1}%",
                    self.config.density_min_pct, self.config.density_max_pct
                ),
            });
        }
    }

    fn check_title(&self, content: &Content, keyword: &str, issues: &mut Vec<Issue>) {
        let len = content.title.chars().count();
        if len > self.config.title_soft_max_chars {
            let severity = if len > self.config.title_hard_max_chars {
                Severity::Major
            } else {
                Severity::Minor
            };
            issues.push(Issue {
                issue_type: IssueType::TitleTooLong,
                severity,
                field: ContentField::Title,
                message: format!(
                    "title is {len} chars, above the {} char limit",
                    self.config.title_soft_max_chars
                ),
                current_value: format!("{len} chars"),
                target_value: format!("<= {} chars", self.config.title_soft_max_chars),
            });
        }

        if !contains_phrase(&content.title, keyword) {
            issues.push(Issue {
                issue_type: IssueType::TitleKeywordMissing,
                severity: Severity::Major,
                field: ContentField::Title,
                message: format!("title does not contain the focus keyword '{keyword}'"),
                current_value: content.title.clone(),
                target_value: format!("contains '{keyword}'"),
            });
        }
    }

    fn check_title_uniqueness(&self, content: &Content, issues: &mut Vec<Issue>) {
        let title_lower = content.title.to_lowercase();
        if self
            .title_corpus
            .iter()
            .any(|t| t.to_lowercase() == title_lower)
        {
            issues.push(Issue {
                issue_type: IssueType::TitleNotUnique,
                severity: Severity::Major,
                field: ContentField::Title,
                message: "title duplicates an existing post title".to_string(),
                current_value: content.title.clone(),
                target_value: "a title not present in the corpus".to_string(),
            });
        }
    }

    fn check_readability(&self, content: &Content, issues: &mut Vec<Issue>) {
        let text = content.plain_text();
        let sentences: Vec<&str> = SENTENCE_SPLIT
            .split(&text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let total = sentences.len();

        let long = sentences
            .iter()
            .filter(|s| s.split_whitespace().count() > self.config.long_sentence_words)
            .count();
        let passive = sentences.iter().filter(|s| PASSIVE.is_match(s)).count();
        let with_transition = sentences
            .iter()
            .filter(|s| {
                let lower = s.to_lowercase();
                TRANSITION_WORDS.iter().any(|w| lower.contains(w))
            })
            .count();

        let ratio = |n: usize| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64
            }
        };

        if ratio(long) > self.config.long_sentence_ratio_max {
            issues.push(Issue {
                issue_type: IssueType::LongSentences,
                severity: Severity::Minor,
                field: ContentField::Body,
                message: format!(
                    "{long} of {total} sentences exceed {} words",
                    self.config.long_sentence_words
                ),
                current_value: format!("{:.0}%", ratio(long) * 100.0),
                target_value: format!("<= {:.0}%", self.config.long_sentence_ratio_max * 100.0),
            });
        }

        if ratio(passive) > self.config.passive_ratio_max {
            issues.push(Issue {
                issue_type: IssueType::PassiveVoice,
                severity: Severity::Minor,
                field: ContentField::Body,
                message: format!("{passive} of {total} sentences use passive voice"),
                current_value: format!("{:.0}%", ratio(passive) * 100.0),
                target_value: format!("<= {:.0}%", self.config.passive_ratio_max * 100.0),
            });
        }

        if ratio(with_transition) < self.config.transition_ratio_min {
            issues.push(Issue {
                issue_type: IssueType::TransitionWords,
                severity: Severity::Minor,
                field: ContentField::Body,
                message: format!("only {with_transition} of {total} sentences use a transition word"),
                current_value: format!("{:.0}%", ratio(with_transition) * 100.0),
                target_value: format!(">= {:.0}%", self.config.transition_ratio_min * 100.0),
            });
        }
    }

    fn check_image_alts(&self, content: &Content, keyword: &str, issues: &mut Vec<Issue>) {
        for (idx, image) in content.image_prompts.iter().enumerate() {
            let alt = image.alt.trim();
            if alt.is_empty() {
                issues.push(Issue {
                    issue_type: IssueType::ImageAltMissing,
                    severity: Severity::Major,
                    field: ContentField::ImageAlt,
                    message: format!("image {idx} has no alt text"),
                    current_value: String::new(),
                    target_value: "descriptive alt text".to_string(),
                });
            } else if alt.eq_ignore_ascii_case(keyword) || alt.chars().count() < 4 {
                issues.push(Issue {
                    issue_type: IssueType::ImageAltPoor,
                    severity: Severity::Minor,
                    field: ContentField::ImageAlt,
                    message: format!("image {idx} alt text is too thin or keyword-only"),
                    current_value: alt.to_string(),
                    target_value: "descriptive alt text beyond the bare keyword".to_string(),
                });
            }
        }
    }

    fn check_secondary_keywords(
        &self,
        content: &Content,
        secondary_keywords: &[String],
        issues: &mut Vec<Issue>,
    ) {
        let text = content.plain_text();
        for keyword in secondary_keywords {
            if !contains_phrase(&text, keyword) {
                issues.push(Issue {
                    issue_type: IssueType::SecondaryKeywordMissing,
                    severity: Severity::Minor,
                    field: ContentField::Body,
                    message: format!("secondary keyword '{keyword}' never appears in the body"),
                    current_value: "0 occurrences".to_string(),
                    target_value: format!("mentions '{keyword}' at least once"),
                });
            }
        }
    }
}
