//! Correction prompt templates for detected issues.
//!
//! Turns a set of [`Issue`]s into targeted rewrite instructions for the
//! generation provider. Issues that share a content field are merged into a
//! single composite instruction so one pass never issues conflicting edits
//! to the same field. Generation is deterministic: identical issues always
//! produce identical prompts, in a stable field order.

use serde::{Deserialize, Serialize};

use crate::content::{Content, ContentField};
use crate::detector::{Issue, IssueType};

/// Correction strategy names recorded per pass.
pub const STRATEGY_TARGETED: &str = "targeted_rewrite";
pub const STRATEGY_COMPOSITE: &str = "composite_field_rewrite";
pub const STRATEGY_NOOP_RECOVERY: &str = "noop_recovery";

/// A rewrite instruction for one content field, consumed once by the
/// corrector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionPrompt {
    /// The issues this prompt addresses (more than one when merged).
    pub issue_types: Vec<IssueType>,
    /// The field the rewrite targets.
    pub field: ContentField,
    /// Natural-language rewrite instruction.
    pub instruction: String,
    /// What the rewrite is expected to improve.
    pub expected_improvement: String,
}

impl CorrectionPrompt {
    /// Whether this prompt merges several issues on the same field.
    pub fn is_composite(&self) -> bool {
        self.issue_types.len() > 1
    }
}

/// Instruction template for a single issue.
fn instruction_for(issue: &Issue, focus_keyword: &str) -> String {
    match issue.issue_type {
        IssueType::MetaDescriptionLength => format!(
            "Rewrite the meta description to be {} (currently {}). Keep it a single \
             compelling sentence or two.",
            issue.target_value, issue.current_value
        ),
        IssueType::MetaDescriptionKeywordMissing => format!(
            "Work the focus keyword '{focus_keyword}' naturally into the meta description."
        ),
        IssueType::KeywordDensityLow => format!(
            "Increase mentions of '{focus_keyword}' in the body so density lands in {} \
             (currently {}). Add mentions naturally; do not stuff.",
            issue.target_value, issue.current_value
        ),
        IssueType::KeywordDensityHigh => format!(
            "Reduce mentions of '{focus_keyword}' in the body so density lands in {} \
             (currently {}). Replace excess mentions with pronouns or synonyms.",
            issue.target_value, issue.current_value
        ),
        IssueType::TitleTooLong => format!(
            "Shorten the title to {} (currently {}) without losing the core promise.",
            issue.target_value, issue.current_value
        ),
        IssueType::TitleKeywordMissing => format!(
            "Rework the title so it contains the focus keyword '{focus_keyword}', \
             preferably near the start."
        ),
        IssueType::TitleNotUnique => {
            "Rewrite the title so it no longer duplicates an existing post title; \
             keep the topic and keyword."
                .to_string()
        }
        IssueType::PassiveVoice => format!(
            "Rewrite passive-voice sentences in the body into active voice \
             (currently {} passive, target {}).",
            issue.current_value, issue.target_value
        ),
        IssueType::LongSentences => format!(
            "Split sentences longer than 20 words into shorter ones \
             (currently {} long, target {}).",
            issue.current_value, issue.target_value
        ),
        IssueType::TransitionWords => format!(
            "Add transition words (however, therefore, also, ...) so that {} of \
             sentences start with or contain one (currently {}).",
            issue.target_value, issue.current_value
        ),
        IssueType::ImageAltMissing => {
            "Write descriptive alt text for each image that has none, describing what \
             the image shows."
                .to_string()
        }
        IssueType::ImageAltPoor => format!(
            "Expand thin or keyword-only image alt text into a short description; \
             mention '{focus_keyword}' only where it genuinely fits."
        ),
        IssueType::SecondaryKeywordMissing => format!(
            "Mention the phrase from this requirement at least once in the body: {}.",
            issue.target_value
        ),
    }
}

fn improvement_for(issue: &Issue) -> String {
    format!("{} -> {}", issue.current_value, issue.target_value)
}

/// Generates rewrite prompts from issues, merging per field.
#[derive(Debug, Clone, Default)]
pub struct PromptGenerator;

impl PromptGenerator {
    pub fn new() -> Self {
        Self
    }

    /// One prompt per issue, except issues sharing a field, which collapse
    /// into one composite instruction. Output order is stable (by field).
    pub fn generate_prompts_for_issues(
        &self,
        issues: &[Issue],
        focus_keyword: &str,
        _content: &Content,
    ) -> Vec<CorrectionPrompt> {
        use std::collections::BTreeMap;

        let mut by_field: BTreeMap<ContentField, Vec<&Issue>> = BTreeMap::new();
        for issue in issues {
            by_field.entry(issue.field).or_default().push(issue);
        }

        by_field
            .into_iter()
            .map(|(field, group)| {
                let issue_types: Vec<IssueType> = group.iter().map(|i| i.issue_type).collect();
                let instruction = if group.len() == 1 {
                    instruction_for(group[0], focus_keyword)
                } else {
                    let mut parts = vec![format!(
                        "Apply all of the following changes to the {field} in one rewrite:"
                    )];
                    for (idx, issue) in group.iter().enumerate() {
                        parts.push(format!(
                            "{}. {}",
                            idx + 1,
                            instruction_for(issue, focus_keyword)
                        ));
                    }
                    parts.join("\n")
                };
                let expected_improvement = group
                    .iter()
                    .map(|i| improvement_for(i))
                    .collect::<Vec<_>>()
                    .join("; ");

                CorrectionPrompt {
                    issue_types,
                    field,
                    instruction,
                    expected_improvement,
                }
            })
            .collect()
    }

    /// Strategy name for a pass built from these prompts.
    pub fn strategy_for(prompts: &[CorrectionPrompt]) -> &'static str {
        if prompts.iter().any(CorrectionPrompt::is_composite) {
            STRATEGY_COMPOSITE
        } else {
            STRATEGY_TARGETED
        }
    }
}
