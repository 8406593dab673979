//! Structural integrity guard for corrected content.
//!
//! Snapshots content before a correction, fingerprints its block structure,
//! and rolls the correction back when the candidate breaks structure. The
//! fingerprint counts block-level tags, heading levels, list items, images,
//! and paragraph boundaries:
//! - heading / image / list-item count drift is a **major** violation
//!   (structure-breaking edit);
//! - paragraph drift or formatting-only drift is **minor**.
//!
//! Checksums are strict content hashes (blake3 over the serialized record),
//! not structural hashes: any byte-level change flips the checksum.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::content::Content;

/// Counts of structural elements in a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructureDescriptor {
    /// Total heading tags.
    pub headings: u32,
    /// Heading count per level h1..h6.
    pub heading_levels: [u32; 6],
    /// Paragraph tags.
    pub paragraphs: u32,
    /// List item tags.
    pub list_items: u32,
    /// Images: inline `<img>` tags plus attached image prompts.
    pub images: u32,
    /// All block-level tags.
    pub block_tags: u32,
    /// Inline formatting tags (strong, em, b, i, a).
    pub inline_format_tags: u32,
}

/// How severe a structural violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationClass {
    Major,
    Minor,
}

/// What drifted between original and candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    HeadingCountChanged,
    ImageCountChanged,
    ListItemCountChanged,
    ParagraphDrift,
    FormattingDrift,
}

impl ViolationKind {
    fn class(self) -> ViolationClass {
        match self {
            Self::HeadingCountChanged | Self::ImageCountChanged | Self::ListItemCountChanged => {
                ViolationClass::Major
            }
            Self::ParagraphDrift | Self::FormattingDrift => ViolationClass::Minor,
        }
    }

    /// Formatting-class violations also break `formatting_preserved`.
    fn is_formatting(self) -> bool {
        matches!(self, Self::FormattingDrift)
    }
}

/// One detected structural difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub class: ViolationClass,
    pub message: String,
}

/// Outcome of comparing a candidate against the original structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// True only when zero major violations exist.
    pub structure_preserved: bool,
    /// True when neither major nor formatting-class minor violations exist.
    pub formatting_preserved: bool,
    pub violations: Vec<Violation>,
}

/// Checksum comparison result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorruptionCheck {
    pub is_corrupted: bool,
    pub expected: String,
    pub actual: String,
}

/// Immutable saved copy of content, usable for rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub content: Content,
    pub checksum: String,
    pub structural_fingerprint: StructureDescriptor,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Result of `preserve_content`: the surviving content plus what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservationOutcome {
    /// True when the candidate was accepted.
    pub success: bool,
    pub validation: IntegrityReport,
    /// True when the original was restored instead.
    pub rolled_back: bool,
    /// The content that survives the call.
    pub content: Content,
    /// Id of the implicit pre-correction snapshot.
    pub snapshot_id: String,
}

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h([1-6])[\s>]").unwrap());
static PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<p[\s>]").unwrap());
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li[\s>]").unwrap());
static IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img[\s>/]").unwrap());
static BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:p|h[1-6]|ul|ol|li|blockquote|pre|table|div)[\s>]").unwrap());
static INLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(?:strong|em|b|i|a)[\s>]").unwrap());

/// Strict content hash over the full serialized record.
///
/// Struct field order is stable, so the JSON encoding is canonical.
pub fn content_checksum(content: &Content) -> String {
    let bytes = serde_json::to_vec(content).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Snapshot store and integrity validator.
#[derive(Debug, Default)]
pub struct StructurePreserver {
    snapshots: HashMap<String, Snapshot>,
}

impl StructurePreserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the structural fingerprint of a content record.
    pub fn analyze_structure(&self, content: &Content) -> StructureDescriptor {
        let body = &content.body;
        let mut heading_levels = [0u32; 6];
        for cap in HEADING.captures_iter(body) {
            let level: usize = cap[1].parse().unwrap_or(1);
            heading_levels[level - 1] += 1;
        }
        StructureDescriptor {
            headings: heading_levels.iter().sum(),
            heading_levels,
            paragraphs: PARAGRAPH.find_iter(body).count() as u32,
            list_items: LIST_ITEM.find_iter(body).count() as u32,
            images: IMG.find_iter(body).count() as u32 + content.image_prompts.len() as u32,
            block_tags: BLOCK.find_iter(body).count() as u32,
            inline_format_tags: INLINE.find_iter(body).count() as u32,
        }
    }

    /// Store an immutable snapshot; returns its id.
    pub fn create_snapshot(&mut self, content: &Content, label: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let snapshot = Snapshot {
            id: id.clone(),
            content: content.clone(),
            checksum: self.generate_checksum(content),
            structural_fingerprint: self.analyze_structure(content),
            label: label.to_string(),
            created_at: Utc::now(),
        };
        self.snapshots.insert(id.clone(), snapshot);
        id
    }

    /// Return the stored snapshot unchanged, or `None` for unknown ids.
    /// Never fails.
    pub fn rollback(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.snapshots.get(snapshot_id).cloned()
    }

    /// Strict content hash over the full serialized record.
    pub fn generate_checksum(&self, content: &Content) -> String {
        content_checksum(content)
    }

    /// Compare content against a previously generated checksum.
    pub fn detect_corruption(&self, content: &Content, checksum: &str) -> CorruptionCheck {
        let actual = self.generate_checksum(content);
        CorruptionCheck {
            is_corrupted: actual != checksum,
            expected: checksum.to_string(),
            actual,
        }
    }

    /// Diff the structural fingerprints of original and candidate.
    pub fn validate_integrity(&self, original: &Content, candidate: &Content) -> IntegrityReport {
        let before = self.analyze_structure(original);
        let after = self.analyze_structure(candidate);
        let mut violations = Vec::new();

        let mut push = |kind: ViolationKind, message: String| {
            violations.push(Violation {
                kind,
                class: kind.class(),
                message,
            });
        };

        if before.headings != after.headings {
            push(
                ViolationKind::HeadingCountChanged,
                format!("heading count changed: {} -> {}", before.headings, after.headings),
            );
        }
        if before.images != after.images {
            push(
                ViolationKind::ImageCountChanged,
                format!("image count changed: {} -> {}", before.images, after.images),
            );
        }
        if before.list_items != after.list_items {
            push(
                ViolationKind::ListItemCountChanged,
                format!(
                    "list item count changed: {} -> {}",
                    before.list_items, after.list_items
                ),
            );
        }
        if before.paragraphs != after.paragraphs {
            push(
                ViolationKind::ParagraphDrift,
                format!(
                    "paragraph count drifted: {} -> {}",
                    before.paragraphs, after.paragraphs
                ),
            );
        }
        if before.inline_format_tags != after.inline_format_tags {
            push(
                ViolationKind::FormattingDrift,
                format!(
                    "inline formatting tags changed: {} -> {}",
                    before.inline_format_tags, after.inline_format_tags
                ),
            );
        }

        let has_major = violations.iter().any(|v| v.class == ViolationClass::Major);
        let has_formatting = violations.iter().any(|v| v.kind.is_formatting());

        IntegrityReport {
            structure_preserved: !has_major,
            formatting_preserved: !has_major && !has_formatting,
            violations,
        }
    }

    /// Validate a candidate and roll back to the original on any major
    /// violation. The original is snapshotted before the decision so the
    /// restore path is byte-exact.
    pub fn preserve_content(
        &mut self,
        original: &Content,
        candidate: &Content,
    ) -> PreservationOutcome {
        let snapshot_id = self.create_snapshot(original, "pre_correction");
        let validation = self.validate_integrity(original, candidate);

        if validation.structure_preserved {
            PreservationOutcome {
                success: true,
                validation,
                rolled_back: false,
                content: candidate.clone(),
                snapshot_id,
            }
        } else {
            warn!(
                violations = validation.violations.len(),
                "candidate breaks structure, rolling back"
            );
            // The stored snapshot is authoritative for the restore.
            let restored = self
                .rollback(&snapshot_id)
                .map(|s| s.content)
                .unwrap_or_else(|| original.clone());
            PreservationOutcome {
                success: false,
                validation,
                rolled_back: true,
                content: restored,
                snapshot_id,
            }
        }
    }
}
