//! Applies correction prompts through the generation provider.
//!
//! For each prompt the corrector asks the provider for a rewrite of the
//! target field, retrying on failure and failing over to an alternate
//! provider when configured. Candidate rewrites are validated (the field
//! must actually change and be non-empty) before they count as applied.
//! A failed correction is logged and skipped — never fatal to the pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::{Content, ContentField};
use crate::detector::IssueType;
use crate::prompts::CorrectionPrompt;
use crate::provider::{GenerationOptions, GenerationProvider, ProviderError};

/// Ceiling on the per-attempt retry delay regardless of config.
const MAX_RETRY_DELAY_MS: u64 = 5_000;

/// Corrector behavior knobs. Mutable at runtime via
/// [`ContentCorrector::update_config`]; changes apply to subsequent calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectorConfig {
    /// Attempts per provider before giving up on it.
    pub max_retry_attempts: u32,
    /// Whether to try the alternate provider after the primary is exhausted.
    pub enable_provider_failover: bool,
    /// Whether to reject no-op or empty rewrites.
    pub enable_correction_validation: bool,
    /// Base delay between retry attempts; doubles each attempt.
    pub retry_base_delay_ms: u64,
    /// Options forwarded to every generate call.
    pub generation: GenerationOptions,
}

impl Default for CorrectorConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 2,
            enable_provider_failover: true,
            enable_correction_validation: true,
            retry_base_delay_ms: 100,
            generation: GenerationOptions::default(),
        }
    }
}

/// A correction that passed validation and was applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub field: ContentField,
    pub issue_types: Vec<IssueType>,
    pub before: String,
    pub after: String,
    /// Which provider produced the accepted rewrite.
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

/// A correction that failed or was rejected, kept in the error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionFailure {
    pub field: ContentField,
    /// Error-type key for the recovery strategy table.
    pub error_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counters across all corrector calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CorrectionStats {
    pub prompts_attempted: u64,
    pub corrections_applied: u64,
    pub corrections_rejected: u64,
    pub provider_failures: u64,
    pub failovers: u64,
}

/// Result of one `apply_corrections` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionOutcome {
    /// True when at least one correction was applied (or none were needed).
    pub success: bool,
    pub corrected_content: Content,
    pub corrections_applied: Vec<CorrectionRecord>,
    pub errors: Vec<CorrectionFailure>,
}

/// Drives provider calls and merges accepted rewrites into the content.
pub struct ContentCorrector {
    primary: Arc<dyn GenerationProvider>,
    failover: Option<Arc<dyn GenerationProvider>>,
    config: CorrectorConfig,
    history: Vec<CorrectionRecord>,
    error_log: Vec<CorrectionFailure>,
    stats: CorrectionStats,
}

impl ContentCorrector {
    pub fn new(primary: Arc<dyn GenerationProvider>, config: CorrectorConfig) -> Self {
        Self {
            primary,
            failover: None,
            config,
            history: Vec::new(),
            error_log: Vec::new(),
            stats: CorrectionStats::default(),
        }
    }

    /// Configure the alternate provider used when the primary is exhausted.
    pub fn with_failover(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.failover = Some(provider);
        self
    }

    pub fn config(&self) -> &CorrectorConfig {
        &self.config
    }

    /// Replace the config; affects subsequent calls only.
    pub fn update_config(&mut self, config: CorrectorConfig) {
        self.config = config;
    }

    /// Append-only log of applied corrections with before/after values.
    pub fn correction_history(&self) -> &[CorrectionRecord] {
        &self.history
    }

    /// Append-only log of failed or rejected corrections.
    pub fn error_log(&self) -> &[CorrectionFailure] {
        &self.error_log
    }

    pub fn correction_stats(&self) -> CorrectionStats {
        self.stats
    }

    /// Apply every prompt in turn, returning the merged content.
    pub async fn apply_corrections(
        &mut self,
        content: &Content,
        prompts: &[CorrectionPrompt],
        focus_keyword: &str,
    ) -> CorrectionOutcome {
        let mut corrected = content.clone();
        let mut applied = Vec::new();
        let mut errors = Vec::new();

        for prompt in prompts {
            self.stats.prompts_attempted += 1;
            let before = prompt.field.read(&corrected).into_owned();
            let instruction = build_instruction(prompt, &before, focus_keyword);

            match self.generate_with_failover(&instruction).await {
                Ok((text, provider)) => {
                    let candidate = text.trim().to_string();
                    if self.config.enable_correction_validation
                        && (candidate.is_empty() || candidate == before)
                    {
                        self.stats.corrections_rejected += 1;
                        let failure = CorrectionFailure {
                            field: prompt.field,
                            error_type: "content_validation_failure".to_string(),
                            message: if candidate.is_empty() {
                                "rewrite was empty".to_string()
                            } else {
                                "rewrite did not change the field".to_string()
                            },
                            timestamp: Utc::now(),
                        };
                        warn!(field = %prompt.field, "correction rejected: {}", failure.message);
                        self.error_log.push(failure.clone());
                        errors.push(failure);
                        continue;
                    }

                    apply_to_field(&mut corrected, prompt.field, &candidate, focus_keyword);
                    self.stats.corrections_applied += 1;
                    let record = CorrectionRecord {
                        field: prompt.field,
                        issue_types: prompt.issue_types.clone(),
                        before,
                        after: candidate,
                        provider,
                        timestamp: Utc::now(),
                    };
                    debug!(field = %record.field, provider = %record.provider, "correction applied");
                    self.history.push(record.clone());
                    applied.push(record);
                }
                Err(err) => {
                    self.stats.provider_failures += 1;
                    let failure = CorrectionFailure {
                        field: prompt.field,
                        error_type: err.error_type().to_string(),
                        message: err.to_string(),
                        timestamp: Utc::now(),
                    };
                    warn!(field = %prompt.field, "correction failed: {}", failure.message);
                    self.error_log.push(failure.clone());
                    errors.push(failure);
                }
            }
        }

        CorrectionOutcome {
            success: prompts.is_empty() || !applied.is_empty(),
            corrected_content: corrected,
            corrections_applied: applied,
            errors,
        }
    }

    /// Retry the primary up to the attempt cap, then the failover provider.
    async fn generate_with_failover(
        &mut self,
        instruction: &str,
    ) -> Result<(String, String), ProviderError> {
        let primary = Arc::clone(&self.primary);
        match self.generate_with_retry(primary.as_ref(), instruction).await {
            Ok(text) => Ok((text, primary.name().to_string())),
            Err(primary_err) => {
                let failover = match (self.config.enable_provider_failover, &self.failover) {
                    (true, Some(p)) => Arc::clone(p),
                    _ => return Err(primary_err),
                };
                warn!(
                    primary = primary.name(),
                    failover = failover.name(),
                    "primary provider exhausted, failing over"
                );
                self.stats.failovers += 1;
                let text = self
                    .generate_with_retry(failover.as_ref(), instruction)
                    .await?;
                Ok((text, failover.name().to_string()))
            }
        }
    }

    async fn generate_with_retry(
        &self,
        provider: &dyn GenerationProvider,
        instruction: &str,
    ) -> Result<String, ProviderError> {
        let attempts = self.config.max_retry_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                // Saturating doubling with a hard cap; the attempt count is
                // caller-supplied and must not overflow the shift or produce
                // hour-long sleeps.
                let delay = self
                    .config
                    .retry_base_delay_ms
                    .saturating_mul(1u64 << (attempt - 1).min(16))
                    .min(MAX_RETRY_DELAY_MS);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            match provider.generate(instruction, &self.config.generation).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    debug!(
                        provider = provider.name(),
                        attempt = attempt + 1,
                        "generate attempt failed: {err}"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(ProviderError::EmptyResponse))
    }
}

/// Build the full provider instruction: task, current value, output contract.
fn build_instruction(prompt: &CorrectionPrompt, current: &str, focus_keyword: &str) -> String {
    format!(
        "You are revising one field of a blog post for SEO compliance. \
         The focus keyword is '{focus_keyword}'.\n\n\
         ## Task\n{}\n\n\
         ## Current {field}\n{current}\n\n\
         ## Instructions\n\
         1. Return ONLY the rewritten {field} text\n\
         2. Do not include explanations or markdown fences\n\
         3. Preserve the meaning and any HTML structure of the original",
        prompt.instruction,
        field = prompt.field,
    )
}

/// Merge an accepted rewrite into the working copy.
fn apply_to_field(content: &mut Content, field: ContentField, text: &str, focus_keyword: &str) {
    match field {
        ContentField::Title => content.title = text.to_string(),
        ContentField::Body => content.body = text.to_string(),
        ContentField::MetaDescription => content.meta_description = Some(text.to_string()),
        ContentField::ImageAlt => {
            // Rewrite only the offending alts; leave good ones untouched.
            for image in &mut content.image_prompts {
                let alt = image.alt.trim();
                if alt.is_empty() || alt.eq_ignore_ascii_case(focus_keyword) {
                    image.alt = text.to_string();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ImagePrompt;
    use crate::provider::{ScriptedProvider, ScriptedReply};

    fn prompt(field: ContentField) -> CorrectionPrompt {
        CorrectionPrompt {
            issue_types: vec![IssueType::MetaDescriptionLength],
            field,
            instruction: "Rewrite it.".into(),
            expected_improvement: "shorter -> in range".into(),
        }
    }

    fn fast_config() -> CorrectorConfig {
        CorrectorConfig {
            retry_base_delay_ms: 1,
            ..Default::default()
        }
    }

    fn content() -> Content {
        Content::builder("SEO Guide", "<p>Body.</p>")
            .meta_description("Short")
            .build()
    }

    #[tokio::test]
    async fn test_applies_rewrite_and_records_history() {
        let provider = Arc::new(ScriptedProvider::repeating("primary", "A much longer meta."));
        let mut corrector = ContentCorrector::new(provider, fast_config());

        let outcome = corrector
            .apply_corrections(&content(), &[prompt(ContentField::MetaDescription)], "SEO")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.corrections_applied.len(), 1);
        assert_eq!(
            outcome.corrected_content.meta_description.as_deref(),
            Some("A much longer meta.")
        );
        assert_eq!(corrector.correction_history().len(), 1);
        assert_eq!(corrector.correction_history()[0].before, "Short");
        assert_eq!(corrector.correction_stats().corrections_applied, 1);
    }

    #[tokio::test]
    async fn test_noop_rewrite_rejected_but_not_fatal() {
        // First reply is a no-op for the meta; second fixes the title.
        let provider = Arc::new(ScriptedProvider::new(
            "primary",
            vec![
                ScriptedReply::Text("Short".into()),
                ScriptedReply::Text("SEO Guide, Improved".into()),
            ],
        ));
        let mut corrector = ContentCorrector::new(provider, fast_config());

        let prompts = vec![prompt(ContentField::MetaDescription), prompt(ContentField::Title)];
        let outcome = corrector.apply_corrections(&content(), &prompts, "SEO").await;

        assert!(outcome.success);
        assert_eq!(outcome.corrections_applied.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].error_type, "content_validation_failure");
        assert_eq!(outcome.corrected_content.title, "SEO Guide, Improved");
        // Rejected rewrite left the meta untouched.
        assert_eq!(outcome.corrected_content.meta_description.as_deref(), Some("Short"));
        assert_eq!(corrector.error_log().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success_on_primary() {
        let provider = Arc::new(ScriptedProvider::new(
            "primary",
            vec![
                ScriptedReply::Fail(ProviderError::Network("reset".into())),
                ScriptedReply::Text("Recovered rewrite.".into()),
            ],
        ));
        let mut corrector = ContentCorrector::new(provider, fast_config());

        let outcome = corrector
            .apply_corrections(&content(), &[prompt(ContentField::MetaDescription)], "SEO")
            .await;

        assert!(outcome.success);
        assert_eq!(corrector.correction_stats().failovers, 0);
    }

    #[tokio::test]
    async fn test_failover_after_primary_exhausted() {
        let primary = Arc::new(ScriptedProvider::new(
            "primary",
            vec![
                ScriptedReply::Fail(ProviderError::Network("down".into())),
                ScriptedReply::Fail(ProviderError::Network("down".into())),
            ],
        ));
        let failover = Arc::new(ScriptedProvider::repeating("backup", "Backup rewrite."));
        let mut corrector =
            ContentCorrector::new(primary, fast_config()).with_failover(failover);

        let outcome = corrector
            .apply_corrections(&content(), &[prompt(ContentField::MetaDescription)], "SEO")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.corrections_applied[0].provider, "backup");
        assert_eq!(corrector.correction_stats().failovers, 1);
    }

    #[tokio::test]
    async fn test_all_providers_down_is_not_fatal() {
        let primary = Arc::new(ScriptedProvider::new("primary", vec![]));
        let mut corrector = ContentCorrector::new(primary, fast_config());

        let original = content();
        let outcome = corrector
            .apply_corrections(&original, &[prompt(ContentField::MetaDescription)], "SEO")
            .await;

        assert!(!outcome.success);
        assert!(outcome.corrections_applied.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.corrected_content, original);
        assert_eq!(corrector.correction_stats().provider_failures, 1);
    }

    #[tokio::test]
    async fn test_failover_disabled_by_config() {
        let primary = Arc::new(ScriptedProvider::new("primary", vec![]));
        let failover = Arc::new(ScriptedProvider::repeating("backup", "never used"));
        let mut corrector = ContentCorrector::new(primary, fast_config()).with_failover(failover);
        corrector.update_config(CorrectorConfig {
            enable_provider_failover: false,
            retry_base_delay_ms: 1,
            ..Default::default()
        });

        let outcome = corrector
            .apply_corrections(&content(), &[prompt(ContentField::MetaDescription)], "SEO")
            .await;

        assert!(!outcome.success);
        assert_eq!(corrector.correction_stats().failovers, 0);
    }

    #[tokio::test]
    async fn test_image_alt_rewrite_targets_offending_alts_only() {
        let original = Content::builder("T", "b")
            .image_prompt(ImagePrompt::new("p1", ""))
            .image_prompt(ImagePrompt::new("p2", "a fine existing alt"))
            .build();
        let provider = Arc::new(ScriptedProvider::repeating("primary", "a clear description"));
        let mut corrector = ContentCorrector::new(provider, fast_config());

        let outcome = corrector
            .apply_corrections(&original, &[prompt(ContentField::ImageAlt)], "SEO")
            .await;

        assert_eq!(outcome.corrected_content.image_prompts[0].alt, "a clear description");
        assert_eq!(outcome.corrected_content.image_prompts[1].alt, "a fine existing alt");
    }

    #[tokio::test]
    async fn test_oversized_retry_config_stays_bounded() {
        // An attempt count past the shift width must neither overflow nor
        // stretch the delays; with a zero base every retry is immediate.
        let provider = Arc::new(ScriptedProvider::new("primary", vec![]));
        let config = CorrectorConfig {
            max_retry_attempts: 70,
            retry_base_delay_ms: 0,
            enable_provider_failover: false,
            ..Default::default()
        };
        let mut corrector = ContentCorrector::new(provider, config);

        let outcome = corrector
            .apply_corrections(&content(), &[prompt(ContentField::MetaDescription)], "SEO")
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].error_type, "ai_provider_failure");
    }

    #[tokio::test]
    async fn test_empty_prompt_list_is_success() {
        let provider = Arc::new(ScriptedProvider::new("primary", vec![]));
        let mut corrector = ContentCorrector::new(provider, fast_config());
        let outcome = corrector.apply_corrections(&content(), &[], "SEO").await;
        assert!(outcome.success);
        assert!(outcome.corrections_applied.is_empty());
    }
}
