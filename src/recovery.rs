//! Error classification, recovery strategies, and graceful degradation.
//!
//! Every failure in the optimization loop moves through the same machine:
//! classify → select strategy → execute → (success | exhausted). Retriable
//! work runs through [`ErrorHandler::execute_with_recovery`] with bounded
//! exponential backoff (a deliberate `tokio::time::sleep`, never
//! busy-waiting); exhaustion applies the component's fallback plan instead
//! of raising. Handled errors are never swallowed: each one lands in an
//! inspectable log and folds into the final user-facing report.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Failure taxonomy.
///
/// Ordered by severity so `max()` picks the worst category in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Logged, no behavioral change.
    Informational,
    /// Partial success accepted, tracked as reduced success rate.
    Degraded,
    /// Transient — retried with backoff, then failed over.
    Recoverable,
    /// Fatal and unrecoverable — terminates the session.
    Critical,
}

impl ErrorCategory {
    pub fn is_critical(self) -> bool {
        self == Self::Critical
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Informational => write!(f, "informational"),
            Self::Degraded => write!(f, "degraded"),
            Self::Recoverable => write!(f, "recoverable"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

const CRITICAL_KEYWORDS: &[&str] = &[
    "fatal",
    "crash",
    "cannot continue",
    "unrecoverable",
    "panic",
    "corrupt",
];

const RECOVERABLE_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "network",
    "connection",
    "unavailable",
    "temporar",
    "retry",
    "429",
    "503",
];

const DEGRADED_KEYWORDS: &[&str] = &["partial", "degraded", "some checks failed"];

const INFORMATIONAL_KEYWORDS: &[&str] = &["notice", "deprecated", "skipped", "informational"];

/// Keyword-based classification. Critical keywords outrank recoverable
/// ones; unknown messages default to recoverable, matching the
/// provider-boundary policy of treating errors as transient until proven
/// otherwise.
pub fn classify_error(message: &str, component: &str) -> ErrorCategory {
    let haystack = format!("{} {}", component, message).to_lowercase();
    let any = |keywords: &[&str]| keywords.iter().any(|k| haystack.contains(k));

    if any(CRITICAL_KEYWORDS) {
        ErrorCategory::Critical
    } else if any(RECOVERABLE_KEYWORDS) {
        ErrorCategory::Recoverable
    } else if any(DEGRADED_KEYWORDS) {
        ErrorCategory::Degraded
    } else if any(INFORMATIONAL_KEYWORDS) {
        ErrorCategory::Informational
    } else {
        ErrorCategory::Recoverable
    }
}

/// Named recovery approaches, selected per error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    ProviderFailover,
    ExponentialBackoff,
    RetryWithBackoff,
    RollbackRestore,
    SkipAndContinue,
    GenericRetry,
}

impl RecoveryStrategy {
    /// Whether this strategy schedules a delay before the next attempt.
    fn wants_backoff(self) -> bool {
        matches!(
            self,
            Self::ExponentialBackoff | Self::RetryWithBackoff | Self::GenericRetry
        )
    }

    /// Human-readable action for logs and reports.
    pub fn action(self) -> &'static str {
        match self {
            Self::ProviderFailover => "switch to the alternate generation provider",
            Self::ExponentialBackoff => "wait with exponentially increasing delay, then retry",
            Self::RetryWithBackoff => "retry the request after a short delay",
            Self::RollbackRestore => "restore the pre-correction snapshot and continue",
            Self::SkipAndContinue => "skip this correction and continue with the next",
            Self::GenericRetry => "retry the operation once more",
        }
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProviderFailover => "provider_failover",
            Self::ExponentialBackoff => "exponential_backoff",
            Self::RetryWithBackoff => "retry_with_backoff",
            Self::RollbackRestore => "rollback_restore",
            Self::SkipAndContinue => "skip_and_continue",
            Self::GenericRetry => "generic_retry",
        };
        write!(f, "{s}")
    }
}

/// What the handler decided for one error occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryDecision {
    pub strategy: RecoveryStrategy,
    pub action: String,
    /// Set when the strategy schedules a delay before the next attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_delay: Option<Duration>,
}

/// One handled error, retained in the inspectable log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandledError {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub error_type: String,
    pub message: String,
    pub context: String,
    pub category: ErrorCategory,
    pub strategy: RecoveryStrategy,
    pub attempt: u32,
}

/// How much of a component's capability survived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Full,
    Partial,
    Unavailable,
}

/// Result of accepting partial success for a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationOutcome {
    pub success: bool,
    pub degraded: bool,
    /// passed / (passed + failed) × 100.
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation_level: Option<DegradationLevel>,
}

/// Ordered fallback plan for a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPlan {
    pub component: String,
    pub primary: String,
    pub levels: Vec<String>,
    /// Terminal level: accept partial results rather than fail.
    pub graceful_degradation: bool,
}

/// Human-readable error report for the end of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReport {
    pub summary: String,
    pub details: Vec<String>,
    pub recommendations: Vec<String>,
    pub severity: ErrorCategory,
}

/// Result of `execute_with_recovery`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    pub attempts: u32,
    pub fallback_applied: bool,
}

/// Retry/backoff limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

/// Classifies failures, selects strategies, and executes bounded retries.
pub struct ErrorHandler {
    config: RecoveryConfig,
    strategies: HashMap<&'static str, RecoveryStrategy>,
    log: Vec<HandledError>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

impl ErrorHandler {
    pub fn new(config: RecoveryConfig) -> Self {
        let strategies = HashMap::from([
            ("ai_provider_failure", RecoveryStrategy::ProviderFailover),
            ("rate_limit_exceeded", RecoveryStrategy::ExponentialBackoff),
            ("network_error", RecoveryStrategy::RetryWithBackoff),
            ("structure_violation", RecoveryStrategy::RollbackRestore),
            ("content_validation_failure", RecoveryStrategy::SkipAndContinue),
        ]);
        Self {
            config,
            strategies,
            log: Vec::new(),
        }
    }

    /// The fixed error-type → strategy mapping.
    pub fn recovery_strategies(&self) -> &HashMap<&'static str, RecoveryStrategy> {
        &self.strategies
    }

    /// Every error handled so far, oldest first.
    pub fn error_log(&self) -> &[HandledError] {
        &self.log
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let ms = self
            .config
            .base_backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.config.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Classify an error, pick its strategy, and log the occurrence.
    pub fn handle_error_with_recovery(
        &mut self,
        error_type: &str,
        component: &str,
        error: &str,
        context: &str,
        attempt: u32,
    ) -> RecoveryDecision {
        let strategy = self
            .strategies
            .get(error_type)
            .copied()
            .unwrap_or(RecoveryStrategy::GenericRetry);
        let category = classify_error(error, component);
        let backoff_delay = strategy.wants_backoff().then(|| self.backoff_for(attempt));

        debug!(
            component,
            error_type,
            %category,
            %strategy,
            attempt,
            "error handled"
        );

        self.log.push(HandledError {
            timestamp: Utc::now(),
            component: component.to_string(),
            error_type: error_type.to_string(),
            message: error.to_string(),
            context: context.to_string(),
            category,
            strategy,
            attempt,
        });

        RecoveryDecision {
            strategy,
            action: strategy.action().to_string(),
            backoff_delay,
        }
    }

    /// Accept partial results: degraded whenever failures coexist with at
    /// least one success.
    pub fn apply_graceful_degradation(
        &self,
        component: &str,
        passed_checks: &[String],
        failed_checks: &[String],
    ) -> DegradationOutcome {
        let passed = passed_checks.len();
        let failed = failed_checks.len();
        let total = passed + failed;
        let success_rate = if total == 0 {
            100.0
        } else {
            passed as f64 / total as f64 * 100.0
        };

        let degraded = failed > 0 && passed > 0;
        let degradation_level = if failed == 0 {
            None
        } else if degraded {
            Some(DegradationLevel::Partial)
        } else {
            Some(DegradationLevel::Unavailable)
        };

        if degraded {
            warn!(
                component,
                success_rate, "accepting partially degraded results"
            );
        }

        DegradationOutcome {
            success: passed > 0,
            degraded,
            success_rate,
            degradation_level,
        }
    }

    /// Ordered fallback plan per component.
    pub fn fallback_strategy(&self, component: &str) -> FallbackPlan {
        let (primary, levels) = match component {
            "corrector" => (
                "primary_provider",
                vec![
                    "failover_provider".to_string(),
                    "skip_failed_corrections".to_string(),
                ],
            ),
            "preserver" => (
                "structural_validation",
                vec!["rollback_to_snapshot".to_string()],
            ),
            "detector" => (
                "full_rule_set",
                vec!["default_thresholds".to_string()],
            ),
            _ => ("retry", vec!["skip_component".to_string()]),
        };
        FallbackPlan {
            component: component.to_string(),
            primary: primary.to_string(),
            levels,
            graceful_degradation: true,
        }
    }

    /// Run an operation with bounded retry and exponential backoff.
    ///
    /// On exhaustion the component's fallback plan is applied and reported
    /// via `fallback_applied` instead of raising.
    pub async fn execute_with_recovery<T, F, Fut>(
        &mut self,
        mut operation: F,
        error_type: &str,
        component: &str,
    ) -> RecoveryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max = self.config.max_attempts.max(1);
        for attempt in 0..max {
            match operation().await {
                Ok(value) => {
                    return RecoveryOutcome {
                        success: true,
                        value: Some(value),
                        attempts: attempt + 1,
                        fallback_applied: false,
                    };
                }
                Err(err) => {
                    let decision = self.handle_error_with_recovery(
                        error_type,
                        component,
                        &err.to_string(),
                        "execute_with_recovery",
                        attempt,
                    );
                    if attempt + 1 < max {
                        if let Some(delay) = decision.backoff_delay {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        let plan = self.fallback_strategy(component);
        warn!(
            component,
            attempts = max,
            fallback = %plan.primary,
            "operation exhausted retries, applying fallback"
        );
        RecoveryOutcome {
            success: false,
            value: None,
            attempts: max,
            fallback_applied: true,
        }
    }

    /// Fold a batch of handled errors into a human-readable report.
    pub fn generate_user_friendly_report(&self, errors: &[HandledError]) -> UserReport {
        if errors.is_empty() {
            return UserReport {
                summary: "No errors were encountered during optimization.".to_string(),
                details: Vec::new(),
                recommendations: Vec::new(),
                severity: ErrorCategory::Informational,
            };
        }

        let count_of = |category: ErrorCategory| {
            errors.iter().filter(|e| e.category == category).count()
        };
        let severity = errors
            .iter()
            .map(|e| e.category)
            .max()
            .unwrap_or(ErrorCategory::Informational);

        let summary = format!(
            "{} error(s) handled: {} critical, {} recoverable, {} degraded, {} informational.",
            errors.len(),
            count_of(ErrorCategory::Critical),
            count_of(ErrorCategory::Recoverable),
            count_of(ErrorCategory::Degraded),
            count_of(ErrorCategory::Informational),
        );

        let details = errors
            .iter()
            .map(|e| {
                format!(
                    "[{}] {}: {} (handled via {})",
                    e.category, e.component, e.message, e.strategy
                )
            })
            .collect();

        let mut recommendations = Vec::new();
        if count_of(ErrorCategory::Critical) > 0 {
            recommendations
                .push("A critical failure ended the session early; review provider and content configuration before retrying.".to_string());
        }
        if errors.iter().any(|e| e.error_type == "rate_limit_exceeded") {
            recommendations
                .push("The provider rate-limited requests; lower the pass frequency or raise the API quota.".to_string());
        }
        if errors.iter().any(|e| e.error_type == "ai_provider_failure") {
            recommendations
                .push("The primary provider failed repeatedly; verify its endpoint or configure a failover provider.".to_string());
        }
        if errors.iter().any(|e| e.error_type == "content_validation_failure") {
            recommendations
                .push("Some rewrites were rejected as no-ops; consider raising max_tokens or adjusting prompt templates.".to_string());
        }
        if recommendations.is_empty() {
            recommendations.push("Errors were transient and recovered automatically; no action needed.".to_string());
        }

        UserReport {
            summary,
            details,
            recommendations,
            severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_critical_keywords_outrank_recoverable() {
        assert_eq!(
            classify_error("fatal network timeout", "corrector"),
            ErrorCategory::Critical
        );
        assert_eq!(
            classify_error("request timed out", "corrector"),
            ErrorCategory::Recoverable
        );
        assert_eq!(
            classify_error("partial results only", "detector"),
            ErrorCategory::Degraded
        );
        assert_eq!(
            classify_error("deprecated option skipped", "config"),
            ErrorCategory::Informational
        );
    }

    #[test]
    fn test_unknown_errors_default_to_recoverable() {
        assert_eq!(
            classify_error("something odd happened", "corrector"),
            ErrorCategory::Recoverable
        );
    }

    #[test]
    fn test_strategy_mapping() {
        let mut handler = ErrorHandler::default();
        let decision =
            handler.handle_error_with_recovery("ai_provider_failure", "corrector", "502", "", 0);
        assert_eq!(decision.strategy, RecoveryStrategy::ProviderFailover);

        let decision =
            handler.handle_error_with_recovery("rate_limit_exceeded", "corrector", "429", "", 0);
        assert_eq!(decision.strategy, RecoveryStrategy::ExponentialBackoff);
        assert!(decision.backoff_delay.is_some());

        let decision = handler.handle_error_with_recovery("mystery_type", "x", "?", "", 0);
        assert_eq!(decision.strategy, RecoveryStrategy::GenericRetry);
    }

    #[test]
    fn test_backoff_grows_exponentially_and_caps() {
        let handler = ErrorHandler::default();
        assert_eq!(handler.backoff_for(0), Duration::from_millis(100));
        assert_eq!(handler.backoff_for(1), Duration::from_millis(200));
        assert_eq!(handler.backoff_for(2), Duration::from_millis(400));
        assert_eq!(handler.backoff_for(10), Duration::from_millis(5_000));
    }

    #[test]
    fn test_errors_are_never_swallowed() {
        let mut handler = ErrorHandler::default();
        handler.handle_error_with_recovery("network_error", "corrector", "reset", "pass 1", 0);
        handler.handle_error_with_recovery("network_error", "corrector", "reset", "pass 2", 1);
        assert_eq!(handler.error_log().len(), 2);
        assert_eq!(handler.error_log()[0].context, "pass 1");
    }

    #[test]
    fn test_graceful_degradation_math() {
        let handler = ErrorHandler::default();

        let outcome = handler.apply_graceful_degradation(
            "detector",
            &["a".into(), "b".into(), "c".into()],
            &["d".into()],
        );
        assert!(outcome.success);
        assert!(outcome.degraded);
        assert_eq!(outcome.success_rate, 75.0);
        assert_eq!(outcome.degradation_level, Some(DegradationLevel::Partial));

        let clean = handler.apply_graceful_degradation("detector", &["a".into()], &[]);
        assert!(!clean.degraded);
        assert_eq!(clean.success_rate, 100.0);
        assert_eq!(clean.degradation_level, None);

        let dead = handler.apply_graceful_degradation("detector", &[], &["a".into()]);
        assert!(!dead.success);
        assert!(!dead.degraded);
        assert_eq!(dead.degradation_level, Some(DegradationLevel::Unavailable));
    }

    #[test]
    fn test_fallback_plans_end_in_degradation() {
        let handler = ErrorHandler::default();
        let plan = handler.fallback_strategy("corrector");
        assert_eq!(plan.primary, "primary_provider");
        assert!(plan.graceful_degradation);
        assert!(!plan.levels.is_empty());
    }

    #[tokio::test]
    async fn test_execute_with_recovery_first_try() {
        let mut handler = ErrorHandler::default();
        let outcome = handler
            .execute_with_recovery(|| async { Ok::<_, anyhow::Error>(42) }, "network_error", "x")
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.value, Some(42));
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.fallback_applied);
    }

    #[tokio::test]
    async fn test_execute_with_recovery_retries_then_succeeds() {
        let mut handler = ErrorHandler::new(RecoveryConfig {
            base_backoff_ms: 1,
            ..Default::default()
        });
        let calls = AtomicU32::new(0);
        let outcome = handler
            .execute_with_recovery(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            anyhow::bail!("connection reset");
                        }
                        Ok(7)
                    }
                },
                "network_error",
                "corrector",
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(handler.error_log().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_with_recovery_exhaustion_applies_fallback() {
        let mut handler = ErrorHandler::new(RecoveryConfig {
            max_attempts: 2,
            base_backoff_ms: 1,
            ..Default::default()
        });
        let outcome: RecoveryOutcome<()> = handler
            .execute_with_recovery(
                || async { anyhow::bail!("still down") },
                "ai_provider_failure",
                "corrector",
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.fallback_applied);
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn test_user_report_severity_and_recommendations() {
        let mut handler = ErrorHandler::default();
        handler.handle_error_with_recovery("rate_limit_exceeded", "corrector", "rate limit hit", "", 0);
        handler.handle_error_with_recovery("ai_provider_failure", "corrector", "fatal crash", "", 0);

        let report = handler.generate_user_friendly_report(&handler.error_log().to_vec());
        assert_eq!(report.severity, ErrorCategory::Critical);
        assert_eq!(report.details.len(), 2);
        assert!(report.summary.contains("2 error(s)"));
        assert!(report.recommendations.len() >= 2);
    }

    #[test]
    fn test_user_report_empty() {
        let handler = ErrorHandler::default();
        let report = handler.generate_user_friendly_report(&[]);
        assert_eq!(report.severity, ErrorCategory::Informational);
        assert!(report.details.is_empty());
    }
}
