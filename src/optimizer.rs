//! The multi-pass orchestrator: detect → correct → validate, bounded.
//!
//! Drives every other component through the loop state machine. Each pass
//! runs detection, generates prompts, applies AI corrections, validates the
//! result against the original structure (rolling back on a major
//! violation), re-scores, and records the pass with the tracker.
//!
//! Pass failures never escape as raw errors. Non-critical ones are routed
//! through the error handler and the loop continues with the pre-pass
//! content as a no-op pass; a classified-critical failure terminates the
//! session. Either way the caller always receives a full result with a
//! termination reason and a readable error report.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::content::Content;
use crate::corrector::ContentCorrector;
use crate::detector::{DetectionReport, SeoIssueDetector};
use crate::preserver::StructurePreserver;
use crate::prompts::{PromptGenerator, STRATEGY_NOOP_RECOVERY};
use crate::recovery::{classify_error, ErrorHandler, UserReport};
use crate::report::{ComprehensiveReport, SessionSummary};
use crate::state_machine::{LoopState, LoopStateMachine};
use crate::tracker::{PassData, ProgressTracker};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Compliance score reached the configured target.
    TargetReached,
    /// Iteration cap hit before the target.
    BudgetExhausted,
    /// No issues to fix; content left untouched when this holds at pass 0.
    AlreadyCompliant,
    /// Two consecutive passes with no score improvement.
    Stagnation,
    /// A classified-critical failure ended the session.
    CriticalError,
    /// Caller asked to skip optimization entirely.
    Bypassed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetReached => write!(f, "target_reached"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::AlreadyCompliant => write!(f, "already_compliant"),
            Self::Stagnation => write!(f, "stagnation"),
            Self::CriticalError => write!(f, "critical_error"),
            Self::Bypassed => write!(f, "bypassed"),
        }
    }
}

/// How the caller wants the entry point to behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMode {
    /// Run the full loop automatically.
    #[default]
    Seamless,
    /// Run the full loop; the caller reviews the result before publishing.
    Manual,
    /// Skip optimization and return the original content tagged as bypassed.
    Bypass,
}

/// Loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Maximum correction passes per session.
    pub max_iterations: u32,
    /// Score at or above which the session succeeds.
    pub target_compliance_score: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            target_compliance_score: 90.0,
        }
    }
}

/// Everything a caller gets back from one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub final_content: Content,
    /// Correction passes actually run.
    pub passes: u32,
    /// Score of the final content.
    pub compliance_score: f64,
    pub termination_reason: TerminationReason,
    pub report: ComprehensiveReport,
    /// Human-readable account of every error handled during the session.
    pub error_report: UserReport,
    pub session_id: String,
}

/// Advance the loop state machine, surfacing graph violations.
///
/// The loop only requests legal transitions; a rejection here means the
/// loop itself regressed, so it is logged and trips debug builds instead
/// of being silently swallowed.
fn advance_loop(state: &mut LoopStateMachine, to: LoopState, reason: Option<&str>) {
    if let Err(err) = state.advance(to, reason) {
        warn!(error = %err, "loop transition rejected");
        debug_assert!(false, "loop transition rejected: {err}");
    }
}

/// What one pass produced, for recording and loop control.
struct PassOutput {
    content: Content,
    critical: bool,
    corrections_applied: Vec<String>,
    strategy: String,
}

impl PassOutput {
    fn noop(current: &Content, critical: bool) -> Self {
        Self {
            content: current.clone(),
            critical,
            corrections_applied: Vec::new(),
            strategy: STRATEGY_NOOP_RECOVERY.to_string(),
        }
    }
}

/// Orchestrates one optimization session over injected collaborators.
pub struct MultiPassOptimizer {
    detector: SeoIssueDetector,
    prompt_generator: PromptGenerator,
    corrector: ContentCorrector,
    preserver: StructurePreserver,
    error_handler: ErrorHandler,
    tracker: ProgressTracker,
    config: OptimizerConfig,
    last_session_id: Option<String>,
}

impl MultiPassOptimizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detector: SeoIssueDetector,
        prompt_generator: PromptGenerator,
        corrector: ContentCorrector,
        preserver: StructurePreserver,
        error_handler: ErrorHandler,
        tracker: ProgressTracker,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            detector,
            prompt_generator,
            corrector,
            preserver,
            error_handler,
            tracker,
            config,
            last_session_id: None,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Content as it stood after the given pass of the most recent session.
    pub fn rollback_to_pass(&self, pass_number: u32) -> Option<Content> {
        let session_id = self.last_session_id.as_deref()?;
        self.tracker.rollback_to_pass(session_id, pass_number)
    }

    /// Run one bounded optimization session.
    ///
    /// Never returns a bare error: every outcome, including critical
    /// failure, arrives as an [`OptimizationResult`] with a termination
    /// reason and the session report.
    pub async fn optimize_content(
        &mut self,
        content: Content,
        focus_keyword: &str,
        mode: OptimizationMode,
    ) -> OptimizationResult {
        let session_id = self.tracker.start_session();
        self.last_session_id = Some(session_id.clone());
        let mut state = LoopStateMachine::new();

        if mode == OptimizationMode::Bypass {
            info!(session = %session_id, "optimization bypassed by caller");
            advance_loop(&mut state, LoopState::Terminated, Some("bypassed"));
            let score = self.detect(&content, focus_keyword).compliance_score;
            return self.finish(content, 0, score, TerminationReason::Bypassed, &session_id);
        }

        let mut current = content;
        let mut passes: u32 = 0;
        let mut flat_streak: u32 = 0;

        let reason = loop {
            advance_loop(&mut state, LoopState::Detecting, None);
            let detection = self.detect(&current, focus_keyword);
            let score = detection.compliance_score;

            if passes == 0 && detection.is_compliant() {
                break TerminationReason::AlreadyCompliant;
            }
            if score >= self.config.target_compliance_score {
                break TerminationReason::TargetReached;
            }
            if passes >= self.config.max_iterations {
                break TerminationReason::BudgetExhausted;
            }
            if detection.is_compliant() {
                break TerminationReason::AlreadyCompliant;
            }
            if flat_streak >= 2 {
                break TerminationReason::Stagnation;
            }

            passes += 1;
            state.set_pass(passes);
            let pass_start = Instant::now();
            advance_loop(&mut state, LoopState::Correcting, Some("issues detected"));

            let pass = self
                .run_pass(&mut state, &current, &detection, focus_keyword)
                .await;

            let after_report = self.detect(&pass.content, focus_keyword);
            let after = after_report.compliance_score;
            flat_streak = if after > score { 0 } else { flat_streak + 1 };

            let issues_resolved: Vec<String> = detection
                .issues
                .iter()
                .filter(|i| {
                    !after_report
                        .issues
                        .iter()
                        .any(|a| a.issue_type == i.issue_type)
                })
                .map(|i| format!("{:?}", i.issue_type))
                .collect();

            let record = PassData {
                before_score: score,
                after_score: after,
                issues_resolved,
                corrections_applied: pass.corrections_applied,
                strategy_used: pass.strategy,
                duration_ms: pass_start.elapsed().as_millis() as u64,
                content: pass.content.clone(),
            };
            if let Err(err) = self.tracker.record_pass(&session_id, record) {
                warn!(session = %session_id, error = %err, "pass not recorded");
            }

            debug!(
                pass = passes,
                before = score,
                after,
                flat_streak,
                "pass complete"
            );

            current = pass.content;
            if pass.critical {
                break TerminationReason::CriticalError;
            }
        };

        advance_loop(&mut state, LoopState::Terminated, Some(&reason.to_string()));
        info!(
            session = %session_id,
            passes,
            %reason,
            "session terminated: {}",
            state.summary()
        );

        let final_score = self.detect(&current, focus_keyword).compliance_score;
        self.finish(current, passes, final_score, reason, &session_id)
    }

    fn detect(&self, content: &Content, focus_keyword: &str) -> DetectionReport {
        self.detector
            .detect_all_issues(content, focus_keyword, &content.secondary_keywords)
    }

    /// One correction pass: prompts → provider → structural validation.
    ///
    /// On a critical failure or a structural rollback the pre-pass content
    /// survives, so the caller can treat the pass as a no-op.
    async fn run_pass(
        &mut self,
        state: &mut LoopStateMachine,
        current: &Content,
        detection: &DetectionReport,
        focus_keyword: &str,
    ) -> PassOutput {
        let prompts =
            self.prompt_generator
                .generate_prompts_for_issues(&detection.issues, focus_keyword, current);
        let strategy = PromptGenerator::strategy_for(&prompts);

        let outcome = self
            .corrector
            .apply_corrections(current, &prompts, focus_keyword)
            .await;

        let mut critical = false;
        for (attempt, failure) in outcome.errors.iter().enumerate() {
            let decision = self.error_handler.handle_error_with_recovery(
                &failure.error_type,
                "content_corrector",
                &failure.message,
                &format!("field {}", failure.field),
                attempt as u32,
            );
            debug!(action = %decision.action, "corrector failure routed");
            if classify_error(&failure.message, "content_corrector").is_critical() {
                critical = true;
            }
        }

        advance_loop(state, LoopState::Validating, None);

        if critical {
            warn!("critical corrector failure, discarding pass output");
            return PassOutput::noop(current, true);
        }
        if outcome.corrections_applied.is_empty() {
            // Nothing passed validation; skip structural checks.
            return PassOutput::noop(current, false);
        }

        let corrections_applied: Vec<String> = outcome
            .corrections_applied
            .iter()
            .map(|r| r.field.to_string())
            .collect();

        let preservation = self
            .preserver
            .preserve_content(current, &outcome.corrected_content);
        if preservation.rolled_back {
            self.error_handler.handle_error_with_recovery(
                "structure_violation",
                "structure_preserver",
                "candidate altered document structure",
                "post-correction validation",
                0,
            );
            return PassOutput::noop(current, false);
        }

        PassOutput {
            content: preservation.content,
            critical: false,
            corrections_applied,
            strategy: strategy.to_string(),
        }
    }

    fn finish(
        &mut self,
        final_content: Content,
        passes: u32,
        compliance_score: f64,
        termination_reason: TerminationReason,
        session_id: &str,
    ) -> OptimizationResult {
        if let Err(err) = self.tracker.end_session(session_id) {
            warn!(session = %session_id, error = %err, "session close failed");
        }
        let report = self
            .tracker
            .generate_comprehensive_report(session_id, self.config.target_compliance_score)
            .unwrap_or_else(|| empty_report(session_id));
        let error_report = self
            .error_handler
            .generate_user_friendly_report(self.error_handler.error_log());

        OptimizationResult {
            final_content,
            passes,
            compliance_score,
            termination_reason,
            report,
            error_report,
            session_id: session_id.to_string(),
        }
    }
}

fn empty_report(session_id: &str) -> ComprehensiveReport {
    ComprehensiveReport {
        summary: SessionSummary {
            session_id: session_id.to_string(),
            total_passes: 0,
            duration_ms: 0,
            initial_score: None,
            final_score: None,
            net_improvement: 0.0,
        },
        passes: Vec::new(),
        strategies: Vec::new(),
        before_after: None,
        analysis: None,
    }
}
