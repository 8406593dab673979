//! Bounded multi-pass SEO compliance engine.
//!
//! This library provides:
//! - Rule-based issue detection with a severity-weighted compliance score
//! - AI-assisted correction through a pluggable generation-provider boundary
//! - Structural validation with snapshot rollback when a rewrite breaks
//!   the document
//! - Error classification, bounded recovery, and graceful degradation
//! - Per-pass progress tracking with strategy effectiveness metrics
//!
//! # Flow
//!
//! The [`optimizer::MultiPassOptimizer`] drives the loop: detect issues,
//! generate correction prompts, apply rewrites through the provider,
//! validate structure (rolling back on violations), re-score, and record
//! the pass. It terminates on target score, issue-free content, iteration
//! budget, stagnation, or a critical error — always returning a full
//! result with a termination reason and session report.
//!
//! # Usage
//!
//! ```bash
//! # Dry run against a scripted provider
//! seo-refinery --content post.json --dry-run
//!
//! # Real run against an OpenAI-compatible endpoint
//! SEO_REFINERY_API_KEY=... seo-refinery --content post.json \
//!     --provider-url https://api.openai.com/v1
//! ```

pub mod content;
pub mod corrector;
pub mod detector;
pub mod optimizer;
pub mod preserver;
pub mod prompts;
pub mod provider;
pub mod recovery;
pub mod report;
pub mod state_machine;
pub mod tracker;

// Re-export the content model
pub use content::{Content, ContentBuilder, ContentField, ImagePrompt};

// Re-export detection types
pub use detector::{
    DetectionReport, DetectorConfig, Issue, IssueType, SeoIssueDetector, Severity,
};

// Re-export the correction pipeline
pub use corrector::{ContentCorrector, CorrectionOutcome, CorrectorConfig};
pub use prompts::{CorrectionPrompt, PromptGenerator};
pub use provider::{
    GenerationOptions, GenerationProvider, HttpProvider, ProviderError, ScriptedProvider,
    ScriptedReply,
};

// Re-export structural preservation
pub use preserver::{IntegrityReport, PreservationOutcome, Snapshot, StructurePreserver};

// Re-export recovery types
pub use recovery::{
    classify_error, DegradationLevel, ErrorCategory, ErrorHandler, RecoveryConfig,
    RecoveryStrategy, UserReport,
};

// Re-export tracking and reporting
pub use report::{ComprehensiveReport, ProgressAnalysis, ScoreTrend, SessionSummary};
pub use tracker::{PassRecord, ProgressTracker, StrategyMetric};

// Re-export the orchestrator
pub use optimizer::{
    MultiPassOptimizer, OptimizationMode, OptimizationResult, OptimizerConfig, TerminationReason,
};
