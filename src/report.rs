//! Report assembly for a completed (or interrupted) session.
//!
//! Everything here derives `Serialize` so callers can emit the whole report
//! as JSON; the wire format beyond that is a caller concern.

use serde::{Deserialize, Serialize};

use crate::tracker::{PassRecord, StrategyMetric};

/// Headline numbers for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total_passes: u32,
    pub duration_ms: u64,
    /// Score before the first pass (None when no passes ran).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_score: Option<f64>,
    /// Score after the last pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    /// final − initial.
    pub net_improvement: f64,
}

/// Direction of the score across passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTrend {
    Improving,
    Flat,
    Declining,
}

/// First-vs-last pass comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeforeAfter {
    pub before_score: f64,
    pub after_score: f64,
    pub score_delta: f64,
}

/// Trend, extremes, and a simple linear projection toward the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressAnalysis {
    pub trend: ScoreTrend,
    /// Pass number with the largest improvement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_pass: Option<u32>,
    /// Pass number with the smallest improvement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_pass: Option<u32>,
    /// Mean per-pass score improvement.
    pub average_improvement: f64,
    /// Passes still needed to reach the target at the current average
    /// rate. `None` when the average rate is zero or negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_passes_to_target: Option<u32>,
}

impl ProgressAnalysis {
    /// Linear analysis over recorded passes.
    pub fn from_passes(passes: &[PassRecord], target_score: f64) -> Option<Self> {
        if passes.is_empty() {
            return None;
        }

        let improvements: Vec<f64> = passes
            .iter()
            .map(|p| p.after_score - p.before_score)
            .collect();
        let average_improvement = improvements.iter().sum::<f64>() / improvements.len() as f64;

        let trend = if average_improvement > f64::EPSILON {
            ScoreTrend::Improving
        } else if average_improvement < -f64::EPSILON {
            ScoreTrend::Declining
        } else {
            ScoreTrend::Flat
        };

        let best_pass = passes
            .iter()
            .zip(&improvements)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(p, _)| p.pass_number);
        let worst_pass = passes
            .iter()
            .zip(&improvements)
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(p, _)| p.pass_number);

        let last_score = passes.last().map(|p| p.after_score).unwrap_or(0.0);
        let projected_passes_to_target = if last_score >= target_score {
            Some(0)
        } else if average_improvement > 0.0 {
            Some(((target_score - last_score) / average_improvement).ceil() as u32)
        } else {
            None
        };

        Some(Self {
            trend,
            best_pass,
            worst_pass,
            average_improvement,
            projected_passes_to_target,
        })
    }
}

/// The full nested report for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveReport {
    pub summary: SessionSummary,
    pub passes: Vec<PassRecord>,
    pub strategies: Vec<StrategyMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_after: Option<BeforeAfter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ProgressAnalysis>,
}
