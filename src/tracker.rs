//! Per-session progress tracking: pass metrics, strategy effectiveness,
//! and a bounded content history for pass-level rollback.
//!
//! The content history is a FIFO ring capped at [`CONTENT_HISTORY_CAP`]
//! entries; the oldest pass is evicted first, so the most recent ten passes
//! are always retrievable. Strategy metrics update incrementally as passes
//! are recorded — no full recompute. One tracker instance serves one
//! optimizer instance; concurrent sessions over different content must own
//! independent trackers.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::content::Content;
use crate::preserver::content_checksum;
use crate::report::{BeforeAfter, ComprehensiveReport, ProgressAnalysis, SessionSummary};

/// Maximum retained content-history entries per session.
pub const CONTENT_HISTORY_CAP: usize = 10;

/// Metrics for one detect→correct→validate iteration. Append-only within a
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRecord {
    /// 1-indexed pass number.
    pub pass_number: u32,
    pub before_score: f64,
    pub after_score: f64,
    pub issues_resolved: Vec<String>,
    pub corrections_applied: Vec<String>,
    pub strategy_used: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Incrementally aggregated effectiveness of one correction strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMetric {
    pub strategy_name: String,
    pub times_used: u64,
    pub total_score_improvement: f64,
    pub total_issues_resolved: u64,
    pub success_count: u64,
}

impl StrategyMetric {
    fn new(strategy_name: &str) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            times_used: 0,
            total_score_improvement: 0.0,
            total_issues_resolved: 0,
            success_count: 0,
        }
    }

    pub fn average_improvement(&self) -> f64 {
        if self.times_used == 0 {
            0.0
        } else {
            self.total_score_improvement / self.times_used as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.times_used == 0 {
            0.0
        } else {
            self.success_count as f64 / self.times_used as f64
        }
    }
}

/// A retained copy of the content as it stood after one pass, hashed for
/// integrity checking on retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub pass_number: u32,
    pub content: Content,
    pub checksum: String,
}

/// State of one optimization session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub passes: Vec<PassRecord>,
    pub strategy_stats: HashMap<String, StrategyMetric>,
    pub content_history: VecDeque<HistoryEntry>,
}

/// Input for `record_pass`.
#[derive(Debug, Clone)]
pub struct PassData {
    pub before_score: f64,
    pub after_score: f64,
    pub issues_resolved: Vec<String>,
    pub corrections_applied: Vec<String>,
    pub strategy_used: String,
    pub duration_ms: u64,
    /// Content as it stands after this pass.
    pub content: Content,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("session '{0}' was already ended")]
    SessionEnded(String),
}

/// Records per-pass metrics and content history for active sessions.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    sessions: HashMap<String, Session>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session and return its id.
    pub fn start_session(&mut self) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.sessions.insert(
            session_id.clone(),
            Session {
                session_id: session_id.clone(),
                started_at: Utc::now(),
                ended_at: None,
                passes: Vec::new(),
                strategy_stats: HashMap::new(),
                content_history: VecDeque::new(),
            },
        );
        debug!(session = %session_id, "session started");
        session_id
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Append a pass record, retain the post-pass content, and update the
    /// strategy metric for the pass's strategy.
    pub fn record_pass(&mut self, session_id: &str, data: PassData) -> Result<(), TrackerError> {
        debug_assert!((0.0..=100.0).contains(&data.after_score));

        let strategy = data.strategy_used.clone();
        let improvement = data.after_score - data.before_score;
        let issues_resolved = data.issues_resolved.len() as u64;
        let success = improvement > 0.0;

        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| TrackerError::UnknownSession(session_id.to_string()))?;
        if session.ended_at.is_some() {
            return Err(TrackerError::SessionEnded(session_id.to_string()));
        }

        let pass_number = session.passes.len() as u32 + 1;
        session.passes.push(PassRecord {
            pass_number,
            before_score: data.before_score,
            after_score: data.after_score,
            issues_resolved: data.issues_resolved,
            corrections_applied: data.corrections_applied,
            strategy_used: data.strategy_used,
            duration_ms: data.duration_ms,
            timestamp: Utc::now(),
        });

        session.content_history.push_back(HistoryEntry {
            pass_number,
            checksum: content_checksum(&data.content),
            content: data.content,
        });
        while session.content_history.len() > CONTENT_HISTORY_CAP {
            session.content_history.pop_front();
        }

        self.track_strategy_effectiveness(
            session_id,
            &strategy,
            improvement,
            issues_resolved,
            success,
        )?;
        Ok(())
    }

    /// Incrementally fold one observation into a strategy's metric.
    pub fn track_strategy_effectiveness(
        &mut self,
        session_id: &str,
        strategy_name: &str,
        improvement: f64,
        issues_resolved: u64,
        success: bool,
    ) -> Result<(), TrackerError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| TrackerError::UnknownSession(session_id.to_string()))?;
        let metric = session
            .strategy_stats
            .entry(strategy_name.to_string())
            .or_insert_with(|| StrategyMetric::new(strategy_name));
        metric.times_used += 1;
        metric.total_score_improvement += improvement;
        metric.total_issues_resolved += issues_resolved;
        if success {
            metric.success_count += 1;
        }
        Ok(())
    }

    /// Close the session and return its headline summary.
    pub fn end_session(&mut self, session_id: &str) -> Result<SessionSummary, TrackerError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| TrackerError::UnknownSession(session_id.to_string()))?;
        if session.ended_at.is_some() {
            return Err(TrackerError::SessionEnded(session_id.to_string()));
        }
        let ended = Utc::now();
        session.ended_at = Some(ended);
        debug!(session = %session_id, passes = session.passes.len(), "session ended");
        Ok(summarize(session))
    }

    /// Content as it stood after the given pass, or `None` when the pass is
    /// invalid or its entry was evicted. A checksum mismatch also yields
    /// `None` — a corrupted entry must not be restored.
    pub fn rollback_to_pass(&self, session_id: &str, pass_number: u32) -> Option<Content> {
        let session = self.sessions.get(session_id)?;
        let entry = session
            .content_history
            .iter()
            .find(|e| e.pass_number == pass_number)?;
        if content_checksum(&entry.content) != entry.checksum {
            warn!(
                session = %session_id,
                pass = pass_number,
                "history entry failed its integrity check"
            );
            return None;
        }
        Some(entry.content.clone())
    }

    /// Assemble the full nested report for a session.
    pub fn generate_comprehensive_report(
        &self,
        session_id: &str,
        target_score: f64,
    ) -> Option<ComprehensiveReport> {
        let session = self.sessions.get(session_id)?;

        let mut strategies: Vec<StrategyMetric> =
            session.strategy_stats.values().cloned().collect();
        strategies.sort_by(|a, b| a.strategy_name.cmp(&b.strategy_name));

        let before_after = match (session.passes.first(), session.passes.last()) {
            (Some(first), Some(last)) => Some(BeforeAfter {
                before_score: first.before_score,
                after_score: last.after_score,
                score_delta: last.after_score - first.before_score,
            }),
            _ => None,
        };

        Some(ComprehensiveReport {
            summary: summarize(session),
            passes: session.passes.clone(),
            strategies,
            before_after,
            analysis: ProgressAnalysis::from_passes(&session.passes, target_score),
        })
    }
}

fn summarize(session: &Session) -> SessionSummary {
    let initial_score = session.passes.first().map(|p| p.before_score);
    let final_score = session.passes.last().map(|p| p.after_score);
    let end = session.ended_at.unwrap_or_else(Utc::now);
    SessionSummary {
        session_id: session.session_id.clone(),
        total_passes: session.passes.len() as u32,
        duration_ms: (end - session.started_at).num_milliseconds().max(0) as u64,
        initial_score,
        final_score,
        net_improvement: match (initial_score, final_score) {
            (Some(i), Some(f)) => f - i,
            _ => 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::STRATEGY_TARGETED;

    fn content(tag: &str) -> Content {
        Content::builder(format!("Title {tag}"), format!("<p>Body {tag}</p>")).build()
    }

    fn pass_data(before: f64, after: f64, tag: &str) -> PassData {
        PassData {
            before_score: before,
            after_score: after,
            issues_resolved: vec!["meta_description_length".into()],
            corrections_applied: vec!["meta_description".into()],
            strategy_used: STRATEGY_TARGETED.into(),
            duration_ms: 25,
            content: content(tag),
        }
    }

    #[test]
    fn test_session_lifecycle() {
        let mut tracker = ProgressTracker::new();
        let id = tracker.start_session();

        tracker.record_pass(&id, pass_data(40.0, 60.0, "1")).unwrap();
        tracker.record_pass(&id, pass_data(60.0, 75.0, "2")).unwrap();

        let summary = tracker.end_session(&id).unwrap();
        assert_eq!(summary.total_passes, 2);
        assert_eq!(summary.initial_score, Some(40.0));
        assert_eq!(summary.final_score, Some(75.0));
        assert_eq!(summary.net_improvement, 35.0);

        // Exactly one start/end pair per session.
        assert!(matches!(
            tracker.end_session(&id),
            Err(TrackerError::SessionEnded(_))
        ));
        assert!(matches!(
            tracker.record_pass(&id, pass_data(75.0, 80.0, "3")),
            Err(TrackerError::SessionEnded(_))
        ));
    }

    #[test]
    fn test_unknown_session_rejected() {
        let mut tracker = ProgressTracker::new();
        assert!(matches!(
            tracker.record_pass("nope", pass_data(0.0, 1.0, "x")),
            Err(TrackerError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_content_history_bounded_at_ten() {
        let mut tracker = ProgressTracker::new();
        let id = tracker.start_session();

        for n in 0..15 {
            tracker
                .record_pass(&id, pass_data(n as f64, n as f64 + 1.0, &n.to_string()))
                .unwrap();
        }

        let session = tracker.session(&id).unwrap();
        assert_eq!(session.content_history.len(), CONTENT_HISTORY_CAP);
        assert_eq!(session.passes.len(), 15);

        // Oldest five evicted, most recent ten retrievable.
        assert!(tracker.rollback_to_pass(&id, 5).is_none());
        for pass in 6..=15 {
            assert!(tracker.rollback_to_pass(&id, pass).is_some(), "pass {pass}");
        }
    }

    #[test]
    fn test_rollback_returns_the_recorded_content() {
        let mut tracker = ProgressTracker::new();
        let id = tracker.start_session();
        tracker.record_pass(&id, pass_data(40.0, 60.0, "alpha")).unwrap();

        let restored = tracker.rollback_to_pass(&id, 1).unwrap();
        assert_eq!(restored, content("alpha"));
        assert!(tracker.rollback_to_pass(&id, 99).is_none());
    }

    #[test]
    fn test_strategy_metrics_update_incrementally() {
        let mut tracker = ProgressTracker::new();
        let id = tracker.start_session();

        tracker.record_pass(&id, pass_data(40.0, 60.0, "1")).unwrap();
        tracker.record_pass(&id, pass_data(60.0, 60.0, "2")).unwrap();

        let session = tracker.session(&id).unwrap();
        let metric = &session.strategy_stats[STRATEGY_TARGETED];
        assert_eq!(metric.times_used, 2);
        assert_eq!(metric.total_score_improvement, 20.0);
        assert_eq!(metric.success_count, 1);
        assert_eq!(metric.average_improvement(), 10.0);
        assert_eq!(metric.success_rate(), 0.5);
    }

    #[test]
    fn test_comprehensive_report_assembly() {
        let mut tracker = ProgressTracker::new();
        let id = tracker.start_session();
        tracker.record_pass(&id, pass_data(40.0, 60.0, "1")).unwrap();
        tracker.record_pass(&id, pass_data(60.0, 75.0, "2")).unwrap();
        tracker.end_session(&id).unwrap();

        let report = tracker.generate_comprehensive_report(&id, 90.0).unwrap();
        assert_eq!(report.summary.total_passes, 2);
        assert_eq!(report.passes.len(), 2);
        assert_eq!(report.strategies.len(), 1);

        let before_after = report.before_after.as_ref().unwrap();
        assert_eq!(before_after.before_score, 40.0);
        assert_eq!(before_after.after_score, 75.0);
        assert_eq!(before_after.score_delta, 35.0);

        let analysis = report.analysis.as_ref().unwrap();
        assert_eq!(analysis.average_improvement, 17.5);
        assert!(analysis.projected_passes_to_target.is_some());

        // The report serializes cleanly for downstream consumers.
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["summary"]["total_passes"].is_number());
    }

    #[test]
    fn test_report_for_empty_session() {
        let mut tracker = ProgressTracker::new();
        let id = tracker.start_session();
        let report = tracker.generate_comprehensive_report(&id, 90.0).unwrap();
        assert_eq!(report.summary.total_passes, 0);
        assert!(report.before_after.is_none());
        assert!(report.analysis.is_none());
    }

    #[test]
    fn test_independent_sessions_do_not_share_state() {
        let mut tracker = ProgressTracker::new();
        let a = tracker.start_session();
        let b = tracker.start_session();

        tracker.record_pass(&a, pass_data(40.0, 60.0, "a")).unwrap();

        assert_eq!(tracker.session(&a).unwrap().passes.len(), 1);
        assert!(tracker.session(&b).unwrap().passes.is_empty());
    }
}
