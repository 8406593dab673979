//! Optimization loop state machine — explicit states and legal transition
//! guards.
//!
//! The multi-pass loop moves through a small, fixed state graph. Modeling it
//! explicitly buys two things:
//! 1. Every transition is validated and logged, so a stuck or misbehaving
//!    run can be reconstructed from the transition log alone.
//! 2. Loop bugs (e.g. correcting before detecting) surface as
//!    `IllegalTransition` errors instead of silent misbehavior.
//!
//! The optimizer calls `advance()` at each phase boundary; each call checks
//! the transition against the graph and appends to the log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The phases of one optimization run.
///
/// Every run starts at `Idle` and ends at `Terminated`, regardless of
/// outcome; the termination reason lives on the run result, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Session created, no pass started yet.
    Idle,
    /// Scanning the content for rule violations.
    Detecting,
    /// Applying AI corrections for the detected issues.
    Correcting,
    /// Checking structure and re-scoring the corrected content.
    Validating,
    /// Run finished — terminal state.
    Terminated,
}

impl LoopState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Detecting => write!(f, "Detecting"),
            Self::Correcting => write!(f, "Correcting"),
            Self::Validating => write!(f, "Validating"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Legal transitions between loop states.
///
/// ```text
/// Idle → Detecting | Terminated
/// Detecting → Correcting | Terminated
/// Correcting → Validating | Terminated
/// Validating → Detecting | Terminated
/// ```
///
/// `Validating → Detecting` is the edge that starts the next pass; any
/// non-terminal state may terminate (already compliant, budget exhausted,
/// critical error, bypass).
fn is_legal_transition(from: LoopState, to: LoopState) -> bool {
    use LoopState::*;

    if to == Terminated && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Idle, Detecting)
            | (Detecting, Correcting)
            | (Correcting, Validating)
            | (Validating, Detecting)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LoopState,
    pub to: LoopState,
    /// Pass number at the time of transition (0 before the first pass).
    pub pass: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: LoopState,
    pub to: LoopState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// The optimization loop state machine.
///
/// Tracks the current state, enforces legal transitions, and keeps a
/// complete transition log for diagnostics.
pub struct LoopStateMachine {
    current: LoopState,
    pass: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl LoopStateMachine {
    /// Create a new state machine starting at `Idle`.
    pub fn new() -> Self {
        Self {
            current: LoopState::Idle,
            pass: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> LoopState {
        self.current
    }

    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Set the pass counter (called by the optimizer loop).
    pub fn set_pass(&mut self, pass: u32) {
        self.pass = pass;
    }

    /// Attempt to advance to the next state.
    ///
    /// Returns `Err(IllegalTransition)` if the move would violate the state
    /// graph; the current state is left untouched in that case.
    pub fn advance(&mut self, to: LoopState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            pass: self.pass,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            pass = self.pass,
            "State transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Terminated` — always legal from non-terminal states.
    pub fn terminate(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(LoopState::Terminated, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// The full transition log.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history summary for logs.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        format!(
            "{} → {} ({}ms, {} transitions)",
            LoopState::Idle,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        ) + if states.is_empty() {
            String::new()
        } else {
            format!(" [{}]", states.join(" → "))
        }
        .as_str()
    }
}

impl Default for LoopStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = LoopStateMachine::new();
        assert_eq!(sm.current(), LoopState::Idle);
        assert!(!sm.is_terminal());
        assert_eq!(sm.transitions().len(), 0);
    }

    #[test]
    fn test_single_pass_then_terminate() {
        let mut sm = LoopStateMachine::new();

        sm.set_pass(1);
        sm.advance(LoopState::Detecting, None).unwrap();
        sm.advance(LoopState::Correcting, Some("3 issues found"))
            .unwrap();
        sm.advance(LoopState::Validating, None).unwrap();
        sm.terminate("target reached").unwrap();

        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 4);
    }

    #[test]
    fn test_multi_pass_loop() {
        let mut sm = LoopStateMachine::new();

        sm.set_pass(1);
        sm.advance(LoopState::Detecting, None).unwrap();
        sm.advance(LoopState::Correcting, None).unwrap();
        sm.advance(LoopState::Validating, None).unwrap();

        // Validation closed the pass but the score is still short → loop.
        sm.set_pass(2);
        sm.advance(LoopState::Detecting, Some("score below target"))
            .unwrap();
        sm.advance(LoopState::Correcting, None).unwrap();
        sm.advance(LoopState::Validating, None).unwrap();
        sm.terminate("budget exhausted").unwrap();

        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 7);
        assert_eq!(sm.transitions().last().unwrap().pass, 2);
    }

    #[test]
    fn test_terminate_from_any_state() {
        for state in [
            LoopState::Idle,
            LoopState::Detecting,
            LoopState::Correcting,
            LoopState::Validating,
        ] {
            let mut sm = LoopStateMachine {
                current: state,
                pass: 0,
                created_at: Instant::now(),
                transitions: Vec::new(),
            };
            assert!(sm.terminate("test").is_ok());
            assert_eq!(sm.current(), LoopState::Terminated);
        }
    }

    #[test]
    fn test_cannot_transition_from_terminal() {
        let mut sm = LoopStateMachine::new();
        sm.terminate("bypass").unwrap();

        let err = sm.advance(LoopState::Detecting, None).unwrap_err();
        assert_eq!(err.from, LoopState::Terminated);
        assert_eq!(err.to, LoopState::Detecting);

        assert!(sm.terminate("again").is_err());
    }

    #[test]
    fn test_illegal_skip_transition() {
        let mut sm = LoopStateMachine::new();

        // Can't correct without detecting first.
        let err = sm.advance(LoopState::Correcting, None).unwrap_err();
        assert_eq!(err.from, LoopState::Idle);
        assert_eq!(err.to, LoopState::Correcting);
    }

    #[test]
    fn test_illegal_backward_transition() {
        let mut sm = LoopStateMachine::new();
        sm.advance(LoopState::Detecting, None).unwrap();

        assert!(sm.advance(LoopState::Idle, None).is_err());
    }

    #[test]
    fn test_transition_record_has_reason() {
        let mut sm = LoopStateMachine::new();
        sm.advance(LoopState::Detecting, Some("session started"))
            .unwrap();

        let record = &sm.transitions()[0];
        assert_eq!(record.from, LoopState::Idle);
        assert_eq!(record.to, LoopState::Detecting);
        assert_eq!(record.reason.as_deref(), Some("session started"));
    }

    #[test]
    fn test_transition_record_serde_roundtrip() {
        let record = TransitionRecord {
            from: LoopState::Validating,
            to: LoopState::Detecting,
            pass: 3,
            elapsed_ms: 12345,
            reason: Some("score below target".into()),
        };

        let json = serde_json::to_string(&record).unwrap();
        let restored: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.from, LoopState::Validating);
        assert_eq!(restored.to, LoopState::Detecting);
        assert_eq!(restored.pass, 3);
        assert_eq!(restored.elapsed_ms, 12345);
    }

    #[test]
    fn test_summary() {
        let mut sm = LoopStateMachine::new();
        sm.advance(LoopState::Detecting, None).unwrap();
        sm.terminate("already compliant").unwrap();
        let summary = sm.summary();
        assert!(summary.contains("Terminated"));
        assert!(summary.contains("2 transitions"));
    }
}
