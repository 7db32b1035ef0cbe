//! Session phase machine — explicit states and legal transition guards.
//!
//! Every session starts at `WarmUp` and terminates at `Closed`; every
//! transition is validated against the legal set and recorded, so
//! "what counts as session end" is never ambiguous and a finished
//! session can be replayed from its transition log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The set of session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Free-form greeting exchange, bounded by the warm-up deadline.
    WarmUp,
    /// The question/attempt/hint loop.
    Questioning,
    /// Final score and closing message; transitions to Closed
    /// immediately after.
    Summary,
    /// Terminal — the session state is frozen.
    Closed,
}

impl SessionPhase {
    /// Whether this is the terminal phase (no further mutation).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WarmUp => write!(f, "warm_up"),
            Self::Questioning => write!(f, "questioning"),
            Self::Summary => write!(f, "summary"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Legal transitions between session phases.
///
/// ```text
/// WarmUp      → Questioning | Summary
/// Questioning → Summary
/// Summary     → Closed
/// ```
///
/// `WarmUp → Summary` covers a whole-session deadline expiring before
/// any question was asked; there is no path that skips `Summary`, so
/// every session ends with a score report.
fn is_legal_transition(from: SessionPhase, to: SessionPhase) -> bool {
    use SessionPhase::*;

    matches!(
        (from, to),
        (WarmUp, Questioning) | (WarmUp, Summary) | (Questioning, Summary) | (Summary, Closed)
    )
}

/// A single recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The phase transitioned from.
    pub from: SessionPhase,
    /// The phase transitioned to.
    pub to: SessionPhase,
    /// Index of the question in flight at the time (0 before the
    /// first question).
    pub question_index: usize,
    /// Optional context about why this transition happened
    /// (e.g. "session deadline exceeded").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal phase transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// The phase machine: current phase, guard enforcement, and a complete
/// transition log for replay and diagnostics.
pub struct PhaseMachine {
    current: SessionPhase,
    question_index: usize,
    transitions: Vec<TransitionRecord>,
}

impl PhaseMachine {
    /// Create a new machine starting at `WarmUp`.
    pub fn new() -> Self {
        Self {
            current: SessionPhase::WarmUp,
            question_index: 0,
            transitions: Vec::new(),
        }
    }

    /// Get the current phase.
    pub fn current(&self) -> SessionPhase {
        self.current
    }

    /// Set the question counter (recorded on subsequent transitions).
    pub fn set_question_index(&mut self, index: usize) {
        self.question_index = index;
    }

    /// Attempt to advance to the next phase.
    pub fn advance(
        &mut self,
        to: SessionPhase,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            question_index = self.question_index,
            reason = reason.unwrap_or(""),
            "Phase transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            question_index: self.question_index,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Whether the machine has reached the terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Get the full transition log.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase() {
        let machine = PhaseMachine::new();
        assert_eq!(machine.current(), SessionPhase::WarmUp);
        assert!(!machine.is_terminal());
        assert!(machine.transitions().is_empty());
    }

    #[test]
    fn test_happy_path() {
        let mut machine = PhaseMachine::new();
        machine.advance(SessionPhase::Questioning, None).unwrap();
        machine.set_question_index(3);
        machine
            .advance(SessionPhase::Summary, Some("questions exhausted"))
            .unwrap();
        machine.advance(SessionPhase::Closed, None).unwrap();

        assert!(machine.is_terminal());
        assert_eq!(machine.transitions().len(), 3);
        assert_eq!(machine.transitions()[1].question_index, 3);
    }

    #[test]
    fn test_forced_summary_from_warmup() {
        let mut machine = PhaseMachine::new();
        machine
            .advance(SessionPhase::Summary, Some("session deadline exceeded"))
            .unwrap();
        machine.advance(SessionPhase::Closed, None).unwrap();
        assert!(machine.is_terminal());
    }

    #[test]
    fn test_cannot_skip_summary() {
        let mut machine = PhaseMachine::new();
        assert!(machine.advance(SessionPhase::Closed, None).is_err());
        machine.advance(SessionPhase::Questioning, None).unwrap();
        assert!(machine.advance(SessionPhase::Closed, None).is_err());
    }

    #[test]
    fn test_cannot_leave_terminal() {
        let mut machine = PhaseMachine::new();
        machine.advance(SessionPhase::Summary, None).unwrap();
        machine.advance(SessionPhase::Closed, None).unwrap();
        for phase in [
            SessionPhase::WarmUp,
            SessionPhase::Questioning,
            SessionPhase::Summary,
        ] {
            let err = machine.advance(phase, None).unwrap_err();
            assert_eq!(err.from, SessionPhase::Closed);
        }
    }

    #[test]
    fn test_cannot_go_backwards() {
        let mut machine = PhaseMachine::new();
        machine.advance(SessionPhase::Questioning, None).unwrap();
        assert!(machine.advance(SessionPhase::WarmUp, None).is_err());
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = IllegalTransition {
            from: SessionPhase::Closed,
            to: SessionPhase::WarmUp,
        };
        assert_eq!(
            err.to_string(),
            "Illegal phase transition: closed → warm_up"
        );
    }
}
