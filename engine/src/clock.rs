//! Session timekeeping.
//!
//! A `Clock` trait is injected everywhere time is read so sessions are
//! replayable against `ManualClock` in tests. `SessionClock` tracks
//! the three independent budgets: warm-up, per-question (re-anchored
//! on every new question), and whole-session (never resets).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};

/// Time provider: monotonic instants for deadlines, wall-clock
/// timestamps for persisted statistics. Both move together under
/// `ManualClock` so replayed sessions write replayable timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only moves when advanced.
pub struct ManualClock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_utc: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, d: Duration) {
        *self.offset.lock().expect("clock lock poisoned") += d;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().expect("clock lock poisoned")
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.origin_utc + TimeDelta::from_std(self.offset()).unwrap_or_else(|_| TimeDelta::zero())
    }
}

/// The three budgeted phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    WarmUp,
    PerQuestion,
    WholeSession,
}

impl std::fmt::Display for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WarmUp => write!(f, "warm_up"),
            Self::PerQuestion => write!(f, "per_question"),
            Self::WholeSession => write!(f, "whole_session"),
        }
    }
}

/// Tracks elapsed and remaining time per phase for one session.
pub struct SessionClock {
    clock: Arc<dyn Clock>,
    warmup_budget: Duration,
    question_budget: Duration,
    session_budget: Duration,
    session_started: Instant,
    question_started: Option<Instant>,
}

impl SessionClock {
    /// Anchor the session (and warm-up) at the clock's current time.
    pub fn new(
        clock: Arc<dyn Clock>,
        warmup_budget: Duration,
        question_budget: Duration,
        session_budget: Duration,
    ) -> Self {
        let session_started = clock.now();
        Self {
            clock,
            warmup_budget,
            question_budget,
            session_budget,
            session_started,
            question_started: None,
        }
    }

    /// Re-anchor the per-question deadline. Called on every new
    /// question; retries at the same question share its anchor.
    pub fn start_question(&mut self) {
        self.question_started = Some(self.clock.now());
    }

    /// Remaining time in the given budget, clamped at zero. The
    /// per-question budget counts as full until a question starts.
    pub fn remaining(&self, budget: Budget) -> Duration {
        let now = self.clock.now();
        let (anchor, limit) = match budget {
            Budget::WarmUp => (self.session_started, self.warmup_budget),
            Budget::WholeSession => (self.session_started, self.session_budget),
            Budget::PerQuestion => match self.question_started {
                Some(anchor) => (anchor, self.question_budget),
                None => return self.question_budget,
            },
        };
        limit.saturating_sub(now.saturating_duration_since(anchor))
    }

    pub fn expired(&self, budget: Budget) -> bool {
        self.remaining(budget).is_zero()
    }

    /// Bound for input-prompt waits: a slow session never grants a
    /// question more time than the whole session has left.
    pub fn input_wait(&self) -> Duration {
        self.remaining(Budget::PerQuestion)
            .min(self.remaining(Budget::WholeSession))
    }

    pub fn session_elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.session_started)
    }

    pub fn question_elapsed(&self) -> Duration {
        self.question_started
            .map(|anchor| self.clock.now().saturating_duration_since(anchor))
            .unwrap_or(Duration::ZERO)
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Wall-clock timestamp from the injected source, for persisted
    /// statistics.
    pub fn utc_now(&self) -> DateTime<Utc> {
        self.clock.utc_now()
    }
}
