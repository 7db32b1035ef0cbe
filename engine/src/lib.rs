//! Conversational memory-training session engine.
//!
//! Drives short question-and-answer training sessions built from a
//! pool of personal facts: a brief warm-up, a fixed number of
//! questions graded through tiered answer matching (exact, fuzzy,
//! semantic), progressively more specific hints on misses, and a
//! scored summary. Three independent time budgets (warm-up,
//! per-question, whole-session) guarantee every session terminates.
//!
//! The engine is transport-agnostic: callers feed user text in through
//! [`TrainingSession::submit_answer`] (or [`SessionRegistry`] when
//! serving several users) and render the returned [`TurnOutput`]
//! however they like. The LLM sits behind the [`Oracle`] trait and is
//! never trusted with control flow — grading short-circuits before it
//! where possible, and every oracle failure degrades to a deterministic
//! template.

pub mod answer;
pub mod clock;
pub mod config;
pub mod error;
pub mod hints;
pub mod oracle;
pub mod prompts;
pub mod qa;
pub mod registry;
pub mod selector;
pub mod session;
pub mod state_machine;

pub use answer::{AnswerMatcher, MatchOutcome, MatchTier, Verdict};
pub use clock::{Budget, Clock, ManualClock, SessionClock, SystemClock};
pub use config::{OracleConfig, TrainerConfig};
pub use error::{EngineError, EngineResult};
pub use hints::HintEscalator;
pub use oracle::{JudgeReply, OpenAiOracle, Oracle, OracleError, Recall};
pub use qa::{HintContext, InMemoryQaStore, QAItem, QAStore};
pub use registry::SessionRegistry;
pub use selector::QuestionSelector;
pub use session::{HistoryEntry, Role, Score, TrainingSession, TurnOutput, Utterance};
pub use state_machine::{IllegalTransition, PhaseMachine, SessionPhase, TransitionRecord};
