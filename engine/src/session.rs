//! The training session orchestrator.
//!
//! One `TrainingSession` instance serves exactly one session: it pulls
//! questions from the selector, grades answers through the matcher,
//! escalates hints on misses, and enforces the warm-up, per-question,
//! and whole-session deadlines. Deadline expiry is a normal
//! termination path, never a fault: a mid-question timeout forces
//! reveal-and-advance, a mid-session timeout forces the summary, and
//! the session always terminates within its budget regardless of user
//! pace.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::answer::{AnswerMatcher, Verdict};
use crate::clock::{Budget, Clock, SessionClock};
use crate::config::TrainerConfig;
use crate::error::{EngineError, EngineResult};
use crate::hints::HintEscalator;
use crate::oracle::{Oracle, OracleError, Recall};
use crate::prompts;
use crate::qa::{HintContext, QAItem, QAStore};
use crate::selector::QuestionSelector;
use crate::state_machine::{PhaseMachine, SessionPhase, TransitionRecord};

/// Session score: `correct <= total`, both monotonically non-decreasing,
/// `total` counts only finalized questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub correct: u32,
    pub total: u32,
}

impl Score {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.total)
        }
    }
}

/// One finalized question, appended to the session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question_id: String,
    pub attempts: u32,
    pub correct: bool,
    pub elapsed_seconds: u64,
}

/// Who said what, for the caller's transcript log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Coach,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub text: String,
}

/// What the engine hands back after each turn.
///
/// `prompt` carries the next question when one was presented; `None`
/// with `is_session_end == false` means the current question is still
/// open and awaits a fresh attempt (the `feedback` carries the hint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutput {
    /// Reaction to what the user just said (verdict text, hint,
    /// reveal, or summary).
    pub feedback: Option<String>,
    /// Next question to present, if a new one was dealt.
    pub prompt: Option<String>,
    pub is_session_end: bool,
    pub score: Score,
}

/// The question currently under attempt.
struct ActiveQuestion {
    item: QAItem,
    /// Attempts consumed (0..=max_attempts).
    attempt_count: u32,
    /// Next hint rung to emit (0..max_hints; the reveal level is never
    /// requested while the question is open).
    hint_level: u32,
}

/// State machine driving one end-to-end training session.
pub struct TrainingSession {
    id: String,
    config: TrainerConfig,
    machine: PhaseMachine,
    clock: SessionClock,
    selector: QuestionSelector,
    matcher: AnswerMatcher,
    escalator: HintEscalator,
    oracle: Arc<dyn Oracle>,
    recall: Option<Arc<dyn Recall>>,
    current: Option<ActiveQuestion>,
    score: Score,
    history: Vec<HistoryEntry>,
    transcript: Vec<Utterance>,
    started: bool,
    last_activity: Instant,
}

impl TrainingSession {
    pub fn new(
        config: TrainerConfig,
        store: Arc<dyn QAStore>,
        oracle: Arc<dyn Oracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session_clock = SessionClock::new(
            clock.clone(),
            config.warmup_budget(),
            config.question_budget(),
            config.session_budget(),
        );
        let matcher = AnswerMatcher::new(
            config.fuzzy_threshold,
            config.min_fuzzy_len,
            oracle.clone(),
        );
        let escalator = HintEscalator::with_oracle(config.max_hints, oracle.clone());
        let last_activity = clock.now();
        Self {
            id: Uuid::new_v4().to_string(),
            selector: QuestionSelector::new(store),
            matcher,
            escalator,
            oracle,
            recall: None,
            machine: PhaseMachine::new(),
            clock: session_clock,
            current: None,
            score: Score::default(),
            history: Vec::new(),
            transcript: Vec::new(),
            started: false,
            last_activity,
            config,
        }
    }

    /// Attach the retrieval collaborator that answers side questions.
    pub fn with_recall(mut self, recall: Arc<dyn Recall>) -> Self {
        self.recall = Some(recall);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.machine.current()
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn transcript(&self) -> &[Utterance] {
        &self.transcript
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        self.machine.transitions()
    }

    /// How long the caller may wait for the next user input.
    pub fn input_wait(&self) -> Duration {
        match self.machine.current() {
            SessionPhase::WarmUp => self
                .clock
                .remaining(Budget::WarmUp)
                .min(self.clock.remaining(Budget::WholeSession)),
            _ => self.clock.input_wait(),
        }
    }

    /// How long the session has been idle (for registry sweeps).
    pub fn idle_for(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.last_activity)
    }

    /// Open the session: emit the warm-up greeting. Call once.
    pub async fn start(&mut self) -> EngineResult<TurnOutput> {
        self.ensure_open()?;
        if self.started {
            return Err(EngineError::Config("session already started".into()));
        }
        self.started = true;
        self.last_activity = self.clock.now();

        info!(session_id = %self.id, "Session starting");

        let timeout = self.oracle_budget(Budget::WarmUp);
        let greeting = match self
            .oracle
            .chat(prompts::WARMUP_PREAMBLE, "Start the session.", timeout)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Warm-up greeting degraded to template");
                "Hello! It's lovely to see you. How are you feeling today?".to_string()
            }
        };

        self.say(&greeting);
        Ok(TurnOutput {
            feedback: None,
            prompt: Some(greeting),
            is_session_end: false,
            score: self.score,
        })
    }

    /// Process one user turn. Deadlines are checked before the input
    /// is graded, so an expired phase forces its transition first.
    pub async fn submit_answer(&mut self, text: &str) -> EngineResult<TurnOutput> {
        self.ensure_open()?;
        self.last_activity = self.clock.now();
        self.hear(text);

        // Whole-session deadline dominates everything.
        if self.clock.expired(Budget::WholeSession) {
            return self.finish("session deadline exceeded").await;
        }

        match self.machine.current() {
            SessionPhase::WarmUp => self.leave_warmup(text).await,
            SessionPhase::Questioning => self.handle_attempt(text).await,
            // Summary is transient (finish() closes immediately), and
            // Closed is rejected by ensure_open above.
            SessionPhase::Summary | SessionPhase::Closed => Err(EngineError::SessionClosed {
                session_id: self.id.clone(),
            }),
        }
    }

    /// Out-of-band query forwarded to the retrieval collaborator.
    /// Does not touch questioning state.
    pub async fn ask_side_question(&self, text: &str) -> EngineResult<String> {
        self.ensure_open()?;
        let recall = self.recall.as_ref().ok_or_else(|| {
            EngineError::Oracle(OracleError::Unavailable(
                "no retrieval collaborator attached".into(),
            ))
        })?;
        Ok(recall.lookup(text).await?)
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.machine.is_terminal() {
            return Err(EngineError::SessionClosed {
                session_id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Acknowledge the warm-up reply and deal the first question.
    async fn leave_warmup(&mut self, reply: &str) -> EngineResult<TurnOutput> {
        let ack = if self.clock.expired(Budget::WarmUp) {
            "Let's get started with today's questions.".to_string()
        } else {
            let timeout = self.oracle_budget(Budget::WarmUp);
            match self
                .oracle
                .chat(prompts::TRANSITION_PREAMBLE, reply, timeout)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Warm-up acknowledgment degraded to template");
                    "Thank you for sharing. Let's start today's memory questions.".to_string()
                }
            }
        };

        self.say(&ack);
        self.machine.advance(SessionPhase::Questioning, None)?;
        self.present_next_question(Some(ack)).await
    }

    /// One attempt at the current question.
    async fn handle_attempt(&mut self, text: &str) -> EngineResult<TurnOutput> {
        // A question should always be in flight here; deal one if the
        // pool had not been touched yet.
        let Some(active) = self.current.as_ref() else {
            return self.present_next_question(None).await;
        };
        let question = active.item.question.clone();
        let accepted = active.item.accepted_answers.clone();

        // Mid-question timeout forces reveal-and-advance.
        if self.clock.expired(Budget::PerQuestion) {
            let reveal = self.reveal_text();
            let feedback = format!("Time's up for this one. {reveal}");
            self.finalize_question(false);
            return self.advance_or_finish(Some(feedback)).await;
        }

        if is_acknowledgment(text) {
            let feedback = "Great - let's continue.".to_string();
            self.say(&feedback);
            return Ok(TurnOutput {
                feedback: Some(feedback),
                prompt: Some(question),
                is_session_end: false,
                score: self.score,
            });
        }

        if is_dont_know(text) {
            return self.handle_miss(None, true).await;
        }

        let timeout = self.oracle_budget(Budget::PerQuestion);
        let outcome = self.matcher.grade(&question, text, &accepted, timeout).await;

        match outcome.verdict {
            Verdict::Correct => {
                let feedback = outcome
                    .feedback
                    .unwrap_or_else(|| "That's right! Well done.".to_string());
                if let Some(active) = self.current.as_mut() {
                    active.attempt_count += 1;
                }
                self.finalize_question(true);
                self.advance_or_finish(Some(feedback)).await
            }
            // Inconclusive fails safe toward another hinted attempt.
            Verdict::Incorrect | Verdict::Inconclusive => {
                self.handle_miss(outcome.feedback, false).await
            }
        }
    }

    /// A wrong (or unknown) answer: hint and retry, or reveal and
    /// advance once attempts are exhausted.
    async fn handle_miss(
        &mut self,
        oracle_feedback: Option<String>,
        gave_up: bool,
    ) -> EngineResult<TurnOutput> {
        let max_attempts = self.config.max_attempts;
        // The reveal is reserved for exhaustion and timeouts: a still
        // open question only ever sees the non-revealing rungs.
        let hint_cap = self.escalator.max_hints().saturating_sub(1);

        let Some(active) = self.current.as_mut() else {
            return self.present_next_question(None).await;
        };
        active.attempt_count += 1;
        if hint_cap > 0 {
            active.hint_level = if gave_up {
                // Skip straight to the most specific non-revealing tier.
                hint_cap
            } else {
                (active.hint_level + 1).min(hint_cap)
            };
        }
        let attempts_used = active.attempt_count;
        let level = active.hint_level;
        let topic = active.item.topic.clone();

        if attempts_used >= max_attempts {
            let reveal = self.reveal_text();
            let feedback = match oracle_feedback {
                Some(fb) => format!("{fb} {reveal}"),
                None => reveal,
            };
            self.finalize_question(false);
            return self.advance_or_finish(Some(feedback)).await;
        }

        let hint = if hint_cap == 0 {
            // Single-level ladders have no rung below the reveal.
            "Take your time and think back carefully.".to_string()
        } else {
            let context = self.hint_context_for(&topic);
            let timeout = self.oracle_budget(Budget::PerQuestion);
            self.escalator.hint(&topic, level, &context, timeout).await
        };

        let lead_in = if gave_up {
            "That's completely okay - let me help."
        } else {
            "Not quite."
        };
        let feedback = format!("{lead_in} {hint}");
        self.say(&feedback);

        Ok(TurnOutput {
            feedback: Some(feedback),
            prompt: None,
            is_session_end: false,
            score: self.score,
        })
    }

    /// Deal the next question, or finish when the configured count is
    /// reached or the pool runs dry.
    async fn present_next_question(
        &mut self,
        feedback: Option<String>,
    ) -> EngineResult<TurnOutput> {
        if self.selector.asked_count() >= self.config.questions_per_session {
            return self.finish_with_feedback(feedback, "question count reached").await;
        }

        let item = match self.selector.next() {
            Ok(item) => item,
            Err(EngineError::PoolExhausted) => {
                return self.finish_with_feedback(feedback, "question pool exhausted").await;
            }
            Err(e) => return Err(e),
        };

        self.machine.set_question_index(self.selector.asked_count());
        self.clock.start_question();
        info!(
            session_id = %self.id,
            question_id = %item.id,
            index = self.selector.asked_count(),
            "Presenting question"
        );

        let prompt = item.question.clone();
        self.current = Some(ActiveQuestion {
            item,
            attempt_count: 0,
            hint_level: 0,
        });
        self.say(&prompt);

        Ok(TurnOutput {
            feedback,
            prompt: Some(prompt),
            is_session_end: false,
            score: self.score,
        })
    }

    /// Commit the finished question exactly once: history, score, and
    /// the pool's statistics.
    fn finalize_question(&mut self, was_correct: bool) {
        let Some(active) = self.current.take() else {
            return;
        };
        let elapsed = self.clock.question_elapsed().as_secs();
        info!(
            session_id = %self.id,
            question_id = %active.item.id,
            attempts = active.attempt_count,
            correct = was_correct,
            "Question finalized"
        );
        let when = self.clock.utc_now();
        if let Err(e) = self
            .selector
            .record(&active.item.id, was_correct, when)
        {
            warn!(error = %e, "Failed to record attempt statistics");
        }
        self.history.push(HistoryEntry {
            question_id: active.item.id,
            attempts: active.attempt_count,
            correct: was_correct,
            elapsed_seconds: elapsed,
        });
        self.score.total += 1;
        if was_correct {
            self.score.correct += 1;
        }
    }

    /// After a finalized question: next question, or the summary if
    /// the session deadline has passed meanwhile.
    async fn advance_or_finish(&mut self, feedback: Option<String>) -> EngineResult<TurnOutput> {
        if let Some(fb) = &feedback {
            self.say(fb);
        }
        if self.clock.expired(Budget::WholeSession) {
            return self.finish_with_feedback(feedback, "session deadline exceeded").await;
        }
        self.present_next_question(feedback).await
    }

    /// Force the Summary → Closed tail from any open phase.
    async fn finish(&mut self, reason: &str) -> EngineResult<TurnOutput> {
        self.finish_with_feedback(None, reason).await
    }

    async fn finish_with_feedback(
        &mut self,
        feedback: Option<String>,
        reason: &str,
    ) -> EngineResult<TurnOutput> {
        // A question still in flight ends unanswered.
        if self.current.is_some() {
            self.finalize_question(false);
        }

        self.machine.advance(SessionPhase::Summary, Some(reason))?;

        let summary = self.summary_text().await;
        self.say(&summary);
        self.machine.advance(SessionPhase::Closed, None)?;

        info!(
            session_id = %self.id,
            correct = self.score.correct,
            total = self.score.total,
            reason,
            "Session closed"
        );

        let feedback = match feedback {
            Some(fb) => format!("{fb}\n{summary}"),
            None => summary,
        };
        Ok(TurnOutput {
            feedback: Some(feedback),
            prompt: None,
            is_session_end: true,
            score: self.score,
        })
    }

    /// Closing message: score line plus an encouraging sentence,
    /// oracle-phrased when possible.
    async fn summary_text(&self) -> String {
        let score_line = format!(
            "You answered {} of {} questions correctly.",
            self.score.correct, self.score.total
        );
        let timeout = self.oracle_budget(Budget::WholeSession);
        let user = format!(
            "Questions answered: {}. Correct: {}. Success rate: {:.0}%.",
            self.score.total,
            self.score.correct,
            self.score.ratio() * 100.0
        );
        match self.oracle.chat(prompts::SUMMARY_PREAMBLE, &user, timeout).await {
            Ok(text) => format!("{score_line} {text}"),
            Err(e) => {
                warn!(error = %e, "Summary degraded to template");
                format!("{score_line} You did well today - every bit of practice helps. See you next time!")
            }
        }
    }

    /// The reveal line for the current question.
    fn reveal_text(&self) -> String {
        let answer = self
            .current
            .as_ref()
            .map(|a| a.item.primary_answer().to_string())
            .unwrap_or_default();
        format!("The answer was: {answer}.")
    }

    /// Escalation facts for a topic; a minimal context built from the
    /// current answer when the store has none.
    fn hint_context_for(&self, topic: &str) -> HintContext {
        if let Some(ctx) = self.selector.hint_context(topic) {
            return ctx;
        }
        HintContext {
            topic: topic.to_string(),
            relationship: None,
            category: None,
            details: Vec::new(),
            answer: self
                .current
                .as_ref()
                .map(|a| a.item.primary_answer().to_string())
                .unwrap_or_default(),
        }
    }

    /// Oracle timeout bounded by the remaining phase budget, so an
    /// oracle stall can never blow a deadline.
    fn oracle_budget(&self, budget: Budget) -> Duration {
        self.config
            .oracle
            .timeout()
            .min(self.clock.remaining(budget))
            .min(self.clock.remaining(Budget::WholeSession))
    }

    fn say(&mut self, text: &str) {
        self.transcript.push(Utterance {
            role: Role::Coach,
            text: text.to_string(),
        });
    }

    fn hear(&mut self, text: &str) {
        self.transcript.push(Utterance {
            role: Role::User,
            text: text.trim().to_string(),
        });
    }
}

/// Bare acknowledgments that should re-prompt rather than count as an
/// attempt.
fn is_acknowledgment(text: &str) -> bool {
    const ACKS: &[&str] = &[
        "okay", "ok", "thanks", "thank you", "got it", "i see", "alright", "understood",
    ];
    let lowered = text.trim().to_lowercase();
    ACKS.iter().any(|a| *a == lowered)
}

/// "I don't know" variants: counts as an attempt but jumps straight to
/// the most specific non-revealing hint.
fn is_dont_know(text: &str) -> bool {
    const PHRASES: &[&str] = &[
        "i don't know",
        "i dont know",
        "dont know",
        "don't know",
        "not sure",
        "can't remember",
        "cant remember",
        "no idea",
    ];
    let lowered = text.trim().to_lowercase();
    PHRASES.iter().any(|p| lowered.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgment_detection() {
        assert!(is_acknowledgment("okay"));
        assert!(is_acknowledgment("  Thanks "));
        assert!(!is_acknowledgment("okay it was a birthday"));
    }

    #[test]
    fn test_dont_know_detection() {
        assert!(is_dont_know("I don't know"));
        assert!(is_dont_know("sorry, i cant remember that"));
        assert!(!is_dont_know("harry"));
    }

    #[test]
    fn test_score_ratio() {
        let score = Score {
            correct: 2,
            total: 3,
        };
        assert!((score.ratio() - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(Score::default().ratio(), 0.0);
    }
}
