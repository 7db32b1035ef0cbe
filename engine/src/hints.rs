//! Hint escalation — progressively more specific cues across attempts.
//!
//! Hints monotonically narrow: level 1 is an indirect relationship or
//! category cue, middle levels add distinguishing details, and the
//! final level states the answer outright as the graceful fallback
//! after attempts are exhausted. The template ladder is fully
//! deterministic; oracle-assisted phrasing is optional and falls back
//! to the template on failure or when the oracle leaks the answer
//! before the final level.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::answer::{contains_phrase, normalize};
use crate::oracle::Oracle;
use crate::qa::HintContext;

/// Produces a hint for a topic at a given escalation level.
pub struct HintEscalator {
    max_hints: u32,
    oracle: Option<Arc<dyn Oracle>>,
}

impl HintEscalator {
    /// Template-only escalator.
    pub fn new(max_hints: u32) -> Self {
        Self {
            max_hints: max_hints.max(1),
            oracle: None,
        }
    }

    /// Escalator that asks the oracle to phrase non-final hints.
    pub fn with_oracle(max_hints: u32, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            max_hints: max_hints.max(1),
            oracle: Some(oracle),
        }
    }

    pub fn max_hints(&self) -> u32 {
        self.max_hints
    }

    /// Produce the hint for `level` in `[1, max_hints]` (clamped).
    ///
    /// The final level always reveals; lower levels never contain the
    /// answer.
    pub async fn hint(
        &self,
        topic: &str,
        level: u32,
        context: &HintContext,
        timeout: Duration,
    ) -> String {
        let level = level.clamp(1, self.max_hints);

        // The reveal is never delegated: it must be exact.
        if level == self.max_hints {
            return reveal(context);
        }

        if let Some(oracle) = &self.oracle {
            match oracle.generate_hint(topic, level, context, timeout).await {
                Ok(hint) if !leaks_answer(&hint, &context.answer) => return hint,
                Ok(_) => {
                    warn!(topic, level, "Oracle hint leaked the answer; using template");
                }
                Err(e) => {
                    warn!(topic, level, error = %e, "Oracle hint failed; using template");
                }
            }
        }

        self.template_hint(level, context)
    }

    /// Deterministic template ladder: cue → details → letter-count →
    /// first-letter → growing prefixes. Each rung reveals something the
    /// lower levels have not, so a deep ladder over a sparse context
    /// still narrows at every step instead of repeating itself.
    pub fn template_hint(&self, level: u32, context: &HintContext) -> String {
        let level = level.clamp(1, self.max_hints);
        if level == self.max_hints {
            return reveal(context);
        }

        let mut rungs: Vec<String> = Vec::new();
        if let Some(rel) = &context.relationship {
            rungs.push(format!("Think about {rel}."));
        } else if let Some(cat) = &context.category {
            rungs.push(format!("Think about {cat}."));
        }
        rungs.extend(context.details.iter().cloned());

        let answer_norm = normalize(&context.answer);
        let letters: Vec<char> = answer_norm.chars().filter(|c| !c.is_whitespace()).collect();
        if !letters.is_empty() {
            rungs.push(format!("The answer has {} letters.", letters.len()));
            rungs.push(format!("It starts with '{}'.", letters[0].to_uppercase()));
            // Deeper rungs spell out a growing prefix, always stopping
            // short of the full answer.
            let non_final = self.max_hints.saturating_sub(1) as usize;
            let mut prefix_len = 2;
            while prefix_len < letters.len() && rungs.len() < non_final {
                let prefix: String = letters[0]
                    .to_uppercase()
                    .chain(letters[1..prefix_len].iter().copied())
                    .collect();
                rungs.push(format!("It begins with '{prefix}'."));
                prefix_len += 1;
            }
        }

        if rungs.is_empty() {
            return "Take your time and think back carefully.".to_string();
        }

        let idx = (level as usize - 1).min(rungs.len() - 1);
        rungs.swap_remove(idx)
    }
}

/// Final-level hint: state the answer outright.
fn reveal(context: &HintContext) -> String {
    if context.answer.is_empty() {
        "I'm sorry, I don't have the answer recorded for this one.".to_string()
    } else {
        format!("It was {}.", context.answer)
    }
}

/// Whether a hint gives away the answer: the whole phrase, or any
/// distinctive word of it, appears in the hint.
fn leaks_answer(hint: &str, answer: &str) -> bool {
    let hint_norm = normalize(hint);
    let answer_norm = normalize(answer);
    if answer_norm.is_empty() || hint_norm.is_empty() {
        return false;
    }
    if answer_norm.len() >= 4 && contains_phrase(&hint_norm, &answer_norm) {
        return true;
    }
    answer_norm
        .split(' ')
        .filter(|w| w.len() >= 4)
        .any(|w| hint_norm.split(' ').any(|h| h == w))
}
