//! Answer matching — tiered equivalence checking for free-form answers.
//!
//! A legitimately correct but oddly-phrased answer must not be
//! rejected, so matching escalates through three tiers and
//! short-circuits on the first confident verdict:
//! 1. exact: normalized equality or whole-phrase containment
//! 2. fuzzy: normalized Levenshtein similarity above a tuned threshold
//! 3. semantic: the external oracle, at most once per attempt
//!
//! Tier 3 failures degrade to `Inconclusive`; the session loop maps
//! that to Incorrect so the user gets another hinted attempt rather
//! than a silent pass.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::oracle::{Oracle, OracleError};

/// Verdict on one candidate answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    /// No tier produced a confident verdict (oracle failed or timed
    /// out). Treated as Incorrect by the session loop.
    Inconclusive,
}

/// Which tier produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Normalized equality.
    Exact,
    /// Accepted answer contained as a whole phrase (or vice versa).
    Phrase,
    /// Similarity above threshold.
    Fuzzy,
    /// Oracle judgment.
    Semantic,
    /// No tier matched.
    None,
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Phrase => write!(f, "phrase"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Semantic => write!(f, "semantic"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Outcome of grading one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub verdict: Verdict,
    pub tier: MatchTier,
    /// Best similarity seen (1.0 for exact matches, 0.0 when unknown).
    pub similarity: f64,
    /// Oracle-phrased feedback, when tier 3 supplied any.
    pub feedback: Option<String>,
}

impl MatchOutcome {
    fn local(verdict: Verdict, tier: MatchTier, similarity: f64) -> Self {
        Self {
            verdict,
            tier,
            similarity,
            feedback: None,
        }
    }
}

/// Decides whether a candidate answer is correct against the accepted
/// variants. Pure given its inputs, aside from the tier-3 oracle call.
pub struct AnswerMatcher {
    threshold: f64,
    min_fuzzy_len: usize,
    oracle: Arc<dyn Oracle>,
}

impl AnswerMatcher {
    pub fn new(threshold: f64, min_fuzzy_len: usize, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            threshold,
            min_fuzzy_len,
            oracle,
        }
    }

    /// Grade one attempt. `oracle_timeout` bounds the single permitted
    /// tier-3 call.
    pub async fn grade(
        &self,
        question: &str,
        candidate: &str,
        accepted: &[String],
        oracle_timeout: Duration,
    ) -> MatchOutcome {
        let candidate_norm = normalize(candidate);
        if candidate_norm.is_empty() || accepted.is_empty() {
            return MatchOutcome::local(Verdict::Incorrect, MatchTier::None, 0.0);
        }
        let accepted_norms: Vec<String> = accepted.iter().map(|a| normalize(a)).collect();

        // Tier 1: exact / whole-phrase containment
        if let Some(outcome) = self.exact_tier(&candidate_norm, &accepted_norms) {
            debug!(tier = %outcome.tier, "Matched without oracle");
            return outcome;
        }

        // Tier 2: fuzzy similarity
        if let Some(outcome) = self.fuzzy_tier(&candidate_norm, &accepted_norms) {
            debug!(similarity = outcome.similarity, "Matched via fuzzy tier");
            return outcome;
        }

        // Tier 3: semantic judgment, the only tier allowed to call the
        // oracle — at most one invocation per attempt.
        match self
            .oracle
            .judge(question, candidate, accepted, oracle_timeout)
            .await
        {
            Ok(reply) => {
                let verdict = if reply.correct {
                    Verdict::Correct
                } else {
                    Verdict::Incorrect
                };
                debug!(correct = reply.correct, "Oracle judged attempt");
                MatchOutcome {
                    verdict,
                    tier: MatchTier::Semantic,
                    similarity: 0.0,
                    feedback: (!reply.feedback.is_empty()).then_some(reply.feedback),
                }
            }
            Err(OracleError::Timeout(d)) => {
                warn!(timeout = ?d, "Oracle timed out; treating attempt as inconclusive");
                MatchOutcome::local(Verdict::Inconclusive, MatchTier::None, 0.0)
            }
            Err(e) => {
                warn!(error = %e, "Oracle failed; treating attempt as inconclusive");
                MatchOutcome::local(Verdict::Inconclusive, MatchTier::None, 0.0)
            }
        }
    }

    fn exact_tier(&self, candidate: &str, accepted: &[String]) -> Option<MatchOutcome> {
        for answer in accepted {
            if answer.is_empty() {
                continue;
            }
            if candidate == answer {
                return Some(MatchOutcome::local(Verdict::Correct, MatchTier::Exact, 1.0));
            }
            // "it was a birthday" vs accepted "birthday"
            if contains_phrase(candidate, answer) {
                return Some(MatchOutcome::local(Verdict::Correct, MatchTier::Phrase, 1.0));
            }
            // "italian restaurant" vs accepted "at the italian restaurant
            // downtown" — only for candidates long enough to be specific.
            if candidate.len() >= self.min_fuzzy_len && contains_phrase(answer, candidate) {
                return Some(MatchOutcome::local(Verdict::Correct, MatchTier::Phrase, 1.0));
            }
        }
        None
    }

    fn fuzzy_tier(&self, candidate: &str, accepted: &[String]) -> Option<MatchOutcome> {
        let mut best = 0.0f64;
        for answer in accepted {
            // Short accepted answers make fuzzy matching unsafe
            // ("cat" vs "car" is one edit apart).
            if answer.len() < self.min_fuzzy_len {
                continue;
            }
            let mut sim = similarity(candidate, answer);
            // Single-word answers: also compare word by word, so
            // "the choclate" still reaches "chocolate".
            if !answer.contains(' ') {
                for word in candidate.split(' ') {
                    sim = sim.max(similarity(word, answer));
                }
            }
            best = best.max(sim);
        }
        (best >= self.threshold).then(|| {
            MatchOutcome::local(Verdict::Correct, MatchTier::Fuzzy, best)
        })
    }
}

/// Normalize for comparison: case-fold, strip punctuation, collapse
/// whitespace.
pub fn normalize(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_ws = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                result.push(lower);
            }
            in_ws = false;
        } else if !in_ws {
            result.push(' ');
            in_ws = true;
        }
    }
    result.trim_end().to_string()
}

/// Whether `needle` appears in `haystack` as a contiguous run of whole
/// words. Both inputs must already be normalized.
pub(crate) fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let hay: Vec<&str> = haystack.split(' ').collect();
    let ndl: Vec<&str> = needle.split(' ').collect();
    if ndl.is_empty() || ndl.len() > hay.len() {
        return false;
    }
    hay.windows(ndl.len()).any(|w| w == ndl.as_slice())
}

/// Normalized Levenshtein similarity in [0, 1].
fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Classic two-row Levenshtein distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::JudgeReply;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Oracle double that counts calls and returns a scripted verdict.
    struct ScriptedOracle {
        verdict: bool,
        fail: bool,
        calls: Mutex<u32>,
    }

    impl ScriptedOracle {
        fn correct() -> Self {
            Self {
                verdict: true,
                fail: false,
                calls: Mutex::new(0),
            }
        }

        fn incorrect() -> Self {
            Self {
                verdict: false,
                fail: false,
                calls: Mutex::new(0),
            }
        }

        fn unavailable() -> Self {
            Self {
                verdict: false,
                fail: true,
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn judge(
            &self,
            _question: &str,
            _candidate: &str,
            _accepted: &[String],
            _timeout: Duration,
        ) -> Result<JudgeReply, OracleError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(OracleError::Unavailable("down".into()));
            }
            Ok(JudgeReply {
                correct: self.verdict,
                feedback: "scripted".into(),
            })
        }

        async fn generate_hint(
            &self,
            _topic: &str,
            _level: u32,
            _context: &crate::qa::HintContext,
            _timeout: Duration,
        ) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("no hints".into()))
        }

        async fn chat(
            &self,
            _system: &str,
            _user: &str,
            _timeout: Duration,
        ) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("no chat".into()))
        }
    }

    fn matcher(oracle: Arc<ScriptedOracle>) -> AnswerMatcher {
        AnswerMatcher::new(0.80, 4, oracle)
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  It was a BIRTHDAY! "), "it was a birthday");
        assert_eq!(normalize("choc-o-late,   cake"), "choc o late cake");
        assert_eq!(normalize("???"), "");
    }

    #[test]
    fn test_contains_phrase_whole_words_only() {
        assert!(contains_phrase("it was a birthday", "birthday"));
        assert!(contains_phrase("at the italian restaurant downtown", "italian restaurant"));
        // "art" is inside "party" but not as a whole word
        assert!(!contains_phrase("a big party", "art"));
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("chocolate", "choclate"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("cat", "car"), 1);
    }

    #[tokio::test]
    async fn test_exact_match_skips_oracle() {
        let oracle = Arc::new(ScriptedOracle::incorrect());
        let m = matcher(oracle.clone());
        let out = m
            .grade("q", "Birthday", &["birthday".into()], TIMEOUT)
            .await;
        assert_eq!(out.verdict, Verdict::Correct);
        assert_eq!(out.tier, MatchTier::Exact);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_phrase_containment() {
        let oracle = Arc::new(ScriptedOracle::incorrect());
        let m = matcher(oracle.clone());
        let out = m
            .grade("q", "it was a birthday", &["birthday".into()], TIMEOUT)
            .await;
        assert_eq!(out.verdict, Verdict::Correct);
        assert_eq!(out.tier, MatchTier::Phrase);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fuzzy_tolerates_typos() {
        let oracle = Arc::new(ScriptedOracle::incorrect());
        let m = matcher(oracle.clone());
        let out = m
            .grade("q", "choclate cake", &["chocolate cake".into()], TIMEOUT)
            .await;
        assert_eq!(out.verdict, Verdict::Correct);
        assert_eq!(out.tier, MatchTier::Fuzzy);
        assert!(out.similarity >= 0.80);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_words_do_not_fuzzy_match() {
        let oracle = Arc::new(ScriptedOracle::incorrect());
        let m = matcher(oracle.clone());
        let out = m.grade("q", "car", &["cat".into()], TIMEOUT).await;
        // "cat" is below min_fuzzy_len, so this falls through to the
        // oracle, which says no.
        assert_eq!(out.verdict, Verdict::Incorrect);
        assert_eq!(out.tier, MatchTier::Semantic);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_semantic_tier_accepts_paraphrase() {
        let oracle = Arc::new(ScriptedOracle::correct());
        let m = matcher(oracle.clone());
        let out = m
            .grade(
                "Who visited you?",
                "my younger brother",
                &["harry".into()],
                TIMEOUT,
            )
            .await;
        assert_eq!(out.verdict, Verdict::Correct);
        assert_eq!(out.tier, MatchTier::Semantic);
        assert_eq!(out.feedback.as_deref(), Some("scripted"));
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_is_inconclusive() {
        let oracle = Arc::new(ScriptedOracle::unavailable());
        let m = matcher(oracle.clone());
        let out = m
            .grade("q", "something else", &["harry".into()], TIMEOUT)
            .await;
        assert_eq!(out.verdict, Verdict::Inconclusive);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_candidate_is_incorrect_without_oracle() {
        let oracle = Arc::new(ScriptedOracle::correct());
        let m = matcher(oracle.clone());
        let out = m.grade("q", "  ?! ", &["birthday".into()], TIMEOUT).await;
        assert_eq!(out.verdict, Verdict::Incorrect);
        assert_eq!(oracle.call_count(), 0);
    }
}
