//! Engine configuration.
//!
//! Every empirically tuned knob (fuzzy threshold, hint count, retry
//! budget, time budgets) is exposed here rather than hard-coded, with
//! environment overrides for deployment and TOML loading for the CLI.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Oracle endpoint configuration (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    #[serde(default = "default_oracle_url")]
    pub url: String,
    /// Bearer token. Empty is allowed for local inference servers.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier sent in the request body.
    #[serde(default = "default_oracle_model")]
    pub model: String,
    /// Hard per-call timeout in seconds. The session loop further
    /// clamps each call to the remaining per-question budget.
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

fn default_oracle_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_oracle_model() -> String {
    "gpt-4o-mini".into()
}

fn default_oracle_timeout() -> u64 {
    20
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("TRAINER_ORACLE_URL").unwrap_or_else(|_| default_oracle_url()),
            api_key: std::env::var("TRAINER_ORACLE_API_KEY").unwrap_or_default(),
            model: std::env::var("TRAINER_ORACLE_MODEL").unwrap_or_else(|_| default_oracle_model()),
            timeout_secs: env_u64("TRAINER_ORACLE_TIMEOUT_SECS", default_oracle_timeout()),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level trainer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// How many questions one session asks before summarizing.
    pub questions_per_session: usize,
    /// Attempts allowed per question before reveal-and-advance.
    pub max_attempts: u32,
    /// Hint ladder depth. The final level states the answer, so this
    /// is best kept equal to `max_attempts`.
    pub max_hints: u32,
    /// Minimum normalized-Levenshtein similarity for the fuzzy tier.
    /// Tuned so single-character typos pass and unrelated short words
    /// do not.
    pub fuzzy_threshold: f64,
    /// Accepted answers shorter than this (normalized chars) skip the
    /// fuzzy tier entirely.
    pub min_fuzzy_len: usize,
    /// Warm-up phase budget in seconds.
    pub warmup_budget_secs: u64,
    /// Per-question budget in seconds, re-anchored on every question.
    pub question_budget_secs: u64,
    /// Whole-session budget in seconds. Never resets.
    pub session_budget_secs: u64,
    /// Oracle endpoint settings.
    pub oracle: OracleConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            questions_per_session: env_usize("TRAINER_NUM_QUESTIONS", 3),
            max_attempts: env_u32("TRAINER_MAX_ATTEMPTS", 3),
            max_hints: env_u32("TRAINER_MAX_HINTS", 3),
            fuzzy_threshold: 0.80,
            min_fuzzy_len: 4,
            warmup_budget_secs: env_u64("TRAINER_WARMUP_SECS", 300),
            question_budget_secs: env_u64("TRAINER_QUESTION_SECS", 60),
            session_budget_secs: env_u64("TRAINER_SESSION_SECS", 1800),
            oracle: OracleConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Parse a TOML document, falling back to defaults for absent keys.
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> EngineResult<()> {
        if self.questions_per_session == 0 {
            return Err(EngineError::Config(
                "questions_per_session must be at least 1".into(),
            ));
        }
        if self.max_attempts == 0 || self.max_hints == 0 {
            return Err(EngineError::Config(
                "max_attempts and max_hints must be at least 1".into(),
            ));
        }
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold < 1.0) {
            return Err(EngineError::Config(format!(
                "fuzzy_threshold must be in (0, 1), got {}",
                self.fuzzy_threshold
            )));
        }
        if self.warmup_budget_secs == 0
            || self.question_budget_secs == 0
            || self.session_budget_secs == 0
        {
            return Err(EngineError::Config("time budgets must be non-zero".into()));
        }
        Ok(())
    }

    pub fn warmup_budget(&self) -> Duration {
        Duration::from_secs(self.warmup_budget_secs)
    }

    pub fn question_budget(&self) -> Duration {
        Duration::from_secs(self.question_budget_secs)
    }

    pub fn session_budget(&self) -> Duration {
        Duration::from_secs(self.session_budget_secs)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
