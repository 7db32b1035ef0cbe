//! Interactive console front end: drives one training session over
//! stdin and writes a transcript log when it ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use trainer_engine::{
    InMemoryQaStore, OpenAiOracle, SystemClock, TrainerConfig, TrainingSession,
};

#[derive(Parser, Debug)]
#[command(name = "trainer", about = "Conversational memory-training sessions")]
struct Cli {
    /// Questions to ask this session
    #[arg(long)]
    num_questions: Option<usize>,

    /// Warm-up budget in seconds
    #[arg(long)]
    warmup_timeout: Option<u64>,

    /// Per-question budget in seconds
    #[arg(long)]
    question_timeout: Option<u64>,

    /// Whole-session budget in seconds
    #[arg(long)]
    max_session: Option<u64>,

    /// Oracle model identifier
    #[arg(long)]
    model: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON question pool file (built-in sample pool when omitted)
    #[arg(long)]
    qa_file: Option<PathBuf>,

    /// Session log destination (default: timestamped file in the
    /// working directory)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let store = match &cli.qa_file {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading question pool {}", path.display()))?;
            InMemoryQaStore::from_json_str(&json)?
        }
        None => InMemoryQaStore::sample(),
    };
    info!(questions = store.len(), "Question pool loaded");

    let oracle = OpenAiOracle::new(
        config.oracle.url.clone(),
        config.oracle.api_key.clone(),
        config.oracle.model.clone(),
    );

    let mut session = TrainingSession::new(
        config,
        Arc::new(store),
        Arc::new(oracle),
        Arc::new(SystemClock),
    );
    info!(session_id = %session.id(), "Session created");

    let opened = session.start().await?;
    if let Some(greeting) = &opened.prompt {
        println!("\n{greeting}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let wait = session.input_wait();
        let input = match tokio::time::timeout(wait, lines.next_line()).await {
            // Deadline passed while waiting; hand the engine an empty
            // turn so it enforces the expiry itself.
            Err(_) => String::new(),
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                println!("\nInput closed; ending session.");
                break;
            }
            Ok(Err(e)) => return Err(e).context("reading stdin"),
        };

        let output = session.submit_answer(&input).await?;
        if let Some(feedback) = &output.feedback {
            println!("\n{feedback}");
        }
        if let Some(prompt) = &output.prompt {
            println!("\n{prompt}");
        }
        if output.is_session_end {
            break;
        }
    }

    let log_path = cli.log_file.unwrap_or_else(default_log_path);
    write_session_log(&log_path, &session)?;
    println!("\nSession log saved to {}", log_path.display());

    Ok(())
}

/// Layer the config sources: TOML file (or defaults), then CLI flags.
fn load_config(cli: &Cli) -> Result<TrainerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            TrainerConfig::from_toml_str(&text)?
        }
        None => TrainerConfig::default(),
    };

    if let Some(n) = cli.num_questions {
        config.questions_per_session = n;
    }
    if let Some(secs) = cli.warmup_timeout {
        config.warmup_budget_secs = secs;
    }
    if let Some(secs) = cli.question_timeout {
        config.question_budget_secs = secs;
    }
    if let Some(secs) = cli.max_session {
        config.session_budget_secs = secs;
    }
    if let Some(model) = &cli.model {
        config.oracle.model = model.clone();
    }

    config.validate()?;
    Ok(config)
}

fn default_log_path() -> PathBuf {
    PathBuf::from(format!(
        "memory_training_session_{}.json",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Persist the finished session: score, per-question history, and the
/// full role-tagged transcript.
fn write_session_log(path: &Path, session: &TrainingSession) -> Result<()> {
    let log = serde_json::json!({
        "session_id": session.id(),
        "ended_at": chrono::Utc::now().to_rfc3339(),
        "phase": session.phase().to_string(),
        "score": session.score(),
        "history": session.history(),
        "transcript": session.transcript(),
        "transitions": session.transitions(),
    });
    let pretty = serde_json::to_string_pretty(&log)?;
    std::fs::write(path, pretty)
        .with_context(|| format!("writing session log {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use trainer_engine::{HintContext, JudgeReply, Oracle, OracleError};

    struct SilentOracle;

    #[async_trait]
    impl Oracle for SilentOracle {
        async fn judge(
            &self,
            _q: &str,
            _c: &str,
            _a: &[String],
            _t: Duration,
        ) -> Result<JudgeReply, OracleError> {
            Err(OracleError::Unavailable("test".into()))
        }

        async fn generate_hint(
            &self,
            _topic: &str,
            _level: u32,
            _ctx: &HintContext,
            _t: Duration,
        ) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("test".into()))
        }

        async fn chat(&self, _s: &str, _u: &str, _t: Duration) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("test".into()))
        }
    }

    #[tokio::test]
    async fn test_session_log_round_trip() {
        let mut session = TrainingSession::new(
            TrainerConfig::default(),
            Arc::new(InMemoryQaStore::sample()),
            Arc::new(SilentOracle),
            Arc::new(SystemClock),
        );
        session.start().await.unwrap();
        session.submit_answer("feeling fine").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        write_session_log(&path, &session).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["session_id"], session.id());
        assert_eq!(parsed["phase"], "questioning");
        assert!(parsed["transcript"].as_array().unwrap().len() >= 3);
    }

    #[test]
    fn test_flag_overrides_win_over_defaults() {
        let cli = Cli {
            num_questions: Some(7),
            warmup_timeout: None,
            question_timeout: Some(45),
            max_session: None,
            model: Some("local-judge".into()),
            config: None,
            qa_file: None,
            log_file: None,
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.questions_per_session, 7);
        assert_eq!(config.question_budget_secs, 45);
        assert_eq!(config.oracle.model, "local-judge");
        // Untouched knobs keep their defaults.
        assert_eq!(config.warmup_budget_secs, 300);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let cli = Cli {
            num_questions: Some(0),
            warmup_timeout: None,
            question_timeout: None,
            max_session: None,
            model: None,
            config: None,
            qa_file: None,
            log_file: None,
        };
        assert!(load_config(&cli).is_err());
    }
}
