//! Session registry — owns live sessions and routes turns by id.
//!
//! Embedders that serve multiple users hold one registry; each session
//! is isolated state behind a single async lock. Closed sessions are
//! disposed on the turn that closes them, and an idle sweep reclaims
//! sessions whose user walked away without finishing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use crate::clock::Clock;
use crate::config::TrainerConfig;
use crate::error::{EngineError, EngineResult};
use crate::oracle::{Oracle, Recall};
use crate::qa::QAStore;
use crate::session::{TrainingSession, TurnOutput};

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, TrainingSession>>,
    config: TrainerConfig,
    store: Arc<dyn QAStore>,
    oracle: Arc<dyn Oracle>,
    clock: Arc<dyn Clock>,
    recall: Option<Arc<dyn Recall>>,
}

impl SessionRegistry {
    pub fn new(
        config: TrainerConfig,
        store: Arc<dyn QAStore>,
        oracle: Arc<dyn Oracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            store,
            oracle,
            clock,
            recall: None,
        }
    }

    /// Attach a retrieval collaborator handed to every new session.
    pub fn with_recall(mut self, recall: Arc<dyn Recall>) -> Self {
        self.recall = Some(recall);
        self
    }

    /// Open a new session and return its id with the warm-up greeting.
    pub async fn create(&self) -> EngineResult<(String, TurnOutput)> {
        let mut session = TrainingSession::new(
            self.config.clone(),
            self.store.clone(),
            self.oracle.clone(),
            self.clock.clone(),
        );
        if let Some(recall) = &self.recall {
            session = session.with_recall(recall.clone());
        }

        let output = session.start().await?;
        let id = session.id().to_string();
        info!(session_id = %id, "Session registered");

        let mut sessions = self.sessions.lock().await;
        sessions.insert(id.clone(), session);
        Ok((id, output))
    }

    /// Route one user turn to a session. The session is disposed when
    /// this turn closes it.
    pub async fn submit_answer(&self, id: &str, text: &str) -> EngineResult<TurnOutput> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;

        let output = session.submit_answer(text).await?;
        if output.is_session_end {
            sessions.remove(id);
            info!(session_id = %id, "Session disposed");
        }
        Ok(output)
    }

    /// Forward a side question without touching questioning state.
    pub async fn ask_side_question(&self, id: &str, text: &str) -> EngineResult<String> {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        session.ask_side_question(text).await
    }

    /// Drop sessions idle for at least `max_idle`; returns their ids.
    /// Swept sessions never reach Summary, so callers wanting a final
    /// score should drive the session to its deadline instead.
    pub async fn sweep_idle(&self, max_idle: Duration) -> Vec<String> {
        let mut sessions = self.sessions.lock().await;
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_for() >= max_idle)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            sessions.remove(id);
            info!(session_id = %id, "Idle session swept");
        }
        stale
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::oracle::{JudgeReply, OracleError};
    use crate::qa::InMemoryQaStore;
    use async_trait::async_trait;

    /// Oracle double: judge always says no, everything else fails so
    /// the engine exercises its template fallbacks.
    struct OfflineOracle;

    #[async_trait]
    impl Oracle for OfflineOracle {
        async fn judge(
            &self,
            _q: &str,
            _c: &str,
            _a: &[String],
            _t: Duration,
        ) -> Result<JudgeReply, OracleError> {
            Ok(JudgeReply {
                correct: false,
                feedback: String::new(),
            })
        }

        async fn generate_hint(
            &self,
            _topic: &str,
            _level: u32,
            _ctx: &crate::qa::HintContext,
            _t: Duration,
        ) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("offline".into()))
        }

        async fn chat(&self, _s: &str, _u: &str, _t: Duration) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("offline".into()))
        }
    }

    fn registry(clock: Arc<ManualClock>) -> SessionRegistry {
        SessionRegistry::new(
            TrainerConfig::default(),
            Arc::new(InMemoryQaStore::sample()),
            Arc::new(OfflineOracle),
            clock,
        )
    }

    #[tokio::test]
    async fn test_create_and_route() {
        let reg = registry(Arc::new(ManualClock::new()));
        let (id, output) = reg.create().await.unwrap();
        assert!(output.prompt.is_some());
        assert!(!output.is_session_end);
        assert_eq!(reg.len().await, 1);

        // Warm-up reply advances into questioning.
        let output = reg.submit_answer(&id, "feeling good").await.unwrap();
        assert!(output.prompt.is_some());
    }

    #[tokio::test]
    async fn test_unknown_session_id() {
        let reg = registry(Arc::new(ManualClock::new()));
        let err = reg.submit_answer("nope", "hello").await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let reg = registry(Arc::new(ManualClock::new()));
        let (a, _) = reg.create().await.unwrap();
        let (b, _) = reg.create().await.unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.len().await, 2);

        reg.submit_answer(&a, "fine thanks").await.unwrap();
        // Session b is untouched by a's progress.
        let out_b = reg.submit_answer(&b, "fine thanks").await.unwrap();
        assert!(!out_b.is_session_end);
    }

    #[tokio::test]
    async fn test_closed_session_is_disposed() {
        let clock = Arc::new(ManualClock::new());
        let reg = registry(clock.clone());
        let (id, _) = reg.create().await.unwrap();

        // Blow the whole-session deadline; the next turn must close
        // and dispose the session.
        clock.advance(Duration::from_secs(3600));
        let output = reg.submit_answer(&id, "hello?").await.unwrap();
        assert!(output.is_session_end);
        assert!(reg.is_empty().await);

        let err = reg.submit_answer(&id, "again").await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_idle_sweep() {
        let clock = Arc::new(ManualClock::new());
        let reg = registry(clock.clone());
        let (id, _) = reg.create().await.unwrap();

        assert!(reg.sweep_idle(Duration::from_secs(600)).await.is_empty());
        clock.advance(Duration::from_secs(700));
        let swept = reg.sweep_idle(Duration::from_secs(600)).await;
        assert_eq!(swept, vec![id]);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_side_question_without_recall_fails() {
        let reg = registry(Arc::new(ManualClock::new()));
        let (id, _) = reg.create().await.unwrap();
        let err = reg.ask_side_question(&id, "what day is it?").await.unwrap_err();
        assert!(matches!(err, EngineError::Oracle(_)));
    }
}
