//! Question selection — spaced-repetition bias over the Q&A pool.
//!
//! Least-recently-practiced items surface first; ties break toward the
//! weakest retention (lowest success ratio), so recently-correct items
//! are not immediately re-asked and weak items come back sooner. One
//! selector instance serves one session and never repeats a question
//! id while unused items remain.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::qa::{QAItem, QAStore};

pub struct QuestionSelector {
    store: Arc<dyn QAStore>,
    asked: HashSet<String>,
}

impl QuestionSelector {
    pub fn new(store: Arc<dyn QAStore>) -> Self {
        Self {
            store,
            asked: HashSet::new(),
        }
    }

    /// Choose the next question and mark it asked for this session.
    ///
    /// Ranking: ascending `last_practiced_at`, then ascending success
    /// ratio, then id for a stable order.
    pub fn next(&mut self) -> EngineResult<QAItem> {
        let mut pool: Vec<QAItem> = self
            .store
            .all()
            .into_iter()
            .filter(|item| !self.asked.contains(&item.id))
            .collect();
        if pool.is_empty() {
            return Err(EngineError::PoolExhausted);
        }

        pool.sort_by(|a, b| {
            a.last_practiced_at
                .cmp(&b.last_practiced_at)
                .then(
                    a.success_ratio()
                        .partial_cmp(&b.success_ratio())
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then_with(|| a.id.cmp(&b.id))
        });

        let item = pool.swap_remove(0);
        self.asked.insert(item.id.clone());
        Ok(item)
    }

    /// Commit one finished question (not per attempt): the only way
    /// the pool's statistics evolve.
    pub fn record(
        &self,
        item_id: &str,
        was_correct: bool,
        when: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.store.record_attempt(item_id, was_correct, when)
    }

    /// Facts for hint escalation about a topic, if any.
    pub fn hint_context(&self, topic: &str) -> Option<crate::qa::HintContext> {
        self.store.hint_context(topic)
    }

    /// How many questions this session has been dealt.
    pub fn asked_count(&self) -> usize {
        self.asked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::InMemoryQaStore;
    use chrono::TimeDelta;

    fn item(id: &str, last: DateTime<Utc>, practiced: u32, success: u32) -> QAItem {
        let mut it = QAItem::new(id, format!("question {id}"), vec![format!("answer {id}")], id);
        it.last_practiced_at = last;
        it.times_practiced = practiced;
        it.success_count = success;
        it
    }

    #[test]
    fn test_least_recently_practiced_first() {
        let now = Utc::now();
        let store = Arc::new(InMemoryQaStore::new());
        store.insert(item("fresh", now, 1, 1));
        store.insert(item("stale", now - TimeDelta::days(3), 1, 1));

        let mut selector = QuestionSelector::new(store);
        assert_eq!(selector.next().unwrap().id, "stale");
        assert_eq!(selector.next().unwrap().id, "fresh");
    }

    #[test]
    fn test_weak_retention_breaks_ties() {
        let now = Utc::now();
        let store = Arc::new(InMemoryQaStore::new());
        store.insert(item("strong", now, 4, 4));
        store.insert(item("weak", now, 4, 1));

        let mut selector = QuestionSelector::new(store);
        assert_eq!(selector.next().unwrap().id, "weak");
    }

    #[test]
    fn test_never_repeats_within_session() {
        let now = Utc::now();
        let store = Arc::new(InMemoryQaStore::new());
        for i in 0..5 {
            store.insert(item(&format!("q{i}"), now, 0, 0));
        }

        let mut selector = QuestionSelector::new(store);
        let mut seen = HashSet::new();
        for _ in 0..5 {
            let picked = selector.next().unwrap();
            assert!(seen.insert(picked.id), "repeated a question id");
        }
        assert!(matches!(
            selector.next().unwrap_err(),
            EngineError::PoolExhausted
        ));
    }

    #[test]
    fn test_empty_pool_is_exhausted() {
        let mut selector = QuestionSelector::new(Arc::new(InMemoryQaStore::new()));
        assert!(matches!(
            selector.next().unwrap_err(),
            EngineError::PoolExhausted
        ));
    }

    #[test]
    fn test_record_flows_to_store() {
        let now = Utc::now();
        let store = Arc::new(InMemoryQaStore::new());
        store.insert(item("q", now - TimeDelta::days(1), 0, 0));

        let selector = QuestionSelector::new(store.clone());
        selector.record("q", true, now).unwrap();

        let updated = store.get("q").unwrap();
        assert_eq!(updated.times_practiced, 1);
        assert_eq!(updated.success_count, 1);
        assert_eq!(updated.last_practiced_at, now);
    }
}
