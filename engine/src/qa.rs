//! Q&A data model and store.
//!
//! `QAItem`s are created by the external knowledge-graph builder; the
//! engine only reads them and mutates the four statistics fields, once
//! per finished question. `InMemoryQaStore` keeps each read-modify-write
//! under a single lock so two sessions sharing one pool cannot lose
//! updates.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// A trainable fact: one question with its accepted answer variants
/// and retention statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QAItem {
    /// Stable identifier.
    pub id: String,
    /// Prompt text presented to the user.
    pub question: String,
    /// Synonyms/variants considered correct.
    pub accepted_answers: Vec<String>,
    /// Grouping key used for hint context and retention tracking.
    pub topic: String,
    /// Attempts made on this item, correct or not.
    #[serde(default)]
    pub times_practiced: u32,
    /// Attempts that ended correct. Always <= `times_practiced`.
    #[serde(default)]
    pub success_count: u32,
    /// When the item entered the pool.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Updated on every finished attempt.
    #[serde(default = "Utc::now")]
    pub last_practiced_at: DateTime<Utc>,
}

impl QAItem {
    /// Build a fresh item with zeroed statistics.
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        accepted_answers: Vec<String>,
        topic: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            question: question.into(),
            accepted_answers,
            topic: topic.into(),
            times_practiced: 0,
            success_count: 0,
            created_at: now,
            last_practiced_at: now,
        }
    }

    /// Fraction of attempts that ended correct (0.0 when never asked).
    pub fn success_ratio(&self) -> f64 {
        if self.times_practiced == 0 {
            0.0
        } else {
            f64::from(self.success_count) / f64::from(self.times_practiced)
        }
    }

    /// Primary accepted answer, used for reveals and hint ladders.
    pub fn primary_answer(&self) -> &str {
        self.accepted_answers
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Facts available for hint escalation about one topic. Supplied by
/// the external knowledge-graph builder; read-only to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HintContext {
    /// Topic this context describes (matches `QAItem::topic`).
    pub topic: String,
    /// Indirect relationship cue, e.g. "your younger brother".
    #[serde(default)]
    pub relationship: Option<String>,
    /// Category cue for non-person topics, e.g. "a dessert".
    #[serde(default)]
    pub category: Option<String>,
    /// Distinguishing details, ordered vague to specific.
    #[serde(default)]
    pub details: Vec<String>,
    /// The literal answer, stated outright at the final hint level.
    pub answer: String,
}

/// Read access to the question pool plus the single permitted write:
/// the four statistics fields, committed once per finished question.
pub trait QAStore: Send + Sync {
    /// Snapshot of every item in the pool.
    fn all(&self) -> Vec<QAItem>;

    /// Look up one item by id.
    fn get(&self, id: &str) -> Option<QAItem>;

    /// Commit one finished attempt: bump `times_practiced`, bump
    /// `success_count` iff correct, stamp `last_practiced_at`.
    fn record_attempt(&self, id: &str, was_correct: bool, when: DateTime<Utc>)
        -> EngineResult<()>;

    /// Escalation facts for a topic, if the builder supplied any.
    fn hint_context(&self, topic: &str) -> Option<HintContext>;
}

/// Serialized pool file: items plus optional hint contexts.
#[derive(Debug, Deserialize)]
struct PoolFile {
    items: Vec<QAItem>,
    #[serde(default)]
    contexts: Vec<HintContext>,
}

struct StoreInner {
    items: HashMap<String, QAItem>,
    contexts: HashMap<String, HintContext>,
}

/// In-memory pool backing for tests and the CLI.
pub struct InMemoryQaStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryQaStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                items: HashMap::new(),
                contexts: HashMap::new(),
            }),
        }
    }

    /// Build a store from a JSON pool file.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let pool: PoolFile =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        let store = Self::new();
        for item in pool.items {
            store.insert(item);
        }
        for ctx in pool.contexts {
            store.insert_context(ctx);
        }
        Ok(store)
    }

    /// Small built-in demo pool for running without a pool file.
    pub fn sample() -> Self {
        let store = Self::new();
        store.insert(QAItem::new(
            "1",
            "Who was having lunch with you yesterday?",
            vec!["my daughter".into(), "daughter".into()],
            "daughter",
        ));
        store.insert(QAItem::new(
            "2",
            "Where were you having lunch yesterday?",
            vec![
                "at the italian restaurant downtown".into(),
                "italian restaurant".into(),
            ],
            "restaurant",
        ));
        store.insert(QAItem::new(
            "3",
            "What did you talk about with your daughter yesterday?",
            vec!["her new job promotion".into(), "job promotion".into()],
            "promotion",
        ));
        store.insert_context(HintContext {
            topic: "daughter".into(),
            relationship: Some("someone in your close family".into()),
            category: None,
            details: vec!["You usually meet her for lunch.".into()],
            answer: "your daughter".into(),
        });
        store
    }

    pub fn insert(&self, item: QAItem) {
        let mut inner = self.inner.lock().expect("qa store lock poisoned");
        inner.items.insert(item.id.clone(), item);
    }

    pub fn insert_context(&self, ctx: HintContext) {
        let mut inner = self.inner.lock().expect("qa store lock poisoned");
        inner.contexts.insert(ctx.topic.clone(), ctx);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("qa store lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryQaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QAStore for InMemoryQaStore {
    fn all(&self) -> Vec<QAItem> {
        let inner = self.inner.lock().expect("qa store lock poisoned");
        inner.items.values().cloned().collect()
    }

    fn get(&self, id: &str) -> Option<QAItem> {
        let inner = self.inner.lock().expect("qa store lock poisoned");
        inner.items.get(id).cloned()
    }

    fn record_attempt(
        &self,
        id: &str,
        was_correct: bool,
        when: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut inner = self.inner.lock().expect("qa store lock poisoned");
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownQuestion(id.to_string()))?;
        item.times_practiced += 1;
        if was_correct {
            item.success_count += 1;
        }
        item.last_practiced_at = when;
        Ok(())
    }

    fn hint_context(&self, topic: &str) -> Option<HintContext> {
        let inner = self.inner.lock().expect("qa store lock poisoned");
        inner.contexts.get(topic).cloned()
    }
}
