//! Oracle capability — external natural-language judgment and generation.
//!
//! The engine treats the LLM as a black box with a bounded-latency
//! contract: every call carries a caller-supplied timeout, and every
//! failure mode maps to a typed `OracleError` the session loop can
//! recover from locally. `OpenAiOracle` talks to any OpenAI-compatible
//! chat-completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::qa::HintContext;

/// Errors from oracle calls.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The call did not complete within the caller's timeout.
    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure or non-success HTTP status.
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle answered, but not in the expected shape.
    #[error("Malformed oracle reply: {0}")]
    Malformed(String),
}

/// Verdict returned by the semantic judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReply {
    /// Whether the candidate answer is semantically correct.
    pub correct: bool,
    /// Brief user-facing feedback, e.g. "Yes, that's your brother Harry!".
    #[serde(default)]
    pub feedback: String,
}

/// External natural-language judgment/generation capability.
///
/// All methods take a hard timeout; implementations must return
/// `OracleError::Timeout` rather than block past it.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Semantic equivalence check: is `candidate` an acceptable answer
    /// to `question` given the accepted variants?
    async fn judge(
        &self,
        question: &str,
        candidate: &str,
        accepted: &[String],
        timeout: Duration,
    ) -> Result<JudgeReply, OracleError>;

    /// Phrase a hint for `topic` at escalation `level` (1-based).
    /// Callers fall back to a template on any error.
    async fn generate_hint(
        &self,
        topic: &str,
        level: u32,
        context: &HintContext,
        timeout: Duration,
    ) -> Result<String, OracleError>;

    /// Free-form single-turn generation for warm-up and summary text.
    async fn chat(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String, OracleError>;
}

/// Out-of-band retrieval collaborator for side questions ("who came to
/// see me?"). Lookups never touch session state.
#[async_trait]
pub trait Recall: Send + Sync {
    async fn lookup(&self, question: &str) -> Result<String, OracleError>;
}

/// Oracle backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiOracle {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiOracle {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// One chat-completions round trip, bounded by `timeout`.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let request = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(timeout);

        let response = match tokio::time::timeout(timeout, request.send()).await {
            Err(_) => return Err(OracleError::Timeout(timeout)),
            Ok(Err(e)) if e.is_timeout() => return Err(OracleError::Timeout(timeout)),
            Ok(Err(e)) => return Err(OracleError::Unavailable(e.to_string())),
            Ok(Ok(resp)) => resp,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| OracleError::Malformed("missing message content".into()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn judge(
        &self,
        question: &str,
        candidate: &str,
        accepted: &[String],
        timeout: Duration,
    ) -> Result<JudgeReply, OracleError> {
        let system = "You are a supportive memory assessment assistant for cognitively \
                      impaired patients. Exact wording is not required; judge whether the \
                      key detail is remembered. Respond with ONLY a JSON object: \
                      {\"correct\": true/false, \"feedback\": \"brief encouraging feedback\"}";
        let user = format!(
            "Question: {question}\nAccepted answers: {}\nUser's answer: {candidate}",
            accepted.join("; "),
        );

        let content = self.complete(system, &user, timeout).await?;
        parse_judge_reply(&content)
    }

    async fn generate_hint(
        &self,
        topic: &str,
        level: u32,
        context: &HintContext,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let system = "You phrase one short, warm hint for a memory-training question. \
                      NEVER state the answer or any part of it. Guide with relationships, \
                      categories, or context only. One sentence.";
        let mut facts = Vec::new();
        if let Some(rel) = &context.relationship {
            facts.push(format!("relationship: {rel}"));
        }
        if let Some(cat) = &context.category {
            facts.push(format!("category: {cat}"));
        }
        for detail in &context.details {
            facts.push(format!("detail: {detail}"));
        }
        let user = format!(
            "Topic: {topic}\nHint level: {level} (higher = more specific)\nKnown facts:\n{}",
            facts.join("\n"),
        );

        let hint = self.complete(system, &user, timeout).await?;
        let hint = hint.trim();
        if hint.is_empty() {
            return Err(OracleError::Malformed("empty hint".into()));
        }
        Ok(hint.to_string())
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let content = self.complete(system, user, timeout).await?;
        let content = content.trim();
        if content.is_empty() {
            return Err(OracleError::Malformed("empty completion".into()));
        }
        Ok(content.to_string())
    }
}

/// Parse the judge's JSON verdict, tolerating Markdown code fences.
fn parse_judge_reply(content: &str) -> Result<JudgeReply, OracleError> {
    let stripped = strip_code_fences(content);
    match serde_json::from_str::<JudgeReply>(stripped.trim()) {
        Ok(reply) => Ok(reply),
        Err(e) => {
            warn!(error = %e, "Judge reply was not valid JSON");
            Err(OracleError::Malformed(e.to_string()))
        }
    }
}

/// Remove a surrounding ``` block (with optional language tag) if present.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let reply = parse_judge_reply(r#"{"correct": true, "feedback": "Well done!"}"#).unwrap();
        assert!(reply.correct);
        assert_eq!(reply.feedback, "Well done!");
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = parse_judge_reply(
            "```json\n{\"correct\": false, \"feedback\": \"Not quite.\"}\n```",
        )
        .unwrap();
        assert!(!reply.correct);
    }

    #[test]
    fn test_parse_missing_feedback() {
        let reply = parse_judge_reply(r#"{"correct": true}"#).unwrap();
        assert!(reply.correct);
        assert!(reply.feedback.is_empty());
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let err = parse_judge_reply("I think that's right!").unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[test]
    fn test_strip_fences_without_language_tag() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }
}
