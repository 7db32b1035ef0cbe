//! Engine error types.
//!
//! Typed outcomes for everything that can go wrong inside the session
//! engine, so a transport layer can map failures to response codes
//! without inspecting internals. Deadline expiry and oracle outages are
//! deliberately NOT here — both are recovered locally by the session
//! loop and never surface as errors.

use thiserror::Error;

use crate::oracle::OracleError;
use crate::state_machine::IllegalTransition;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the session engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Caller invoked an operation after the session reached `Closed`.
    #[error("Session {session_id} is closed")]
    SessionClosed { session_id: String },

    /// No session registered under the given id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The question pool has no items at all.
    #[error("Question pool is empty")]
    PoolExhausted,

    /// A phase transition violated the session state graph.
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// Referenced QA item does not exist in the store.
    #[error("Unknown question id: {0}")]
    UnknownQuestion(String),

    /// Oracle failure that could not be recovered locally.
    ///
    /// Judge and hint calls never produce this (they degrade to
    /// Incorrect / templated hints); it is reserved for side-channel
    /// lookups where there is nothing to fall back to.
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = EngineError::SessionClosed {
            session_id: "abc123".into(),
        };
        assert_eq!(err.to_string(), "Session abc123 is closed");

        let err = EngineError::PoolExhausted;
        assert_eq!(err.to_string(), "Question pool is empty");
    }
}
