//! Transcript storage trait and types for per-caller session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dialog::Topic;

/// Opaque caller identity, typically the originating phone number.
///
/// Same caller, same key within a process lifetime; no uniqueness guarantee
/// beyond that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CallerId(pub String);

impl CallerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One question/answer exchange. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub topic: Topic,
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(topic: Topic, question: &str, answer: &str) -> Self {
        Self {
            topic,
            question: question.to_string(),
            answer: answer.to_string(),
            asked_at: Utc::now(),
        }
    }
}

/// Storage for per-caller session transcripts.
///
/// Implementations must serialize access per caller: a `snapshot` issued
/// after an `append` has returned always includes that turn, and callers
/// never observe each other's sessions.
pub trait TranscriptStore: Send + Sync {
    /// Append a turn to the caller's session, creating the session if absent.
    /// Repeated appends add repeated turns; there is no dedup.
    fn append(&self, caller: &CallerId, turn: Turn);

    /// The caller's turns in append order. Empty if the caller has no session.
    fn snapshot(&self, caller: &CallerId) -> Vec<Turn>;

    /// Remove all turns for the caller. No-op if none exist.
    fn clear(&self, caller: &CallerId);

    /// The name of this store implementation.
    fn name(&self) -> &str;
}
