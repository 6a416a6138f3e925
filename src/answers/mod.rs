//! Answer generation for spoken study questions.
//!
//! Wraps a [`CompletionClient`] with topic-specific tutor personas and the
//! fallback policy the telephony channel requires: a caller must always hear
//! *some* response, so upstream failures are absorbed into a fixed spoken
//! apology rather than propagated.

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::completion::{CompletionClient, CompletionError};
use crate::dialog::Topic;

/// Fixed spoken fallback when answer generation fails. Matches the register
/// of the rest of the prompts: short, declarative, no markup.
pub const SPOKEN_APOLOGY: &str = "I apologize, but I'm having trouble generating a response right now. Please try asking your question again.";

const GENERIC_PERSONA: &str =
    "You are a helpful and knowledgeable tutor, providing clear and concise explanations.";

/// Why a generated answer fell back to the apology text.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("completion service failed: {0}")]
    Upstream(#[from] CompletionError),
}

/// Where an answer's text came from.
#[derive(Debug)]
pub enum AnswerSource {
    /// Text produced by the completion service.
    Generated,
    /// The fixed apology, substituted after a classified failure.
    Fallback(AnswerError),
}

/// An answer ready to be spoken. Never absent: on failure `text` carries the
/// apology and `source` carries the classification for observability.
#[derive(Debug)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

impl Answer {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, AnswerSource::Fallback(_))
    }
}

/// Generates spoken-suitable answers for a question within a topic.
pub struct AnswerGenerator {
    client: Arc<dyn CompletionClient>,
}

impl AnswerGenerator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Topic-specific expert persona, with a generic tutor fallback for any
    /// topic without a dedicated entry.
    fn persona(topic: Topic) -> &'static str {
        const PERSONAS: &[(Topic, &str)] = &[
            (
                Topic::Mathematics,
                "You are a patient mathematics tutor who explains concepts step by step in plain spoken language.",
            ),
            (
                Topic::Science,
                "You are an enthusiastic science tutor who explains concepts with simple everyday examples.",
            ),
            (
                Topic::History,
                "You are a history tutor who explains events and their context as a short spoken story.",
            ),
        ];

        PERSONAS
            .iter()
            .find(|(t, _)| *t == topic)
            .map_or(GENERIC_PERSONA, |(_, persona)| persona)
    }

    fn user_prompt(question: &str, topic: Topic) -> String {
        format!(
            "You are explaining a {} concept.\n\
             The question is: {question}\n\
             Please provide a clear, concise explanation suitable for voice response.\n\
             Keep the response under 30 seconds when spoken.",
            topic.display_name()
        )
    }

    /// Generate an answer for the question. One attempt, no retry; any
    /// failure is classified, logged, and replaced by the spoken apology.
    pub async fn generate(&self, question: &str, topic: Topic) -> Answer {
        let system = Self::persona(topic);
        let user = Self::user_prompt(question, topic);

        match self.client.complete(system, &user).await {
            Ok(text) => Answer {
                text,
                source: AnswerSource::Generated,
            },
            Err(e) => {
                warn!(
                    backend = self.client.name(),
                    topic = topic.display_name(),
                    error = %e,
                    "answer generation failed, substituting spoken apology"
                );
                Answer {
                    text: SPOKEN_APOLOGY.to_string(),
                    source: AnswerSource::Fallback(AnswerError::Upstream(e)),
                }
            }
        }
    }
}
