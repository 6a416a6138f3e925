//! Session summary rendering and delivery.
//!
//! The dialog layer hands a caller's full transcript here; this module
//! renders it into an email body and delivers it to the configured recipient.
//! No internal retry: the dispatcher reports success or a classified failure
//! and the caller of `dispatch` decides what happens next.

pub mod smtp;

pub use smtp::SmtpSummaryDispatcher;

use async_trait::async_trait;
use thiserror::Error;

use crate::transcript::{CallerId, Turn};

/// Failures from the delivery channel.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("summary delivery not configured: {0}")]
    NotConfigured(&'static str),
    #[error("failed to build summary message: {0}")]
    Message(String),
    #[error("summary delivery failed: {0}")]
    Transport(String),
}

/// Delivery channel for rendered session transcripts.
#[async_trait]
pub trait SummaryDispatcher: Send + Sync {
    /// Render and deliver the caller's turns. One attempt per call.
    async fn dispatch(&self, caller: &CallerId, turns: &[Turn]) -> Result<(), SummaryError>;

    /// The name of this delivery channel implementation.
    fn name(&self) -> &str;
}

/// Stand-in used when SMTP settings are absent. Every dispatch reports
/// `NotConfigured`, which the dialog layer turns into a spoken apology.
pub struct DisabledSummaryDispatcher;

#[async_trait]
impl SummaryDispatcher for DisabledSummaryDispatcher {
    async fn dispatch(&self, _caller: &CallerId, _turns: &[Turn]) -> Result<(), SummaryError> {
        Err(SummaryError::NotConfigured("summary"))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Render a caller's transcript into a plain-text message body: topic,
/// question, answer, and timestamp per turn, in chronological order.
pub fn render_transcript(caller: &CallerId, turns: &[Turn]) -> String {
    let mut body = format!(
        "Study session transcript for caller {caller}\n{} question(s) asked.\n",
        turns.len()
    );

    for (i, turn) in turns.iter().enumerate() {
        body.push_str(&format!(
            "\n{}. [{}] {}\nQ: {}\nA: {}\n",
            i + 1,
            turn.topic.display_name(),
            turn.asked_at.format("%Y-%m-%d %H:%M:%S UTC"),
            turn.question,
            turn.answer,
        ));
    }

    body
}
