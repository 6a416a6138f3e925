//! The call-session state machine.
//!
//! Each inbound telephony callback carries an explicit [`DialogStep`] plus the
//! caller's latest input; [`DialogController::advance`] decides what to say,
//! what input to gather next, and which side effects to run (store a turn,
//! dispatch a summary, clear the transcript). The controller is pure data in
//! and data out — the webhook layer renders a [`DialogReply`] into provider
//! markup, so the whole machine is unit-testable without any HTTP framing.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::answers::AnswerGenerator;
use crate::summary::SummaryDispatcher;
use crate::transcript::{CallerId, TranscriptStore, Turn};

// ── Spoken prompts ──────────────────────────────────────────────

const WELCOME: &str = "Welcome to VoxTutor! Let's start your study session.";
const TOPIC_MENU: &str = "Please select a subject to study. Press 1 for Mathematics, press 2 for Science, press 3 for History.";
const INVALID_SELECTION: &str = "Invalid selection.";
const CONTINUE_MENU: &str = "Would you like to ask another question? Press 1 for yes, press 2 to email a transcript of your session, or any other key to end the session.";
const EMPTY_TRANSCRIPT: &str = "You haven't asked any questions this session, so there is nothing to summarize.";
const SUMMARY_SENT: &str = "I've emailed a transcript of your study session.";
const SUMMARY_APOLOGY: &str = "I'm sorry, I wasn't able to send your session summary. Your questions are saved if you'd like to try again.";
const GOODBYE: &str = "Thank you for using VoxTutor. Goodbye!";

// ── Topics ──────────────────────────────────────────────────────

/// The closed set of subjects a caller can study. Selected by digit at
/// session start; drives the tutor persona used for answer generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Mathematics,
    Science,
    History,
}

impl Topic {
    /// Map a pressed digit to a topic. Unmapped digits are rejected, never
    /// silently accepted.
    pub fn from_digit(digit: &str) -> Option<Self> {
        match digit.trim() {
            "1" => Some(Self::Mathematics),
            "2" => Some(Self::Science),
            "3" => Some(Self::History),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Mathematics => "Mathematics",
            Self::Science => "Science",
            Self::History => "History",
        }
    }

    /// URL-safe identifier used to carry the topic through callback routing.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Mathematics => "mathematics",
            Self::Science => "science",
            Self::History => "history",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.trim().to_ascii_lowercase().as_str() {
            "mathematics" => Some(Self::Mathematics),
            "science" => Some(Self::Science),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

// ── Steps and inputs ────────────────────────────────────────────

/// The menu positions the state machine can be in. Carried explicitly as
/// data through routing rather than inferred from URL structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogStep {
    Greeting,
    TopicSelect,
    QuestionCapture(Topic),
    AnswerDelivered,
    ContinueOrEnd,
    SummaryOffered,
    Terminated,
}

impl DialogStep {
    /// The webhook action path that routes input back into this step.
    /// Automatic and terminal steps have no inbound route.
    pub fn action_path(self) -> Option<String> {
        match self {
            Self::Greeting => Some("/voice".to_string()),
            Self::TopicSelect => Some("/handle-topic".to_string()),
            Self::QuestionCapture(topic) => {
                Some(format!("/handle-question?topic={}", topic.slug()))
            }
            Self::ContinueOrEnd => Some("/handle-continue".to_string()),
            Self::SummaryOffered => Some("/handle-summary".to_string()),
            Self::AnswerDelivered | Self::Terminated => None,
        }
    }
}

/// The caller's latest input, as delivered by the telephony provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerInput {
    /// Pressed keypad digits.
    Digits(String),
    /// Transcribed speech, possibly empty.
    Speech(String),
    /// No input before the provider's timeout.
    Silence,
}

// ── Replies ─────────────────────────────────────────────────────

/// What kind of input the next prompt collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherKind {
    Digits,
    Speech,
}

/// An input-collection prompt plus the step that handles the reply.
#[derive(Debug, Clone)]
pub struct Gather {
    pub kind: GatherKind,
    pub prompt: String,
    pub next: DialogStep,
}

/// The controller's decision for one callback: lines to speak, an optional
/// gather, and what happens when the flow falls through the gather (either a
/// redirect loop or spoken closure plus hangup).
#[derive(Debug, Clone)]
pub struct DialogReply {
    /// Spoken before any gather.
    pub say: Vec<String>,
    pub gather: Option<Gather>,
    /// Step to re-enter when no input arrives (or unconditionally when there
    /// is no gather). Re-prompting is the only recourse on a voice channel.
    pub redirect: Option<DialogStep>,
    /// Spoken after the gather falls through, before ending the call.
    pub closing: Vec<String>,
    pub hangup: bool,
}

impl DialogReply {
    fn new() -> Self {
        Self {
            say: Vec::new(),
            gather: None,
            redirect: None,
            closing: Vec::new(),
            hangup: false,
        }
    }
}

// ── Controller ──────────────────────────────────────────────────

/// Stitches stateless callbacks into a coherent session: consults the
/// transcript store, invokes answer generation and summary dispatch, and
/// always produces a spoken reply — no external failure is ever allowed to
/// terminate a call abnormally.
pub struct DialogController {
    store: Arc<dyn TranscriptStore>,
    generator: AnswerGenerator,
    dispatcher: Arc<dyn SummaryDispatcher>,
}

impl DialogController {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        generator: AnswerGenerator,
        dispatcher: Arc<dyn SummaryDispatcher>,
    ) -> Self {
        Self {
            store,
            generator,
            dispatcher,
        }
    }

    /// Advance the state machine one callback.
    pub async fn advance(
        &self,
        step: DialogStep,
        caller: &CallerId,
        input: CallerInput,
    ) -> DialogReply {
        match step {
            DialogStep::Greeting => self.greeting(),
            DialogStep::TopicSelect => self.topic_select(input),
            DialogStep::QuestionCapture(topic) => {
                self.question_capture(caller, topic, input).await
            }
            DialogStep::AnswerDelivered => self.continue_menu(Vec::new()),
            DialogStep::ContinueOrEnd => self.continue_or_end(caller, input).await,
            DialogStep::SummaryOffered => self.summary_offered(caller).await,
            DialogStep::Terminated => self.terminated(),
        }
    }

    fn greeting(&self) -> DialogReply {
        let mut reply = DialogReply::new();
        reply.say.push(WELCOME.to_string());
        reply.gather = Some(Gather {
            kind: GatherKind::Digits,
            prompt: TOPIC_MENU.to_string(),
            next: DialogStep::TopicSelect,
        });
        // No input before timeout: repeat the menu.
        reply.redirect = Some(DialogStep::Greeting);
        reply
    }

    fn topic_select(&self, input: CallerInput) -> DialogReply {
        let topic = match &input {
            CallerInput::Digits(digits) => Topic::from_digit(digits),
            _ => None,
        };

        let Some(topic) = topic else {
            let mut reply = DialogReply::new();
            if let CallerInput::Digits(digits) = &input {
                info!(digits = %digits, "invalid topic selection, re-prompting");
                reply.say.push(INVALID_SELECTION.to_string());
            }
            reply.redirect = Some(DialogStep::Greeting);
            return reply;
        };

        let mut reply = DialogReply::new();
        reply.say.push(format!(
            "You've selected {}. Let's begin your study session.",
            topic.display_name()
        ));
        reply.gather = Some(Gather {
            kind: GatherKind::Speech,
            prompt: format!("Please ask your question about {}.", topic.display_name()),
            next: DialogStep::QuestionCapture(topic),
        });
        reply.redirect = Some(DialogStep::Greeting);
        reply
    }

    async fn question_capture(
        &self,
        caller: &CallerId,
        topic: Topic,
        input: CallerInput,
    ) -> DialogReply {
        let question = match input {
            CallerInput::Speech(utterance) => utterance,
            // Nothing was said: degrade to re-prompting from the top.
            _ => {
                let mut reply = DialogReply::new();
                reply.redirect = Some(DialogStep::Greeting);
                return reply;
            }
        };

        // One attempt per question; a second attempt is a brand-new
        // caller-initiated question. The answer is never absent: on failure
        // it carries the fixed spoken apology.
        let answer = self.generator.generate(&question, topic).await;
        self.store
            .append(caller, Turn::new(topic, &question, &answer.text));
        info!(
            caller = %caller,
            topic = topic.display_name(),
            fallback = answer.is_fallback(),
            "answer delivered"
        );

        // AnswerDelivered flows automatically into the continue/stop menu.
        self.continue_menu(vec![answer.text])
    }

    fn continue_menu(&self, say: Vec<String>) -> DialogReply {
        let mut reply = DialogReply::new();
        reply.say = say;
        reply.gather = Some(Gather {
            kind: GatherKind::Digits,
            prompt: CONTINUE_MENU.to_string(),
            next: DialogStep::ContinueOrEnd,
        });
        // Timeout at the continue menu ends the session with audible closure.
        reply.closing.push(GOODBYE.to_string());
        reply.hangup = true;
        reply
    }

    async fn continue_or_end(&self, caller: &CallerId, input: CallerInput) -> DialogReply {
        match input {
            CallerInput::Digits(digits) if digits.trim() == "1" => {
                let mut reply = DialogReply::new();
                reply.redirect = Some(DialogStep::Greeting);
                reply
            }
            CallerInput::Digits(digits) if digits.trim() == "2" => {
                self.summary_offered(caller).await
            }
            _ => self.terminated(),
        }
    }

    async fn summary_offered(&self, caller: &CallerId) -> DialogReply {
        let mut reply = DialogReply::new();

        let turns = self.store.snapshot(caller);
        if turns.is_empty() {
            // Normal branch, not an error.
            reply.say.push(EMPTY_TRANSCRIPT.to_string());
            reply.say.push(GOODBYE.to_string());
            reply.hangup = true;
            return reply;
        }

        match self.dispatcher.dispatch(caller, &turns).await {
            Ok(()) => {
                self.store.clear(caller);
                reply.say.push(SUMMARY_SENT.to_string());
            }
            Err(e) => {
                // Transcript stays intact so a re-requested summary can succeed.
                warn!(
                    caller = %caller,
                    channel = self.dispatcher.name(),
                    error = %e,
                    "summary dispatch failed, transcript preserved"
                );
                reply.say.push(SUMMARY_APOLOGY.to_string());
            }
        }

        reply.say.push(GOODBYE.to_string());
        reply.hangup = true;
        reply
    }

    fn terminated(&self) -> DialogReply {
        let mut reply = DialogReply::new();
        reply.say.push(GOODBYE.to_string());
        reply.hangup = true;
        reply
    }
}
