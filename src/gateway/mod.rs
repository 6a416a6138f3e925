//! HTTP webhook gateway.
//!
//! The telephony provider POSTs form-encoded callbacks here; each handler maps
//! its route to a [`DialogStep`], feeds the caller's input to the dialog
//! controller, and renders the reply as voice markup. Handlers are thin on
//! purpose: all session logic lives in [`crate::dialog`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Form, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, info, warn};

use crate::dialog::{CallerInput, DialogController, DialogStep, Topic};
use crate::transcript::CallerId;
use crate::twiml;

const MAX_BODY_BYTES: usize = 16 * 1024;
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DialogController>,
}

/// The fields the provider sends that this service reads. Everything else in
/// the callback body is ignored.
#[derive(Debug, Deserialize, Default)]
pub struct CallbackForm {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
}

impl CallbackForm {
    /// The caller's number, or a fixed placeholder when the provider omits it.
    /// A placeholder keeps the session machinery working; it just means all
    /// anonymous callers share one transcript.
    fn caller(&self) -> CallerId {
        self.from
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(CallerId::from)
            .unwrap_or_else(|| CallerId::from("anonymous"))
    }

    /// Digits win over speech when both are present. A present but empty
    /// `SpeechResult` is still speech: the provider heard the caller, the
    /// transcription just came back empty. Only a wholly absent field means
    /// the no-input timeout fired.
    fn input(&self) -> CallerInput {
        if let Some(digits) = self.digits.as_deref().filter(|d| !d.is_empty()) {
            return CallerInput::Digits(digits.to_string());
        }
        if let Some(speech) = self.speech_result.as_deref() {
            return CallerInput::Speech(speech.to_string());
        }
        CallerInput::Silence
    }
}

#[derive(Debug, Deserialize)]
pub struct QuestionParams {
    pub topic: Option<String>,
}

/// Build the webhook router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/voice", post(voice))
        .route("/handle-topic", post(handle_topic))
        .route("/handle-question", post(handle_question))
        .route("/handle-continue", post(handle_continue))
        .route("/handle-summary", post(handle_summary))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}

async fn advance_and_render(
    state: &AppState,
    step: DialogStep,
    form: &CallbackForm,
) -> impl IntoResponse {
    let caller = form.caller();
    let input = form.input();
    debug!(caller = %caller, ?step, "webhook callback");

    let reply = state.controller.advance(step, &caller, input).await;
    let xml = twiml::render_reply(&reply);
    ([(header::CONTENT_TYPE, "application/xml")], xml)
}

async fn voice(State(state): State<AppState>, Form(form): Form<CallbackForm>) -> impl IntoResponse {
    advance_and_render(&state, DialogStep::Greeting, &form).await
}

async fn handle_topic(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> impl IntoResponse {
    advance_and_render(&state, DialogStep::TopicSelect, &form).await
}

async fn handle_question(
    State(state): State<AppState>,
    Query(params): Query<QuestionParams>,
    Form(form): Form<CallbackForm>,
) -> impl IntoResponse {
    // A missing or unknown slug means the callback lost its routing state
    // somewhere; restart from the greeting rather than guess a topic.
    let step = match params.topic.as_deref().and_then(Topic::from_slug) {
        Some(topic) => DialogStep::QuestionCapture(topic),
        None => {
            warn!(slug = params.topic.as_deref(), "missing or unknown topic slug, restarting session");
            DialogStep::Greeting
        }
    };
    advance_and_render(&state, step, &form).await
}

async fn handle_continue(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> impl IntoResponse {
    advance_and_render(&state, DialogStep::ContinueOrEnd, &form).await
}

async fn handle_summary(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> impl IntoResponse {
    advance_and_render(&state, DialogStep::SummaryOffered, &form).await
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "voxtutor",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Bind and serve the gateway until a shutdown signal arrives.
pub async fn run(host: &str, port: u16, controller: Arc<DialogController>) -> Result<()> {
    let app = router(AppState { controller });
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "webhook gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::AnswerGenerator;
    use crate::completion::{CompletionClient, CompletionError};
    use crate::summary::{SummaryDispatcher, SummaryError};
    use crate::transcript::{InMemoryTranscriptStore, TranscriptStore, Turn};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct FixedClient(&'static str);

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, CompletionError> {
            Ok(self.0.to_string())
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct NullDispatcher;

    #[async_trait]
    impl SummaryDispatcher for NullDispatcher {
        async fn dispatch(&self, _caller: &CallerId, _turns: &[Turn]) -> Result<(), SummaryError> {
            Ok(())
        }
        fn name(&self) -> &str {
            "null"
        }
    }

    fn test_router() -> Router {
        let store: Arc<dyn TranscriptStore> = Arc::new(InMemoryTranscriptStore::new());
        let controller = DialogController::new(
            store,
            AnswerGenerator::new(Arc::new(FixedClient("A fixed answer."))),
            Arc::new(NullDispatcher),
        );
        router(AppState {
            controller: Arc::new(controller),
        })
    }

    fn form_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn voice_returns_xml_topic_menu() {
        let response = test_router()
            .oneshot(form_request("/voice", "From=%2B15550001"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "application/xml"
        );
        let xml = body_string(response).await;
        assert!(xml.contains("Welcome to VoxTutor"));
        assert!(xml.contains("action=\"/handle-topic\""));
        assert!(xml.contains("numDigits=\"1\""));
    }

    #[tokio::test]
    async fn valid_topic_digit_gathers_speech() {
        let response = test_router()
            .oneshot(form_request("/handle-topic", "From=%2B15550001&Digits=1"))
            .await
            .unwrap();

        let xml = body_string(response).await;
        assert!(xml.contains("Mathematics"));
        assert!(xml.contains("input=\"speech\""));
        assert!(xml.contains("action=\"/handle-question?topic=mathematics\""));
    }

    #[tokio::test]
    async fn invalid_topic_digit_redirects_to_voice() {
        let response = test_router()
            .oneshot(form_request("/handle-topic", "From=%2B15550001&Digits=9"))
            .await
            .unwrap();

        let xml = body_string(response).await;
        assert!(xml.contains("Invalid selection."));
        assert!(xml.contains("<Redirect method=\"POST\">/voice</Redirect>"));
    }

    #[tokio::test]
    async fn question_callback_speaks_answer_and_offers_continue_menu() {
        let response = test_router()
            .oneshot(form_request(
                "/handle-question?topic=science",
                "From=%2B15550001&SpeechResult=What+is+osmosis%3F",
            ))
            .await
            .unwrap();

        let xml = body_string(response).await;
        assert!(xml.contains("A fixed answer."));
        assert!(xml.contains("action=\"/handle-continue\""));
    }

    #[tokio::test]
    async fn empty_transcription_still_reaches_the_generator() {
        // The provider heard the caller but transcribed nothing. That is
        // speech, not a timeout: the question goes through as-is.
        let response = test_router()
            .oneshot(form_request(
                "/handle-question?topic=science",
                "From=%2B15550001&SpeechResult=",
            ))
            .await
            .unwrap();

        let xml = body_string(response).await;
        assert!(xml.contains("A fixed answer."));
        assert!(xml.contains("action=\"/handle-continue\""));
    }

    #[tokio::test]
    async fn question_without_topic_query_restarts_with_spoken_reply() {
        let response = test_router()
            .oneshot(form_request(
                "/handle-question",
                "From=%2B15550001&SpeechResult=hm",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let xml = body_string(response).await;
        assert!(xml.contains("Welcome to VoxTutor"));
    }

    #[tokio::test]
    async fn unknown_topic_slug_restarts_from_greeting() {
        let response = test_router()
            .oneshot(form_request(
                "/handle-question?topic=alchemy",
                "From=%2B15550001&SpeechResult=hm",
            ))
            .await
            .unwrap();

        let xml = body_string(response).await;
        assert!(xml.contains("Welcome to VoxTutor"));
    }

    #[tokio::test]
    async fn continue_with_other_digit_hangs_up() {
        let response = test_router()
            .oneshot(form_request("/handle-continue", "From=%2B15550001&Digits=9"))
            .await
            .unwrap();

        let xml = body_string(response).await;
        assert!(xml.contains("Goodbye"));
        assert!(xml.ends_with("<Hangup/></Response>"));
    }

    #[tokio::test]
    async fn summary_with_no_questions_explains_and_hangs_up() {
        let response = test_router()
            .oneshot(form_request("/handle-summary", "From=%2B15550001"))
            .await
            .unwrap();

        let xml = body_string(response).await;
        assert!(xml.contains("nothing to summarize"));
        assert!(xml.ends_with("<Hangup/></Response>"));
    }

    #[tokio::test]
    async fn missing_caller_number_still_produces_a_reply() {
        let response = test_router()
            .oneshot(form_request("/voice", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "voxtutor");
    }
}
