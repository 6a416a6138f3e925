//! Completion service clients for answer generation.
//!
//! Each backend implements the [`CompletionClient`] trait: a single
//! request/response chat completion with a system persona and a user prompt.
//! No streaming; the answer is spoken back in one piece.

pub mod openai;

pub use openai::OpenAiCompatibleClient;

use async_trait::async_trait;
use thiserror::Error;

const MAX_API_ERROR_CHARS: usize = 200;

/// Failures from a completion backend, classified so the dialog layer can
/// decide the spoken fallback deterministically.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API key not configured")]
    MissingCredentials,
    #[error("completion request failed: {0}")]
    Request(String),
    #[error("completion API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("completion response contained no choices")]
    EmptyResponse,
}

/// One-shot chat completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send a system persona and a user prompt, returning the generated text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;

    /// The name of this backend implementation.
    fn name(&self) -> &str;
}

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from upstream error strings before
/// they reach logs.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 3] = ["sk-", "sk-proj-", "Bearer "];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}
