//! Thread title generation using a fast/cheap LLM
//!
//! Generates short, ChatGPT-style titles from the first turns of a
//! thread. Model output is sanitized; any failure falls back to a
//! deterministic title derived from the first user message.

use crate::db::{Message, MessageContent};
use crate::llm::{ContentBlock, LlmMessage, LlmRequest, LlmService};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Placeholder title for threads that have not been titled yet
pub const DEFAULT_TITLE: &str = "New Conversation";

const TITLE_PROMPT: &str = r"You create concise chat titles.

Rules:
- 3 to 8 words.
- Title Case.
- No punctuation at the end. No quotes, emojis, or numbering.
- Capture the main topic or intent.

Conversation:
";

const TITLE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_TITLE_WORDS: usize = 8;
const EXCERPT_MESSAGES: usize = 4;
const EXCERPT_CHARS: usize = 240;

/// Generate a title for a thread from its first turns.
///
/// Never fails: if the LLM call errors, times out, or produces nothing
/// usable after sanitization, the deterministic fallback is returned.
pub async fn generate_title(messages: &[Message], llm: Arc<dyn LlmService>) -> String {
    if messages.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    let prompt = format!("{TITLE_PROMPT}{}\n\nReturn ONLY the title text.", build_excerpt(messages));

    let request = LlmRequest {
        system: None,
        messages: vec![LlmMessage::user(vec![ContentBlock::text(prompt)])],
        tools: vec![],
        max_tokens: Some(50), // Title should be very short
    };

    match timeout(TITLE_TIMEOUT, llm.complete(&request)).await {
        Ok(Ok(response)) => {
            let title = sanitize_title(&response.text());
            if title.is_empty() {
                fallback_title(messages)
            } else {
                title
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e.message, "Title generation LLM error");
            fallback_title(messages)
        }
        Err(_) => {
            tracing::warn!("Title generation timed out");
            fallback_title(messages)
        }
    }
}

/// Deterministic fallback: first 8 words of the first user message,
/// Title Cased; `New Conversation` when there is no user text.
pub fn fallback_title(messages: &[Message]) -> String {
    let Some(first_user) = first_user_text(messages) else {
        return DEFAULT_TITLE.to_string();
    };

    let title = sanitize_title(first_user);
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Sanitize a candidate title:
/// - keep only alphanumeric characters, whitespace, `-` and `_`
///   (drops quotes, backticks, bullets, emoji and other punctuation)
/// - clamp to the first 8 words
/// - Title Case each word
///
/// Idempotent on already-clean input.
pub fn sanitize_title(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();

    cleaned
        .split_whitespace()
        .take(MAX_TITLE_WORDS)
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn build_excerpt(messages: &[Message]) -> String {
    let mut lines = Vec::new();

    for msg in messages.iter().take(EXCERPT_MESSAGES) {
        let (role, text) = match &msg.content {
            MessageContent::User(user) => ("User", user.text.clone()),
            MessageContent::Agent(blocks) => {
                let text: String = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                ("Assistant", text)
            }
            // Tool traffic and errors don't help the title
            MessageContent::Tool(_) | MessageContent::Error(_) => continue,
        };

        let mut text = text.replace('\n', " ").trim().to_string();
        if text.is_empty() {
            continue;
        }
        if text.chars().count() > EXCERPT_CHARS {
            text = text.chars().take(EXCERPT_CHARS).collect::<String>() + "...";
        }
        lines.push(format!("{role}: {text}"));
    }

    lines.join("\n")
}

fn first_user_text(messages: &[Message]) -> Option<&str> {
    messages.iter().find_map(|msg| match &msg.content {
        MessageContent::User(user) if !user.text.trim().is_empty() => Some(user.text.as_str()),
        _ => None,
    })
}
