//! Message bodies and plaintext for outbound email.

use maud::html;

use convo_shared::constants::{EMAIL_PREVIEW_CHARS, THREAD_EMAIL_CONTEXT};
use convo_store::Message;

/// Turns a message body into email-safe HTML with inline styles.
pub trait BodyRenderer: Send + Sync {
    fn render(&self, body: &str) -> String;
}

const PARAGRAPH_STYLE: &str = "margin:0 0 12px 0;font-size:15px;line-height:22px;color:#333333;";

/// Escapes the body, turns blank-line separated blocks into paragraphs and
/// single newlines into line breaks.
#[derive(Debug, Default, Clone)]
pub struct BasicRenderer;

impl BodyRenderer for BasicRenderer {
    fn render(&self, body: &str) -> String {
        let normalized = body.replace("\r\n", "\n");
        let paragraphs: Vec<Vec<&str>> = normalized
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.lines().collect())
            .collect();

        html! {
            @for lines in &paragraphs {
                p style=(PARAGRAPH_STYLE) {
                    @for (i, line) in lines.iter().enumerate() {
                        @if i > 0 { br; }
                        (line)
                    }
                }
            }
        }
        .into_string()
    }
}

fn first_name(message: &Message) -> &str {
    message
        .user
        .as_ref()
        .map(|u| u.first_name.as_str())
        .unwrap_or(convo_shared::constants::PLACEHOLDER_USER_NAME)
}

/// Plaintext for a thread email: the most recent messages, newest first.
/// `messages` must already be sorted newest first.
pub fn thread_plaintext(messages: &[Message]) -> String {
    messages
        .iter()
        .take(THREAD_EMAIL_CONTEXT)
        .map(|m| format!("{} said:\n\n{}\n\n", first_name(m), m.body))
        .collect()
}

/// Inbox preview line taken from the start of the plaintext.
pub fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(EMAIL_PREVIEW_CHARS).collect()
}
