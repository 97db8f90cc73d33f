//! HTML layouts for every outbound email.

use maud::{html, Markup, PreEscaped, DOCTYPE};

use convo_shared::constants::APP_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Thread,
    Event,
    Digest,
    Admin,
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::Thread => "thread.html",
            Template::Event => "event.html",
            Template::Digest => "digest.html",
            Template::Admin => "admin.html",
        }
    }
}

/// One message already rendered by a `BodyRenderer`.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub author: String,
    pub html: String,
}

pub struct ThreadEmail<'a> {
    pub subject: &'a str,
    pub preview: &'a str,
    pub from_id: &'a str,
    pub to_id: &'a str,
    pub messages: &'a [MessageView],
    pub url: &'a str,
}

pub struct EventEmail<'a> {
    pub heading: &'a str,
    pub preview: &'a str,
    pub from_id: &'a str,
    pub to_id: &'a str,
    pub name: &'a str,
    pub time: &'a str,
    pub address: &'a str,
    pub description_html: &'a str,
    /// Free text from the host, e.g. a cancellation note.
    pub note: Option<&'a str>,
    pub button_text: &'a str,
    pub url: &'a str,
}

pub struct DigestSection {
    pub name: String,
    pub url: String,
    pub messages: Vec<MessageView>,
}

pub struct UpcomingView {
    pub name: String,
    pub time: String,
    pub address: String,
    pub url: String,
}

pub struct DigestEmail<'a> {
    pub preview: &'a str,
    pub to_id: &'a str,
    pub sections: &'a [DigestSection],
    pub upcoming: &'a [UpcomingView],
}

pub struct AdminEmail<'a> {
    pub preview: &'a str,
    pub heading: &'a str,
    pub body: &'a str,
    pub button_text: &'a str,
    pub url: &'a str,
}

const BODY_STYLE: &str = "margin:0;padding:0;background:#f4f4f4;font-family:Helvetica,Arial,sans-serif;";
const CARD_STYLE: &str = "max-width:600px;margin:24px auto;padding:24px;background:#ffffff;border-radius:6px;";
const AUTHOR_STYLE: &str = "font-weight:bold;font-size:14px;color:#555555;margin:0 0 6px 0;";
const BUTTON_STYLE: &str = "display:inline-block;padding:10px 18px;background:#2b7bb9;color:#ffffff;text-decoration:none;border-radius:4px;";
const MUTED_STYLE: &str = "font-size:12px;color:#999999;";

fn layout(title: &str, preview: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
            }
            body style=(BODY_STYLE) {
                span style="display:none;max-height:0;overflow:hidden;" { (preview) }
                div style=(CARD_STYLE) {
                    (content)
                }
                p style=(MUTED_STYLE) align="center" { "Sent with " (APP_NAME) }
            }
        }
    }
}

fn messages(views: &[MessageView]) -> Markup {
    html! {
        @for m in views {
            div style="margin:0 0 20px 0;" {
                p style=(AUTHOR_STYLE) { (m.author) " said:" }
                (PreEscaped(&m.html))
            }
        }
    }
}

pub fn thread(email: &ThreadEmail<'_>) -> String {
    let content = html! {
        h2 { (email.subject) }
        div data-from-id=(email.from_id) data-to-id=(email.to_id) {
            (messages(email.messages))
        }
        p { "Reply to this email or " a href=(email.url) { "view the conversation" } "." }
    };
    layout(email.subject, email.preview, content).into_string()
}

pub fn event(email: &EventEmail<'_>) -> String {
    let content = html! {
        h2 { (email.heading) }
        div data-from-id=(email.from_id) data-to-id=(email.to_id) {
            @if let Some(note) = email.note {
                p { (note) }
            }
            h3 { (email.name) }
            p { strong { "When: " } (email.time) }
            @if !email.address.is_empty() {
                p { strong { "Where: " } (email.address) }
            }
            (PreEscaped(email.description_html))
        }
        p { a href=(email.url) style=(BUTTON_STYLE) { (email.button_text) } }
    };
    layout(email.name, email.preview, content).into_string()
}

pub fn digest(email: &DigestEmail<'_>) -> String {
    let content = html! {
        div data-to-id=(email.to_id) {
            @if !email.sections.is_empty() {
                h2 { "Here's what you missed" }
            }
            @for section in email.sections {
                h3 { a href=(section.url) { (section.name) } }
                (messages(&section.messages))
            }
            @if !email.upcoming.is_empty() {
                h2 { "Coming up" }
                @for event in email.upcoming {
                    p {
                        a href=(event.url) { (event.name) }
                        br;
                        (event.time)
                        @if !event.address.is_empty() {
                            br;
                            (event.address)
                        }
                    }
                }
            }
        }
    };
    layout("Your digest", email.preview, content).into_string()
}

pub fn admin(email: &AdminEmail<'_>) -> String {
    let content = html! {
        h2 { (email.heading) }
        p { (email.body) }
        p { a href=(email.url) style=(BUTTON_STYLE) { (email.button_text) } }
        p style=(MUTED_STYLE) { "If the button doesn't work, paste this link into your browser: " (email.url) }
    };
    layout(email.heading, email.preview, content).into_string()
}
