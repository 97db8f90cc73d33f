//! # convo-mail
//!
//! Outbound email and activity notifications: the provider, queue and
//! feed collaborators, HTML and plaintext rendering, and [`Postman`],
//! which turns threads, events and digests into emails.

pub mod mailer;
pub mod notify;
pub mod postman;
pub mod queue;
pub mod render;
pub mod templates;

mod error;

pub use error::MailError;
pub use mailer::{Email, LogMailer, Mailer, RecordingMailer};
pub use notify::{feed_id, notify, Activity, MemoryNotifier, Notifier, Verb};
pub use postman::{FanOut, MailSettings, Postman};
pub use queue::{EmailJob, EmailQueue, JobAction, JobKind, MemoryQueue};
pub use render::{BasicRenderer, BodyRenderer};
pub use templates::Template;
