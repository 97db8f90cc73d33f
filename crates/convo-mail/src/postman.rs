//! Every outbound email the system sends.
//!
//! `Postman` owns the mailer, the queue and the renderer. Fan-out sends
//! one email per recipient; a failed recipient is logged and skipped so
//! the rest still get their copy.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use convo_shared::constants::{
    APP_NAME, EVENT_MAIL_DOMAIN, PLACEHOLDER_USER_NAME, THREAD_EMAIL_CONTEXT, THREAD_MAIL_DOMAIN,
};
use convo_shared::magic::MagicLinker;
use convo_shared::{ConvoError, Key, Kind, OpContext, Result};
use convo_store::{Database, Event, Message, Query, Thread, User};

use crate::error::MailError;
use crate::mailer::{Email, Mailer};
use crate::queue::{EmailJob, EmailQueue, JobAction, JobKind};
use crate::render::{preview, thread_plaintext, BodyRenderer};
use crate::templates::{
    self, AdminEmail, DigestEmail, DigestSection, EventEmail, MessageView, Template, ThreadEmail,
    UpcomingView,
};

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub from_name: String,
    pub from_address: String,
    /// Base URL for links back into the app.
    pub app_url: String,
    pub thread_domain: String,
    pub event_domain: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from_name: APP_NAME.to_string(),
            from_address: "support@convo.events".to_string(),
            app_url: "http://localhost:3000".to_string(),
            thread_domain: THREAD_MAIL_DOMAIN.to_string(),
            event_domain: EVENT_MAIL_DOMAIN.to_string(),
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct FanOut {
    pub sent: usize,
    /// Recipient address and the error it hit.
    pub failed: Vec<(String, MailError)>,
}

impl FanOut {
    pub fn first_error(&self) -> Option<&MailError> {
        self.failed.first().map(|(_, e)| e)
    }
}

#[derive(Clone, Copy)]
enum InviteKind {
    New,
    Updated,
}

pub struct Postman {
    db: Database,
    mailer: Arc<dyn Mailer>,
    queue: Arc<dyn EmailQueue>,
    renderer: Arc<dyn BodyRenderer>,
    linker: MagicLinker,
    settings: MailSettings,
}

impl Postman {
    pub fn new(
        db: Database,
        mailer: Arc<dyn Mailer>,
        queue: Arc<dyn EmailQueue>,
        renderer: Arc<dyn BodyRenderer>,
        linker: MagicLinker,
        settings: MailSettings,
    ) -> Self {
        Self {
            db,
            mailer,
            queue,
            renderer,
            linker,
            settings,
        }
    }

    pub fn linker(&self) -> &MagicLinker {
        &self.linker
    }

    pub fn settings(&self) -> &MailSettings {
        &self.settings
    }

    fn url(&self, parent: &Key) -> String {
        let section = match parent.kind() {
            Kind::Event => "events",
            _ => "threads",
        };
        format!("{}/{}/{}", self.settings.app_url, section, parent.encode())
    }

    fn view(&self, message: &Message) -> MessageView {
        MessageView {
            author: message
                .user
                .as_ref()
                .map(|u| u.full_name.clone())
                .unwrap_or_else(|| PLACEHOLDER_USER_NAME.to_string()),
            html: self.renderer.render(&message.body),
        }
    }

    async fn dispatch(&self, template: Template, emails: Vec<Email>) -> FanOut {
        let results = join_all(emails.iter().map(|e| self.mailer.send(e))).await;
        let mut report = FanOut::default();
        for (email, result) in emails.iter().zip(results) {
            match result {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    warn!(template = template.name(), to = %email.to_email, "email not sent: {}", e);
                    report.failed.push((email.to_email.clone(), e));
                }
            }
        }
        debug!(
            template = template.name(),
            sent = report.sent,
            failed = report.failed.len(),
            "fan-out finished"
        );
        report
    }

    // ------------------------------------------------------------------
    // Threads
    // ------------------------------------------------------------------

    /// Email the latest messages of `thread` to every participant except
    /// the author of the newest message.
    pub async fn send_thread(&self, thread: &Thread) -> Result<FanOut> {
        let messages = self
            .db
            .get_messages_by_parent(&thread.key)
            .await
            .op("postman.send_thread")?;
        let Some(latest) = messages.first() else {
            return Ok(FanOut::default());
        };
        let users = self
            .db
            .get_users_by_thread(thread)
            .await
            .op("postman.send_thread")?;

        let text = thread_plaintext(&messages);
        let preview = preview(&text);
        let views: Vec<MessageView> = messages
            .iter()
            .take(THREAD_EMAIL_CONTEXT)
            .map(|m| self.view(m))
            .collect();
        let from_name = latest
            .user
            .as_ref()
            .map(|u| u.full_name.clone())
            .unwrap_or_else(|| PLACEHOLDER_USER_NAME.to_string());
        let from_email = thread.get_email_at(&self.settings.thread_domain);
        let from_id = latest.user_key.encode();
        let url = self.url(&thread.key);

        let emails = users
            .iter()
            .filter(|u| u.key != latest.user_key)
            .map(|u| {
                let to_id = u.key.encode();
                Email {
                    from_name: from_name.clone(),
                    from_email: from_email.clone(),
                    to_name: u.full_name.clone(),
                    to_email: u.email.clone(),
                    subject: thread.subject.clone(),
                    text: text.clone(),
                    html: templates::thread(&ThreadEmail {
                        subject: &thread.subject,
                        preview: &preview,
                        from_id: &from_id,
                        to_id: &to_id,
                        messages: &views,
                        url: &url,
                    }),
                }
            })
            .collect();

        let report = self.dispatch(Template::Thread, emails).await;
        info!(thread = %thread.key, sent = report.sent, failed = report.failed.len(), "thread emailed");
        Ok(report)
    }

    pub async fn send_thread_async(&self, thread: &Thread) -> Result<()> {
        self.enqueue(JobKind::Thread, JobAction::SendThread, vec![thread.key.encode()])
            .await
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    fn event_email(
        &self,
        event: &Event,
        recipient: &User,
        subject: String,
        heading: &str,
        note: Option<&str>,
        attach_ics: bool,
    ) -> Email {
        let owner = event
            .owner
            .as_ref()
            .map(|o| o.full_name.clone())
            .unwrap_or_else(|| self.settings.from_name.clone());
        let time = event.get_formatted_time();
        let url = self.url(&event.key);
        let to_id = recipient.key.encode();

        let mut text = format!("{}\n\n{}\n{}\n", heading, event.name, time);
        if !event.place.address.is_empty() {
            text.push_str(&event.place.address);
            text.push('\n');
        }
        if let Some(note) = note {
            text.push_str(&format!("\n{}\n", note));
        }
        if !event.description.is_empty() {
            text.push_str(&format!("\n{}\n", event.description));
        }
        text.push_str(&format!("\n{}\n", url));
        if attach_ics {
            text.push_str("\n--- invite.ics ---\n");
            text.push_str(&event.get_ics());
        }

        let preview = preview(&text);
        let description_html = self.renderer.render(&event.description);
        let html = templates::event(&EventEmail {
            heading,
            preview: &preview,
            from_id: &event.owner_key.encode(),
            to_id: &to_id,
            name: &event.name,
            time: &time,
            address: &event.place.address,
            description_html: &description_html,
            note,
            button_text: if attach_ics { "RSVP" } else { "View event" },
            url: &url,
        });

        Email {
            from_name: owner,
            from_email: event.get_email_at(&self.settings.event_domain),
            to_name: recipient.full_name.clone(),
            to_email: recipient.email.clone(),
            subject,
            text,
            html,
        }
    }

    fn invite_email(&self, event: &Event, recipient: &User, kind: InviteKind) -> Email {
        let host = event
            .owner
            .as_ref()
            .map(|o| o.first_name.clone())
            .unwrap_or_else(|| self.settings.from_name.clone());
        match kind {
            InviteKind::New => self.event_email(
                event,
                recipient,
                format!("Invitation: {}", event.name),
                &format!("{} invited you to {}", host, event.name),
                None,
                true,
            ),
            InviteKind::Updated => self.event_email(
                event,
                recipient,
                format!("Updated invitation: {}", event.name),
                &format!("{} updated {}", host, event.name),
                None,
                true,
            ),
        }
    }

    async fn invitees(&self, event: &Event, op: &'static str) -> Result<Vec<User>> {
        Ok(self
            .db
            .get_users_by_event(event)
            .await
            .op(op)?
            .into_iter()
            .filter(|u| !event.owner_is(&u.key))
            .collect())
    }

    pub async fn send_invites(&self, event: &Event) -> Result<FanOut> {
        let users = self.invitees(event, "postman.send_invites").await?;
        let emails = users
            .iter()
            .map(|u| self.invite_email(event, u, InviteKind::New))
            .collect();
        let report = self.dispatch(Template::Event, emails).await;
        info!(event = %event.key, sent = report.sent, "invites sent");
        Ok(report)
    }

    pub async fn send_updated_invites(&self, event: &Event) -> Result<FanOut> {
        let users = self.invitees(event, "postman.send_updated_invites").await?;
        let emails = users
            .iter()
            .map(|u| self.invite_email(event, u, InviteKind::Updated))
            .collect();
        let report = self.dispatch(Template::Event, emails).await;
        info!(event = %event.key, sent = report.sent, "updated invites sent");
        Ok(report)
    }

    /// Tell every guest the event is off. Called before the event document
    /// is deleted, so there is no queued variant.
    pub async fn send_cancellation(&self, event: &Event, message: &str) -> Result<FanOut> {
        let users = self.invitees(event, "postman.send_cancellation").await?;
        let heading = format!("{} was cancelled", event.name);
        let note = Some(message.trim()).filter(|m| !m.is_empty());
        let emails = users
            .iter()
            .map(|u| {
                self.event_email(
                    event,
                    u,
                    format!("Cancelled: {}", event.name),
                    &heading,
                    note,
                    false,
                )
            })
            .collect();
        let report = self.dispatch(Template::Event, emails).await;
        info!(event = %event.key, sent = report.sent, "cancellation sent");
        Ok(report)
    }

    pub async fn send_invite_to_user(&self, event: &Event, user: &User) -> Result<FanOut> {
        let email = self.invite_email(event, user, InviteKind::New);
        Ok(self.dispatch(Template::Event, vec![email]).await)
    }

    pub async fn send_invites_async(&self, event: &Event) -> Result<()> {
        self.enqueue(JobKind::Event, JobAction::SendInvites, vec![event.key.encode()])
            .await
    }

    pub async fn send_updated_invites_async(&self, event: &Event) -> Result<()> {
        self.enqueue(
            JobKind::Event,
            JobAction::SendUpdatedInvites,
            vec![event.key.encode()],
        )
        .await
    }

    pub async fn send_invite_to_user_async(&self, event: &Event, user: &User) -> Result<()> {
        self.enqueue(
            JobKind::Event,
            JobAction::SendInviteToUser,
            vec![event.key.encode(), user.key.encode()],
        )
        .await
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    async fn enqueue(&self, kind: JobKind, action: JobAction, ids: Vec<String>) -> Result<()> {
        self.queue
            .enqueue(EmailJob::new(kind, action, ids))
            .await
            .op("postman.enqueue")
    }

    /// Run one queued job against fresh copies of its entities.
    pub async fn process_job(&self, job: &EmailJob) -> Result<FanOut> {
        let id = |i: usize| -> Result<Key> {
            let encoded = job
                .ids
                .get(i)
                .ok_or_else(|| ConvoError::Malformed(format!("email job {} is missing id {}", job.id, i)))?;
            Key::decode(encoded)
        };

        match (job.kind, job.action) {
            (JobKind::Thread, JobAction::SendThread) => {
                let thread = self.db.get_thread(&id(0)?).await.op("postman.job")?;
                self.send_thread(&thread).await
            }
            (JobKind::Event, JobAction::SendInvites) => {
                let event = self.db.get_event(&id(0)?).await.op("postman.job")?;
                self.send_invites(&event).await
            }
            (JobKind::Event, JobAction::SendUpdatedInvites) => {
                let event = self.db.get_event(&id(0)?).await.op("postman.job")?;
                self.send_updated_invites(&event).await
            }
            (JobKind::Event, JobAction::SendInviteToUser) => {
                let event = self.db.get_event(&id(0)?).await.op("postman.job")?;
                let user = self.db.get_user(&id(1)?).await.op("postman.job")?;
                self.send_invite_to_user(&event, &user).await
            }
            (kind, action) => Err(ConvoError::Malformed(format!(
                "unsupported email job {:?}/{:?}",
                kind, action
            ))),
        }
    }

    /// Drain `jobs` until every sender is gone.
    pub async fn run(self: Arc<Self>, mut jobs: UnboundedReceiver<EmailJob>) {
        info!("email worker started");
        while let Some(job) = jobs.recv().await {
            match self.process_job(&job).await {
                Ok(report) => debug!(job = %job.id, sent = report.sent, "email job done"),
                Err(e) => error!(job = %job.id, kind = ?job.kind, action = ?job.action, "email job failed: {}", e),
            }
        }
        info!("email worker stopped");
    }

    // ------------------------------------------------------------------
    // Account emails
    // ------------------------------------------------------------------

    async fn send_admin(
        &self,
        user: &User,
        action: &str,
        subject: &str,
        heading: &str,
        body: &str,
        button_text: &str,
    ) -> Result<()> {
        let url = self
            .linker
            .link(&user.key.encode(), &user.link_secret(action), action)
            .map_err(|e| ConvoError::Internal(e.to_string()))?;
        let text = format!("{}\n\n{}\n\n{}\n", heading, body, url);
        let html = templates::admin(&AdminEmail {
            preview: body,
            heading,
            body,
            button_text,
            url: &url,
        });
        let email = Email {
            from_name: self.settings.from_name.clone(),
            from_email: self.settings.from_address.clone(),
            to_name: user.full_name.clone(),
            to_email: user.email.clone(),
            subject: subject.to_string(),
            text,
            html,
        };
        self.mailer.send(&email).await.op("postman.admin")?;
        debug!(user = %user.key, template = Template::Admin.name(), action, "account email sent");
        Ok(())
    }

    pub async fn send_password_reset(&self, user: &User) -> Result<()> {
        self.send_admin(
            user,
            "reset",
            "Reset your password",
            "Reset your password",
            "Someone asked to reset the password on your account. Use the link below to choose a new one.",
            "Reset password",
        )
        .await
    }

    pub async fn send_verify(&self, user: &User) -> Result<()> {
        self.send_admin(
            user,
            "verify",
            "Verify your email",
            "Verify your email",
            "Confirm this address to finish setting up your account.",
            "Verify email",
        )
        .await
    }

    // ------------------------------------------------------------------
    // Digests
    // ------------------------------------------------------------------

    /// Email `user` their unread messages and upcoming events, then mark
    /// the digested messages read. Returns false when there was nothing
    /// to send.
    pub async fn send_digest(&self, user: &User) -> Result<bool> {
        let mut digest = self.db.digest_for_user(user).await.op("postman.digest")?;
        if digest.is_empty() {
            return Ok(false);
        }

        let mut text = String::new();
        let sections: Vec<DigestSection> = digest
            .items
            .iter()
            .map(|item| {
                text.push_str(&format!("{}\n\n{}", item.name, thread_plaintext(&item.messages)));
                DigestSection {
                    name: item.name.clone(),
                    url: self.url(&item.parent),
                    messages: item.messages.iter().map(|m| self.view(m)).collect(),
                }
            })
            .collect();
        let upcoming: Vec<UpcomingView> = digest
            .upcoming
            .iter()
            .map(|e| {
                text.push_str(&format!("Coming up: {} - {}\n", e.name, e.get_formatted_time()));
                UpcomingView {
                    name: e.name.clone(),
                    time: e.get_formatted_time(),
                    address: e.place.address.clone(),
                    url: self.url(&e.key),
                }
            })
            .collect();

        let preview = preview(&text);
        let html = templates::digest(&DigestEmail {
            preview: &preview,
            to_id: &user.key.encode(),
            sections: &sections,
            upcoming: &upcoming,
        });
        let email = Email {
            from_name: self.settings.from_name.clone(),
            from_email: self.settings.from_address.clone(),
            to_name: user.full_name.clone(),
            to_email: user.email.clone(),
            subject: format!("Your {} digest", APP_NAME),
            text,
            html,
        };
        self.mailer.send(&email).await.op("postman.digest")?;
        self.db
            .mark_digested_as_read(&mut digest.items, &user.key)
            .await
            .op("postman.digest")?;
        info!(user = %user.key, items = digest.items.len(), upcoming = digest.upcoming.len(), "digest sent");
        Ok(true)
    }

    /// Digest every user. One user's failure does not stop the rest.
    pub async fn send_digests(&self) -> Result<usize> {
        let users: Vec<User> = self
            .db
            .query(&Query::new(Kind::User))
            .await
            .op("postman.digests")?;
        let mut sent = 0;
        for user in &users {
            match self.send_digest(user).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => warn!(user = %user.key, "digest failed: {}", e),
            }
        }
        info!(users = users.len(), sent, "digests finished");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::RecordingMailer;
    use crate::queue::MemoryQueue;
    use crate::render::BasicRenderer;
    use chrono::{Duration, Utc};
    use convo_store::{EventDraft, Place};

    struct Harness {
        db: Database,
        mailer: Arc<RecordingMailer>,
        queue: Arc<MemoryQueue>,
        postman: Postman,
    }

    fn harness(mailer: RecordingMailer) -> Harness {
        let (db, _) = Database::memory();
        let mailer = Arc::new(mailer);
        let queue = Arc::new(MemoryQueue::new());
        let postman = Postman::new(
            db.clone(),
            mailer.clone(),
            queue.clone(),
            Arc::new(BasicRenderer),
            MagicLinker::new("test-secret", "https://app.convo.events"),
            MailSettings::default(),
        );
        Harness {
            db,
            mailer,
            queue,
            postman,
        }
    }

    async fn user(db: &Database, first: &str) -> User {
        let u = User::invited(&format!("{}@example.com", first.to_lowercase()), first, "Doe").unwrap();
        db.create_user(&u).await.unwrap();
        u
    }

    async fn event(db: &Database, owner: &User, guests: &[User]) -> Event {
        let event = Event::new(
            EventDraft {
                name: "Picnic".into(),
                description: "Bring a blanket".into(),
                place: Place {
                    address: "Dolores Park".into(),
                    ..Place::default()
                },
                timestamp: Utc::now() + Duration::days(3),
                utc_offset: -7 * 3600,
                guests_can_invite: false,
            },
            owner,
            &[],
            guests,
        )
        .unwrap();
        db.create_event(&event).await.unwrap();
        db.get_event(&event.key).await.unwrap()
    }

    #[tokio::test]
    async fn test_send_thread_skips_author_and_survives_failures() {
        let h = harness(RecordingMailer::new().rejecting("carol@example.com"));
        let alice = user(&h.db, "Alice").await;
        let bob = user(&h.db, "Bob").await;
        let carol = user(&h.db, "Carol").await;
        let dave = user(&h.db, "Dave").await;

        let mut thread = h
            .db
            .create_thread("Weekend", &alice, &[bob.clone(), carol.clone(), dave.clone()])
            .await
            .unwrap();
        h.db.add_thread_message(&alice, &mut thread, "Hike?").await.unwrap();
        h.db.add_thread_message(&bob, &mut thread, "Yes **please**").await.unwrap();

        let report = h.postman.send_thread(&thread).await.unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.first_error(), Some(MailError::Rejected { .. })));

        let sent = h.mailer.sent().await;
        let recipients: Vec<&str> = sent.iter().map(|e| e.to_email.as_str()).collect();
        assert!(recipients.contains(&"alice@example.com"));
        assert!(recipients.contains(&"dave@example.com"));
        assert!(!recipients.contains(&"bob@example.com"));

        let to_alice = &h.mailer.sent_to("alice@example.com").await[0];
        assert!(to_alice.text.starts_with("Bob said:\n\nYes **please**\n\nAlice said:"));
        assert_eq!(to_alice.from_email, thread.get_email());
        assert_eq!(to_alice.from_name, "Bob Doe");
        assert!(to_alice.html.contains(&format!("data-to-id=\"{}\"", alice.key.encode())));
        assert!(to_alice.html.contains(&format!("data-from-id=\"{}\"", bob.key.encode())));
    }

    #[tokio::test]
    async fn test_send_thread_without_messages_sends_nothing() {
        let h = harness(RecordingMailer::new());
        let alice = user(&h.db, "Alice").await;
        let bob = user(&h.db, "Bob").await;
        let thread = h.db.create_thread("", &alice, &[bob]).await.unwrap();
        let report = h.postman.send_thread(&thread).await.unwrap();
        assert_eq!(report.sent, 0);
        assert!(h.mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_invites_carry_ics_and_skip_owner() {
        let h = harness(RecordingMailer::new());
        let alice = user(&h.db, "Alice").await;
        let bob = user(&h.db, "Bob").await;
        let event = event(&h.db, &alice, &[bob.clone()]).await;

        let report = h.postman.send_invites(&event).await.unwrap();
        assert_eq!(report.sent, 1);
        let email = &h.mailer.sent_to("bob@example.com").await[0];
        assert_eq!(email.subject, "Invitation: Picnic");
        assert!(email.text.contains("--- invite.ics ---"));
        assert!(email.text.contains("BEGIN:VCALENDAR"));
        assert_eq!(email.from_email, event.get_email());
        assert!(h.mailer.sent_to("alice@example.com").await.is_empty());

        h.postman.send_updated_invites(&event).await.unwrap();
        let again = h.mailer.sent_to("bob@example.com").await;
        assert_eq!(again[1].subject, "Updated invitation: Picnic");
    }

    #[tokio::test]
    async fn test_cancellation_includes_note_without_ics() {
        let h = harness(RecordingMailer::new());
        let alice = user(&h.db, "Alice").await;
        let bob = user(&h.db, "Bob").await;
        let event = event(&h.db, &alice, &[bob]).await;

        h.postman.send_cancellation(&event, "Rain, sorry!").await.unwrap();
        let email = &h.mailer.sent_to("bob@example.com").await[0];
        assert_eq!(email.subject, "Cancelled: Picnic");
        assert!(email.text.contains("Rain, sorry!"));
        assert!(!email.text.contains("BEGIN:VCALENDAR"));
    }

    #[tokio::test]
    async fn test_async_jobs_round_trip_through_queue() {
        let h = harness(RecordingMailer::new());
        let mut rx = h.queue.take_receiver().await.unwrap();
        let alice = user(&h.db, "Alice").await;
        let bob = user(&h.db, "Bob").await;
        let carol = user(&h.db, "Carol").await;
        let event = event(&h.db, &alice, &[bob]).await;

        h.postman.send_invites_async(&event).await.unwrap();
        h.postman.send_invite_to_user_async(&event, &carol).await.unwrap();
        assert!(h.mailer.sent().await.is_empty());

        let job = rx.recv().await.unwrap();
        assert_eq!(job.action, JobAction::SendInvites);
        h.postman.process_job(&job).await.unwrap();
        let job = rx.recv().await.unwrap();
        assert_eq!(job.ids.len(), 2);
        h.postman.process_job(&job).await.unwrap();

        assert_eq!(h.mailer.sent_to("bob@example.com").await.len(), 1);
        assert_eq!(h.mailer.sent_to("carol@example.com").await.len(), 1);
    }

    #[tokio::test]
    async fn test_process_job_rejects_mismatched_job() {
        let h = harness(RecordingMailer::new());
        let job = EmailJob::new(JobKind::Thread, JobAction::SendInvites, vec![]);
        assert!(h.postman.process_job(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_password_reset_link_verifies_until_password_changes() {
        let h = harness(RecordingMailer::new());
        let mut alice = User::with_password("alice@example.com", "Alice", "Doe", "hunter22hunter").unwrap();
        h.db.create_user(&alice).await.unwrap();

        h.postman.send_password_reset(&alice).await.unwrap();
        let email = &h.mailer.sent_to("alice@example.com").await[0];
        let link = email
            .text
            .lines()
            .find(|l| l.contains("/magic/reset/"))
            .unwrap()
            .to_string();

        let linker = h.postman.linker();
        let verified = linker.verify(&link, &alice.link_secret("reset")).unwrap();
        assert_eq!(verified.id, alice.key.encode());

        assert!(alice.change_password("another-password"));
        assert!(linker.verify(&link, &alice.link_secret("reset")).is_err());
    }

    #[tokio::test]
    async fn test_verify_email_sent() {
        let h = harness(RecordingMailer::new());
        let alice = user(&h.db, "Alice").await;
        h.postman.send_verify(&alice).await.unwrap();
        let email = &h.mailer.sent_to("alice@example.com").await[0];
        assert!(email.html.contains("/magic/verify/"));
    }

    #[tokio::test]
    async fn test_digest_sent_once() {
        let h = harness(RecordingMailer::new());
        let alice = user(&h.db, "Alice").await;
        let bob = user(&h.db, "Bob").await;
        let mut thread = h.db.create_thread("Lunch", &alice, &[bob.clone()]).await.unwrap();
        h.db.add_thread_message(&alice, &mut thread, "Noon?").await.unwrap();

        let bob = h.db.get_user(&bob.key).await.unwrap();
        assert!(h.postman.send_digest(&bob).await.unwrap());
        let email = &h.mailer.sent_to("bob@example.com").await[0];
        assert!(email.text.contains("Lunch"));
        assert!(email.html.contains("Noon?"));

        // Everything digested is now read.
        assert!(!h.postman.send_digest(&bob).await.unwrap());
        assert_eq!(h.postman.send_digests().await.unwrap(), 0);
    }
}
