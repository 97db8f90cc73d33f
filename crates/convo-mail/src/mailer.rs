//! Outbound email provider.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{MailError, Result};

/// Provider status for an accepted message.
pub const ACCEPTED: u16 = 202;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from_name: String,
    pub from_email: String,
    pub to_name: String,
    pub to_email: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Hand one email to the provider. Returns the provider status.
    async fn send(&self, email: &Email) -> Result<u16>;
}

/// Development mailer: logs and accepts everything.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<u16> {
        tracing::info!(
            to = %email.to_email,
            from = %email.from_email,
            subject = %email.subject,
            bytes = email.html.len() + email.text.len(),
            "email accepted (log mailer)"
        );
        Ok(ACCEPTED)
    }
}

/// Test mailer: records every accepted email and rejects chosen
/// recipients.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    reject: HashSet<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send addressed to `email`.
    pub fn rejecting(mut self, email: &str) -> Self {
        self.reject.insert(email.to_string());
        self
    }

    pub async fn sent(&self) -> Vec<Email> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, email: &str) -> Vec<Email> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|e| e.to_email == email)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<u16> {
        if self.reject.contains(&email.to_email) {
            return Err(MailError::Rejected {
                to: email.to_email.clone(),
                status: 550,
            });
        }
        self.sent.lock().await.push(email.clone());
        Ok(ACCEPTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> Email {
        Email {
            from_name: "Convo".into(),
            from_email: "support@convo.events".into(),
            to_name: "Someone".into(),
            to_email: to.into(),
            subject: "Hello".into(),
            text: "hi".into(),
            html: "<p>hi</p>".into(),
        }
    }

    #[tokio::test]
    async fn test_recording_mailer() {
        let mailer = RecordingMailer::new().rejecting("bad@example.com");
        assert_eq!(mailer.send(&email("ok@example.com")).await.unwrap(), ACCEPTED);
        assert!(mailer.send(&email("bad@example.com")).await.is_err());
        assert_eq!(mailer.sent().await.len(), 1);
        assert_eq!(mailer.sent_to("ok@example.com").await.len(), 1);
    }

    #[tokio::test]
    async fn test_log_mailer_accepts() {
        assert_eq!(LogMailer.send(&email("x@example.com")).await.unwrap(), ACCEPTED);
    }
}
