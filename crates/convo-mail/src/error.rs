use thiserror::Error;

use convo_shared::ConvoError;

/// Errors produced by outbound mail, the email queue and the activity feed.
#[derive(Error, Debug)]
pub enum MailError {
    /// The provider could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("Rejected by provider ({status}) for {to}")]
    Rejected { to: String, status: u16 },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Feed error: {0}")]
    Feed(String),
}

pub type Result<T> = std::result::Result<T, MailError>;

impl From<MailError> for ConvoError {
    fn from(e: MailError) -> Self {
        ConvoError::Internal(e.to_string())
    }
}
