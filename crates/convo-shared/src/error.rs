use std::collections::BTreeMap;

use thiserror::Error;

/// Field name -> human-readable message.
pub type FieldErrors = BTreeMap<String, String>;

/// Coarse classification used by the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Limit,
    UnsupportedMedia,
    Internal,
}

#[derive(Error, Debug)]
pub enum ConvoError {
    #[error("invalid input: {}", describe_fields(.0))]
    InvalidInput(FieldErrors),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("limit reached: {0}")]
    Limit(String),

    #[error("unsupported media type")]
    UnsupportedMedia,

    /// A handle that does not decode.
    #[error("malformed handle: {0}")]
    Malformed(String),

    /// More than one record matched a lookup that must be unique.
    #[error("duplicate records: {0}")]
    Duplicate(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Breadcrumb added by each layer the error passes through.
    #[error("{op}: {source}")]
    Op {
        op: &'static str,
        #[source]
        source: Box<ConvoError>,
    },
}

pub type Result<T> = std::result::Result<T, ConvoError>;

impl ConvoError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), message.into());
        ConvoError::InvalidInput(fields)
    }

    pub fn with_op(self, op: &'static str) -> Self {
        ConvoError::Op {
            op,
            source: Box::new(self),
        }
    }

    /// The innermost error, with every breadcrumb stripped.
    pub fn root(&self) -> &ConvoError {
        match self {
            ConvoError::Op { source, .. } => source.root(),
            other => other,
        }
    }

    /// Breadcrumbs from the outermost layer inwards.
    pub fn ops(&self) -> Vec<&'static str> {
        let mut ops = Vec::new();
        let mut current = self;
        while let ConvoError::Op { op, source } = current {
            ops.push(*op);
            current = source;
        }
        ops
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            ConvoError::InvalidInput(_) | ConvoError::Malformed(_) => ErrorKind::InvalidInput,
            ConvoError::Unauthorized => ErrorKind::Unauthorized,
            ConvoError::Forbidden(_) => ErrorKind::Forbidden,
            ConvoError::NotFound(_) => ErrorKind::NotFound,
            ConvoError::Conflict(_) => ErrorKind::Conflict,
            ConvoError::Limit(_) => ErrorKind::Limit,
            ConvoError::UnsupportedMedia => ErrorKind::UnsupportedMedia,
            ConvoError::Duplicate(_) | ConvoError::Internal(_) | ConvoError::Op { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the boundary may show this error to the client verbatim.
    pub fn is_client_reportable(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    /// Field messages, when the root error is a validation failure.
    pub fn fields(&self) -> Option<&FieldErrors> {
        match self.root() {
            ConvoError::InvalidInput(fields) => Some(fields),
            _ => None,
        }
    }

    /// Client-facing message for reportable errors.
    pub fn message(&self) -> String {
        match self.root() {
            ConvoError::InvalidInput(fields) => describe_fields(fields),
            ConvoError::Unauthorized => "Unauthorized".to_string(),
            ConvoError::Forbidden(m)
            | ConvoError::NotFound(m)
            | ConvoError::Conflict(m)
            | ConvoError::Limit(m) => m.clone(),
            ConvoError::UnsupportedMedia => "Unsupported content type".to_string(),
            ConvoError::Malformed(_) => "The requested resource was not found".to_string(),
            _ => "Something went wrong".to_string(),
        }
    }
}

fn describe_fields(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Attach an operation breadcrumb to any error convertible into [`ConvoError`].
pub trait OpContext<T> {
    fn op(self, op: &'static str) -> Result<T>;
}

impl<T, E: Into<ConvoError>> OpContext<T> for std::result::Result<T, E> {
    fn op(self, op: &'static str) -> Result<T> {
        self.map_err(|e| e.into().with_op(op))
    }
}

impl From<serde_json::Error> for ConvoError {
    fn from(e: serde_json::Error) -> Self {
        ConvoError::Internal(format!("serialization: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breadcrumbs_preserve_kind() {
        let err = ConvoError::Conflict("You have already RSVP'd".into())
            .with_op("event.add_rsvp")
            .with_op("api.add_rsvp");

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.ops(), vec!["api.add_rsvp", "event.add_rsvp"]);
        assert_eq!(err.message(), "You have already RSVP'd");
        assert!(err.is_client_reportable());
    }

    #[test]
    fn test_internal_is_not_reportable() {
        let err = ConvoError::Internal("disk on fire".into()).with_op("store.put");
        assert!(!err.is_client_reportable());
        assert_eq!(err.message(), "Something went wrong");
    }

    #[test]
    fn test_duplicate_reports_as_internal() {
        assert_eq!(
            ConvoError::Duplicate("email".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_invalid_field_map() {
        let err: Result<()> = Err(ConvoError::invalid("time", "Your event must be in the future"));
        let err = err.op("event.new").unwrap_err();
        let fields = err.fields().unwrap();
        assert_eq!(fields["time"], "Your event must be in the future");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
