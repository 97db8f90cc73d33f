use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use convo_shared::{ConvoError, ErrorKind};

pub const GENERIC_MESSAGE: &str = "Something went wrong";

/// A `ConvoError` on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub ConvoError);

impl<E> From<E> for ApiError
where
    E: Into<ConvoError>,
{
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn message(m: String) -> serde_json::Value {
    serde_json::json!({ "message": m })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, body) = match err.kind() {
            ErrorKind::InvalidInput => {
                let body = match err.fields() {
                    Some(fields) => serde_json::to_value::<&BTreeMap<String, String>>(fields)
                        .unwrap_or_else(|_| message(err.message())),
                    None => message(err.message()),
                };
                (StatusCode::BAD_REQUEST, body)
            }
            ErrorKind::Conflict | ErrorKind::Limit => (StatusCode::BAD_REQUEST, message(err.message())),
            ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, message(err.message())),
            ErrorKind::Forbidden => (StatusCode::FORBIDDEN, message(err.message())),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, message(err.message())),
            ErrorKind::UnsupportedMedia => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, message(err.message()))
            }
            ErrorKind::Internal => {
                tracing::error!(alarm = true, ops = ?err.ops(), error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    message(GENERIC_MESSAGE.to_string()),
                )
            }
        };

        if status != StatusCode::INTERNAL_SERVER_ERROR {
            tracing::debug!(status = status.as_u16(), ops = ?err.ops(), "client error: {}", err);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: ConvoError) -> (StatusCode, serde_json::Value) {
        let response = ApiError(err).into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_field_errors_are_the_payload() {
        let (status, body) = render(ConvoError::invalid("email", "This email is invalid").with_op("users.create")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["email"], "This email is invalid");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (ConvoError::Conflict("You have already RSVP'd".into()), StatusCode::BAD_REQUEST),
            (ConvoError::Limit("full".into()), StatusCode::BAD_REQUEST),
            (ConvoError::Malformed("zz".into()), StatusCode::BAD_REQUEST),
            (ConvoError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ConvoError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (ConvoError::NotFound("Thread not found".into()), StatusCode::NOT_FOUND),
            (ConvoError::UnsupportedMedia, StatusCode::UNSUPPORTED_MEDIA_TYPE),
        ];
        for (err, expected) in cases {
            assert_eq!(render(err).await.0, expected);
        }
    }

    #[tokio::test]
    async fn test_internal_errors_are_generic() {
        let (status, body) = render(ConvoError::Duplicate("two users share a token".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "message": "Something went wrong" }));
    }
}
