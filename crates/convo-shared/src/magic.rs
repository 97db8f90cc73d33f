//! Signed magic links.
//!
//! A link carries `(id, issued_at, action)` and an HMAC-SHA256 signature
//! over those fields plus a per-user rotating secret (the password digest
//! for resets, the verified flag for verification). Once the secret rotates
//! every previously issued link for that action stops verifying.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::constants::MAGIC_LINK_TTL_HOURS;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLink {
    pub id: String,
    pub action: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MagicLinkError {
    #[error("Invalid link format")]
    InvalidFormat,

    #[error("Link has expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,
}

#[derive(Clone)]
pub struct MagicLinker {
    secret: Vec<u8>,
    base_url: String,
}

impl MagicLinker {
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build a link for `id` bound to `rotating` and `action`.
    pub fn link(&self, id: &str, rotating: &str, action: &str) -> Result<String, MagicLinkError> {
        self.link_at(id, rotating, action, Utc::now())
    }

    fn link_at(
        &self,
        id: &str,
        rotating: &str,
        action: &str,
        at: DateTime<Utc>,
    ) -> Result<String, MagicLinkError> {
        let ts = at.timestamp();
        let sig = hex::encode(self.mac(id, ts, rotating, action)?.finalize().into_bytes());
        Ok(format!(
            "{}/magic/{}/{}/{}/{}",
            self.base_url,
            action,
            URL_SAFE_NO_PAD.encode(id),
            ts,
            sig
        ))
    }

    /// Id and action of a link without checking its signature. Used to
    /// find the user whose rotating secret the link is then verified with.
    pub fn peek(link: &str) -> Result<(String, String), MagicLinkError> {
        let parts = split(link)?;
        Ok((parts.id, parts.action))
    }

    /// Check a link (full URL or path) against the current rotating secret.
    pub fn verify(&self, link: &str, rotating: &str) -> Result<MagicLink, MagicLinkError> {
        let parts = split(link)?;
        self.mac(&parts.id, parts.ts, rotating, &parts.action)?
            .verify_slice(&parts.sig)
            .map_err(|_| MagicLinkError::InvalidSignature)?;

        let issued_at = Utc
            .timestamp_opt(parts.ts, 0)
            .single()
            .ok_or(MagicLinkError::InvalidFormat)?;
        if Utc::now() - issued_at > Duration::hours(MAGIC_LINK_TTL_HOURS) {
            return Err(MagicLinkError::Expired);
        }

        Ok(MagicLink {
            id: parts.id,
            action: parts.action,
            issued_at,
        })
    }

    fn mac(
        &self,
        id: &str,
        ts: i64,
        rotating: &str,
        action: &str,
    ) -> Result<HmacSha256, MagicLinkError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| MagicLinkError::InvalidSignature)?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(ts.to_string().as_bytes());
        mac.update(b".");
        mac.update(rotating.as_bytes());
        mac.update(b".");
        mac.update(action.as_bytes());
        Ok(mac)
    }
}

struct LinkParts {
    id: String,
    action: String,
    ts: i64,
    sig: Vec<u8>,
}

fn split(link: &str) -> Result<LinkParts, MagicLinkError> {
    let mut parts = link.trim().trim_end_matches('/').rsplit('/');
    let sig = parts.next().ok_or(MagicLinkError::InvalidFormat)?;
    let ts = parts.next().ok_or(MagicLinkError::InvalidFormat)?;
    let encoded_id = parts.next().ok_or(MagicLinkError::InvalidFormat)?;
    let action = parts.next().ok_or(MagicLinkError::InvalidFormat)?;
    if parts.next() != Some("magic") {
        return Err(MagicLinkError::InvalidFormat);
    }

    let id = URL_SAFE_NO_PAD
        .decode(encoded_id)
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
        .ok_or(MagicLinkError::InvalidFormat)?;
    Ok(LinkParts {
        id,
        action: action.to_string(),
        ts: ts.parse().map_err(|_| MagicLinkError::InvalidFormat)?,
        sig: hex::decode(sig).map_err(|_| MagicLinkError::InvalidFormat)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linker() -> MagicLinker {
        MagicLinker::new("test-secret", "https://app.convo.events/")
    }

    #[test]
    fn test_link_roundtrip() {
        let linker = linker();
        let link = linker.link("user-1", "digest-abc", "reset").unwrap();
        assert!(link.starts_with("https://app.convo.events/magic/reset/"));

        let parsed = linker.verify(&link, "digest-abc").unwrap();
        assert_eq!(parsed.id, "user-1");
        assert_eq!(parsed.action, "reset");
    }

    #[test]
    fn test_rotated_secret_invalidates() {
        let linker = linker();
        let link = linker.link("user-1", "false", "verify").unwrap();
        assert_eq!(
            linker.verify(&link, "true"),
            Err(MagicLinkError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_action_fails() {
        let linker = linker();
        let link = linker.link("user-1", "x", "verify").unwrap();
        let tampered = link.replace("/verify/", "/reset/");
        assert!(linker.verify(&tampered, "x").is_err());
    }

    #[test]
    fn test_expired_link() {
        let linker = linker();
        let issued = Utc::now() - Duration::hours(MAGIC_LINK_TTL_HOURS + 1);
        let link = linker.link_at("user-1", "x", "reset", issued).unwrap();
        assert_eq!(linker.verify(&link, "x"), Err(MagicLinkError::Expired));
    }

    #[test]
    fn test_peek_reads_without_verifying() {
        let link = linker().link("user-9", "x", "verify").unwrap();
        assert_eq!(
            MagicLinker::peek(&link).unwrap(),
            ("user-9".to_string(), "verify".to_string())
        );
    }

    #[test]
    fn test_garbage_is_invalid_format() {
        assert_eq!(
            linker().verify("https://example.com/nope", "x"),
            Err(MagicLinkError::InvalidFormat)
        );
    }
}
