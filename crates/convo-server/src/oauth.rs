//! Verification of third-party sign-in tokens.

#[cfg(test)]
use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use convo_shared::{ConvoError, Result};
use convo_store::{OAuthProfile, Provider};

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const FACEBOOK_ME_URL: &str = "https://graph.facebook.com/me";

#[async_trait]
pub trait OAuthVerifier: Send + Sync {
    /// Exchange a client-supplied token for the provider's view of the user.
    /// Bad tokens are `Unauthorized`.
    async fn verify(&self, provider: Provider, token: &str) -> Result<OAuthProfile>;
}

#[derive(Deserialize)]
struct GoogleTokenInfo {
    aud: String,
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
    #[serde(default)]
    picture: String,
}

#[derive(Deserialize)]
struct FacebookMe {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

/// Verifies tokens against the providers' public endpoints.
pub struct HttpOAuthVerifier {
    client: reqwest::Client,
    google_audience: Option<String>,
}

impl HttpOAuthVerifier {
    pub fn new(client: reqwest::Client, google_audience: Option<String>) -> Self {
        Self {
            client,
            google_audience,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ConvoError::Internal(format!("oauth request: {e}")))?;
        if !response.status().is_success() {
            tracing::debug!(status = response.status().as_u16(), url, "oauth token rejected");
            return Err(ConvoError::Unauthorized);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ConvoError::Internal(format!("oauth response: {e}")))
    }

    async fn google(&self, token: &str) -> Result<OAuthProfile> {
        let Some(audience) = self.google_audience.as_deref() else {
            return Err(ConvoError::Forbidden("Google sign-in is not configured".into()));
        };
        let info: GoogleTokenInfo = self
            .get_json(GOOGLE_TOKENINFO_URL, &[("id_token", token)])
            .await?;
        if info.aud != audience {
            tracing::warn!(aud = %info.aud, "google token for another audience");
            return Err(ConvoError::Unauthorized);
        }
        Ok(OAuthProfile {
            provider: Provider::Google,
            subject: info.sub,
            email: info.email,
            first_name: info.given_name,
            last_name: info.family_name,
            avatar: info.picture,
        })
    }

    async fn facebook(&self, token: &str) -> Result<OAuthProfile> {
        let me: FacebookMe = self
            .get_json(
                FACEBOOK_ME_URL,
                &[
                    ("fields", "id,email,first_name,last_name"),
                    ("access_token", token),
                ],
            )
            .await?;
        Ok(OAuthProfile {
            provider: Provider::Facebook,
            avatar: format!("https://graph.facebook.com/{}/picture?type=large", me.id),
            subject: me.id,
            email: me.email,
            first_name: me.first_name,
            last_name: me.last_name,
        })
    }
}

#[async_trait]
impl OAuthVerifier for HttpOAuthVerifier {
    async fn verify(&self, provider: Provider, token: &str) -> Result<OAuthProfile> {
        match provider {
            Provider::Google => self.google(token).await,
            Provider::Facebook => self.facebook(token).await,
        }
    }
}

/// Fixed token table for tests.
#[cfg(test)]
#[derive(Default)]
pub struct StaticOAuthVerifier {
    profiles: HashMap<(Provider, String), OAuthProfile>,
}

#[cfg(test)]
impl StaticOAuthVerifier {
    pub fn with(mut self, token: &str, profile: OAuthProfile) -> Self {
        self.profiles.insert((profile.provider, token.to_string()), profile);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl OAuthVerifier for StaticOAuthVerifier {
    async fn verify(&self, provider: Provider, token: &str) -> Result<OAuthProfile> {
        self.profiles
            .get(&(provider, token.to_string()))
            .cloned()
            .ok_or(ConvoError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokeninfo_shape() {
        let info: GoogleTokenInfo = serde_json::from_value(serde_json::json!({
            "aud": "client-id",
            "sub": "1234",
            "email": "ann@example.com",
            "given_name": "Ann",
            "family_name": "Lee",
            "email_verified": "true"
        }))
        .unwrap();
        assert_eq!(info.sub, "1234");
        assert!(info.picture.is_empty());
    }

    #[tokio::test]
    async fn test_google_needs_audience() {
        let verifier = HttpOAuthVerifier::new(reqwest::Client::new(), None);
        let err = verifier.verify(Provider::Google, "token").await.unwrap_err();
        assert!(matches!(err, ConvoError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_static_verifier() {
        let profile = OAuthProfile {
            provider: Provider::Facebook,
            subject: "fb-1".into(),
            email: "ann@example.com".into(),
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            avatar: String::new(),
        };
        let verifier = StaticOAuthVerifier::default().with("good", profile.clone());
        assert_eq!(verifier.verify(Provider::Facebook, "good").await.unwrap(), profile);
        assert!(verifier.verify(Provider::Google, "good").await.is_err());
    }
}
