//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server starts with zero configuration
//! for local development.

use std::net::SocketAddr;
use std::time::Duration;

use convo_shared::constants::{EVENT_MAIL_DOMAIN, THREAD_MAIL_DOMAIN};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Bearer token for `/admin/*`.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Public base URL of the web app, used in magic links and emails.
    /// Env: `APP_URL`
    /// Default: `http://localhost:3000`
    pub app_url: String,

    /// Env: `MAIL_FROM_NAME`
    pub mail_from_name: String,

    /// Env: `MAIL_FROM_ADDRESS`
    pub mail_from_address: String,

    /// Env: `THREAD_MAIL_DOMAIN`
    pub thread_mail_domain: String,

    /// Env: `EVENT_MAIL_DOMAIN`
    pub event_mail_domain: String,

    /// Env: `AVATAR_BUCKET`
    /// Default: `file://./avatars`
    pub avatar_bucket: String,

    /// Expected `aud` of Google id tokens. Google sign-in is refused while
    /// this is empty.
    /// Env: `GOOGLE_OAUTH_AUDIENCE`
    pub google_audience: Option<String>,

    /// Google Places key. Without it places resolve from a static table.
    /// Env: `PLACES_API_KEY`
    pub places_api_key: Option<String>,

    /// Env: `REQUEST_TIMEOUT_SECS`
    /// Default: `30`
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            admin_token: None,
            app_url: "http://localhost:3000".to_string(),
            mail_from_name: "Convo".to_string(),
            mail_from_address: "support@convo.events".to_string(),
            thread_mail_domain: THREAD_MAIL_DOMAIN.to_string(),
            event_mail_domain: EVENT_MAIL_DOMAIN.to_string(),
            avatar_bucket: "file://./avatars".to_string(),
            google_audience: None,
            places_api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        config.admin_token = non_empty("ADMIN_TOKEN");

        if let Some(url) = non_empty("APP_URL") {
            config.app_url = url.trim_end_matches('/').to_string();
        }
        if let Some(name) = non_empty("MAIL_FROM_NAME") {
            config.mail_from_name = name;
        }
        if let Some(address) = non_empty("MAIL_FROM_ADDRESS") {
            config.mail_from_address = address;
        }
        if let Some(domain) = non_empty("THREAD_MAIL_DOMAIN") {
            config.thread_mail_domain = domain;
        }
        if let Some(domain) = non_empty("EVENT_MAIL_DOMAIN") {
            config.event_mail_domain = domain;
        }
        if let Some(bucket) = non_empty("AVATAR_BUCKET") {
            config.avatar_bucket = bucket;
        }

        config.google_audience = non_empty("GOOGLE_OAUTH_AUDIENCE");
        config.places_api_key = non_empty("PLACES_API_KEY");

        if let Ok(val) = std::env::var("REQUEST_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid REQUEST_TIMEOUT_SECS, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.admin_token.is_none());
        assert_eq!(config.thread_mail_domain, "mail.hiconvo.com");
        assert_eq!(config.event_mail_domain, "mail.convo.events");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
