use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use convo_shared::constants::{
    BCRYPT_COST, MAX_CONTACTS, MIN_PASSWORD_LEN, PLACEHOLDER_USER_NAME, SESSION_TOKEN_BYTES,
};
use convo_shared::key;
use convo_shared::{ConvoError, FieldErrors, Key, Kind, Result};

use crate::database::Entity;

/// Third-party identity providers a user can sign in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google" => Some(Provider::Google),
            "facebook" => Some(Provider::Facebook),
            _ => None,
        }
    }

    /// Stored property holding this provider's subject id.
    pub fn field(&self) -> &'static str {
        match self {
            Provider::Google => "OauthGoogleId",
            Provider::Facebook => "OauthFacebookId",
        }
    }
}

/// Identity asserted by a provider after token verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider: Provider,
    pub subject: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
}

/// Denormalized view of a user embedded in threads, events and messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserPartial {
    pub key: Key,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub avatar: String,
}

impl UserPartial {
    /// Stand-in for a user whose document no longer exists.
    pub fn placeholder(key: Key) -> Self {
        Self {
            key,
            first_name: PLACEHOLDER_USER_NAME.to_string(),
            last_name: String::new(),
            full_name: PLACEHOLDER_USER_NAME.to_string(),
            avatar: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub key: Key,
    pub email: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub password_digest: String,
    pub token: String,
    #[serde(default)]
    pub oauth_google_id: Option<String>,
    #[serde(default)]
    pub oauth_facebook_id: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub contacts: Vec<Key>,
    /// Threads this user is a member of (not owner).
    #[serde(default)]
    pub threads: Vec<Key>,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    const KIND: Kind = Kind::User;

    fn key(&self) -> &Key {
        &self.key
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| ConvoError::Internal(format!("bcrypt: {e}")))
}

impl User {
    fn blank(email: &str, first_name: &str, last_name: &str) -> Result<Self> {
        let email = normalize_email(email);
        let mut fields = FieldErrors::new();
        if !is_valid_email(&email) {
            fields.insert("email".into(), "This email is invalid".into());
        }
        if first_name.trim().is_empty() {
            fields.insert("firstName".into(), "This field is required".into());
        }
        if !fields.is_empty() {
            return Err(ConvoError::InvalidInput(fields));
        }

        let mut user = Self {
            key: Key::generate(Kind::User),
            email,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            full_name: String::new(),
            password_digest: String::new(),
            token: generate_token(),
            oauth_google_id: None,
            oauth_facebook_id: None,
            verified: false,
            avatar: String::new(),
            contacts: Vec::new(),
            threads: Vec::new(),
            created_at: Utc::now(),
        };
        user.derive_full_name();
        Ok(user)
    }

    /// New unverified user with a bcrypt password digest.
    pub fn with_password(
        email: &str,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> Result<Self> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ConvoError::invalid(
                "password",
                format!("Must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        let mut user = Self::blank(email, first_name, last_name)?;
        user.password_digest = hash_password(password)?;
        Ok(user)
    }

    /// New user linked to a provider identity. The provider has already
    /// confirmed the email, so the account starts verified.
    pub fn with_oauth(profile: &OAuthProfile) -> Result<Self> {
        let mut user = Self::blank(&profile.email, &profile.first_name, &profile.last_name)?;
        user.link_oauth(profile.provider, &profile.subject);
        user.avatar = profile.avatar.clone();
        user.verified = true;
        Ok(user)
    }

    /// Placeholder user created when someone is invited by email only.
    pub fn invited(email: &str, first_name: &str, last_name: &str) -> Result<Self> {
        let first = if first_name.trim().is_empty() {
            email.split('@').next().unwrap_or_default().to_string()
        } else {
            first_name.to_string()
        };
        Self::blank(email, &first, last_name)
    }

    pub fn derive_full_name(&mut self) {
        self.full_name = match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => String::new(),
        };
    }

    pub fn set_name(&mut self, first_name: &str, last_name: &str) -> Result<()> {
        if first_name.trim().is_empty() {
            return Err(ConvoError::invalid("firstName", "This field is required"));
        }
        self.first_name = first_name.trim().to_string();
        self.last_name = last_name.trim().to_string();
        self.derive_full_name();
        Ok(())
    }

    pub fn check_password(&self, candidate: &str) -> bool {
        if self.password_digest.is_empty() {
            return false;
        }
        bcrypt::verify(candidate, &self.password_digest).unwrap_or(false)
    }

    /// Replace the password digest. Returns false if the password is
    /// rejected or hashing fails; the old digest is then kept.
    pub fn change_password(&mut self, new: &str) -> bool {
        if new.chars().count() < MIN_PASSWORD_LEN {
            return false;
        }
        match hash_password(new) {
            Ok(digest) => {
                self.password_digest = digest;
                true
            }
            Err(e) => {
                tracing::warn!(user = %self.key, error = %e, "password hashing failed");
                false
            }
        }
    }

    pub fn rotate_token(&mut self) {
        self.token = generate_token();
    }

    pub fn has_password(&self) -> bool {
        !self.password_digest.is_empty()
    }

    pub fn oauth_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.oauth_google_id.as_deref(),
            Provider::Facebook => self.oauth_facebook_id.as_deref(),
        }
    }

    pub fn link_oauth(&mut self, provider: Provider, subject: &str) {
        let id = Some(subject.to_string());
        match provider {
            Provider::Google => self.oauth_google_id = id,
            Provider::Facebook => self.oauth_facebook_id = id,
        }
    }

    pub fn verify(&mut self) {
        self.verified = true;
    }

    /// Secret folded into magic-link signatures for each action. Changing
    /// it (new password, verification) invalidates outstanding links.
    pub fn link_secret(&self, action: &str) -> String {
        match action {
            "verify" => self.verified.to_string(),
            _ => self.password_digest.clone(),
        }
    }

    pub fn snapshot(&self) -> UserPartial {
        UserPartial {
            key: self.key,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: self.full_name.clone(),
            avatar: self.avatar.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    pub fn has_contact(&self, other: &Key) -> bool {
        key::contains(&self.contacts, other)
    }

    pub fn add_contact(&mut self, other: &User) -> Result<()> {
        if other.key == self.key {
            return Err(ConvoError::invalid("user", "You cannot add yourself as a contact"));
        }
        if self.has_contact(&other.key) {
            return Err(ConvoError::Conflict(
                "This user is already one of your contacts".into(),
            ));
        }
        if self.contacts.len() >= MAX_CONTACTS {
            return Err(ConvoError::Limit(format!(
                "You can have at most {MAX_CONTACTS} contacts"
            )));
        }
        self.contacts.push(other.key);
        Ok(())
    }

    pub fn remove_contact(&mut self, other: &Key) -> Result<()> {
        key::swap_remove(&mut self.contacts, other)
            .map(|_| ())
            .ok_or_else(|| ConvoError::NotFound("This user is not one of your contacts".into()))
    }

    // ------------------------------------------------------------------
    // Thread handles
    // ------------------------------------------------------------------

    pub fn add_thread(&mut self, thread: &Key) -> bool {
        if key::contains(&self.threads, thread) {
            return false;
        }
        self.threads.push(*thread);
        true
    }

    pub fn remove_thread(&mut self, thread: &Key) -> bool {
        key::swap_remove(&mut self.threads, thread).is_some()
    }

    /// Fold another account's contacts, thread handles and identities into
    /// this one. Never links the user to itself.
    pub fn absorb(&mut self, other: &User) {
        let mut contacts = self.contacts.clone();
        contacts.extend(other.contacts.iter().copied());
        self.contacts = key::swap(&contacts, &other.key, &self.key);
        self.contacts.retain(|k| *k != self.key);

        let mut threads = self.threads.clone();
        threads.extend(other.threads.iter().copied());
        self.threads = key::dedupe(&threads);

        if self.oauth_google_id.is_none() {
            self.oauth_google_id = other.oauth_google_id.clone();
        }
        if self.oauth_facebook_id.is_none() {
            self.oauth_facebook_id = other.oauth_facebook_id.clone();
        }
        if self.avatar.is_empty() {
            self.avatar = other.avatar.clone();
        }
        self.verified |= other.verified;
    }
}
