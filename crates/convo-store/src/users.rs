//! Persistence operations for [`User`] records.

use convo_shared::{ConvoError, Key, Kind, OpContext, Result};

use crate::database::Database;
use crate::datastore::Query;
use crate::models::user::normalize_email;
use crate::models::{OAuthProfile, Provider, User, UserPartial};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user. Emails are unique across all users.
    pub async fn create_user(&self, user: &User) -> Result<()> {
        if self.get_user_by_email(&user.email).await?.is_some() {
            return Err(ConvoError::Conflict(
                "This email has already been registered".into(),
            ))
            .op("users.create");
        }
        self.put(user).await.op("users.create")?;
        tracing::info!(user = %user.key, "user created");
        Ok(())
    }

    /// Find the user behind a provider identity, linking it to an existing
    /// account with the same email when there is one. Returns whether a new
    /// user was created.
    pub async fn get_or_create_oauth_user(&self, profile: &OAuthProfile) -> Result<(User, bool)> {
        if let Some(user) = self
            .get_user_by_oauth_id(profile.provider, &profile.subject)
            .await?
        {
            return Ok((user, false));
        }

        if let Some(mut user) = self.get_user_by_email(&profile.email).await? {
            user.link_oauth(profile.provider, &profile.subject);
            if user.avatar.is_empty() {
                user.avatar = profile.avatar.clone();
            }
            user.verify();
            self.put(&user).await.op("users.link_oauth")?;
            tracing::info!(user = %user.key, provider = ?profile.provider, "linked oauth identity");
            return Ok((user, false));
        }

        let user = User::with_oauth(profile).op("users.create_oauth")?;
        self.create_user(&user).await?;
        Ok((user, true))
    }

    /// Find a user by email, creating an unregistered placeholder if none
    /// exists. Used when inviting people who have no account yet.
    pub async fn get_or_create_invited_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User> {
        if let Some(user) = self.get_user_by_email(email).await? {
            return Ok(user);
        }
        let user = User::invited(email, first_name, last_name)?;
        self.create_user(&user).await?;
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub async fn get_user(&self, key: &Key) -> Result<User> {
        self.fetch(key).await.op("users.get")
    }

    /// One slot per key; missing users are `None`.
    pub async fn get_users(&self, keys: &[Key]) -> Result<Vec<Option<User>>> {
        self.get_multi(keys).await.op("users.get_multi")
    }

    /// Snapshots for `keys`, substituting placeholders for missing users.
    pub async fn get_user_partials(&self, keys: &[Key]) -> Result<Vec<UserPartial>> {
        let users = self.get_users(keys).await?;
        Ok(partials(keys, &users))
    }

    async fn get_unique_user(&self, field: &str, value: &str, op: &'static str) -> Result<Option<User>> {
        let mut users: Vec<User> = self
            .query(&Query::new(Kind::User).filter(field, value))
            .await
            .op(op)?;
        match users.len() {
            0 => Ok(None),
            1 => Ok(users.pop()),
            n => {
                tracing::error!(field, count = n, "duplicate users for unique field");
                Err(ConvoError::Duplicate(format!("{n} users share one {field}"))).op(op)
            }
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.get_unique_user("Email", &normalize_email(email), "users.get_by_email")
            .await
    }

    pub async fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }
        self.get_unique_user("Token", token, "users.get_by_token").await
    }

    pub async fn get_user_by_oauth_id(&self, provider: Provider, id: &str) -> Result<Option<User>> {
        if id.is_empty() {
            return Ok(None);
        }
        self.get_unique_user(provider.field(), id, "users.get_by_oauth_id")
            .await
    }

    /// Contacts of `user` as snapshots, in contact order.
    pub async fn get_contacts(&self, user: &User) -> Result<Vec<UserPartial>> {
        self.get_user_partials(&user.contacts).await
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub async fn add_contact(&self, user: &mut User, contact: &User) -> Result<()> {
        user.add_contact(contact).op("users.add_contact")?;
        self.put(user).await.op("users.add_contact")
    }

    pub async fn remove_contact(&self, user: &mut User, contact: &Key) -> Result<()> {
        user.remove_contact(contact).op("users.remove_contact")?;
        self.put(user).await.op("users.remove_contact")
    }
}

/// Pair each key with its fetched user, falling back to a placeholder.
pub(crate) fn partials(keys: &[Key], users: &[Option<User>]) -> Vec<UserPartial> {
    keys.iter()
        .zip(users)
        .map(|(key, user)| match user {
            Some(u) => u.snapshot(),
            None => UserPartial::placeholder(*key),
        })
        .collect()
}
