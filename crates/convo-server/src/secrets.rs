//! Process-wide secrets.
//!
//! Lookups go stored `Secret` documents first, then the environment, then
//! a development default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use convo_shared::{Key, Kind, OpContext, Result};
use convo_store::{Database, Entity, Query};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Secret {
    pub key: Key,
    pub name: String,
    pub value: String,
}

impl Entity for Secret {
    const KIND: Kind = Kind::Secret;

    fn key(&self) -> &Key {
        &self.key
    }
}

pub const MAGIC_LINK_SECRET: &str = "MAGIC_LINK_SECRET";

const DEV_DEFAULTS: &[(&str, &str)] = &[(MAGIC_LINK_SECRET, "convo-development-magic-link-secret")];

#[derive(Debug, Clone, Default)]
pub struct Secrets {
    stored: HashMap<String, String>,
}

impl Secrets {
    /// Read every stored secret once at startup.
    pub async fn load(db: &Database) -> Result<Self> {
        let secrets: Vec<Secret> = db
            .query(&Query::new(Kind::Secret))
            .await
            .op("secrets.load")?;
        tracing::info!(count = secrets.len(), "secrets loaded");
        Ok(Self {
            stored: secrets.into_iter().map(|s| (s.name, s.value)).collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.stored.get(name) {
            return Some(value.clone());
        }
        if let Ok(value) = std::env::var(name) {
            if !value.is_empty() {
                return Some(value);
            }
        }
        DEV_DEFAULTS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(n, v)| {
                tracing::warn!(secret = n, "using development default secret");
                v.to_string()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stored_secret_wins() {
        let (db, _) = Database::memory();
        db.put(&Secret {
            key: Key::generate(Kind::Secret),
            name: MAGIC_LINK_SECRET.into(),
            value: "from-store".into(),
        })
        .await
        .unwrap();

        let secrets = Secrets::load(&db).await.unwrap();
        assert_eq!(secrets.get(MAGIC_LINK_SECRET).as_deref(), Some("from-store"));
    }

    #[tokio::test]
    async fn test_falls_back_to_default() {
        let (db, _) = Database::memory();
        let secrets = Secrets::load(&db).await.unwrap();
        assert!(secrets.get(MAGIC_LINK_SECRET).is_some());
        assert!(secrets.get("CONVO_TEST_UNKNOWN_SECRET").is_none());
    }
}
