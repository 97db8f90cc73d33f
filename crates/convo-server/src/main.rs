//! # convo-server
//!
//! Composition root for the Convo backend.
//!
//! This binary wires together:
//! - the document store and the typed [`convo_store::Database`] over it
//! - **outbound email** through a queued [`convo_mail::Postman`] worker
//! - **activity feeds**, **search indexing**, **OAuth** and **place** lookups
//! - the **REST API** (axum) with bearer-token sessions and an admin surface

mod api;
mod config;
mod error;
mod oauth;
mod places;
mod search;
mod secrets;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use convo_mail::{BasicRenderer, LogMailer, MailSettings, MemoryNotifier, MemoryQueue, Postman};
use convo_shared::magic::MagicLinker;
use convo_store::{Database, MergeLocks};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::oauth::HttpOAuthVerifier;
use crate::places::{GooglePlaces, PlaceResolver, StaticPlaces};
use crate::search::LogSearch;
use crate::secrets::{Secrets, MAGIC_LINK_SECRET};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,convo_server=debug,convo_store=info")),
        )
        .init();

    info!("Starting Convo server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        http_addr = %config.http_addr,
        app_url = %config.app_url,
        admin_enabled = config.admin_token.is_some(),
        google_enabled = config.google_audience.is_some(),
        places_enabled = config.places_api_key.is_some(),
        avatar_bucket = %config.avatar_bucket,
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Store, secrets and schema upkeep
    // -----------------------------------------------------------------------
    let (db, _store) = Database::memory();

    let secrets = Secrets::load(&db).await?;
    let magic_secret = secrets
        .get(MAGIC_LINK_SECRET)
        .ok_or_else(|| anyhow::anyhow!("{MAGIC_LINK_SECRET} is not set"))?;

    let normalized = db.normalize_legacy_messages().await?;
    if normalized > 0 {
        info!(normalized, "Rewrote legacy message documents");
    }

    // -----------------------------------------------------------------------
    // 4. Collaborators
    // -----------------------------------------------------------------------
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    let queue = Arc::new(MemoryQueue::new());
    let jobs = queue
        .take_receiver()
        .await
        .ok_or_else(|| anyhow::anyhow!("email queue receiver already taken"))?;

    let postman = Arc::new(Postman::new(
        db.clone(),
        Arc::new(LogMailer),
        queue,
        Arc::new(BasicRenderer),
        MagicLinker::new(magic_secret, config.app_url.clone()),
        MailSettings {
            from_name: config.mail_from_name.clone(),
            from_address: config.mail_from_address.clone(),
            app_url: config.app_url.clone(),
            thread_domain: config.thread_mail_domain.clone(),
            event_domain: config.event_mail_domain.clone(),
        },
    ));

    let places: Arc<dyn PlaceResolver> = match &config.places_api_key {
        Some(key) => Arc::new(GooglePlaces::new(http.clone(), key.clone())),
        None => Arc::new(StaticPlaces::default()),
    };

    let app_state = AppState {
        db,
        postman: postman.clone(),
        notifier: Arc::new(MemoryNotifier::new()),
        oauth: Arc::new(HttpOAuthVerifier::new(http, config.google_audience.clone())),
        places,
        search: Arc::new(LogSearch),
        merge_locks: MergeLocks::new(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 5. Spawn background tasks
    // -----------------------------------------------------------------------
    tokio::spawn(postman.run(jobs));

    // -----------------------------------------------------------------------
    // 6. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
