//! Cinemabot - Telegram bot for finding movies and places to watch them
//!
//! Searches Kinopoisk by keyword, lets the user page through the matches and
//! scrapes watch links for the chosen one, keeping per-chat query history and
//! view counters in SQLite.

mod config;
mod db;
mod movie;
mod providers;
mod runtime;
mod session;
mod telegram;

use config::BotConfig;
use db::Database;
use providers::{GoogleLinkFinder, KinopoiskClient};
use runtime::{Collaborators, DatabaseStorage, ProductionManager};
use std::sync::Arc;
use telegram::{Poller, TelegramApi};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinemabot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let api = Arc::new(TelegramApi::new(&config.bot_token)?);
    let collaborators = Collaborators {
        storage: DatabaseStorage::new(db),
        catalog: Arc::new(KinopoiskClient::new(&config.kinopoisk_token)?),
        links: Arc::new(GoogleLinkFinder::new(
            config.links_count,
            &config.link_query_suffix,
        )?),
        renderer: Arc::clone(&api),
    };
    let manager: Arc<ProductionManager> = Arc::new(
        runtime::RuntimeManager::new(collaborators).with_idle_timeout(config.idle_timeout),
    );

    let cancel = CancellationToken::new();
    let poller = Poller::new(api, manager, config.poll_timeout);
    let polling = tokio::spawn(poller.run(cancel.clone()));

    tracing::info!(links_count = config.links_count, "Cinemabot started");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    cancel.cancel();
    polling.await?;

    Ok(())
}
