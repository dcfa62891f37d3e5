//! calbot: calendar notification bot
//!
//! Wires the CalDAV client, the chat client, the sync engine and the
//! scheduler together and runs until interrupted.

mod chat;

use std::sync::Arc;

use calbot_caldav::CaldavClient;
use calbot_core::store::{SqliteStore, UserRepo};
use calbot_core::workspace::Workspace;
use calbot_core::Config;
use calbot_schedule::Scheduler;
use calbot_sync::{CalendarService, UserService};
use tracing_subscriber::EnvFilter;

use chat::ChatClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config_path =
        std::env::var("CALBOT_CONFIG").unwrap_or_else(|_| "calbot.toml".to_string());
    let config =
        Config::load(&config_path).map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting calbot...");
    tracing::info!("CalDAV server: {}", config.caldav.server_url);

    let store = Arc::new(SqliteStore::new(&config.storage.db_path)?);
    let repo = UserRepo::new(store);
    let workspace = Arc::new(Workspace::new(repo.clone()));

    let caldav = Arc::new(CaldavClient::new(&config.caldav.server_url)?);
    let chat = Arc::new(ChatClient::new(&config.chat)?);

    let calendar = Arc::new(CalendarService::new(repo.clone(), caldav));
    let users = Arc::new(UserService::new(
        repo.clone(),
        workspace.clone(),
        calendar,
        chat.clone(),
    ));

    let scheduler = Scheduler::new(repo, workspace, chat, users);
    scheduler.initialize_all().await?;

    tracing::info!("calbot is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    scheduler.shutdown().await;
    Ok(())
}
