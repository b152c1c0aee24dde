use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::sync::Mutex;
use uuid::Uuid;

mod deletion;
mod helpers;
mod listing;
mod message_handlers;
mod metadata;
mod router;
mod store;

use deletion::*;
use helpers::*;
use listing::*;
use message_handlers::*;
use metadata::*;
use router::*;
use store::*;

const DEFAULT_DATABASE_PATH: &str = "data/links.json";
const DEFAULT_SESSION_TTL_SECS: u64 = 5 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_USER_AGENT: &str = concat!("linkkeeper-bot/", env!("CARGO_PKG_VERSION"));
const TITLE_DISPLAY_CHARS: usize = 50;
const DESCRIPTION_DISPLAY_CHARS: usize = 100;
const MESSAGE_CHAR_LIMIT: usize = 4000;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    token: Option<String>,
    user_id: Option<u64>,
    database_path: Option<PathBuf>,
    session_ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
    fetch_timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone)]
struct Config {
    token: String,
    user_id: Option<u64>,
    database_path: PathBuf,
    session_ttl_secs: u64,
    sweep_interval_secs: u64,
    fetch_timeout_secs: u64,
    user_agent: String,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Title and description scraped from a page. Both are always present, possibly empty.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
struct LinkMetadata {
    title: String,
    description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LinkRecord {
    url: String,
    metadata: LinkMetadata,
    timestamp: String,
}

impl LinkRecord {
    fn display_title(&self) -> &str {
        let title = self.metadata.title.trim();
        if title.is_empty() {
            &self.url
        } else {
            title
        }
    }
}

struct AppState {
    config: Config,
    router: ConversationRouter,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    if let Some(dir) = config.database_path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
        }
    }

    let fetcher = HttpMetadataFetcher::new(
        Duration::from_secs(config.fetch_timeout_secs),
        &config.user_agent,
    )?;
    let router = ConversationRouter::new(
        LinkStore::new(config.database_path.clone()),
        Arc::new(fetcher),
        config.session_ttl_secs,
        Duration::from_secs(config.fetch_timeout_secs),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        router,
    });

    start_sweep_loop(state.clone(), config.sweep_interval_secs);

    info!(
        "starting with database {} (session ttl {}s)",
        config.database_path.display(),
        config.session_ttl_secs
    );

    let bot = Bot::new(config.token.clone());

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
