use super::*;

pub(super) const HELP_TEXT: &str = "Send me a link and I'll save its title and description.\n\n\
/list - show saved links (reply with a number for details)\n\
/delete or /del - pick links to remove (a number, several like 1,3, or all)\n\
/help - show this message";

pub(super) fn load_config(path: Option<&Path>) -> Result<Config> {
    let (config_file, config_dir) = match path {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            let config_file: ConfigFile = toml::from_str(&contents).context("parse config")?;
            let config_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            (config_file, Some(config_dir))
        }
        None => (ConfigFile::default(), None),
    };
    resolve_config(
        config_file,
        std::env::var("BOT_TOKEN").ok(),
        config_dir.as_deref(),
    )
}

/// Fills defaults and validates. Relative paths in a config file are taken relative to
/// the file's directory.
pub(super) fn resolve_config(
    config_file: ConfigFile,
    env_token: Option<String>,
    config_dir: Option<&Path>,
) -> Result<Config> {
    let token = config_file
        .token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| env_token.filter(|token| !token.trim().is_empty()))
        .ok_or_else(|| anyhow!("bot token is missing: set `token` in the config or BOT_TOKEN"))?;

    let database_path = match (config_file.database_path, config_dir) {
        (Some(path), Some(dir)) => resolve_relative_path(&path, dir),
        (Some(path), None) => path,
        (None, _) => PathBuf::from(DEFAULT_DATABASE_PATH),
    };

    let sweep_interval_secs = config_file
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    if sweep_interval_secs == 0 {
        bail!("sweep_interval_seconds must be greater than zero");
    }
    let fetch_timeout_secs = config_file
        .fetch_timeout_seconds
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
    if fetch_timeout_secs == 0 {
        bail!("fetch_timeout_seconds must be greater than zero");
    }

    Ok(Config {
        token: token.trim().to_string(),
        user_id: config_file.user_id,
        database_path,
        session_ttl_secs: config_file
            .session_ttl_seconds
            .unwrap_or(DEFAULT_SESSION_TTL_SECS),
        sweep_interval_secs,
        fetch_timeout_secs,
        user_agent: config_file
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
    })
}

pub(super) fn resolve_relative_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_relative() {
        base_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

pub(super) fn build_deletion_text(outcome: &DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::Listing(listing) => listing.text.clone(),
        DeleteOutcome::NothingStored => "❌ No links stored to delete.".to_string(),
        DeleteOutcome::NoActiveSession => "❌ Please use /delete command first.".to_string(),
        DeleteOutcome::Rejected(SelectionError::Unparsable) => {
            "❌ Please enter a number, several numbers (e.g. 1,3) or 'all'.".to_string()
        }
        DeleteOutcome::Rejected(SelectionError::OutOfRange { max }) => format!(
            "❌ Invalid number(s). Please choose from 1 to {}.",
            max
        ),
        DeleteOutcome::ConfirmAll { count } => format!(
            "⚠️ Are you sure you want to delete ALL {} links? Reply 'yes' to confirm.",
            count
        ),
        DeleteOutcome::ConfirmMany { titles } => {
            format!(
                "⚠️ Delete these {} links?\n\n{}\nReply 'yes' to confirm.",
                titles.len(),
                bounded_join(&bullet_lines(titles), MESSAGE_CHAR_LIMIT - 100, "links")
            )
        }
        DeleteOutcome::Deleted {
            titles,
            skipped,
            all,
        } => {
            let mut text = if titles.is_empty() {
                "❌ Nothing was deleted.".to_string()
            } else if *all && *skipped == 0 {
                "✅ All links have been deleted.".to_string()
            } else if titles.len() == 1 {
                format!("✅ Deleted: <b>{}</b>", escape_html(&titles[0]))
            } else {
                format!(
                    "🗑️ Successfully deleted:\n{}",
                    bounded_join(&bullet_lines(titles), MESSAGE_CHAR_LIMIT - 200, "links")
                )
            };
            if *skipped > 0 {
                text.push_str(&format!(
                    "\n<i>{} link(s) had already been removed.</i>",
                    skipped
                ));
            }
            text
        }
        DeleteOutcome::Cancelled => "❌ Deletion cancelled.".to_string(),
    }
}

fn bullet_lines(titles: &[String]) -> Vec<String> {
    titles
        .iter()
        .map(|title| format!("• {}\n", escape_html(&truncate_chars(title, TITLE_DISPLAY_CHARS))))
        .collect()
}

pub(super) fn build_reply_text(reply: &ChatReply) -> String {
    match reply {
        ChatReply::Listing(listing) => listing.text.clone(),
        ChatReply::NothingStored => "📭 No links have been stored yet.".to_string(),
        ChatReply::Deletion(outcome) => build_deletion_text(outcome),
        ChatReply::LinkDetails { index, record } => build_link_details(*index, record),
        ChatReply::LinkNoLongerSaved { index } => format!(
            "❌ Link #{} is no longer saved. Use /list to refresh.",
            index
        ),
        ChatReply::NoListing => "❌ Please use /list command first.".to_string(),
        ChatReply::ListingIndexOutOfRange { max } => format!(
            "❌ Invalid number. Please choose from 1 to {}.",
            max
        ),
        ChatReply::FetchRequested(_) => "🔍 Extracting metadata...".to_string(),
        ChatReply::Saved(record) => format!(
            "✅ Link successfully saved!\n\n<b>Title:</b> {}\n<b>Description:</b> {}",
            escape_html(record.display_title()),
            escape_html(&record.metadata.description)
        ),
        ChatReply::FetchFailed { url, reason } => format!(
            "⚠️ Couldn't extract metadata from {}\n<i>{}</i>",
            escape_html(url),
            escape_html(reason)
        ),
        ChatReply::Unrecognized => {
            "Send me a link to save it, or use /help to see what I can do.".to_string()
        }
    }
}

pub(super) async fn send_html(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .disable_web_page_preview(true)
        .await?;
    Ok(())
}

pub(super) async fn send_error(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    bot.send_message(chat_id, text).await?;
    Ok(())
}

pub(super) async fn with_retries<F, T>(mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_err = None;
    for attempt in 0..3 {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
        if attempt < 2 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("retry failed")))
}

pub(super) fn parse_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let cmd = first.trim_start_matches('/');
    Some(cmd.split('@').next().unwrap_or(cmd))
}

pub(super) fn short_id() -> String {
    let id = Uuid::new_v4().to_string();
    id.split('-').next().unwrap_or(&id).to_string()
}

pub(super) fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

pub(super) fn now_iso8601() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

pub(super) fn start_sweep_loop(state: Arc<AppState>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let expired = state.router.on_periodic_sweep().await;
            if expired > 0 {
                debug!("swept {} expired delete session(s)", expired);
            }
        }
    });
}
