use super::*;

const LIST_HEADER: &str = "<b>📚 Stored Links:</b>";
const LIST_FOOTER: &str = "<i>Reply with a number to see full details.</i>";
const DELETE_HEADER: &str = "<b>🗑️ Select links to delete:</b>";
const DELETE_FOOTER: &str =
    "<i>Reply with a number, several numbers (e.g. 1,3) or 'all'. Anything else is ignored.</i>";

/// How an inbound text is handled, decided once per message in priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Inbound {
    DeleteFlowInput,
    NumericSelection(usize),
    UrlSubmission(String),
    Unrecognized,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum DeleteOutcome {
    Listing(Listing),
    NothingStored,
    NoActiveSession,
    Rejected(SelectionError),
    ConfirmAll { count: usize },
    ConfirmMany { titles: Vec<String> },
    /// `titles` are the links actually removed; `skipped` were already gone from the store.
    Deleted {
        titles: Vec<String>,
        skipped: usize,
        all: bool,
    },
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum ChatReply {
    Listing(Listing),
    NothingStored,
    Deletion(DeleteOutcome),
    LinkDetails { index: usize, record: LinkRecord },
    LinkNoLongerSaved { index: usize },
    NoListing,
    ListingIndexOutOfRange { max: usize },
    /// The text is a URL; the transport acknowledges it and calls `save_link`.
    FetchRequested(String),
    Saved(LinkRecord),
    FetchFailed { url: String, reason: String },
    Unrecognized,
}

pub(super) fn classify(text: &str, has_session: bool) -> Inbound {
    let trimmed = text.trim();
    if has_session {
        return Inbound::DeleteFlowInput;
    }
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        // Overflowing numbers still count as a selection, just an impossible one.
        return Inbound::NumericSelection(trimmed.parse().unwrap_or(usize::MAX));
    }
    if let Some(url) = parse_link(trimmed) {
        return Inbound::UrlSubmission(url);
    }
    if looks_like_delete_reply(trimmed) {
        return Inbound::DeleteFlowInput;
    }
    Inbound::Unrecognized
}

/// Canonical form of an absolute http(s) URL, or `None` for anything else.
pub(super) fn parse_link(text: &str) -> Option<String> {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return None;
    }
    let url = reqwest::Url::parse(text).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url.to_string())
}

fn looks_like_delete_reply(text: &str) -> bool {
    if text.eq_ignore_ascii_case("yes") || text.eq_ignore_ascii_case("all") {
        return true;
    }
    text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c.is_whitespace())
}

/// Chat-facing core: owns the store, the deletion sessions and the per-chat listing
/// caches, and exposes the entry points the transport calls.
pub(super) struct ConversationRouter {
    pub(super) store: LinkStore,
    pub(super) sessions: SessionManager,
    listings: Mutex<HashMap<i64, ListingCache>>,
    fetcher: Arc<dyn MetadataFetcher>,
    fetch_timeout: Duration,
}

impl ConversationRouter {
    pub(super) fn new(
        store: LinkStore,
        fetcher: Arc<dyn MetadataFetcher>,
        session_ttl_secs: u64,
        fetch_timeout: Duration,
    ) -> Self {
        ConversationRouter {
            store,
            sessions: SessionManager::new(session_ttl_secs),
            listings: Mutex::new(HashMap::new()),
            fetcher,
            fetch_timeout,
        }
    }

    pub(super) async fn on_list_requested(&self, chat_id: i64) -> Result<ChatReply> {
        let links = self.store.load_all()?;
        if links.is_empty() {
            self.listings.lock().await.remove(&chat_id);
            return Ok(ChatReply::NothingStored);
        }
        let (listing, cache) = render_listing(&links, LIST_HEADER, LIST_FOOTER);
        debug!("chat {} listed {} links", chat_id, listing.count);
        self.listings.lock().await.insert(chat_id, cache);
        Ok(ChatReply::Listing(listing))
    }

    pub(super) async fn on_delete_listing_requested(&self, chat_id: i64) -> Result<DeleteOutcome> {
        let snapshot = self.store.load_all()?;
        let mut sessions = self.sessions.lock().await;
        if snapshot.is_empty() {
            sessions.remove(chat_id);
            return Ok(DeleteOutcome::NothingStored);
        }
        let (listing, _) = render_listing(&snapshot, DELETE_HEADER, DELETE_FOOTER);
        sessions.create(chat_id, snapshot, now_ts());
        Ok(DeleteOutcome::Listing(listing))
    }

    pub(super) async fn on_chat_text(&self, chat_id: i64, text: &str) -> Result<ChatReply> {
        let mut sessions = self.sessions.lock().await;
        let has_session = sessions.get(chat_id, now_ts()).is_some();
        match classify(text, has_session) {
            Inbound::DeleteFlowInput => self
                .continue_deletion(&mut sessions, chat_id, text)
                .await
                .map(ChatReply::Deletion),
            Inbound::NumericSelection(index) => {
                drop(sessions);
                self.resolve_listing(chat_id, index).await
            }
            Inbound::UrlSubmission(url) => Ok(ChatReply::FetchRequested(url)),
            Inbound::Unrecognized => Ok(ChatReply::Unrecognized),
        }
    }

    /// Drops idle sessions and returns how many were removed.
    pub(super) async fn on_periodic_sweep(&self) -> usize {
        self.sessions.sweep_expired(now_ts()).await
    }

    pub(super) async fn save_link(&self, url: &str) -> Result<ChatReply> {
        let fetched = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url)).await;
        let metadata = match fetched {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(err)) => {
                warn!("metadata fetch failed for {}: {:#}", url, err);
                return Ok(ChatReply::FetchFailed {
                    url: url.to_string(),
                    reason: format!("{:#}", err),
                });
            }
            Err(_) => {
                warn!("metadata fetch timed out for {}", url);
                return Ok(ChatReply::FetchFailed {
                    url: url.to_string(),
                    reason: format!("timed out after {}s", self.fetch_timeout.as_secs()),
                });
            }
        };
        let record = self.store.upsert(url, metadata).await?;
        info!("saved {}", record.url);
        Ok(ChatReply::Saved(record))
    }

    async fn continue_deletion(
        &self,
        sessions: &mut SessionTable<'_>,
        chat_id: i64,
        text: &str,
    ) -> Result<DeleteOutcome> {
        let now = now_ts();
        let Some(session) = sessions.get(chat_id, now) else {
            return Ok(DeleteOutcome::NoActiveSession);
        };
        session.touch(now);
        let session_id = session.id.clone();
        let age = now.saturating_sub(session.created_at);

        match session.handle_input(text) {
            SessionStep::Rejected(err) => Ok(DeleteOutcome::Rejected(err)),
            SessionStep::AwaitConfirmation { records, all: true } => {
                Ok(DeleteOutcome::ConfirmAll {
                    count: records.len(),
                })
            }
            SessionStep::AwaitConfirmation { records, all: false } => {
                Ok(DeleteOutcome::ConfirmMany {
                    titles: titles_of(&records),
                })
            }
            SessionStep::CommitOne(record) => {
                // A failed write leaves the session in place so the user can retry.
                let removed = self.store.delete_one(&record.url).await?;
                sessions.remove(chat_id);
                info!(
                    "session {} deleted {} link(s) from {} after {}s",
                    session_id,
                    usize::from(removed),
                    self.store.path().display(),
                    age
                );
                Ok(if removed {
                    DeleteOutcome::Deleted {
                        titles: vec![record.display_title().to_string()],
                        skipped: 0,
                        all: false,
                    }
                } else {
                    DeleteOutcome::Deleted {
                        titles: Vec::new(),
                        skipped: 1,
                        all: false,
                    }
                })
            }
            SessionStep::CommitMany { records, all } => {
                let urls: Vec<String> = records.iter().map(|record| record.url.clone()).collect();
                let removed = self.store.delete_many(&urls).await?;
                sessions.remove(chat_id);
                info!(
                    "session {} deleted {} link(s) from {} after {}s",
                    session_id,
                    removed.len(),
                    self.store.path().display(),
                    age
                );
                let titles = records
                    .iter()
                    .filter(|record| removed.contains(&record.url))
                    .map(|record| record.display_title().to_string())
                    .collect();
                Ok(DeleteOutcome::Deleted {
                    titles,
                    skipped: records.len() - removed.len(),
                    all,
                })
            }
            SessionStep::Cancelled => {
                sessions.remove(chat_id);
                debug!("session {} cancelled", session_id);
                Ok(DeleteOutcome::Cancelled)
            }
        }
    }

    async fn resolve_listing(&self, chat_id: i64, index: usize) -> Result<ChatReply> {
        let url = {
            let mut listings = self.listings.lock().await;
            let Some(cache) = listings.get(&chat_id) else {
                return Ok(ChatReply::NoListing);
            };
            let Some(url) = cache.resolve(index).map(str::to_string) else {
                return Ok(ChatReply::ListingIndexOutOfRange { max: cache.len() });
            };
            listings.remove(&chat_id);
            url
        };

        // The cache only maps numbers to URLs; the record itself comes from the live store.
        Ok(match self.store.get(&url)? {
            Some(record) => ChatReply::LinkDetails { index, record },
            None => ChatReply::LinkNoLongerSaved { index },
        })
    }
}

fn titles_of(records: &[LinkRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.display_title().to_string())
        .collect()
}
