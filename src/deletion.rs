use super::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum SessionPhase {
    Selecting,
    /// `pending` holds 1-based display indices into the snapshot.
    AwaitingConfirmation { pending: Vec<usize>, all: bool },
}

/// A chat's in-progress `/delete` conversation. The snapshot is frozen at creation;
/// commits always go through the URLs captured in it.
#[derive(Clone, Debug)]
pub(super) struct DeletionSession {
    pub(super) id: String,
    pub(super) snapshot: LinkMap,
    pub(super) phase: SessionPhase,
    pub(super) created_at: u64,
    pub(super) last_activity: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Selection {
    All,
    /// Sorted, deduplicated, 1-based and within range.
    Indices(Vec<usize>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum SelectionError {
    Unparsable,
    OutOfRange { max: usize },
}

/// What the session decided for one input. Store mutations are left to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum SessionStep {
    Rejected(SelectionError),
    CommitOne(LinkRecord),
    AwaitConfirmation { records: Vec<LinkRecord>, all: bool },
    CommitMany { records: Vec<LinkRecord>, all: bool },
    Cancelled,
}

impl DeletionSession {
    pub(super) fn new(snapshot: LinkMap, now: u64) -> Self {
        DeletionSession {
            id: short_id(),
            snapshot,
            phase: SessionPhase::Selecting,
            created_at: now,
            last_activity: now,
        }
    }

    pub(super) fn is_expired(&self, now: u64, ttl_secs: u64) -> bool {
        now.saturating_sub(self.last_activity) > ttl_secs
    }

    pub(super) fn touch(&mut self, now: u64) {
        self.last_activity = now;
    }

    pub(super) fn handle_input(&mut self, input: &str) -> SessionStep {
        if let SessionPhase::AwaitingConfirmation { pending, all } = &self.phase {
            return if input.trim().eq_ignore_ascii_case("yes") {
                SessionStep::CommitMany {
                    records: self.records_at(pending),
                    all: *all,
                }
            } else {
                SessionStep::Cancelled
            };
        }

        let total = self.snapshot.len();
        match parse_selection(input, total) {
            Err(err) => SessionStep::Rejected(err),
            Ok(Selection::All) => {
                let pending: Vec<usize> = (1..=total).collect();
                let records = self.records_at(&pending);
                self.phase = SessionPhase::AwaitingConfirmation { pending, all: true };
                SessionStep::AwaitConfirmation { records, all: true }
            }
            Ok(Selection::Indices(indices)) if indices.len() == 1 => {
                match self.records_at(&indices).into_iter().next() {
                    Some(record) => SessionStep::CommitOne(record),
                    None => SessionStep::Rejected(SelectionError::OutOfRange { max: total }),
                }
            }
            Ok(Selection::Indices(indices)) => {
                let records = self.records_at(&indices);
                self.phase = SessionPhase::AwaitingConfirmation {
                    pending: indices,
                    all: false,
                };
                SessionStep::AwaitConfirmation {
                    records,
                    all: false,
                }
            }
        }
    }

    fn records_at(&self, indices: &[usize]) -> Vec<LinkRecord> {
        indices
            .iter()
            .filter_map(|index| index.checked_sub(1))
            .filter_map(|index| self.snapshot.get_index(index).cloned())
            .collect()
    }
}

/// Parses a reply to the delete listing: `all`, or indices separated by any mix of
/// commas and whitespace.
pub(super) fn parse_selection(input: &str, total: usize) -> Result<Selection, SelectionError> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("all") {
        return Ok(Selection::All);
    }

    let mut indices = BTreeSet::new();
    let mut out_of_range = false;
    for token in trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        if !token.chars().all(|c| c.is_ascii_digit()) {
            return Err(SelectionError::Unparsable);
        }
        match token.parse::<usize>() {
            Ok(index) if index >= 1 && index <= total => {
                indices.insert(index);
            }
            _ => out_of_range = true,
        }
    }

    if out_of_range {
        return Err(SelectionError::OutOfRange { max: total });
    }
    if indices.is_empty() {
        return Err(SelectionError::Unparsable);
    }
    Ok(Selection::Indices(indices.into_iter().collect()))
}

/// Owner of every chat's deletion session.
pub(super) struct SessionManager {
    sessions: Mutex<HashMap<i64, DeletionSession>>,
    ttl_secs: u64,
}

/// Exclusive access to the session table. Holding it makes check-then-mutate on a
/// chat's session a single critical section, shared with the expiry sweep.
pub(super) struct SessionTable<'a> {
    sessions: tokio::sync::MutexGuard<'a, HashMap<i64, DeletionSession>>,
    ttl_secs: u64,
}

impl SessionManager {
    pub(super) fn new(ttl_secs: u64) -> Self {
        SessionManager {
            sessions: Mutex::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub(super) async fn lock(&self) -> SessionTable<'_> {
        SessionTable {
            sessions: self.sessions.lock().await,
            ttl_secs: self.ttl_secs,
        }
    }

    pub(super) async fn sweep_expired(&self, now: u64) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|chat_id, session| {
            let expired = session.is_expired(now, self.ttl_secs);
            if expired {
                debug!("session {} for chat {} expired", session.id, chat_id);
            }
            !expired
        });
        before - sessions.len()
    }
}

impl SessionTable<'_> {
    /// Starts a fresh session for the chat, replacing any previous one.
    pub(super) fn create(&mut self, chat_id: i64, snapshot: LinkMap, now: u64) -> &DeletionSession {
        let session = DeletionSession::new(snapshot, now);
        debug!(
            "session {} for chat {} started with {} links",
            session.id,
            chat_id,
            session.snapshot.len()
        );
        self.sessions.insert(chat_id, session);
        &self.sessions[&chat_id]
    }

    /// Returns the chat's live session. An expired one is dropped on the spot so stale
    /// state can never be resumed between sweeps.
    pub(super) fn get(&mut self, chat_id: i64, now: u64) -> Option<&mut DeletionSession> {
        let expired = self
            .sessions
            .get(&chat_id)
            .map(|session| session.is_expired(now, self.ttl_secs))?;
        if expired {
            if let Some(session) = self.sessions.remove(&chat_id) {
                debug!("session {} for chat {} expired", session.id, chat_id);
            }
            return None;
        }
        self.sessions.get_mut(&chat_id)
    }

    pub(super) fn remove(&mut self, chat_id: i64) -> Option<DeletionSession> {
        self.sessions.remove(&chat_id)
    }
}
