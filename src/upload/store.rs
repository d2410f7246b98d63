//! Session store
//!
//! State transitions are checked and applied under the entry lock, so two
//! concurrent confirms of one session cannot both succeed.

use super::session::{SessionState, UploadSession};
use super::UploadError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A requested state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm { actual_file_size: u64 },
    Expire,
}

/// Result of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Pending sessions moved to expired
    pub expired: usize,
    /// Terminal sessions removed after the retention window
    pub evicted: usize,
    /// Sessions still pending afterwards
    pub pending: usize,
}

/// Storage for upload sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails with `Conflict` if the id is already taken
    async fn insert(&self, session: UploadSession) -> Result<(), UploadError>;

    async fn get(&self, id: &str) -> Result<Option<UploadSession>, UploadError>;

    /// Atomically move a pending session to a terminal state.
    ///
    /// A pending session past its deadline is marked expired and `Expired`
    /// is returned whatever the requested transition.
    async fn transition(
        &self,
        id: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<UploadSession, UploadError>;

    /// Expire lapsed pending sessions and drop terminal sessions older than
    /// `expires_at + retention`
    async fn sweep(&self, now: DateTime<Utc>, retention: Duration) -> Result<SweepStats, UploadError>;
}

/// In-process session store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, UploadSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: UploadSession) -> Result<(), UploadError> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(UploadError::Conflict(session.id)),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<UploadSession>, UploadError> {
        Ok(self.sessions.get(id).map(|entry| entry.value().clone()))
    }

    async fn transition(
        &self,
        id: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<UploadSession, UploadError> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| UploadError::NotFound(id.to_string()))?;
        let session = entry.value_mut();

        match session.state {
            SessionState::Confirmed => return Err(UploadError::Conflict(id.to_string())),
            SessionState::Expired => return Err(UploadError::Expired(id.to_string())),
            SessionState::Pending => {}
        }

        if session.is_lapsed_at(now) {
            session.state = SessionState::Expired;
            return Err(UploadError::Expired(id.to_string()));
        }

        match transition {
            Transition::Confirm { actual_file_size } => {
                session.state = SessionState::Confirmed;
                session.confirmed_at = Some(now);
                session.actual_file_size = Some(actual_file_size);
            }
            Transition::Expire => {
                session.state = SessionState::Expired;
            }
        }

        Ok(session.clone())
    }

    async fn sweep(&self, now: DateTime<Utc>, retention: Duration) -> Result<SweepStats, UploadError> {
        let mut stats = SweepStats::default();

        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if session.state != SessionState::Pending {
                continue;
            }
            if session.is_lapsed_at(now) {
                session.state = SessionState::Expired;
                stats.expired += 1;
            } else {
                stats.pending += 1;
            }
        }

        self.sessions.retain(|_, session| {
            // keep the session when the deadline is not representable
            let keep = !session.state.is_terminal()
                || session
                    .expires_at
                    .checked_add_signed(retention)
                    .map_or(true, |evict_at| now < evict_at);
            if !keep {
                stats.evicted += 1;
            }
            keep
        });

        Ok(stats)
    }
}
