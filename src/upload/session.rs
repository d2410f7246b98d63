//! Upload sessions
//!
//! A session reserves one storage key for one user between presign and
//! confirm. It moves `pending -> confirmed` or `pending -> expired` exactly
//! once; both end states are terminal.

use super::FileType;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Random bytes behind a session id
const SESSION_ID_BYTES: usize = 32;

/// Lifecycle state of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Confirmed,
    Expired,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Confirmed => "confirmed",
            SessionState::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Pending)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending or finished direct upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    /// Size declared at presign time
    pub file_size: u64,
    pub content_type: String,
    pub file_type: FileType,
    pub category: String,
    pub storage_key: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_file_size: Option<u64>,
}

impl UploadSession {
    /// 64 hex chars from a cryptographically secure RNG
    pub fn new_id() -> String {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Deadline has passed, regardless of the stored state
    pub fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// State as observed at `now`: a lapsed pending session reads as expired
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        match self.state {
            SessionState::Pending if self.is_lapsed_at(now) => SessionState::Expired,
            state => state,
        }
    }

    /// Seconds left before the deadline, zero once lapsed
    pub fn remaining_seconds_at(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }
}
