//! Thread — a derived view, not a stored record (spec §3)

use serde::{Deserialize, Serialize};

use super::email::EmailId;

/// Unique identifier for a thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The set of live emails sharing a thread-id, ordered by `receivedAt`
/// ascending. Assembled on read by `Thread/get`; never persisted as its
/// own row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub email_ids: Vec<EmailId>,
}
