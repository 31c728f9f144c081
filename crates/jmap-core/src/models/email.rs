//! Email model (spec §3)

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mailbox::MailboxId;
use super::thread::ThreadId;

/// Unique identifier for an email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmailId(pub String);

impl EmailId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EmailId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EmailId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The `$seen` keyword controls unread counters (I2); it is handled as a
/// plain string alongside every other keyword rather than a special case,
/// except where the spec calls it out explicitly.
pub const KEYWORD_SEEN: &str = "$seen";

/// One message. `body_structure` and `blob_id` are opaque here: MIME
/// parsing and the blob store are external collaborators (spec §1) — this
/// engine only ever moves them around, never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub thread_id: ThreadId,
    pub blob_id: String,
    /// Opaque body-part tree, produced by the (external) MIME parser.
    pub body_structure: serde_json::Value,
    pub mailbox_ids: BTreeSet<MailboxId>,
    pub keywords: BTreeSet<String>,
    pub received_at: DateTime<Utc>,
    /// Optimistic-lock version, bumped by every mutation.
    pub version: i64,
    /// Soft-delete marker (I6): once set, no further update may succeed.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Email {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_unread(&self) -> bool {
        !self.keywords.contains(KEYWORD_SEEN)
    }
}

/// Normalise a keyword per spec §4.4: case-fold, then validate against the
/// allowed character set. JMAP keywords are either a leading `$` followed
/// by lowercase letters/digits, or a user keyword of letters/digits/`-`/`_`.
pub fn normalize_keyword(raw: &str) -> Option<String> {
    if raw.is_empty() || raw.len() > 255 {
        return None;
    }
    let folded = raw.to_ascii_lowercase();

    let body = folded.strip_prefix('$').unwrap_or(&folded);
    if body.is_empty() {
        return None;
    }
    let valid = body
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return None;
    }

    Some(folded)
}
