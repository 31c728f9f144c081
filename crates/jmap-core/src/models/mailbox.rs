//! Mailbox model — a flat, named bucket of emails (spec §3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a mailbox. Equal to the role name for the six
/// well-known mailboxes, otherwise a fresh UUID (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MailboxId(pub String);

impl MailboxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MailboxId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MailboxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One of the six well-known mailbox roles. At most one mailbox per
/// account may hold a given role (I5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxRole {
    Inbox,
    Drafts,
    Sent,
    Trash,
    Junk,
    Archive,
}

impl MailboxRole {
    /// Parse a role from its JMAP wire string, rejecting anything outside
    /// the closed set (spec §4.6: "Reject invalid roles").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbox" => Some(MailboxRole::Inbox),
            "drafts" => Some(MailboxRole::Drafts),
            "sent" => Some(MailboxRole::Sent),
            "trash" => Some(MailboxRole::Trash),
            "junk" => Some(MailboxRole::Junk),
            "archive" => Some(MailboxRole::Archive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MailboxRole::Inbox => "inbox",
            MailboxRole::Drafts => "drafts",
            MailboxRole::Sent => "sent",
            MailboxRole::Trash => "trash",
            MailboxRole::Junk => "junk",
            MailboxRole::Archive => "archive",
        }
    }
}

/// A named bucket of emails. The hierarchy is deliberately flat: there is
/// no `parentId` support (Non-goals, spec §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: MailboxId,
    pub name: String,
    pub role: Option<MailboxRole>,
    pub sort_order: u32,
    pub total_emails: i64,
    pub unread_emails: i64,
    pub is_subscribed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mailbox {
    /// Build a brand-new mailbox with zeroed counters.
    pub fn new(id: MailboxId, name: impl Into<String>, role: Option<MailboxRole>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            role,
            sort_order: 0,
            total_emails: 0,
            unread_emails: 0,
            is_subscribed: true,
            created_at: now,
            updated_at: now,
        }
    }
}
