//! The abstract store interface (spec §6)
//!
//! This is the boundary the real DynamoDB-style store sits behind; it is
//! an external collaborator (spec §1). `jmap-core` only ever programs
//! against this trait. The one concrete implementation shipped here,
//! [`super::memory::InMemoryStore`], exists purely for tests.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// One row: a flat attribute map, the way a DynamoDB item would be
/// represented once decoded off the wire.
pub type Item = HashMap<String, Value>;

/// Encode a model struct as a store item.
pub fn to_item<T: Serialize>(value: &T) -> Result<Item> {
    let json = serde_json::to_value(value).context("failed to encode item")?;
    match json {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(anyhow::anyhow!("expected object, got {other}")),
    }
}

/// Decode a store item back into a model struct.
pub fn from_item<T: DeserializeOwned>(item: &Item) -> Result<T> {
    let map: serde_json::Map<String, Value> = item.clone().into_iter().collect();
    serde_json::from_value(Value::Object(map)).context("failed to decode item")
}

/// A precondition gating a write. Mirrors the handful of condition
/// expressions this engine actually needs (spec §4.3–§4.5): existence for
/// create/update/uniqueness, and equality on a named field for optimistic
/// locking (email `version`) or counter advancement (state `value`).
#[derive(Debug, Clone)]
pub enum Condition {
    None,
    Exists,
    NotExists,
    /// The item's `field` attribute must currently equal `expected`.
    FieldEquals { field: &'static str, expected: i64 },
}

/// Thrown by a write whose [`Condition`] did not hold. Callers downcast
/// via `anyhow::Error::downcast_ref` to distinguish contention (retry)
/// from "precondition genuinely unmet" (typed JMAP error) — the same
/// pattern the teacher uses for `HistoryExpiredError` in `gmail/client.rs`.
#[derive(Debug, thiserror::Error)]
#[error("conditional check failed for {pk}/{sk}")]
pub struct ConditionalCheckFailed {
    pub pk: String,
    pub sk: String,
}

/// A single write, as produced by the transaction composer (C5).
#[derive(Debug, Clone)]
pub enum WriteItem {
    Put {
        pk: String,
        sk: String,
        item: Item,
        condition: Condition,
    },
    Delete {
        pk: String,
        sk: String,
        condition: Condition,
    },
    /// Atomically add `delta` to a numeric field (DynamoDB `ADD` /
    /// `SET field = field + :delta`). Used for mailbox counters (spec
    /// §4.3) so that two concurrent mutations to the same mailbox's
    /// `totalEmails`/`unreadEmails` cannot lose an update the way a
    /// read-modify-write would.
    Increment {
        pk: String,
        sk: String,
        field: &'static str,
        delta: i64,
        condition: Condition,
    },
}

impl WriteItem {
    pub fn pk(&self) -> &str {
        match self {
            WriteItem::Put { pk, .. } | WriteItem::Delete { pk, .. } | WriteItem::Increment { pk, .. } => pk,
        }
    }

    pub fn sk(&self) -> &str {
        match self {
            WriteItem::Put { sk, .. } | WriteItem::Delete { sk, .. } | WriteItem::Increment { sk, .. } => sk,
        }
    }
}

/// Ascending or descending order for a range [`Store::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// The store primitives consumed by C2–C4 (spec §6). All methods are
/// synchronous: handlers are plain request/response functions, and the
/// teacher's own storage trait (`MailStore`) is synchronous for the same
/// reason — suspension points are the store round-trips themselves (spec
/// §5), not an async runtime.
pub trait Store: Send + Sync {
    fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>>;

    /// Range-scan every row in `pk` whose sort key starts with `sk_prefix`,
    /// ordered lexicographically. `limit` bounds the number of rows
    /// returned (`None` = unbounded).
    fn query(
        &self,
        pk: &str,
        sk_prefix: &str,
        limit: Option<usize>,
        direction: SortDirection,
    ) -> Result<Vec<Item>>;

    /// Execute-now single-item write, used by legacy non-transactional
    /// paths and cannot be bundled with other items (spec §4.4).
    fn put_item(&self, pk: &str, sk: &str, item: Item, condition: Condition) -> Result<()>;

    fn delete_item(&self, pk: &str, sk: &str, condition: Condition) -> Result<()>;

    /// Commit every item atomically, or none at all. The store returns
    /// [`ConditionalCheckFailed`] (as the first failing item) if any
    /// condition did not hold.
    fn transact_write_items(&self, items: Vec<WriteItem>) -> Result<()>;

    /// The upper bound on items per [`Store::transact_write_items`] call
    /// (spec §4.5); the composer must reject anything larger before
    /// submitting.
    fn max_transact_items(&self) -> usize {
        100
    }
}
