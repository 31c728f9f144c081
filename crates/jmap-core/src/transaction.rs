//! Transaction composer convention (C5)
//!
//! Not a runtime component in its own right — every mutation path follows
//! the same rule: read current states, validate, ask each affected store
//! for its write items, concatenate them in a fixed order, submit as one
//! bounded transaction. This module holds the two things that make the
//! convention enforceable in code: an ordering builder and a bounded retry
//! helper.

use anyhow::Result;

use crate::error::JmapError;
use crate::store::{ConditionalCheckFailed, Store, WriteItem};

/// Mirrors [`crate::store::Store::max_transact_items`]; checked up front so
/// composers fail fast with a typed error instead of letting the store
/// reject the whole call.
pub const MAX_TRANSACT_ITEMS: usize = 100;

/// Assembles one transaction's write items in the mandated order: data
/// rows, then counter rows, then state-counter rows, then change-log rows
/// (spec §4.5 step 4).
#[derive(Default)]
pub struct TransactionBuilder {
    data: Vec<WriteItem>,
    counters: Vec<WriteItem>,
    state_counters: Vec<WriteItem>,
    change_log: Vec<WriteItem>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `Mailbox`/`Email` row create/update/delete.
    pub fn add_data(&mut self, item: WriteItem) -> &mut Self {
        self.data.push(item);
        self
    }

    pub fn add_data_many(&mut self, items: impl IntoIterator<Item = WriteItem>) -> &mut Self {
        self.data.extend(items);
        self
    }

    /// A mailbox `totalEmails`/`unreadEmails` increment/decrement.
    pub fn add_counter(&mut self, item: WriteItem) -> &mut Self {
        self.counters.push(item);
        self
    }

    pub fn add_counters(&mut self, items: impl IntoIterator<Item = WriteItem>) -> &mut Self {
        self.counters.extend(items);
        self
    }

    /// The `(newState, items)` pair from [`crate::store::StateStore`]'s
    /// `build_state_change_items*` — the counter write and its change-log
    /// rows travel together already in the right relative order.
    pub fn add_state_change(&mut self, items: impl IntoIterator<Item = WriteItem>) -> &mut Self {
        for item in items {
            if is_change_log_row(&item) {
                self.change_log.push(item);
            } else {
                self.state_counters.push(item);
            }
        }
        self
    }

    /// Concatenate every section in the mandated order and enforce the
    /// per-transaction item cap.
    pub fn build(self) -> std::result::Result<Vec<WriteItem>, JmapError> {
        let total = self.data.len() + self.counters.len() + self.state_counters.len() + self.change_log.len();
        if total > MAX_TRANSACT_ITEMS {
            return Err(JmapError::TooManyItems);
        }

        let mut items = self.data;
        items.extend(self.counters);
        items.extend(self.state_counters);
        items.extend(self.change_log);
        Ok(items)
    }
}

fn is_change_log_row(item: &WriteItem) -> bool {
    item.sk().starts_with("CHANGE#")
}

/// Whether `err` represents store contention (a conditional-check failure)
/// as opposed to some other failure. Contention is retried in-handler
/// (spec §4.5 step 5); anything else propagates immediately.
pub fn is_contention(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ConditionalCheckFailed>().is_some()
}

/// Run `attempt` up to `limit` times, retrying only on store contention.
/// Grounded on the teacher's `get_message_with_token_retry` bounded-retry
/// loop in `gmail/client.rs`, adapted to immediate retry: store
/// conditional-check failures are expected to clear on the very next
/// attempt (another writer simply got there first), not a transient
/// network condition that benefits from backoff.
pub fn with_retries<T>(limit: u32, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
    let mut last_err = None;
    for try_num in 0..limit.max(1) {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if is_contention(&err) {
                    log::warn!("store contention, retry {}/{}", try_num + 1, limit);
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
        }
    }
    Err(last_err.expect("limit >= 1 guarantees at least one attempt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Condition, Item};

    fn put(sk: &str) -> WriteItem {
        WriteItem::Put {
            pk: "ACCOUNT#a".into(),
            sk: sk.into(),
            item: Item::new(),
            condition: Condition::None,
        }
    }

    #[test]
    fn build_orders_sections() {
        let mut builder = TransactionBuilder::new();
        builder.add_state_change(vec![put("STATE#Email"), put("CHANGE#Email#0000000001")]);
        builder.add_data(put("EMAIL#e1"));
        builder.add_counter(put("MAILBOX#m1"));

        let items = builder.build().unwrap();
        let sks: Vec<&str> = items.iter().map(|i| i.sk()).collect();
        assert_eq!(
            sks,
            vec!["EMAIL#e1", "MAILBOX#m1", "STATE#Email", "CHANGE#Email#0000000001"]
        );
    }

    #[test]
    fn build_rejects_oversized_transaction() {
        let mut builder = TransactionBuilder::new();
        for i in 0..(MAX_TRANSACT_ITEMS + 1) {
            builder.add_data(put(&format!("EMAIL#{i}")));
        }
        assert_eq!(builder.build().unwrap_err(), JmapError::TooManyItems);
    }

    #[test]
    fn with_retries_gives_up_after_limit() {
        let mut calls = 0;
        let result: Result<()> = with_retries(3, || {
            calls += 1;
            Err(ConditionalCheckFailed {
                pk: "p".into(),
                sk: "s".into(),
            }
            .into())
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn with_retries_succeeds_without_retrying_on_non_contention_error() {
        let mut calls = 0;
        let result: Result<()> = with_retries(3, || {
            calls += 1;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
