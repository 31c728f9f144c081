//! In-memory reference implementation of [`Store`]
//!
//! Used for every test in this crate. Grounded on the teacher's
//! `storage::InMemoryMailStore`: a lock-protected map guarded by a single
//! `RwLock`, generalized here from mail-specific maps to a generic
//! `BTreeMap<(pk, sk), Item>` so that `query` gets free lexicographic
//! ordering, the same way the teacher's `BTreeSet`-backed label index
//! gives free ordering for its own range scans.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};

use super::traits::{Condition, ConditionalCheckFailed, Item, SortDirection, Store, WriteItem};

#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<BTreeMap<(String, String), Item>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_condition(
        existing: Option<&Item>,
        condition: &Condition,
    ) -> std::result::Result<(), ()> {
        match condition {
            Condition::None => Ok(()),
            Condition::Exists => {
                if existing.is_some() {
                    Ok(())
                } else {
                    Err(())
                }
            }
            Condition::NotExists => {
                if existing.is_none() {
                    Ok(())
                } else {
                    Err(())
                }
            }
            Condition::FieldEquals { field, expected } => {
                let current = existing
                    .and_then(|item| item.get(*field))
                    .and_then(|v| v.as_i64());
                if current == Some(*expected) {
                    Ok(())
                } else {
                    Err(())
                }
            }
        }
    }
}

impl Store for InMemoryStore {
    fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>> {
        let rows = self.rows.read().map_err(|_| anyhow!("lock poisoned"))?;
        Ok(rows.get(&(pk.to_string(), sk.to_string())).cloned())
    }

    fn query(
        &self,
        pk: &str,
        sk_prefix: &str,
        limit: Option<usize>,
        direction: SortDirection,
    ) -> Result<Vec<Item>> {
        let rows = self.rows.read().map_err(|_| anyhow!("lock poisoned"))?;
        let mut matches: Vec<Item> = rows
            .iter()
            .filter(|((row_pk, sk), _)| row_pk == pk && sk.starts_with(sk_prefix))
            .map(|(_, item)| item.clone())
            .collect();

        if direction == SortDirection::Descending {
            matches.reverse();
        }

        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        Ok(matches)
    }

    fn put_item(&self, pk: &str, sk: &str, item: Item, condition: Condition) -> Result<()> {
        let mut rows = self.rows.write().map_err(|_| anyhow!("lock poisoned"))?;
        let key = (pk.to_string(), sk.to_string());

        if Self::check_condition(rows.get(&key), &condition).is_err() {
            return Err(ConditionalCheckFailed {
                pk: pk.to_string(),
                sk: sk.to_string(),
            }
            .into());
        }

        rows.insert(key, item);
        Ok(())
    }

    fn delete_item(&self, pk: &str, sk: &str, condition: Condition) -> Result<()> {
        let mut rows = self.rows.write().map_err(|_| anyhow!("lock poisoned"))?;
        let key = (pk.to_string(), sk.to_string());

        if Self::check_condition(rows.get(&key), &condition).is_err() {
            return Err(ConditionalCheckFailed {
                pk: pk.to_string(),
                sk: sk.to_string(),
            }
            .into());
        }

        rows.remove(&key);
        Ok(())
    }

    fn transact_write_items(&self, items: Vec<WriteItem>) -> Result<()> {
        if items.len() > self.max_transact_items() {
            return Err(anyhow!("transaction exceeds item limit"));
        }

        let mut rows = self.rows.write().map_err(|_| anyhow!("lock poisoned"))?;

        // Validate every condition before mutating anything, so the
        // transaction is all-or-nothing even though this reference store
        // has no native multi-item transaction primitive.
        for write in &items {
            let key = (write.pk().to_string(), write.sk().to_string());
            let condition = match write {
                WriteItem::Put { condition, .. } => condition,
                WriteItem::Delete { condition, .. } => condition,
                WriteItem::Increment { condition, .. } => condition,
            };
            if Self::check_condition(rows.get(&key), condition).is_err() {
                return Err(ConditionalCheckFailed {
                    pk: write.pk().to_string(),
                    sk: write.sk().to_string(),
                }
                .into());
            }
        }

        for write in items {
            match write {
                WriteItem::Put { pk, sk, item, .. } => {
                    rows.insert((pk, sk), item);
                }
                WriteItem::Delete { pk, sk, .. } => {
                    rows.remove(&(pk, sk));
                }
                WriteItem::Increment {
                    pk, sk, field, delta, ..
                } => {
                    let key = (pk, sk);
                    let entry = rows.entry(key).or_default();
                    let current = entry.get(field).and_then(|v| v.as_i64()).unwrap_or(0);
                    entry.insert(field.to_string(), serde_json::json!(current + delta));
                }
            }
        }

        Ok(())
    }
}
