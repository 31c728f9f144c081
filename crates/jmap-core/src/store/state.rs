//! State & change-log store (C2)

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::keys;
use crate::models::{ChangeKind, ChangeRecord, ObjectType, StateValue};

use super::traits::{from_item, to_item, Condition, Item, SortDirection, Store, WriteItem};

/// A page of changes plus whether more exist beyond it (spec §4.8).
pub struct ChangesPage {
    pub records: Vec<ChangeRecord>,
    pub has_more: bool,
}

pub struct StateStore<'s> {
    store: &'s dyn Store,
    retention: Duration,
}

impl<'s> StateStore<'s> {
    pub fn new(store: &'s dyn Store, retention: Duration) -> Self {
        Self { store, retention }
    }

    fn counter_item(value: i64) -> Item {
        let mut item = Item::new();
        item.insert("value".to_string(), json!(value));
        item
    }

    /// Returns 0 if no state row exists: absence is semantically state 0.
    pub fn get_current_state(&self, account_id: &str, object_type: ObjectType) -> Result<StateValue> {
        let pk = keys::account_pk(account_id);
        let sk = keys::state_sk(object_type);
        let value = self
            .store
            .get_item(&pk, &sk)?
            .and_then(|item| item.get("value").and_then(|v| v.as_i64()))
            .unwrap_or(0);
        Ok(StateValue(value))
    }

    /// The state of the oldest surviving (non-expired) change record, or 0
    /// if none survive. Used by `/changes` to detect TTL-driven gaps.
    pub fn get_oldest_available_state(
        &self,
        account_id: &str,
        object_type: ObjectType,
    ) -> Result<StateValue> {
        let pk = keys::account_pk(account_id);
        let prefix = keys::change_sk_prefix(object_type);
        let now = Utc::now();

        for item in self
            .store
            .query(&pk, &prefix, None, SortDirection::Ascending)?
        {
            let record: ChangeRecord = from_item(&item)?;
            if record.expires_at > now {
                return Ok(record.state);
            }
        }
        Ok(StateValue(0))
    }

    /// Change records strictly greater than `since`, ascending, bounded by
    /// `max_changes`. Expired (TTL'd) records are skipped as if absent.
    pub fn query_changes(
        &self,
        account_id: &str,
        object_type: ObjectType,
        since: StateValue,
        max_changes: Option<usize>,
    ) -> Result<ChangesPage> {
        let pk = keys::account_pk(account_id);
        let prefix = keys::change_sk_prefix(object_type);
        let now = Utc::now();

        let all: Vec<ChangeRecord> = self
            .store
            .query(&pk, &prefix, None, SortDirection::Ascending)?
            .iter()
            .map(from_item)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|r| r.state > since && r.expires_at > now)
            .collect();

        match max_changes {
            Some(max) if all.len() > max => Ok(ChangesPage {
                records: all[..max].to_vec(),
                has_more: true,
            }),
            _ => Ok(ChangesPage {
                records: all,
                has_more: false,
            }),
        }
    }

    /// Build the two write items for a single-object state advance: the
    /// conditional counter increment, and the insert of its change record
    /// at `current + 1` (spec §4.2). Does not execute.
    pub fn build_state_change_items(
        &self,
        account_id: &str,
        object_type: ObjectType,
        current_state: StateValue,
        object_id: &str,
        kind: ChangeKind,
    ) -> Result<(StateValue, Vec<WriteItem>)> {
        self.build_state_change_items_multi(
            account_id,
            object_type,
            current_state,
            &[object_id.to_string()],
            kind,
        )
    }

    /// Build write items advancing the counter by `k = object_ids.len()`
    /// and emitting `k` change records at sequential states, all of the
    /// same `kind`. This is the only correct way to record "N objects
    /// changed in one transaction" (spec §4.2): `k` separate single calls
    /// would race on the same counter row.
    pub fn build_state_change_items_multi(
        &self,
        account_id: &str,
        object_type: ObjectType,
        current_state: StateValue,
        object_ids: &[String],
        kind: ChangeKind,
    ) -> Result<(StateValue, Vec<WriteItem>)> {
        let changes: Vec<(String, ChangeKind)> =
            object_ids.iter().map(|id| (id.clone(), kind)).collect();
        self.build_state_change_items_for_objects(account_id, object_type, current_state, &changes)
    }

    /// Generalisation of [`Self::build_state_change_items_multi`] for the
    /// case where each advancing object carries its own change kind —
    /// e.g. `Mailbox/set` processing a create, an update, and a destroy
    /// in the same call, all against the one `Mailbox` counter (spec
    /// §4.6: "each bumps `newState`"). A single `STATE` row cannot be
    /// `Put` twice in one transaction, so every object sharing a type
    /// must advance through one call to this function rather than one
    /// call per object.
    pub fn build_state_change_items_for_objects(
        &self,
        account_id: &str,
        object_type: ObjectType,
        current_state: StateValue,
        changes: &[(String, ChangeKind)],
    ) -> Result<(StateValue, Vec<WriteItem>)> {
        let pk = keys::account_pk(account_id);
        let k = changes.len() as i64;
        let new_state = current_state.advance_by(k);

        let counter_condition = if current_state.0 == 0 {
            Condition::NotExists
        } else {
            Condition::FieldEquals {
                field: "value",
                expected: current_state.0,
            }
        };

        let mut items = vec![WriteItem::Put {
            pk: pk.clone(),
            sk: keys::state_sk(object_type),
            item: Self::counter_item(new_state.0),
            condition: counter_condition,
        }];

        let now = Utc::now();
        let expires_at: DateTime<Utc> = now + self.retention;

        for (offset, (object_id, kind)) in changes.iter().enumerate() {
            let state = current_state.0 + offset as i64 + 1;
            let record = ChangeRecord {
                account_id: account_id.to_string(),
                object_type,
                state: StateValue(state),
                object_id: object_id.clone(),
                kind: *kind,
                created_at: now,
                expires_at,
            };
            items.push(WriteItem::Put {
                pk: pk.clone(),
                sk: keys::change_sk(object_type, state),
                item: to_item(&record)?,
                condition: Condition::NotExists,
            });
        }

        Ok((new_state, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn fresh() -> InMemoryStore {
        InMemoryStore::new()
    }

    #[test]
    fn current_state_defaults_to_zero() {
        let store = fresh();
        let state = StateStore::new(&store, Duration::days(7));
        let v = state.get_current_state("acc1", ObjectType::Email).unwrap();
        assert_eq!(v, StateValue(0));
    }

    #[test]
    fn single_change_advances_by_one() {
        let store = fresh();
        let state = StateStore::new(&store, Duration::days(7));
        let current = state.get_current_state("acc1", ObjectType::Email).unwrap();
        let (new_state, items) = state
            .build_state_change_items("acc1", ObjectType::Email, current, "e1", ChangeKind::Created)
            .unwrap();
        store.transact_write_items(items).unwrap();

        assert_eq!(new_state, StateValue(1));
        let after = state.get_current_state("acc1", ObjectType::Email).unwrap();
        assert_eq!(after, StateValue(1));
    }

    #[test]
    fn multi_change_advances_by_k_with_contiguous_states() {
        let store = fresh();
        let state = StateStore::new(&store, Duration::days(7));
        let current = state.get_current_state("acc1", ObjectType::Mailbox).unwrap();
        let ids = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];
        let (new_state, items) = state
            .build_state_change_items_multi(
                "acc1",
                ObjectType::Mailbox,
                current,
                &ids,
                ChangeKind::Updated,
            )
            .unwrap();
        store.transact_write_items(items).unwrap();
        assert_eq!(new_state, StateValue(3));

        let page = state
            .query_changes("acc1", ObjectType::Mailbox, StateValue(0), None)
            .unwrap();
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.records[0].state, StateValue(1));
        assert_eq!(page.records[2].state, StateValue(3));
        assert!(!page.has_more);
    }

    #[test]
    fn query_changes_respects_max_changes() {
        let store = fresh();
        let state = StateStore::new(&store, Duration::days(7));
        let mut current = state.get_current_state("acc1", ObjectType::Email).unwrap();
        for i in 0..3 {
            let (new_state, items) = state
                .build_state_change_items(
                    "acc1",
                    ObjectType::Email,
                    current,
                    &format!("e{i}"),
                    ChangeKind::Created,
                )
                .unwrap();
            store.transact_write_items(items).unwrap();
            current = new_state;
        }

        let page = state
            .query_changes("acc1", ObjectType::Email, StateValue(0), Some(1))
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.has_more);
    }

    #[test]
    fn concurrent_counter_update_is_rejected() {
        let store = fresh();
        let state = StateStore::new(&store, Duration::days(7));
        let current = state.get_current_state("acc1", ObjectType::Email).unwrap();

        let (_, items_a) = state
            .build_state_change_items("acc1", ObjectType::Email, current, "e1", ChangeKind::Created)
            .unwrap();
        let (_, items_b) = state
            .build_state_change_items("acc1", ObjectType::Email, current, "e2", ChangeKind::Created)
            .unwrap();

        store.transact_write_items(items_a).unwrap();
        // items_b was built against the stale `current`, so its counter
        // condition no longer holds.
        assert!(store.transact_write_items(items_b).is_err());
    }
}
