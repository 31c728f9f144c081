//! `/changes` handlers (C8) — `Mailbox/changes`, `Email/changes`, `Thread/changes`

use std::collections::BTreeMap;

use crate::error::JmapError;
use crate::models::{ChangeKind, ObjectType, StateValue};
use crate::store::{StateStore, Store};

pub struct ChangesRequest {
    pub account_id: String,
    pub since_state: Option<StateValue>,
    pub max_changes: Option<usize>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangesResponse {
    pub old_state: StateValue,
    pub new_state: StateValue,
    pub has_more_changes: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub destroyed: Vec<String>,
}

/// Shared implementation for `Mailbox/changes`, `Email/changes`,
/// `Thread/changes` — they differ only in which [`ObjectType`]'s counter
/// and change log they read (spec §4.8).
pub fn handle_changes(
    store: &dyn Store,
    retention: chrono::Duration,
    object_type: ObjectType,
    req: ChangesRequest,
) -> std::result::Result<ChangesResponse, JmapError> {
    let state_store = StateStore::new(store, retention);

    let since_state = req.since_state.ok_or(JmapError::CannotCalculateChanges)?;

    let current_state = state_store
        .get_current_state(&req.account_id, object_type)
        .map_err(log_server_fail)?;
    let oldest_available = state_store
        .get_oldest_available_state(&req.account_id, object_type)
        .map_err(log_server_fail)?;

    if since_state > current_state {
        return Err(JmapError::CannotCalculateChanges);
    }
    // `oldest_available == 0` means no change record has ever aged out;
    // anything is still recoverable from state 0 forward.
    if oldest_available.0 > 0 && since_state < oldest_available {
        return Err(JmapError::CannotCalculateChanges);
    }

    let page = state_store
        .query_changes(&req.account_id, object_type, since_state, req.max_changes)
        .map_err(log_server_fail)?;

    // Deduplicate by object-id, keeping the last change kind seen.
    let mut by_id: BTreeMap<String, ChangeKind> = BTreeMap::new();
    for record in &page.records {
        by_id.insert(record.object_id.clone(), record.kind);
    }

    let mut resp = ChangesResponse {
        old_state: since_state,
        new_state: page
            .records
            .last()
            .map(|r| r.state)
            .unwrap_or(current_state),
        has_more_changes: page.has_more,
        ..Default::default()
    };

    for (object_id, kind) in by_id {
        match kind {
            ChangeKind::Created => resp.created.push(object_id),
            ChangeKind::Updated => resp.updated.push(object_id),
            ChangeKind::Destroyed => resp.destroyed.push(object_id),
        }
    }

    Ok(resp)
}

fn log_server_fail(err: anyhow::Error) -> JmapError {
    log::error!("changes store failure: {err:#}");
    JmapError::ServerFail
}
