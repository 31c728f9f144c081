//! `Mailbox/set` handler (C6)

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::JmapError;
use crate::models::{ChangeKind, Mailbox, MailboxId, MailboxRole, ObjectType, StateValue};
use crate::store::{MailboxStore, StateStore, Store};
use crate::transaction::TransactionBuilder;

pub struct MailboxSetRequest {
    pub account_id: String,
    pub if_in_state: Option<StateValue>,
    /// client-id -> create properties (JMAP `create` map).
    pub create: BTreeMap<String, Value>,
    /// mailbox-id -> property patch.
    pub update: BTreeMap<String, Value>,
    pub destroy: Vec<String>,
    pub on_destroy_remove_emails: bool,
}

#[derive(Debug, Default)]
pub struct MailboxSetResponse {
    pub old_state: StateValue,
    pub new_state: StateValue,
    pub created: BTreeMap<String, Mailbox>,
    pub updated: BTreeMap<String, Mailbox>,
    pub destroyed: Vec<String>,
    pub not_created: BTreeMap<String, JmapError>,
    pub not_updated: BTreeMap<String, JmapError>,
    pub not_destroyed: BTreeMap<String, JmapError>,
}

pub fn handle_mailbox_set(
    store: &dyn Store,
    retention: chrono::Duration,
    req: MailboxSetRequest,
) -> std::result::Result<MailboxSetResponse, JmapError> {
    let mailbox_store = MailboxStore::new(store);
    let state_store = StateStore::new(store, retention);

    let old_state = state_store
        .get_current_state(&req.account_id, ObjectType::Mailbox)
        .map_err(log_server_fail)?;

    if let Some(expected) = req.if_in_state {
        if expected != old_state {
            return Err(JmapError::StateMismatch);
        }
    }

    let mut resp = MailboxSetResponse {
        old_state,
        new_state: old_state,
        ..Default::default()
    };

    let mut builder = TransactionBuilder::new();
    let mut changes: Vec<(String, ChangeKind)> = Vec::new();
    // (client_id or None for update/destroy, mailbox)
    let mut created_preview: Vec<(String, Mailbox)> = Vec::new();
    let mut updated_preview: Vec<Mailbox> = Vec::new();
    let mut cleanup_targets: Vec<(MailboxId, bool)> = Vec::new(); // (id, had_emails)

    for (client_id, props) in &req.create {
        match prepare_create(&mailbox_store, &req.account_id, props) {
            Ok(mailbox) => {
                let item = match mailbox_store.build_create_mailbox_item(&req.account_id, &mailbox) {
                    Ok(item) => item,
                    Err(e) => {
                        resp.not_created
                            .insert(client_id.clone(), JmapError::InvalidArguments(e.to_string()));
                        continue;
                    }
                };
                builder.add_data(item);
                changes.push((mailbox.id.as_str().to_string(), ChangeKind::Created));
                created_preview.push((client_id.clone(), mailbox));
            }
            Err(e) => {
                resp.not_created.insert(client_id.clone(), e);
            }
        }
    }

    for (mailbox_id, patch) in &req.update {
        let id = MailboxId::new(mailbox_id.clone());
        let current = match mailbox_store.get(&req.account_id, &id) {
            Ok(Some(m)) => m,
            Ok(None) => {
                resp.not_updated.insert(mailbox_id.clone(), JmapError::NotFound);
                continue;
            }
            Err(e) => {
                resp.not_updated.insert(mailbox_id.clone(), log_item_fail(e));
                continue;
            }
        };

        match apply_mailbox_patch(current, patch) {
            Ok(updated) => {
                let item = match mailbox_store.build_update_mailbox_item(&req.account_id, &updated) {
                    Ok(item) => item,
                    Err(e) => {
                        resp.not_updated
                            .insert(mailbox_id.clone(), JmapError::InvalidArguments(e.to_string()));
                        continue;
                    }
                };
                builder.add_data(item);
                changes.push((mailbox_id.clone(), ChangeKind::Updated));
                updated_preview.push(updated);
            }
            Err(e) => {
                resp.not_updated.insert(mailbox_id.clone(), e);
            }
        }
    }

    for mailbox_id in &req.destroy {
        let id = MailboxId::new(mailbox_id.clone());
        let current = match mailbox_store.get(&req.account_id, &id) {
            Ok(Some(m)) => m,
            Ok(None) => {
                resp.not_destroyed.insert(mailbox_id.clone(), JmapError::NotFound);
                continue;
            }
            Err(e) => {
                resp.not_destroyed.insert(mailbox_id.clone(), log_item_fail(e));
                continue;
            }
        };

        if current.total_emails > 0 && !req.on_destroy_remove_emails {
            resp.not_destroyed
                .insert(mailbox_id.clone(), JmapError::MailboxHasEmail);
            continue;
        }

        builder.add_data(mailbox_store.build_delete_mailbox_item(&req.account_id, &id));
        changes.push((mailbox_id.clone(), ChangeKind::Destroyed));
        if current.total_emails > 0 {
            cleanup_targets.push((id, true));
        }
        resp.destroyed.push(mailbox_id.clone());
    }

    if !changes.is_empty() {
        let (new_state, state_items) = state_store
            .build_state_change_items_for_objects(&req.account_id, ObjectType::Mailbox, old_state, &changes)
            .map_err(log_server_fail)?;
        builder.add_state_change(state_items);
        resp.new_state = new_state;

        let items = builder.build()?;
        store
            .transact_write_items(items)
            .map_err(log_server_fail)?;

        log::info!(
            "Mailbox/set committed: {} created, {} updated, {} destroyed",
            created_preview.len(),
            updated_preview.len(),
            resp.destroyed.len()
        );

        for (client_id, mailbox) in created_preview {
            resp.created.insert(client_id, mailbox);
        }
        for mailbox in updated_preview {
            resp.updated.insert(mailbox.id.as_str().to_string(), mailbox);
        }
    } else {
        // Nothing committed; undo the tentative destroy bookkeeping.
        resp.destroyed.clear();
    }

    // Best-effort cleanup: walk emails of each destroyed, non-empty mailbox.
    // Failures here are non-fatal (spec §4.6, §9): the mailbox row is
    // already gone, and the change-stream consumer reconciles.
    for (mailbox_id, _) in cleanup_targets {
        if let Err(e) = super::email_cleanup::cleanup_destroyed_mailbox(store, retention, &req.account_id, &mailbox_id) {
            log::warn!("post-destroy email cleanup failed for {}: {e:#}", mailbox_id.as_str());
        }
    }

    Ok(resp)
}

fn prepare_create(
    mailbox_store: &MailboxStore<'_>,
    account_id: &str,
    props: &Value,
) -> std::result::Result<Mailbox, JmapError> {
    let obj = props
        .as_object()
        .ok_or_else(|| JmapError::InvalidProperties("create body must be an object".into()))?;

    if obj.get("parentId").is_some_and(|v| !v.is_null()) {
        return Err(JmapError::InvalidProperties("parentId is not supported (flat hierarchy)".into()));
    }

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| JmapError::InvalidProperties("name is required".into()))?;

    let role = match obj.get("role") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(
            MailboxRole::parse(s).ok_or_else(|| JmapError::InvalidProperties(format!("unknown role: {s}")))?,
        ),
        Some(_) => return Err(JmapError::InvalidProperties("role must be a string".into())),
    };

    if let Some(role) = role {
        if mailbox_store
            .role_taken(account_id, role, None)
            .map_err(|e| JmapError::InvalidArguments(e.to_string()))?
        {
            return Err(JmapError::InvalidProperties(format!("role already in use: {}", role.as_str())));
        }
    }

    let id = match role {
        Some(role) => MailboxId::new(role.as_str()),
        None => MailboxId::new(Uuid::new_v4().to_string()),
    };

    let mut mailbox = Mailbox::new(id, name, role);
    if let Some(sort_order) = obj.get("sortOrder").and_then(Value::as_u64) {
        mailbox.sort_order = sort_order as u32;
    }
    if let Some(is_subscribed) = obj.get("isSubscribed").and_then(Value::as_bool) {
        mailbox.is_subscribed = is_subscribed;
    }

    Ok(mailbox)
}

fn apply_mailbox_patch(mut mailbox: Mailbox, patch: &Value) -> std::result::Result<Mailbox, JmapError> {
    let obj = patch
        .as_object()
        .ok_or_else(|| JmapError::InvalidProperties("update patch must be an object".into()))?;

    if obj.get("parentId").is_some_and(|v| !v.is_null()) {
        return Err(JmapError::InvalidProperties("parentId is not supported (flat hierarchy)".into()));
    }

    if let Some(name) = obj.get("name").and_then(Value::as_str) {
        mailbox.name = name.to_string();
    }
    if let Some(sort_order) = obj.get("sortOrder").and_then(Value::as_u64) {
        mailbox.sort_order = sort_order as u32;
    }
    if let Some(is_subscribed) = obj.get("isSubscribed").and_then(Value::as_bool) {
        mailbox.is_subscribed = is_subscribed;
    }
    mailbox.updated_at = Utc::now();

    Ok(mailbox)
}

fn log_server_fail(err: anyhow::Error) -> JmapError {
    log::error!("Mailbox/set store failure: {err:#}");
    JmapError::ServerFail
}

fn log_item_fail(err: anyhow::Error) -> JmapError {
    log::error!("Mailbox/set per-item read failure: {err:#}");
    JmapError::ServerFail
}
