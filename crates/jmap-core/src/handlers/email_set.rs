//! `Email/set` handler (C7)

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;

use crate::error::JmapError;
use crate::models::{normalize_keyword, ChangeKind, Email, EmailId, KEYWORD_SEEN, MailboxId, ObjectType, StateValue};
use crate::store::{EmailStore, MailboxStore, StateStore, Store};
use crate::transaction::{with_retries, TransactionBuilder};

pub struct EmailSetRequest {
    pub account_id: String,
    pub if_in_state: Option<StateValue>,
    /// `create` is always rejected (spec §4.7: use `Email/import`).
    pub create: BTreeMap<String, Value>,
    /// email-id -> property patch.
    pub update: BTreeMap<String, Value>,
    pub destroy: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EmailSetResponse {
    pub old_state: StateValue,
    pub new_state: StateValue,
    pub updated: BTreeMap<String, Email>,
    pub destroyed: Vec<String>,
    pub not_created: BTreeMap<String, JmapError>,
    pub not_updated: BTreeMap<String, JmapError>,
    pub not_destroyed: BTreeMap<String, JmapError>,
}

pub fn handle_email_set(
    store: &dyn Store,
    retention: chrono::Duration,
    keyword_retry_limit: u32,
    destroy_retry_limit: u32,
    req: EmailSetRequest,
) -> std::result::Result<EmailSetResponse, JmapError> {
    let state_store = StateStore::new(store, retention);

    let old_state = state_store
        .get_current_state(&req.account_id, ObjectType::Email)
        .map_err(log_server_fail)?;

    if let Some(expected) = req.if_in_state {
        if expected != old_state {
            return Err(JmapError::StateMismatch);
        }
    }

    let mut resp = EmailSetResponse {
        old_state,
        new_state: old_state,
        ..Default::default()
    };

    for client_id in req.create.keys() {
        resp.not_created.insert(
            client_id.clone(),
            JmapError::Forbidden("Email/set create is not supported; use Email/import".into()),
        );
    }

    for (email_id, patch) in &req.update {
        match with_retries(keyword_retry_limit.max(1), || {
            attempt_update(store, retention, &req.account_id, email_id, patch)
        }) {
            Ok(email) => {
                resp.updated.insert(email_id.clone(), email);
            }
            Err(err) => {
                resp.not_updated.insert(email_id.clone(), classify(err));
            }
        }
    }

    for email_id in &req.destroy {
        match with_retries(destroy_retry_limit.max(1), || {
            attempt_destroy(store, retention, &req.account_id, email_id)
        }) {
            Ok(()) => resp.destroyed.push(email_id.clone()),
            Err(err) => {
                resp.not_destroyed.insert(email_id.clone(), classify(err));
            }
        }
    }

    resp.new_state = state_store
        .get_current_state(&req.account_id, ObjectType::Email)
        .map_err(log_server_fail)?;

    Ok(resp)
}

fn classify(err: anyhow::Error) -> JmapError {
    match err.downcast::<JmapError>() {
        Ok(e) => e,
        Err(e) => {
            log::error!("Email/set store failure: {e:#}");
            JmapError::ServerFail
        }
    }
}

fn log_server_fail(err: anyhow::Error) -> JmapError {
    log::error!("Email/set store failure: {err:#}");
    JmapError::ServerFail
}

#[derive(Default)]
struct EmailPatch {
    mailbox_ids_replacement: Option<BTreeSet<MailboxId>>,
    mailbox_patches: Vec<(MailboxId, bool)>,
    keywords_replacement: Option<BTreeSet<String>>,
    keyword_patches: Vec<(String, bool)>,
}

fn parse_email_patch(patch: &Value) -> std::result::Result<EmailPatch, JmapError> {
    let obj = patch
        .as_object()
        .ok_or_else(|| JmapError::InvalidProperties("patch must be an object".into()))?;

    let mut parsed = EmailPatch::default();

    for (key, value) in obj {
        if key == "mailboxIds" {
            parsed.mailbox_ids_replacement = Some(parse_id_set(value, MailboxId::new)?);
        } else if key == "keywords" {
            parsed.keywords_replacement = Some(parse_keyword_set(value)?);
        } else if let Some(rest) = key.strip_prefix("mailboxIds/") {
            if rest.contains('/') {
                return Err(JmapError::InvalidPatch(format!("nested pointer path: {key}")));
            }
            let add = pointer_value(value)?;
            parsed.mailbox_patches.push((MailboxId::new(rest), add));
        } else if let Some(rest) = key.strip_prefix("keywords/") {
            if rest.contains('/') {
                return Err(JmapError::InvalidPatch(format!("nested pointer path: {key}")));
            }
            let add = pointer_value(value)?;
            let normalized = normalize_keyword(rest)
                .ok_or_else(|| JmapError::InvalidProperties(format!("invalid keyword: {rest}")))?;
            parsed.keyword_patches.push((normalized, add));
        } else {
            return Err(JmapError::InvalidProperties(format!(
                "property not writable via Email/set: {key}"
            )));
        }
    }

    Ok(parsed)
}

fn pointer_value(value: &Value) -> std::result::Result<bool, JmapError> {
    match value {
        Value::Bool(true) => Ok(true),
        Value::Null => Ok(false),
        _ => Err(JmapError::InvalidPatch("pointer patch value must be true or null".into())),
    }
}

fn parse_id_set<T>(value: &Value, build: impl Fn(String) -> T) -> std::result::Result<BTreeSet<T>, JmapError>
where
    T: Ord,
{
    let obj = value
        .as_object()
        .ok_or_else(|| JmapError::InvalidProperties("expected an id-set object".into()))?;
    let mut set = BTreeSet::new();
    for (id, flag) in obj {
        if flag != &Value::Bool(true) {
            return Err(JmapError::InvalidProperties(format!("id-set value for {id} must be true")));
        }
        set.insert(build(id.clone()));
    }
    Ok(set)
}

fn parse_keyword_set(value: &Value) -> std::result::Result<BTreeSet<String>, JmapError> {
    let obj = value
        .as_object()
        .ok_or_else(|| JmapError::InvalidProperties("expected a keyword-set object".into()))?;
    let mut set = BTreeSet::new();
    for (keyword, flag) in obj {
        if flag != &Value::Bool(true) {
            return Err(JmapError::InvalidProperties(format!(
                "keyword-set value for {keyword} must be true"
            )));
        }
        let normalized = normalize_keyword(keyword)
            .ok_or_else(|| JmapError::InvalidProperties(format!("invalid keyword: {keyword}")))?;
        set.insert(normalized);
    }
    Ok(set)
}

fn attempt_update(
    store: &dyn Store,
    retention: chrono::Duration,
    account_id: &str,
    email_id: &str,
    patch: &Value,
) -> Result<Email> {
    let email_store = EmailStore::new(store);
    let mailbox_store = MailboxStore::new(store);
    let state_store = StateStore::new(store, retention);

    let email = email_store
        .get(account_id, &EmailId::new(email_id))?
        .ok_or(JmapError::NotFound)?;
    if !email.is_live() {
        return Err(JmapError::NotFound.into());
    }

    let parsed = parse_email_patch(patch)?;

    let mut new_mailbox_ids = email.mailbox_ids.clone();
    let mut mailbox_ids_changed = parsed.mailbox_ids_replacement.is_some();
    if let Some(replacement) = parsed.mailbox_ids_replacement {
        new_mailbox_ids = replacement;
    }
    for (id, add) in &parsed.mailbox_patches {
        mailbox_ids_changed = true;
        if *add {
            new_mailbox_ids.insert(id.clone());
        } else {
            new_mailbox_ids.remove(id);
        }
    }

    let mut new_keywords = email.keywords.clone();
    let mut keywords_changed = parsed.keywords_replacement.is_some();
    if let Some(replacement) = parsed.keywords_replacement {
        new_keywords = replacement;
    }
    for (kw, add) in &parsed.keyword_patches {
        keywords_changed = true;
        if *add {
            new_keywords.insert(kw.clone());
        } else {
            new_keywords.remove(kw);
        }
    }

    if mailbox_ids_changed && new_mailbox_ids.is_empty() {
        return Err(JmapError::InvalidProperties("mailboxIds must not be empty".into()).into());
    }
    if !mailbox_ids_changed && !keywords_changed {
        return Err(JmapError::InvalidArguments("patch changed nothing".into()).into());
    }

    let mut builder = TransactionBuilder::new();
    let mut affected_mailboxes: BTreeSet<MailboxId> = BTreeSet::new();
    let was_unread = email.is_unread();

    if mailbox_ids_changed {
        for id in &new_mailbox_ids {
            if !mailbox_store.exists(account_id, id)? {
                return Err(
                    JmapError::InvalidProperties(format!("mailbox does not exist: {}", id.as_str())).into(),
                );
            }
        }

        let (added, removed, items) =
            email_store.build_update_email_mailboxes_items(account_id, &email, new_mailbox_ids.clone())?;
        builder.add_data_many(items);
        for id in &added {
            builder.add_counters(mailbox_store.build_increment_counts_items(account_id, id, was_unread));
            affected_mailboxes.insert(id.clone());
        }
        for id in &removed {
            builder.add_counters(mailbox_store.build_decrement_counts_items(account_id, id, was_unread));
            affected_mailboxes.insert(id.clone());
        }
    }

    if keywords_changed {
        let is_unread_after = !new_keywords.contains(KEYWORD_SEEN);
        let item =
            email_store.build_update_email_keywords_item(account_id, &email, new_keywords, email.version)?;
        builder.add_data(item);

        if was_unread != is_unread_after {
            let delta = if is_unread_after { 1 } else { -1 };
            let membership = if mailbox_ids_changed {
                new_mailbox_ids.clone()
            } else {
                email.mailbox_ids.clone()
            };
            for id in &membership {
                builder.add_counter(mailbox_store.build_unread_delta_item(account_id, id, delta));
                affected_mailboxes.insert(id.clone());
            }
        }
    }

    let email_current_state = state_store.get_current_state(account_id, ObjectType::Email)?;
    let (_, email_state_items) = state_store.build_state_change_items(
        account_id,
        ObjectType::Email,
        email_current_state,
        email_id,
        ChangeKind::Updated,
    )?;
    builder.add_state_change(email_state_items);

    if !affected_mailboxes.is_empty() {
        let mailbox_current_state = state_store.get_current_state(account_id, ObjectType::Mailbox)?;
        let ids: Vec<String> = affected_mailboxes.iter().map(|id| id.as_str().to_string()).collect();
        let (_, mailbox_state_items) = state_store.build_state_change_items_multi(
            account_id,
            ObjectType::Mailbox,
            mailbox_current_state,
            &ids,
            ChangeKind::Updated,
        )?;
        builder.add_state_change(mailbox_state_items);
    }

    let items = builder.build().map_err(anyhow::Error::new)?;
    store.transact_write_items(items)?;

    log::info!("Email/set updated {email_id}");
    email_store
        .get(account_id, &EmailId::new(email_id))?
        .ok_or_else(|| anyhow::anyhow!("email vanished immediately after update"))
}

fn attempt_destroy(store: &dyn Store, retention: chrono::Duration, account_id: &str, email_id: &str) -> Result<()> {
    let email_store = EmailStore::new(store);
    let mailbox_store = MailboxStore::new(store);
    let state_store = StateStore::new(store, retention);

    let email = email_store
        .get(account_id, &EmailId::new(email_id))?
        .ok_or(JmapError::NotFound)?;
    if !email.is_live() {
        return Err(JmapError::NotFound.into());
    }

    let mut builder = TransactionBuilder::new();
    let was_unread = email.is_unread();

    let soft_delete_item = email_store.build_soft_delete_email_item(account_id, &email, Utc::now())?;
    builder.add_data(soft_delete_item);

    for id in &email.mailbox_ids {
        builder.add_counters(mailbox_store.build_decrement_counts_items(account_id, id, was_unread));
    }

    let email_current_state = state_store.get_current_state(account_id, ObjectType::Email)?;
    let (_, email_state_items) = state_store.build_state_change_items(
        account_id,
        ObjectType::Email,
        email_current_state,
        email_id,
        ChangeKind::Destroyed,
    )?;
    builder.add_state_change(email_state_items);

    if !email.mailbox_ids.is_empty() {
        let mailbox_current_state = state_store.get_current_state(account_id, ObjectType::Mailbox)?;
        let ids: Vec<String> = email.mailbox_ids.iter().map(|id| id.as_str().to_string()).collect();
        let (_, mailbox_state_items) = state_store.build_state_change_items_multi(
            account_id,
            ObjectType::Mailbox,
            mailbox_current_state,
            &ids,
            ChangeKind::Updated,
        )?;
        builder.add_state_change(mailbox_state_items);
    }

    let thread_current_state = state_store.get_current_state(account_id, ObjectType::Thread)?;
    let (_, thread_state_items) = state_store.build_state_change_items(
        account_id,
        ObjectType::Thread,
        thread_current_state,
        email.thread_id.as_str(),
        ChangeKind::Updated,
    )?;
    builder.add_state_change(thread_state_items);

    let items = builder.build().map_err(anyhow::Error::new)?;
    store.transact_write_items(items)?;
    log::info!("Email/set destroyed {email_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mailbox, MailboxRole};
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn retention() -> chrono::Duration {
        chrono::Duration::days(7)
    }

    fn seed_mailbox(store: &InMemoryStore, account_id: &str, id: &str) -> Mailbox {
        let mailbox_store = MailboxStore::new(store);
        let mailbox = Mailbox::new(MailboxId::new(id), id, None);
        store
            .transact_write_items(vec![mailbox_store.build_create_mailbox_item(account_id, &mailbox).unwrap()])
            .unwrap();
        mailbox
    }

    fn seed_email(store: &InMemoryStore, account_id: &str, id: &str, mailbox_id: &str) -> Email {
        let email_store = EmailStore::new(store);
        let mailbox_store = MailboxStore::new(store);
        let email = Email {
            id: EmailId::new(id),
            thread_id: "t1".into(),
            blob_id: "b1".into(),
            body_structure: json!({}),
            mailbox_ids: [MailboxId::new(mailbox_id)].into_iter().collect(),
            keywords: BTreeSet::new(),
            received_at: Utc::now(),
            version: 1,
            deleted_at: None,
        };
        email_store.seed(account_id, &email).unwrap();
        store
            .transact_write_items(mailbox_store.build_increment_counts_items(account_id, &MailboxId::new(mailbox_id), true))
            .unwrap();
        email
    }

    #[test]
    fn move_email_between_mailboxes_updates_counters() {
        let store = InMemoryStore::new();
        seed_mailbox(&store, "acc1", "inbox");
        seed_mailbox(&store, "acc1", "archive");
        seed_email(&store, "acc1", "e1", "inbox");

        let mut update = BTreeMap::new();
        update.insert("e1".to_string(), json!({"mailboxIds": {"archive": true}}));

        let resp = handle_email_set(
            &store,
            retention(),
            3,
            3,
            EmailSetRequest {
                account_id: "acc1".into(),
                if_in_state: None,
                create: BTreeMap::new(),
                update,
                destroy: Vec::new(),
            },
        )
        .unwrap();

        assert!(resp.updated.contains_key("e1"));
        let mailbox_store = MailboxStore::new(&store);
        let inbox = mailbox_store.get("acc1", &MailboxId::new("inbox")).unwrap().unwrap();
        let archive = mailbox_store.get("acc1", &MailboxId::new("archive")).unwrap().unwrap();
        assert_eq!(inbox.total_emails, 0);
        assert_eq!(archive.total_emails, 1);
        assert_eq!(archive.unread_emails, 1);
    }

    #[test]
    fn create_is_always_forbidden() {
        let store = InMemoryStore::new();
        let mut create = BTreeMap::new();
        create.insert("c0".to_string(), json!({}));
        let resp = handle_email_set(
            &store,
            retention(),
            3,
            3,
            EmailSetRequest {
                account_id: "acc1".into(),
                if_in_state: None,
                create,
                update: BTreeMap::new(),
                destroy: Vec::new(),
            },
        )
        .unwrap();
        assert!(matches!(resp.not_created["c0"], JmapError::Forbidden(_)));
    }

    #[test]
    fn destroy_decrements_both_mailboxes() {
        let store = InMemoryStore::new();
        seed_mailbox(&store, "acc1", "inbox");
        seed_mailbox(&store, "acc1", "archive");
        let email_store = EmailStore::new(&store);
        let mailbox_store = MailboxStore::new(&store);
        let email = Email {
            id: EmailId::new("e1"),
            thread_id: "t1".into(),
            blob_id: "b1".into(),
            body_structure: json!({}),
            mailbox_ids: [MailboxId::new("inbox"), MailboxId::new("archive")].into_iter().collect(),
            keywords: BTreeSet::new(),
            received_at: Utc::now(),
            version: 1,
            deleted_at: None,
        };
        email_store.seed("acc1", &email).unwrap();
        store
            .transact_write_items(mailbox_store.build_increment_counts_items("acc1", &MailboxId::new("inbox"), true))
            .unwrap();
        store
            .transact_write_items(mailbox_store.build_increment_counts_items("acc1", &MailboxId::new("archive"), true))
            .unwrap();

        let resp = handle_email_set(
            &store,
            retention(),
            3,
            3,
            EmailSetRequest {
                account_id: "acc1".into(),
                if_in_state: None,
                create: BTreeMap::new(),
                update: BTreeMap::new(),
                destroy: vec!["e1".to_string()],
            },
        )
        .unwrap();

        assert_eq!(resp.destroyed, vec!["e1".to_string()]);
        let inbox = mailbox_store.get("acc1", &MailboxId::new("inbox")).unwrap().unwrap();
        let archive = mailbox_store.get("acc1", &MailboxId::new("archive")).unwrap().unwrap();
        assert_eq!(inbox.total_emails, 0);
        assert_eq!(archive.total_emails, 0);
        let after = email_store.get("acc1", &EmailId::new("e1")).unwrap().unwrap();
        assert!(!after.is_live());
    }

    #[test]
    fn keyword_with_invalid_character_is_invalid_properties() {
        let store = InMemoryStore::new();
        seed_mailbox(&store, "acc1", "inbox");
        seed_email(&store, "acc1", "e1", "inbox");

        // No percent-decoding happens anywhere in this codebase, so this is
        // a literal `%` in the keyword name, not an encoded `/` — rejected
        // by `normalize_keyword`'s character set, not the nested-path guard.
        let mut update = BTreeMap::new();
        update.insert("e1".to_string(), json!({"keywords/foo%2Fbar": true}));
        let resp = handle_email_set(
            &store,
            retention(),
            3,
            3,
            EmailSetRequest {
                account_id: "acc1".into(),
                if_in_state: None,
                create: BTreeMap::new(),
                update,
                destroy: Vec::new(),
            },
        )
        .unwrap();
        assert!(matches!(resp.not_updated["e1"], JmapError::InvalidProperties(_)));
    }

    #[test]
    fn keyword_pointer_with_nested_slash_is_invalid_patch() {
        let store = InMemoryStore::new();
        seed_mailbox(&store, "acc1", "inbox");
        seed_email(&store, "acc1", "e1", "inbox");

        let mut update = BTreeMap::new();
        update.insert("e1".to_string(), json!({"keywords/foo/bar": true}));
        let resp = handle_email_set(
            &store,
            retention(),
            3,
            3,
            EmailSetRequest {
                account_id: "acc1".into(),
                if_in_state: None,
                create: BTreeMap::new(),
                update,
                destroy: Vec::new(),
            },
        )
        .unwrap();
        assert!(matches!(resp.not_updated["e1"], JmapError::InvalidPatch(_)));
    }

    #[test]
    fn empty_mailbox_ids_after_patch_is_rejected() {
        let store = InMemoryStore::new();
        seed_mailbox(&store, "acc1", "inbox");
        seed_email(&store, "acc1", "e1", "inbox");

        let mut update = BTreeMap::new();
        update.insert("e1".to_string(), json!({"mailboxIds/inbox": null}));
        let resp = handle_email_set(
            &store,
            retention(),
            3,
            3,
            EmailSetRequest {
                account_id: "acc1".into(),
                if_in_state: None,
                create: BTreeMap::new(),
                update,
                destroy: Vec::new(),
            },
        )
        .unwrap();
        assert!(matches!(resp.not_updated["e1"], JmapError::InvalidProperties(_)));
    }

    #[test]
    fn concurrent_keyword_updates_both_commit() {
        let store = InMemoryStore::new();
        seed_mailbox(&store, "acc1", "inbox");
        seed_email(&store, "acc1", "e1", "inbox");

        let mut update_seen = BTreeMap::new();
        update_seen.insert("e1".to_string(), json!({"keywords/$seen": true}));
        let resp_a = handle_email_set(
            &store,
            retention(),
            3,
            3,
            EmailSetRequest {
                account_id: "acc1".into(),
                if_in_state: None,
                create: BTreeMap::new(),
                update: update_seen,
                destroy: Vec::new(),
            },
        )
        .unwrap();
        assert!(resp_a.updated.contains_key("e1"));

        let mut update_flagged = BTreeMap::new();
        update_flagged.insert("e1".to_string(), json!({"keywords/flagged": true}));
        let resp_b = handle_email_set(
            &store,
            retention(),
            3,
            3,
            EmailSetRequest {
                account_id: "acc1".into(),
                if_in_state: None,
                create: BTreeMap::new(),
                update: update_flagged,
                destroy: Vec::new(),
            },
        )
        .unwrap();
        assert!(resp_b.updated.contains_key("e1"));

        let email_store = EmailStore::new(&store);
        let final_email = email_store.get("acc1", &EmailId::new("e1")).unwrap().unwrap();
        assert!(final_email.keywords.contains("$seen"));
        assert!(final_email.keywords.contains("flagged"));

        let state_store = StateStore::new(&store, retention());
        let state = state_store.get_current_state("acc1", ObjectType::Email).unwrap();
        assert_eq!(state, StateValue(2));
    }
}
