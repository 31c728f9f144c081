//! `/get` handlers (C8) — `Mailbox/get`, `Email/get`, `Thread/get`
//!
//! Read-only; no mutation, no state change. `Thread/get`'s fan-out is the
//! only intra-handler parallelism in this engine (spec §5), grounded on
//! the teacher's `get_messages_batch_parallel` (`gmail/client.rs`): a
//! scoped `rayon` pool built fresh per call at the configured concurrency
//! cap, rather than the global rayon pool, since the cap
//! (`threadGetConcurrency`) is a request-scoped dial, not a process-wide one.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use rayon::prelude::*;

use crate::error::JmapError;
use crate::models::{Email, EmailId, Mailbox, MailboxId, Thread, ThreadId};
use crate::store::{EmailStore, MailboxStore, Store};

pub struct GetResult<T> {
    pub found: Vec<T>,
    pub not_found: Vec<String>,
}

pub fn handle_mailbox_get(
    store: &dyn Store,
    account_id: &str,
    ids: Option<Vec<String>>,
) -> std::result::Result<GetResult<Mailbox>, JmapError> {
    let mailbox_store = MailboxStore::new(store);

    let requested = match ids {
        Some(ids) => ids,
        None => mailbox_store
            .list_all(account_id)
            .map_err(log_server_fail)?
            .into_iter()
            .map(|m| m.id.as_str().to_string())
            .collect(),
    };

    let mut found = Vec::new();
    let mut not_found = Vec::new();
    for id in requested {
        match mailbox_store.get(account_id, &MailboxId::new(id.clone())).map_err(log_server_fail)? {
            Some(mailbox) => found.push(mailbox),
            None => not_found.push(id),
        }
    }

    Ok(GetResult { found, not_found })
}

pub fn handle_email_get(
    store: &dyn Store,
    account_id: &str,
    ids: Option<Vec<String>>,
) -> std::result::Result<GetResult<Email>, JmapError> {
    let email_store = EmailStore::new(store);

    let requested = match ids {
        Some(ids) => ids,
        None => {
            return Ok(GetResult {
                found: email_store.list_all(account_id).map_err(log_server_fail)?,
                not_found: Vec::new(),
            })
        }
    };

    let mut found = Vec::new();
    let mut not_found = Vec::new();

    for id in requested {
        match email_store.get(account_id, &EmailId::new(id.clone())).map_err(log_server_fail)? {
            Some(email) if email.is_live() => found.push(email),
            _ => not_found.push(id),
        }
    }

    Ok(GetResult { found, not_found })
}

pub fn handle_thread_get(
    store: &dyn Store,
    account_id: &str,
    ids: Vec<String>,
    concurrency: usize,
) -> std::result::Result<GetResult<Thread>, JmapError> {
    let email_store = EmailStore::new(store);
    let cancelled = AtomicBool::new(false);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .map_err(|e| {
            log::error!("failed to build Thread/get worker pool: {e}");
            JmapError::ServerFail
        })?;

    let results: Vec<Result<(String, Vec<Email>)>> = pool.install(|| {
        ids.par_iter()
            .map(|id| -> Result<(String, Vec<Email>)> {
                if cancelled.load(Ordering::Relaxed) {
                    anyhow::bail!("cancelled");
                }
                let emails = email_store
                    .find_by_thread_id(account_id, &ThreadId::new(id.clone()))
                    .inspect_err(|_| cancelled.store(true, Ordering::Relaxed))?;
                Ok((id.clone(), emails))
            })
            .collect()
    });

    let mut found = Vec::new();
    let mut not_found = Vec::new();

    for result in results {
        let (thread_id, emails) = result.map_err(|e| {
            log::error!("Thread/get fan-out failure: {e:#}");
            JmapError::ServerFail
        })?;

        let live_ids: Vec<EmailId> = emails.into_iter().filter(|e| e.is_live()).map(|e| e.id).collect();
        if live_ids.is_empty() {
            not_found.push(thread_id);
        } else {
            found.push(Thread {
                id: ThreadId::new(thread_id),
                email_ids: live_ids,
            });
        }
    }

    Ok(GetResult { found, not_found })
}

fn log_server_fail(err: anyhow::Error) -> JmapError {
    log::error!("get store failure: {err:#}");
    JmapError::ServerFail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MailboxRole;
    use crate::store::InMemoryStore;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn mailbox_get_with_null_ids_returns_all() {
        let store = InMemoryStore::new();
        let mailbox_store = MailboxStore::new(&store);
        let mailbox = Mailbox::new(MailboxId::new("inbox"), "Inbox", Some(MailboxRole::Inbox));
        store
            .transact_write_items(vec![mailbox_store.build_create_mailbox_item("acc1", &mailbox).unwrap()])
            .unwrap();

        let result = handle_mailbox_get(&store, "acc1", None).unwrap();
        assert_eq!(result.found.len(), 1);
        assert!(result.not_found.is_empty());
    }

    #[test]
    fn email_get_with_null_ids_returns_all_live_emails() {
        let store = InMemoryStore::new();
        let email_store = EmailStore::new(&store);

        let live = Email {
            id: EmailId::new("e1"),
            thread_id: ThreadId::new("t1"),
            blob_id: "b1".into(),
            body_structure: json!({}),
            mailbox_ids: BTreeSet::new(),
            keywords: BTreeSet::new(),
            received_at: Utc::now(),
            version: 1,
            deleted_at: None,
        };
        let mut gone = live.clone();
        gone.id = EmailId::new("e2");
        gone.deleted_at = Some(Utc::now());

        email_store.seed("acc1", &live).unwrap();
        email_store.seed("acc1", &gone).unwrap();

        let result = handle_email_get(&store, "acc1", None).unwrap();
        assert_eq!(result.found.len(), 1);
        assert_eq!(result.found[0].id, EmailId::new("e1"));
        assert!(result.not_found.is_empty());
    }

    #[test]
    fn mailbox_get_missing_id_is_not_found() {
        let store = InMemoryStore::new();
        let result = handle_mailbox_get(&store, "acc1", Some(vec!["ghost".into()])).unwrap();
        assert!(result.found.is_empty());
        assert_eq!(result.not_found, vec!["ghost".to_string()]);
    }

    #[test]
    fn thread_get_excludes_soft_deleted_emails() {
        let store = InMemoryStore::new();
        let email_store = EmailStore::new(&store);

        let live = Email {
            id: EmailId::new("e1"),
            thread_id: ThreadId::new("t1"),
            blob_id: "b1".into(),
            body_structure: json!({}),
            mailbox_ids: BTreeSet::new(),
            keywords: BTreeSet::new(),
            received_at: Utc::now(),
            version: 1,
            deleted_at: None,
        };
        let mut gone = live.clone();
        gone.id = EmailId::new("e2");
        gone.deleted_at = Some(Utc::now());

        email_store.seed("acc1", &live).unwrap();
        email_store.seed("acc1", &gone).unwrap();

        let result = handle_thread_get(&store, "acc1", vec!["t1".to_string()], 5).unwrap();
        assert_eq!(result.found.len(), 1);
        assert_eq!(result.found[0].email_ids, vec![EmailId::new("e1")]);
    }

    #[test]
    fn thread_get_reports_all_soft_deleted_thread_as_not_found() {
        let store = InMemoryStore::new();
        let email_store = EmailStore::new(&store);
        let mut gone = Email {
            id: EmailId::new("e1"),
            thread_id: ThreadId::new("t1"),
            blob_id: "b1".into(),
            body_structure: json!({}),
            mailbox_ids: BTreeSet::new(),
            keywords: BTreeSet::new(),
            received_at: Utc::now(),
            version: 1,
            deleted_at: None,
        };
        gone.deleted_at = Some(Utc::now());
        email_store.seed("acc1", &gone).unwrap();

        let result = handle_thread_get(&store, "acc1", vec!["t1".to_string()], 5).unwrap();
        assert!(result.found.is_empty());
        assert_eq!(result.not_found, vec!["t1".to_string()]);
    }
}
