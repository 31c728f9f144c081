//! Email store (C4)

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::keys;
use crate::models::{Email, EmailId, MailboxId, ThreadId};

use super::traits::{from_item, to_item, Condition, SortDirection, Store, WriteItem};

pub struct EmailStore<'s> {
    store: &'s dyn Store,
}

impl<'s> EmailStore<'s> {
    pub fn new(store: &'s dyn Store) -> Self {
        Self { store }
    }

    /// Returns `None` for a missing row. Callers treat `deletedAt != null`
    /// as not-found for mutation purposes (I6) but may still read it for
    /// cleanup decisions (spec §4.4).
    pub fn get(&self, account_id: &str, email_id: &EmailId) -> Result<Option<Email>> {
        let pk = keys::account_pk(account_id);
        let sk = keys::email_sk(email_id.as_str());
        match self.store.get_item(&pk, &sk)? {
            Some(item) => Ok(Some(from_item(&item)?)),
            None => Ok(None),
        }
    }

    /// Every live email in the account, for `Email/get ids=null` (spec
    /// §4.8 `[ADDED]`). Mirrors `MailboxStore::list_all`'s full prefix
    /// scan; soft-deleted rows are filtered here rather than left to the
    /// caller, matching how `get` already treats `deletedAt` as not-found
    /// for read purposes outside of cleanup.
    pub fn list_all(&self, account_id: &str) -> Result<Vec<Email>> {
        let pk = keys::account_pk(account_id);
        let emails: Vec<Email> = self
            .store
            .query(&pk, keys::email_sk_prefix(), None, SortDirection::Ascending)?
            .iter()
            .map(from_item)
            .collect::<Result<Vec<_>>>()?;
        Ok(emails.into_iter().filter(Email::is_live).collect())
    }

    /// All emails sharing `thread_id`, pre-sorted by `receivedAt`
    /// ascending. Callers filter out soft-deleted entries before exposing
    /// `emailIds` (spec §4.4).
    ///
    /// Membership rows (`THREAD#{tid}#EMAIL#{eid}`) are written once, by
    /// the (out-of-scope) import path, and never touched by mailbox
    /// membership updates — see `DESIGN.md` for why that's the reading of
    /// spec §4.4 this engine takes.
    pub fn find_by_thread_id(&self, account_id: &str, thread_id: &ThreadId) -> Result<Vec<Email>> {
        let pk = keys::account_pk(account_id);
        let prefix = keys::thread_membership_sk_prefix(thread_id.as_str());

        let mut emails = Vec::new();
        for item in self
            .store
            .query(&pk, &prefix, None, SortDirection::Ascending)?
        {
            let email_id = item
                .get("email_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("thread membership row missing email_id"))?;
            if let Some(email) = self.get(account_id, &EmailId::new(email_id))? {
                emails.push(email);
            }
        }

        emails.sort_by_key(|e| e.received_at);
        Ok(emails)
    }

    /// Diff `email`'s current `mailboxIds` against `new_mailbox_ids` and
    /// build the email-row update. Returns the added/removed mailbox ids
    /// so the caller can build the matching counter writes (spec §4.4).
    pub fn build_update_email_mailboxes_items(
        &self,
        account_id: &str,
        email: &Email,
        new_mailbox_ids: BTreeSet<MailboxId>,
    ) -> Result<(Vec<MailboxId>, Vec<MailboxId>, Vec<WriteItem>)> {
        let added: Vec<MailboxId> = new_mailbox_ids
            .difference(&email.mailbox_ids)
            .cloned()
            .collect();
        let removed: Vec<MailboxId> = email
            .mailbox_ids
            .difference(&new_mailbox_ids)
            .cloned()
            .collect();

        let mut updated = email.clone();
        updated.mailbox_ids = new_mailbox_ids;
        updated.version += 1;

        let pk = keys::account_pk(account_id);
        let sk = keys::email_sk(email.id.as_str());
        let item = WriteItem::Put {
            pk,
            sk,
            item: to_item(&updated)?,
            condition: Condition::FieldEquals {
                field: "version",
                expected: email.version,
            },
        };

        Ok((added, removed, vec![item]))
    }

    /// Build the email-row update for a keyword replacement. Generalized
    /// here to a compose form (returns a [`WriteItem`] rather than
    /// executing immediately): the handler needs to bundle this with the
    /// mailbox unread-counter writes and the `Email`/`Mailbox` state
    /// changes in one atomic transaction (spec §4.5), so a stand-alone
    /// execute-now round trip would break atomicity with those dependent
    /// writes. See `DESIGN.md`.
    pub fn build_update_email_keywords_item(
        &self,
        account_id: &str,
        email: &Email,
        new_keywords: BTreeSet<String>,
        expected_version: i64,
    ) -> Result<WriteItem> {
        let mut updated = email.clone();
        updated.keywords = new_keywords;
        updated.version += 1;

        let pk = keys::account_pk(account_id);
        let sk = keys::email_sk(email.id.as_str());
        Ok(WriteItem::Put {
            pk,
            sk,
            item: to_item(&updated)?,
            condition: Condition::FieldEquals {
                field: "version",
                expected: expected_version,
            },
        })
    }

    /// Build the email-row update that marks `email` soft-deleted,
    /// conditional on it still being at the version we last read (spec
    /// §4.4). Does not touch the thread-membership row: liveness is
    /// determined by `deletedAt`, not row presence.
    pub fn build_soft_delete_email_item(
        &self,
        account_id: &str,
        email: &Email,
        now: DateTime<Utc>,
    ) -> Result<WriteItem> {
        let mut updated = email.clone();
        updated.deleted_at = Some(now);
        updated.version += 1;

        let pk = keys::account_pk(account_id);
        let sk = keys::email_sk(email.id.as_str());
        Ok(WriteItem::Put {
            pk,
            sk,
            item: to_item(&updated)?,
            condition: Condition::FieldEquals {
                field: "version",
                expected: email.version,
            },
        })
    }

    /// Test/fixture-only helper standing in for the out-of-scope
    /// `Email/import` path: writes the email row and its thread
    /// membership row directly, bypassing the transaction composer.
    #[cfg(any(test, feature = "test-util"))]
    pub fn seed(&self, account_id: &str, email: &Email) -> Result<()> {
        let pk = keys::account_pk(account_id);
        self.store.put_item(
            &pk,
            &keys::email_sk(email.id.as_str()),
            to_item(email)?,
            Condition::None,
        )?;

        let mut membership = super::traits::Item::new();
        membership.insert(
            "email_id".to_string(),
            serde_json::json!(email.id.as_str()),
        );
        self.store.put_item(
            &pk,
            &keys::thread_membership_sk(email.thread_id.as_str(), email.id.as_str()),
            membership,
            Condition::None,
        )?;
        Ok(())
    }
}
