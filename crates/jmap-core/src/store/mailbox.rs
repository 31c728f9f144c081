//! Mailbox store (C3)

use anyhow::Result;

use crate::keys;
use crate::models::{Mailbox, MailboxId, MailboxRole};

use super::traits::{from_item, to_item, Condition, SortDirection, Store, WriteItem};

pub struct MailboxStore<'s> {
    store: &'s dyn Store,
}

impl<'s> MailboxStore<'s> {
    pub fn new(store: &'s dyn Store) -> Self {
        Self { store }
    }

    pub fn get(&self, account_id: &str, mailbox_id: &MailboxId) -> Result<Option<Mailbox>> {
        let pk = keys::account_pk(account_id);
        let sk = keys::mailbox_sk(mailbox_id.as_str());
        match self.store.get_item(&pk, &sk)? {
            Some(item) => Ok(Some(from_item(&item)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, account_id: &str, mailbox_id: &MailboxId) -> Result<bool> {
        Ok(self.get(account_id, mailbox_id)?.is_some())
    }

    pub fn list_all(&self, account_id: &str) -> Result<Vec<Mailbox>> {
        let pk = keys::account_pk(account_id);
        self.store
            .query(&pk, keys::mailbox_sk_prefix(), None, SortDirection::Ascending)?
            .iter()
            .map(from_item)
            .collect()
    }

    /// Whether some *other* mailbox already holds `role` (I5). `excluding`
    /// lets an update of the role-holder itself pass the check.
    pub fn role_taken(
        &self,
        account_id: &str,
        role: MailboxRole,
        excluding: Option<&MailboxId>,
    ) -> Result<bool> {
        let taken = self
            .list_all(account_id)?
            .into_iter()
            .any(|m| m.role == Some(role) && Some(&m.id) != excluding);
        Ok(taken)
    }

    pub fn build_create_mailbox_item(&self, account_id: &str, mailbox: &Mailbox) -> Result<WriteItem> {
        let pk = keys::account_pk(account_id);
        let sk = keys::mailbox_sk(mailbox.id.as_str());
        Ok(WriteItem::Put {
            pk,
            sk,
            item: to_item(mailbox)?,
            condition: Condition::NotExists,
        })
    }

    pub fn build_update_mailbox_item(&self, account_id: &str, mailbox: &Mailbox) -> Result<WriteItem> {
        let pk = keys::account_pk(account_id);
        let sk = keys::mailbox_sk(mailbox.id.as_str());
        Ok(WriteItem::Put {
            pk,
            sk,
            item: to_item(mailbox)?,
            condition: Condition::Exists,
        })
    }

    pub fn build_delete_mailbox_item(&self, account_id: &str, mailbox_id: &MailboxId) -> WriteItem {
        let pk = keys::account_pk(account_id);
        let sk = keys::mailbox_sk(mailbox_id.as_str());
        WriteItem::Delete {
            pk,
            sk,
            condition: Condition::Exists,
        }
    }

    /// Atomic `totalEmails += 1`, and `unreadEmails += 1` when
    /// `increment_unread` is true (the email lacked `$seen` before the
    /// change, spec §4.3).
    pub fn build_increment_counts_items(
        &self,
        account_id: &str,
        mailbox_id: &MailboxId,
        increment_unread: bool,
    ) -> Vec<WriteItem> {
        self.build_count_delta_items(account_id, mailbox_id, 1, increment_unread)
    }

    /// Atomic `totalEmails -= 1`, and `unreadEmails -= 1` when
    /// `decrement_unread` is true. Never clamps at zero: a result below
    /// zero means an invariant was already violated elsewhere and must
    /// surface, not be hidden (spec §4.3).
    pub fn build_decrement_counts_items(
        &self,
        account_id: &str,
        mailbox_id: &MailboxId,
        decrement_unread: bool,
    ) -> Vec<WriteItem> {
        self.build_count_delta_items(account_id, mailbox_id, -1, decrement_unread)
    }

    /// Atomic `unreadEmails += delta` only, with no accompanying
    /// `totalEmails` change — used when a keyword transition flips
    /// `$seen` presence without changing mailbox membership (spec §4.7).
    pub fn build_unread_delta_item(&self, account_id: &str, mailbox_id: &MailboxId, delta: i64) -> WriteItem {
        let pk = keys::account_pk(account_id);
        let sk = keys::mailbox_sk(mailbox_id.as_str());
        WriteItem::Increment {
            pk,
            sk,
            field: "unread_emails",
            delta,
            condition: Condition::Exists,
        }
    }

    fn build_count_delta_items(
        &self,
        account_id: &str,
        mailbox_id: &MailboxId,
        total_delta: i64,
        affect_unread: bool,
    ) -> Vec<WriteItem> {
        let pk = keys::account_pk(account_id);
        let sk = keys::mailbox_sk(mailbox_id.as_str());

        let mut items = vec![WriteItem::Increment {
            pk: pk.clone(),
            sk: sk.clone(),
            field: "total_emails",
            delta: total_delta,
            condition: Condition::Exists,
        }];

        if affect_unread {
            items.push(WriteItem::Increment {
                pk,
                sk,
                field: "unread_emails",
                delta: total_delta,
                condition: Condition::Exists,
            });
        }

        items
    }
}
