//! Best-effort email cleanup after `Mailbox/set destroy onDestroyRemoveEmails=true` (spec §4.6, §9)
//!
//! Not a single transaction: the set of affected emails can be unbounded
//! while transactions are bounded, so this walks them one at a time,
//! committing as it goes. A failure partway through leaves an
//! inconsistency the change-stream consumer (out of scope) or a sweeper
//! eventually reconciles — the alternative (refusing destroy of non-empty
//! mailboxes) was rejected as user-hostile.

use anyhow::Result;

use crate::keys;
use crate::models::{ChangeKind, MailboxId, ObjectType};
use crate::store::{EmailStore, SortDirection, StateStore, Store};

pub fn cleanup_destroyed_mailbox(
    store: &dyn Store,
    retention: chrono::Duration,
    account_id: &str,
    mailbox_id: &MailboxId,
) -> Result<()> {
    let email_store = EmailStore::new(store);
    let state_store = StateStore::new(store, retention);

    let pk = keys::account_pk(account_id);
    let rows = store.query(&pk, keys::email_sk_prefix(), None, SortDirection::Ascending)?;

    for row in rows {
        let email: crate::models::Email = match crate::store::traits::from_item(&row) {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !email.is_live() || !email.mailbox_ids.contains(mailbox_id) {
            continue;
        }

        let current_state = state_store.get_current_state(account_id, ObjectType::Email)?;

        if email.mailbox_ids.len() == 1 {
            let item = email_store.build_soft_delete_email_item(account_id, &email, chrono::Utc::now())?;
            let (_, state_items) = state_store.build_state_change_items(
                account_id,
                ObjectType::Email,
                current_state,
                email.id.as_str(),
                ChangeKind::Destroyed,
            )?;
            let mut items = vec![item];
            items.extend(state_items);
            if let Err(e) = store.transact_write_items(items) {
                log::warn!("cleanup: soft-delete of {} failed: {e:#}", email.id.as_str());
            }
        } else {
            let mut remaining = email.mailbox_ids.clone();
            remaining.remove(mailbox_id);
            let (_, _, mut items) =
                email_store.build_update_email_mailboxes_items(account_id, &email, remaining)?;
            let (_, state_items) = state_store.build_state_change_items(
                account_id,
                ObjectType::Email,
                current_state,
                email.id.as_str(),
                ChangeKind::Updated,
            )?;
            items.extend(state_items);
            if let Err(e) = store.transact_write_items(items) {
                log::warn!("cleanup: mailbox update of {} failed: {e:#}", email.id.as_str());
            }
        }
    }

    Ok(())
}
