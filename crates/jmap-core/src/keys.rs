//! Key schema & codec (C1)
//!
//! The single source of truth for the store's partition-key/sort-key
//! layout (spec §4.1). No other module builds sort keys by hand.

use crate::models::ObjectType;

/// Change-log states are zero-padded to this many decimal digits so that
/// lexicographic sort-key order matches numeric order (spec §3, §4.2).
/// This is the only supported width: it caps counters at ~10^10 per type.
pub const CHANGE_STATE_WIDTH: usize = 10;

pub fn account_pk(account_id: &str) -> String {
    format!("ACCOUNT#{account_id}")
}

pub fn mailbox_sk(mailbox_id: &str) -> String {
    format!("MAILBOX#{mailbox_id}")
}

/// Prefix shared by every mailbox row, for range-scanning all mailboxes
/// in an account.
pub fn mailbox_sk_prefix() -> &'static str {
    "MAILBOX#"
}

pub fn email_sk(email_id: &str) -> String {
    format!("EMAIL#{email_id}")
}

pub fn email_sk_prefix() -> &'static str {
    "EMAIL#"
}

pub fn thread_membership_sk(thread_id: &str, email_id: &str) -> String {
    format!("THREAD#{thread_id}#EMAIL#{email_id}")
}

pub fn thread_membership_sk_prefix(thread_id: &str) -> String {
    format!("THREAD#{thread_id}#EMAIL#")
}

pub fn state_sk(object_type: ObjectType) -> String {
    format!("STATE#{}", object_type.sort_key_tag())
}

/// Zero-pad a state value so that sort-key order matches numeric order.
pub fn pad_state(state: i64) -> String {
    format!("{:0width$}", state, width = CHANGE_STATE_WIDTH)
}

pub fn change_sk(object_type: ObjectType, state: i64) -> String {
    format!(
        "CHANGE#{}#{}",
        object_type.sort_key_tag(),
        pad_state(state)
    )
}

/// Prefix shared by every change row of one type, for range-scanning the
/// change log.
pub fn change_sk_prefix(object_type: ObjectType) -> String {
    format!("CHANGE#{}#", object_type.sort_key_tag())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_state_sorts_lexicographically() {
        let a = change_sk(ObjectType::Email, 9);
        let b = change_sk(ObjectType::Email, 10);
        assert!(a < b, "{a} should sort before {b}");
    }

    #[test]
    fn keys_are_scoped_by_type() {
        let email_sk = change_sk(ObjectType::Email, 1);
        let mailbox_sk = change_sk(ObjectType::Mailbox, 1);
        assert_ne!(email_sk, mailbox_sk);
    }

    #[test]
    fn mailbox_sk_is_stable_for_same_id() {
        assert_eq!(mailbox_sk("inbox"), mailbox_sk("inbox"));
        assert_ne!(mailbox_sk("inbox"), mailbox_sk("archive"));
    }
}
