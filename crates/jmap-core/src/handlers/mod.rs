//! JMAP method handlers (C6–C8) — one module per method family, each a
//! thin layer over the stores and the transaction composer.

mod changes;
mod email_cleanup;
mod email_set;
mod get;
mod mailbox_set;

pub use changes::{handle_changes, ChangesRequest, ChangesResponse};
pub use email_cleanup::cleanup_destroyed_mailbox;
pub use email_set::{handle_email_set, EmailSetRequest, EmailSetResponse};
pub use get::{handle_email_get, handle_mailbox_get, handle_thread_get, GetResult};
pub use mailbox_set::{handle_mailbox_set, MailboxSetRequest, MailboxSetResponse};
