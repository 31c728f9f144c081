//! Domain models for the JMAP mail entities this engine owns

mod email;
mod mailbox;
mod state;
mod thread;

pub use email::{normalize_keyword, Email, EmailId, KEYWORD_SEEN};
pub use mailbox::{Mailbox, MailboxId, MailboxRole};
pub use state::{ChangeKind, ChangeRecord, ObjectType, StateValue};
pub use thread::{Thread, ThreadId};
