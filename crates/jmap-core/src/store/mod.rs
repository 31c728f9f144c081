//! Storage abstraction layer
//!
//! `traits` defines the primitives an external DynamoDB-style store must
//! provide (spec §6); `memory` is the in-memory reference implementation
//! used by every test; `state`, `mailbox`, `email` are C2–C4, the
//! type-specific stores built on top of `traits::Store`.

mod email;
mod mailbox;
mod memory;
mod state;
pub mod traits;

pub use email::EmailStore;
pub use mailbox::MailboxStore;
pub use memory::InMemoryStore;
pub use state::StateStore;
pub use traits::{Condition, ConditionalCheckFailed, Item, SortDirection, Store, WriteItem};
