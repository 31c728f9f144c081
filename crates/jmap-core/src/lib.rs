//! jmap-core - A JMAP mail state engine (RFC 8620/8621 subset)
//!
//! This crate implements the storage-facing half of a JMAP mail server:
//! the `Mailbox`/`Email`/`Thread` data model, a DynamoDB-style store
//! abstraction, the transaction composer that keeps counters, rows, and
//! change logs consistent, and the `/set`, `/get`, `/changes` method
//! handlers built on top of it.
//!
//! MIME parsing, the blob store, authentication, and the outer JSON
//! request/response envelope are external collaborators this crate never
//! opens itself — see `config.rs` and `envelope.rs` for the seams.

pub mod config;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod models;
pub mod store;
pub mod transaction;

pub use config::EngineConfig;
pub use envelope::{MethodCall, MethodResponse};
pub use error::JmapError;
pub use models::{
    normalize_keyword, ChangeKind, ChangeRecord, Email, EmailId, KEYWORD_SEEN, Mailbox, MailboxId,
    MailboxRole, ObjectType, StateValue, Thread, ThreadId,
};
pub use store::{EmailStore, InMemoryStore, MailboxStore, StateStore, Store};
pub use transaction::{is_contention, with_retries, TransactionBuilder};
