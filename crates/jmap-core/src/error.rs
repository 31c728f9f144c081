//! Typed JMAP errors (spec §5)
//!
//! Handlers return `anyhow::Result` internally (teacher convention) but
//! surface one of these at the method-response boundary, the same way the
//! teacher downcasts to `HistoryExpiredError` at the sync boundary instead
//! of threading a typed error through every intermediate call.

use thiserror::Error;

/// A JMAP method-level error, serialized to clients via its `type` tag.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JmapError {
    #[error("unknownMethod")]
    UnknownMethod,

    #[error("stateMismatch")]
    StateMismatch,

    #[error("cannotCalculateChanges")]
    CannotCalculateChanges,

    #[error("invalidArguments: {0}")]
    InvalidArguments(String),

    #[error("serverFail")]
    ServerFail,

    #[error("invalidProperties: {0}")]
    InvalidProperties(String),

    #[error("invalidPatch: {0}")]
    InvalidPatch(String),

    #[error("notFound")]
    NotFound,

    #[error("mailboxHasEmail")]
    MailboxHasEmail,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("tooManyItems")]
    TooManyItems,
}

impl JmapError {
    /// The wire `type` string JMAP clients expect (spec §5).
    pub fn type_tag(&self) -> &'static str {
        match self {
            JmapError::UnknownMethod => "unknownMethod",
            JmapError::StateMismatch => "stateMismatch",
            JmapError::CannotCalculateChanges => "cannotCalculateChanges",
            JmapError::InvalidArguments(_) => "invalidArguments",
            JmapError::ServerFail => "serverFail",
            JmapError::InvalidProperties(_) => "invalidProperties",
            JmapError::InvalidPatch(_) => "invalidPatch",
            JmapError::NotFound => "notFound",
            JmapError::MailboxHasEmail => "mailboxHasEmail",
            JmapError::Forbidden(_) => "forbidden",
            JmapError::TooManyItems => "tooManyItems",
        }
    }
}
