//! JMAP request/response envelope (spec §6)
//!
//! Parsing the outer `Request` object (with its `using` capability list and
//! `methodCalls` array) is the caller's job — the envelope/routing layer is
//! an external collaborator (spec §1). This module only carries the shape
//! of a single method call and its response once routed here.

use serde::{Deserialize, Serialize};

/// One entry of a JMAP `methodCalls` array, already split out by the
/// caller's routing layer.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodCall {
    /// Id of the outer JMAP request this call belongs to, for correlating
    /// logs and retries back to the request the caller's envelope layer
    /// received.
    pub request_id: String,
    pub account_id: String,
    pub method: String,
    /// Client-supplied correlation id, echoed back unchanged in the
    /// response's third array slot.
    pub client_id: String,
    pub args: serde_json::Value,
}

/// One entry of a JMAP `methodResponses` array.
#[derive(Debug, Clone, Serialize)]
pub struct MethodResponse {
    pub name: String,
    pub args: serde_json::Value,
    pub client_id: String,
}

impl MethodResponse {
    pub fn new(name: impl Into<String>, args: serde_json::Value, client_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            client_id: client_id.into(),
        }
    }

    /// Build an `error` response carrying a [`crate::error::JmapError`]'s
    /// wire tag (spec §5).
    pub fn error(error: &crate::error::JmapError, client_id: impl Into<String>) -> Self {
        Self::new(
            "error",
            serde_json::json!({ "type": error.type_tag(), "description": error.to_string() }),
            client_id,
        )
    }
}
