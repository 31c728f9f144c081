//! State counters and change-log records
//!
//! Grounded on the teacher's `models/sync_state.rs`: a small, serde-derived
//! struct plus a handful of plain constructor/update methods, rather than a
//! generic state-machine type.

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The three record kinds that own a per-account monotonic state counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Email,
    Mailbox,
    Thread,
}

impl ObjectType {
    /// The tag used when building sort keys (`STATE#{tag}`, `CHANGE#{tag}#...`).
    pub fn sort_key_tag(&self) -> &'static str {
        match self {
            ObjectType::Email => "Email",
            ObjectType::Mailbox => "Mailbox",
            ObjectType::Thread => "Thread",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sort_key_tag())
    }
}

/// A monotonic 64-bit counter, serialised to JMAP clients as a decimal
/// string (JMAP forbids numeric state, spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct StateValue(pub i64);

impl StateValue {
    pub const ZERO: StateValue = StateValue(0);

    pub fn next(self) -> StateValue {
        StateValue(self.0 + 1)
    }

    pub fn advance_by(self, k: i64) -> StateValue {
        StateValue(self.0 + k)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for StateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StateVisitor;

        impl<'de> Visitor<'de> for StateVisitor {
            type Value = StateValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string or integer state value")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StateValue, E> {
                v.parse::<i64>()
                    .map(StateValue)
                    .map_err(|_| de::Error::custom(format!("invalid state value: {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<StateValue, E> {
                Ok(StateValue(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<StateValue, E> {
                Ok(StateValue(v as i64))
            }

            // `ifInState` may arrive as a JSON number; the JSON parser
            // surfaces it as a float (spec §6) — truncate before compare.
            fn visit_f64<E: de::Error>(self, v: f64) -> Result<StateValue, E> {
                Ok(StateValue(v as i64))
            }
        }

        deserializer.deserialize_any(StateVisitor)
    }
}

/// What kind of change a change-log row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    Updated,
    Destroyed,
}

/// One row in the append-only change log (spec §3, "Change record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub account_id: String,
    pub object_type: ObjectType,
    pub state: StateValue,
    pub object_id: String,
    pub kind: ChangeKind,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry; the record is treated as gone once `now >= expires_at`.
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_value_serialises_as_decimal_string() {
        let v = StateValue(42);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"42\"");
    }

    #[test]
    fn state_value_deserialises_from_string_or_number() {
        let from_str: StateValue = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(from_str, StateValue(7));

        let from_num: StateValue = serde_json::from_str("7").unwrap();
        assert_eq!(from_num, StateValue(7));

        // ifInState may arrive as a float via the JSON parser.
        let from_float: StateValue = serde_json::from_str("7.0").unwrap();
        assert_eq!(from_float, StateValue(7));
    }

    #[test]
    fn object_type_sort_key_tag() {
        assert_eq!(ObjectType::Email.sort_key_tag(), "Email");
        assert_eq!(ObjectType::Mailbox.sort_key_tag(), "Mailbox");
        assert_eq!(ObjectType::Thread.sort_key_tag(), "Thread");
    }
}
