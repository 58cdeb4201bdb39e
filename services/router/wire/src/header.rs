//! Message header map.
//!
//! Headers are a string-keyed map of JSON values. Two keys are always present
//! on a well-formed message: [`HEADER_ID`] (unique string identity) and
//! [`HEADER_TIMESTAMP`] (milliseconds since the Unix epoch at creation).
//! Message types extend the map with [`HEADER_SEQUENCE`] and [`HEADER_ORIGIN`]
//! (link-state), [`HEADER_REPLY_TO`] (probe ack), [`HEADER_PREVIOUS_HOP`]
//! (set on every forwarded copy) and [`HEADER_KIND`] (application ping/pong).

use crate::error::WireError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique message identity
pub const HEADER_ID: &str = "id";
/// Creation time in Unix milliseconds
pub const HEADER_TIMESTAMP: &str = "timestamp";
/// Per-origin sequence number
pub const HEADER_SEQUENCE: &str = "sequence";
/// Node that originated a flooded advertisement
pub const HEADER_ORIGIN: &str = "origin";
/// Id of the probe an ack answers
pub const HEADER_REPLY_TO: &str = "reply_to";
/// Node that transmitted this copy
pub const HEADER_PREVIOUS_HOP: &str = "previous_hop";
/// Application-level data kind (`ping`, `pong`)
pub const HEADER_KIND: &str = "kind";

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a fresh message id
pub fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Key-value header map with a required `{id, timestamp}` subset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Value>);

impl Headers {
    /// Create headers with an explicit id and timestamp
    pub fn new(id: impl Into<String>, timestamp: u64) -> Self {
        let mut headers = Self(BTreeMap::new());
        headers.set(HEADER_ID, id.into());
        headers.set(HEADER_TIMESTAMP, timestamp);
        headers
    }

    /// Create headers with a fresh id and the current timestamp
    pub fn fresh() -> Self {
        Self::new(fresh_id(), now_millis())
    }

    /// Fill in `id` and `timestamp` when they are absent
    pub fn ensure_identity(&mut self) {
        if self.get_str(HEADER_ID).map_or(true, str::is_empty) {
            self.set(HEADER_ID, fresh_id());
        }
        if self.get_u64(HEADER_TIMESTAMP).is_none() {
            self.set(HEADER_TIMESTAMP, now_millis());
        }
    }

    /// Check that the required subset is present and well-typed
    pub fn validate(&self) -> Result<(), WireError> {
        match self.0.get(HEADER_ID) {
            None => return Err(WireError::MissingField("headers.id")),
            Some(Value::String(id)) if !id.is_empty() => {}
            Some(other) => return Err(WireError::invalid("headers.id", format!("{other}"))),
        }
        match self.0.get(HEADER_TIMESTAMP) {
            None => Err(WireError::MissingField("headers.timestamp")),
            Some(v) if v.as_u64().is_some() => Ok(()),
            Some(other) => Err(WireError::invalid("headers.timestamp", format!("{other}"))),
        }
    }

    /// Raw lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Total lookup: returns `default` when the key is absent
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.0.get(key).unwrap_or(default)
    }

    /// String lookup
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer lookup
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Replace-or-append by key; never creates a duplicate entry
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Remove a header, returning its old value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Message id (empty string when absent)
    pub fn id(&self) -> &str {
        self.get_str(HEADER_ID).unwrap_or("")
    }

    /// Creation timestamp in Unix milliseconds (0 when absent)
    pub fn timestamp(&self) -> u64 {
        self.get_u64(HEADER_TIMESTAMP).unwrap_or(0)
    }

    /// Sequence number, if any
    pub fn sequence(&self) -> Option<u64> {
        self.get_u64(HEADER_SEQUENCE)
    }

    /// Originating node of a flooded advertisement, if any
    pub fn origin(&self) -> Option<&str> {
        self.get_str(HEADER_ORIGIN)
    }

    /// Id of the probe this message acknowledges, if any
    pub fn reply_to(&self) -> Option<&str> {
        self.get_str(HEADER_REPLY_TO)
    }

    /// Node that transmitted this copy, if it was forwarded
    pub fn previous_hop(&self) -> Option<&str> {
        self.get_str(HEADER_PREVIOUS_HOP)
    }

    /// Application data kind, if any
    pub fn kind(&self) -> Option<&str> {
        self.get_str(HEADER_KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_headers_are_valid() {
        let headers = Headers::fresh();
        assert!(headers.validate().is_ok());
        assert!(!headers.id().is_empty());
        assert!(headers.timestamp() > 0);
        assert_ne!(headers.id(), Headers::fresh().id());
    }

    #[test]
    fn test_set_replaces_existing_key() {
        let mut headers = Headers::new("m1", 10);
        headers.set(HEADER_PREVIOUS_HOP, "A");
        headers.set(HEADER_PREVIOUS_HOP, "B");

        assert_eq!(headers.previous_hop(), Some("B"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_lookup_is_total() {
        let headers = Headers::new("m1", 10);
        let fallback = Value::from("none");

        assert_eq!(headers.get_or("missing", &fallback), &fallback);
        assert_eq!(headers.sequence(), None);
        assert_eq!(headers.origin(), None);

        let empty = Headers::default();
        assert_eq!(empty.id(), "");
        assert_eq!(empty.timestamp(), 0);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut headers = Headers::default();
        assert!(matches!(
            headers.validate(),
            Err(WireError::MissingField("headers.id"))
        ));

        headers.set(HEADER_ID, "m1");
        assert!(matches!(
            headers.validate(),
            Err(WireError::MissingField("headers.timestamp"))
        ));

        headers.set(HEADER_TIMESTAMP, "yesterday");
        assert!(matches!(
            headers.validate(),
            Err(WireError::InvalidField { field: "headers.timestamp", .. })
        ));
    }

    #[test]
    fn test_ensure_identity_keeps_existing_id() {
        let mut headers = Headers::default();
        headers.set(HEADER_ID, "keep-me");
        headers.ensure_identity();

        assert_eq!(headers.id(), "keep-me");
        assert!(headers.validate().is_ok());
    }
}
