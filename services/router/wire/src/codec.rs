//! Encoding and decoding of wire messages.
//!
//! Messages travel as self-describing JSON records with the fields
//! `type, from, to, hop_budget, headers, payload`. Decoding is strict about
//! structure (known type, all envelope fields, required headers) and lenient
//! about payload shape, which is opaque at this layer.

use crate::error::WireError;
use crate::header::Headers;
use crate::message::{MessageType, NodeId, WireMessage};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

/// Envelope as it appears on the wire, before validation
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    from: Option<NodeId>,
    to: Option<NodeId>,
    hop_budget: Option<u32>,
    headers: Option<Headers>,
    #[serde(default)]
    payload: Value,
}

/// Encode a message to bytes
pub fn encode(msg: &WireMessage) -> Result<Bytes, WireError> {
    Ok(Bytes::from(serde_json::to_vec(msg)?))
}

/// Decode a message, failing on unknown types and missing required fields
pub fn decode(data: &[u8]) -> Result<WireMessage, WireError> {
    let value: Value = serde_json::from_slice(data)?;
    if !value.is_object() {
        return Err(WireError::Malformed("expected a JSON object".to_string()));
    }

    let raw: RawMessage = serde_json::from_value(value)?;

    let msg_type: MessageType = raw
        .msg_type
        .ok_or(WireError::MissingField("type"))?
        .parse()?;
    let from = raw.from.ok_or(WireError::MissingField("from"))?;
    let to = raw.to.ok_or(WireError::MissingField("to"))?;
    let hop_budget = raw.hop_budget.ok_or(WireError::MissingField("hop_budget"))?;
    let headers = raw.headers.ok_or(WireError::MissingField("headers"))?;
    headers.validate()?;

    if from.as_str().is_empty() {
        return Err(WireError::invalid("from", "empty node id"));
    }
    if to.as_str().is_empty() {
        return Err(WireError::invalid("to", "empty node id"));
    }

    Ok(WireMessage {
        msg_type,
        from,
        to,
        hop_budget,
        headers,
        payload: raw.payload,
    })
}
