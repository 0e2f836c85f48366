//! Stream Codec
//!
//! JSON codec for the Alpaca market data stream. Frames arrive as JSON
//! arrays where each element is one message object, discriminated by its
//! `"T"` field; control messages occasionally arrive as a bare object.
//!
//! # Tolerance
//!
//! Decoding is tolerant per record: an unknown discriminator or a
//! malformed record is logged and dropped, and the rest of the batch is
//! still delivered. Only an unparseable frame fails the whole batch.

use tracing::{trace, warn};

use crate::infrastructure::alpaca::messages::WireMessage;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is neither a JSON array nor an object.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// JSON codec for the market data stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into wire messages.
    ///
    /// Record-level problems (unknown `"T"`, missing fields) drop that
    /// record only; the surviving records are returned in frame order.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame itself is not parseable JSON or is
    /// neither an array nor an object.
    pub fn decode(&self, text: &str) -> Result<Vec<WireMessage>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let records: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
            Ok(records.into_iter().filter_map(decode_record).collect())
        } else if trimmed.starts_with('{') {
            let record: serde_json::Value = serde_json::from_str(trimmed)?;
            Ok(decode_record(record).into_iter().collect())
        } else {
            // Char-wise truncation: the frame is remote input and byte 50
            // may fall inside a multi-byte character.
            let preview: String = trimmed.chars().take(50).collect();
            Err(CodecError::InvalidFrame(format!(
                "expected JSON array or object, got: {preview}..."
            )))
        }
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

/// Decode one record by its `"T"` discriminator; `None` drops the record.
fn decode_record(value: serde_json::Value) -> Option<WireMessage> {
    let msg_type = value.get("T").and_then(|v| v.as_str())?.to_string();

    let result = match msg_type.as_str() {
        "success" => serde_json::from_value(value).map(WireMessage::Success),
        "error" => serde_json::from_value(value).map(WireMessage::Error),
        "subscription" => serde_json::from_value(value).map(WireMessage::Subscription),
        "q" => serde_json::from_value(value).map(WireMessage::Quote),
        "t" => serde_json::from_value(value).map(WireMessage::Trade),
        "b" | "d" | "u" => serde_json::from_value(value).map(WireMessage::Bar),
        "s" => serde_json::from_value(value).map(WireMessage::Status),
        other => {
            trace!(msg_type = other, "skipping unknown message type");
            return None;
        }
    };

    match result {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(msg_type = %msg_type, error = %err, "dropping malformed record");
            None
        }
    }
}
