//! Frame Codec
//!
//! Parses and validates inbound text frames. A frame that fails here is
//! dropped by the caller; it never reaches the snapshot store.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::messages::{
    ERROR, Envelope, ErrorBody, MARKET_DATA, MARKET_STATUS, MarketDataFrame, StreamEvent,
};
use crate::domain::snapshot::{InstrumentSnapshot, SnapshotError};

/// A frame that could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not valid JSON, or a payload of the wrong shape.
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Top level is not an object.
    #[error("expected a JSON object envelope")]
    NotAnObject,

    /// `type` or `data` is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// `type` is not a known discriminant.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A snapshot broke the data model.
    #[error("invalid snapshot at index {index}: {source}")]
    InvalidSnapshot {
        /// Position in `data`.
        index: usize,
        /// What was wrong with it.
        #[source]
        source: SnapshotError,
    },

    /// The same symbol appeared twice in one frame.
    #[error("duplicate symbol in frame: {0}")]
    DuplicateSymbol(String),

    /// An `error` frame whose `data` is neither a string nor `{message}`.
    #[error("invalid error payload")]
    InvalidErrorPayload,
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::NotAnObject | Self::MissingField(_) | Self::InvalidErrorPayload => "shape",
            Self::UnknownType(_) => "unknown_type",
            Self::InvalidSnapshot { .. } => "invalid_snapshot",
            Self::DuplicateSymbol(_) => "duplicate_symbol",
        }
    }
}

/// JSON codec for the market stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` for malformed JSON, a missing `type` or `data`,
    /// an unknown `type`, or any snapshot that fails validation.
    pub fn decode(&self, text: &str) -> Result<StreamEvent, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }

        let envelope: Envelope = serde_json::from_value(value)?;
        let kind = envelope.kind.ok_or(DecodeError::MissingField("type"))?;
        let data = envelope.data.ok_or(DecodeError::MissingField("data"))?;

        match kind.as_str() {
            MARKET_DATA => {
                let snapshots: Vec<InstrumentSnapshot> = serde_json::from_value(data)?;
                validate_frame(&snapshots)?;
                Ok(StreamEvent::MarketData(MarketDataFrame {
                    snapshots,
                    timestamp: envelope.timestamp.as_ref().and_then(parse_timestamp),
                    upstream_connected: envelope.proxy_connected,
                }))
            }
            MARKET_STATUS => Ok(StreamEvent::MarketStatus(data)),
            ERROR => match data {
                serde_json::Value::String(message) => Ok(StreamEvent::Error(message)),
                other => serde_json::from_value::<ErrorBody>(other)
                    .map(|body| StreamEvent::Error(body.message))
                    .map_err(|_| DecodeError::InvalidErrorPayload),
            },
            _ => Err(DecodeError::UnknownType(kind)),
        }
    }
}

fn validate_frame(snapshots: &[InstrumentSnapshot]) -> Result<(), DecodeError> {
    let mut seen = HashSet::with_capacity(snapshots.len());
    for (index, snapshot) in snapshots.iter().enumerate() {
        snapshot
            .validate()
            .map_err(|source| DecodeError::InvalidSnapshot { index, source })?;
        if !seen.insert(snapshot.symbol.as_str()) {
            return Err(DecodeError::DuplicateSymbol(snapshot.symbol.clone()));
        }
    }
    Ok(())
}

/// Parse RFC 3339, or naive ISO-8601 read as UTC. Anything else is `None`.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
