//! Domain-specific error types for the orange client core.
//!
//! Transport failures never escape the session: they are routed into the
//! reconnect path. The variants here surface only where a caller can act on
//! them (provisioning, packetization, explicit connect attempts).

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the orange core.
#[derive(Debug, Error)]
pub enum OrangeError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A state transition or message violated the session protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A control envelope could not be decoded.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The websocket layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The probe HTTP client reported an error.
    #[error("probe error: {0}")]
    Probe(#[from] reqwest::Error),

    /// The IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] url::ParseError),

    /// The session has no live link to send on.
    #[error("not connected")]
    NotConnected,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Serialization Errors ─────────────────────────────────────
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A binary media packet could not be produced.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    // ── Codec Errors ─────────────────────────────────────────────
    /// The external codec collaborator rejected an operation.
    #[error("codec error: {0}")]
    Codec(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── EncodingError ─────────────────────────────────────────────────

/// Typed error for media packetization.
///
/// Reported to the immediate caller only; it never touches the
/// connection lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// The recipient identity does not fit the one-byte length field.
    #[error("recipient identity too long: {len} bytes (max {max})")]
    IdentityTooLong { len: usize, max: usize },
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for OrangeError {
    fn from(s: String) -> Self {
        OrangeError::Other(s)
    }
}

impl From<&str> for OrangeError {
    fn from(s: &str) -> Self {
        OrangeError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for OrangeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        OrangeError::ChannelClosed
    }
}

impl From<tokio::time::error::Elapsed> for OrangeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        OrangeError::Other("deadline elapsed".into())
    }
}
