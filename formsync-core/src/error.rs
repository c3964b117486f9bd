//! Error types.
//!
//! The orchestration primitives never wrap the error type of the operation
//! they drive; a loader or action that fails with `E` surfaces exactly that
//! `E`. The types here cover the crate's own plumbing and the transport
//! boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hub::ProtocolError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no tokio runtime is available to drive async work")]
    NoRuntime,

    #[error(transparent)]
    Transport(#[from] TransportFailure),

    #[error("comment hub: {0}")]
    Hub(#[from] ProtocolError),

    #[error("session storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("session encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("session decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A request that did not produce a 2xx response.
///
/// `status` is `None` when no response arrived at all. `body` is the
/// response body as JSON when it parses, otherwise the raw text.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("transport failure (status {status:?}): {body}")]
pub struct TransportFailure {
    pub status: Option<u16>,
    pub body: serde_json::Value,
}

impl TransportFailure {
    pub fn new(status: Option<u16>, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// Failure with no HTTP response, e.g. connection refused.
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::new(None, serde_json::Value::String(err.to_string()))
    }

    /// Build from a status and raw body text.
    pub fn from_body(status: u16, text: &str) -> Self {
        let body = serde_json::from_str(text)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string()));
        Self::new(Some(status), body)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}
