use std::path::PathBuf;

use sweep_core::StepError;
use thiserror::Error;

/// Transport or protocol failure talking to the in-page agent.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge connect to {path} failed: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bridge write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("bridge read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("bridge closed connection")]
    Closed,

    #[error("bridge {method} timed out after {after_ms} ms")]
    Timeout { method: String, after_ms: u64 },

    #[error("bridge response id mismatch: sent {sent}, got {got}")]
    IdMismatch { sent: u64, got: u64 },

    #[error("agent error: {0}")]
    Remote(String),

    #[error("bridge request encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("bridge response parse failed: {0}")]
    Decode(#[source] serde_json::Error),
}

impl From<BridgeError> for StepError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Timeout { method, after_ms } => StepError::Timeout {
                what: method,
                after_ms,
            },
            other => StepError::Bridge(other.to_string()),
        }
    }
}
