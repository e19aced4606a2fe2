use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or parse failure; retried up to the configured bound.
    Transient,
    /// The menu translator rejected a server message.
    Protocol,
    MissingEmbed,
    MalformedTouchZone,
    RetriesExhausted,
}

impl FailureKind {
    /// Whether this failure stops automatic updates and must be shown.
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureKind::Protocol | FailureKind::RetriesExhausted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {message}")]
pub struct ViewerFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ViewerFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
