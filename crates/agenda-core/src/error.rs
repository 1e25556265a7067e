use serde::Serialize;
use thiserror::Error;

use crate::event::EventSource;

/// Failure of one source's fetch. Carried as data next to that source's feed;
/// the merge continues with whatever the other source delivered.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFetchError {
    #[error("{origin} calendar is not connected")]
    NotConnected { origin: EventSource },

    #[error("{origin} calendar rejected the stored credentials")]
    Unauthorized { origin: EventSource },

    #[error("{origin} calendar fetch failed: {message}")]
    Transport { origin: EventSource, message: String },

    #[error("{origin} calendar payload could not be decoded: {message}")]
    Decode { origin: EventSource, message: String },
}

impl SourceFetchError {
    pub fn origin(&self) -> EventSource {
        match self {
            Self::NotConnected { origin }
            | Self::Unauthorized { origin }
            | Self::Transport { origin, .. }
            | Self::Decode { origin, .. } => *origin,
        }
    }
}

/// Why a single record never became a `CanonicalEvent`.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Hash)]
pub enum RejectReason {
    #[error("record has no start time")]
    MissingStart,

    #[error("start time could not be parsed")]
    UnparseableStart,

    #[error("end time could not be parsed")]
    UnparseableEnd,

    #[error("end time precedes start time")]
    EndBeforeStart,

    #[error("event was cancelled at the source")]
    Cancelled,

    #[error("record does not match the source schema")]
    Undecodable,
}
