use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Internal,
    External,
}

impl EventSource {
    pub fn all() -> [Self; 2] {
        [Self::Internal, Self::External]
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Event id namespaced by its source, e.g. `internal:42` or `external:abc123`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(source: EventSource, raw: &str) -> Self {
        Self(format!("{}:{}", source.as_key(), raw.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single event shape everything past the normalizer works with.
///
/// `start <= end` holds for every value built by [`CanonicalEvent::new`];
/// records that would violate it are rejected during normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub id: EventId,

    pub title: String,

    pub start: NaiveDateTime,

    pub end: NaiveDateTime,

    #[serde(default)]
    pub all_day: bool,

    pub source: EventSource,

    #[serde(default)]
    pub color: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub conference_link: Option<String>,
}

impl CanonicalEvent {
    pub const DEFAULT_DURATION_MINUTES: i64 = 60;

    /// Returns `None` when `end` precedes `start`. A missing end defaults to one hour.
    pub fn new(
        source: EventSource,
        raw_id: &str,
        title: String,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Option<Self> {
        let end = end.unwrap_or(start + Duration::minutes(Self::DEFAULT_DURATION_MINUTES));
        if end < start {
            return None;
        }

        Some(Self {
            id: EventId::new(source, raw_id),
            title,
            start,
            end,
            all_day: false,
            source,
            color: None,
            location: None,
            conference_link: None,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open `[start, end)` overlap test.
    pub fn overlaps(&self, other: &CanonicalEvent) -> bool {
        self.start < other.end && other.start < self.end
    }
}
