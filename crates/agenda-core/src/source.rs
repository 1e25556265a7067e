//! Raw record shapes for the two event sources and the feeds that carry them.
//!
//! Nothing outside this module and `normalize` may look at these types; every
//! later stage only sees `CanonicalEvent`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SourceFetchError;
use crate::event::EventSource;

/// A row from the CRM's own events table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InternalEventRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub start_time: Option<String>,

    #[serde(default)]
    pub end_time: Option<String>,

    #[serde(default)]
    pub all_day: bool,

    #[serde(default)]
    pub color: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub meeting_link: Option<String>,

    /// Set when the row was pushed to the connected provider calendar.
    #[serde(default)]
    pub google_event_id: Option<String>,
}

/// An event resource as returned by the connected calendar provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEventRecord {
    pub id: String,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub start: Option<ProviderTime>,

    #[serde(default)]
    pub end: Option<ProviderTime>,

    #[serde(default)]
    pub color_id: Option<String>,

    #[serde(default)]
    pub hangout_link: Option<String>,

    #[serde(default)]
    pub conference_data: Option<ConferenceData>,

    #[serde(default)]
    pub html_link: Option<String>,
}

/// `dateTime` for timed events, `date` for all-day ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTime {
    #[serde(default)]
    pub date_time: Option<String>,

    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceData {
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    #[serde(default)]
    pub entry_point_type: Option<String>,

    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Internal(InternalEventRecord),
    External(ExternalEventRecord),
}

impl SourceRecord {
    pub fn source(&self) -> EventSource {
        match self {
            Self::Internal(_) => EventSource::Internal,
            Self::External(_) => EventSource::External,
        }
    }
}

/// One source's latest delivery: its records, or the reason there are none.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeed {
    pub source: EventSource,
    pub outcome: Result<DecodedRecords, SourceFetchError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecords {
    pub records: Vec<SourceRecord>,
    /// Items that were present in the payload but did not fit the schema.
    pub undecodable: usize,
}

impl SourceFeed {
    pub fn empty(source: EventSource) -> Self {
        Self {
            source,
            outcome: Ok(DecodedRecords::default()),
        }
    }

    pub fn failed(error: SourceFetchError) -> Self {
        Self {
            source: error.origin(),
            outcome: Err(error),
        }
    }

    pub fn internal(records: Vec<InternalEventRecord>) -> Self {
        Self {
            source: EventSource::Internal,
            outcome: Ok(DecodedRecords {
                records: records.into_iter().map(SourceRecord::Internal).collect(),
                undecodable: 0,
            }),
        }
    }

    pub fn external(records: Vec<ExternalEventRecord>) -> Self {
        Self {
            source: EventSource::External,
            outcome: Ok(DecodedRecords {
                records: records.into_iter().map(SourceRecord::External).collect(),
                undecodable: 0,
            }),
        }
    }

    /// Decodes a JSON payload item by item. A payload that is not a list (or a
    /// `{"items": [...]}` envelope) fails the whole feed; a bad item only
    /// counts against `undecodable`.
    #[tracing::instrument(skip(payload), fields(source = %source, bytes = payload.len()))]
    pub fn decode_json(source: EventSource, payload: &str) -> Self {
        let items = match parse_items(payload) {
            Ok(items) => items,
            Err(message) => {
                warn!(%message, "source payload rejected");
                return Self::failed(SourceFetchError::Decode {
                    origin: source,
                    message,
                });
            }
        };

        let mut decoded = DecodedRecords::default();
        for (idx, item) in items.into_iter().enumerate() {
            let record = match source {
                EventSource::Internal => {
                    serde_json::from_value::<InternalEventRecord>(item).map(SourceRecord::Internal)
                }
                EventSource::External => {
                    serde_json::from_value::<ExternalEventRecord>(item).map(SourceRecord::External)
                }
            };
            match record {
                Ok(record) => decoded.records.push(record),
                Err(err) => {
                    debug!(index = idx, error = %err, "skipping undecodable record");
                    decoded.undecodable += 1;
                }
            }
        }

        debug!(
            records = decoded.records.len(),
            undecodable = decoded.undecodable,
            "decoded source payload"
        );
        Self {
            source,
            outcome: Ok(decoded),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.outcome.is_err()
    }
}

fn parse_items(payload: &str) -> Result<Vec<Value>, String> {
    let value: Value = serde_json::from_str(payload).map_err(|err| err.to_string())?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err("`items` is not a list".to_string()),
            None => Err("expected a list of events or an `items` envelope".to_string()),
        },
        _ => Err("expected a list of events".to_string()),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(raw) => Ok(raw),
        Value::Number(num) => Ok(num.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
