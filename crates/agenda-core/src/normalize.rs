use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDateTime};
use chrono_tz::Tz;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::datetime::{local_midnight, parse_local_date, parse_local_datetime};
use crate::error::{RejectReason, SourceFetchError};
use crate::event::{CanonicalEvent, EventSource};
use crate::source::{ExternalEventRecord, InternalEventRecord, ProviderTime, SourceFeed, SourceRecord};

const UNTITLED: &str = "(No title)";

/// The provider's fixed event palette, indexed by `colorId`.
const PROVIDER_EVENT_PALETTE: [(&str, &str); 11] = [
    ("1", "#7986cb"),
    ("2", "#33b679"),
    ("3", "#8e24aa"),
    ("4", "#e67c73"),
    ("5", "#f6bf26"),
    ("6", "#f4511e"),
    ("7", "#039be5"),
    ("8", "#616161"),
    ("9", "#3f51b5"),
    ("10", "#0b8043"),
    ("11", "#d50000"),
];

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SourceReport {
    pub accepted: usize,
    /// Rejected or undecodable records. A failed fetch counts as one.
    pub malformed: usize,
    pub cancelled: usize,
    pub duplicates: usize,
    pub fetch_error: Option<SourceFetchError>,
}

impl SourceReport {
    pub fn is_degraded(&self) -> bool {
        self.fetch_error.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MergeReport {
    pub internal: SourceReport,
    pub external: SourceReport,
}

impl MergeReport {
    pub fn for_source(&self, source: EventSource) -> &SourceReport {
        match source {
            EventSource::Internal => &self.internal,
            EventSource::External => &self.external,
        }
    }

    pub fn degraded_sources(&self) -> Vec<EventSource> {
        EventSource::all()
            .into_iter()
            .filter(|source| self.for_source(*source).is_degraded())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedEvents {
    pub events: Vec<CanonicalEvent>,
    pub report: MergeReport,
}

/// Maps source records onto `CanonicalEvent`, converting offset-carrying
/// timestamps into the wall-clock of `tz`.
#[derive(Debug, Clone)]
pub struct Normalizer {
    tz: Tz,
}

impl Normalizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn normalize(&self, record: &SourceRecord) -> Result<CanonicalEvent, RejectReason> {
        match record {
            SourceRecord::Internal(record) => self.normalize_internal(record),
            SourceRecord::External(record) => self.normalize_external(record),
        }
    }

    /// Normalizes both feeds and merges them. A failed feed contributes no
    /// events and is flagged in the report; it never affects the other feed.
    #[tracing::instrument(skip_all)]
    pub fn merge(&self, internal: &SourceFeed, external: &SourceFeed) -> MergedEvents {
        let (mut events, mirrored, internal_report) = self.normalize_feed(internal);
        let (external_events, _, mut external_report) = self.normalize_feed(external);

        for event in external_events {
            let raw_id = event
                .id
                .as_str()
                .strip_prefix("external:")
                .unwrap_or(event.id.as_str());
            if mirrored.contains(raw_id) {
                debug!(id = %event.id, "dropping provider copy of a mirrored internal event");
                external_report.accepted = external_report.accepted.saturating_sub(1);
                external_report.duplicates += 1;
                continue;
            }
            events.push(event);
        }

        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

        info!(
            events = events.len(),
            internal_accepted = internal_report.accepted,
            internal_malformed = internal_report.malformed,
            external_accepted = external_report.accepted,
            external_malformed = external_report.malformed,
            duplicates = external_report.duplicates,
            "merged calendar sources"
        );

        MergedEvents {
            events,
            report: MergeReport {
                internal: internal_report,
                external: external_report,
            },
        }
    }

    #[tracing::instrument(skip(self, feed), fields(source = %feed.source))]
    fn normalize_feed(&self, feed: &SourceFeed) -> (Vec<CanonicalEvent>, BTreeSet<String>, SourceReport) {
        let mut report = SourceReport::default();
        let mut mirrored = BTreeSet::new();

        let decoded = match &feed.outcome {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "source unavailable; continuing without it");
                report.fetch_error = Some(err.clone());
                report.malformed = 1;
                return (Vec::new(), mirrored, report);
            }
        };

        report.malformed = decoded.undecodable;
        let mut events = Vec::with_capacity(decoded.records.len());

        for record in &decoded.records {
            match self.normalize(record) {
                Ok(event) => {
                    if let SourceRecord::Internal(InternalEventRecord {
                        google_event_id: Some(mirror),
                        ..
                    }) = record
                        && !mirror.trim().is_empty()
                    {
                        mirrored.insert(mirror.trim().to_string());
                    }
                    report.accepted += 1;
                    events.push(event);
                }
                Err(RejectReason::Cancelled) => {
                    report.cancelled += 1;
                }
                Err(reason) => {
                    debug!(%reason, "dropping malformed record");
                    report.malformed += 1;
                }
            }
        }

        (events, mirrored, report)
    }

    fn normalize_internal(&self, record: &InternalEventRecord) -> Result<CanonicalEvent, RejectReason> {
        let raw_start = non_blank(record.start_time.as_deref()).ok_or(RejectReason::MissingStart)?;
        let (start, date_only) = self
            .parse_time_or_date(raw_start)
            .ok_or(RejectReason::UnparseableStart)?;
        let all_day = record.all_day || date_only;

        let end = match non_blank(record.end_time.as_deref()) {
            Some(raw_end) => Some(
                self.parse_time_or_date(raw_end)
                    .map(|(end, _)| end)
                    .ok_or(RejectReason::UnparseableEnd)?,
            ),
            None => None,
        };

        let mut event = build_event(
            EventSource::Internal,
            &record.id,
            record.title.as_deref(),
            start,
            end,
            all_day,
        )?;
        event.color = record.color.as_deref().and_then(normalize_hex_color);
        event.location = non_blank(record.location.as_deref()).map(str::to_string);
        event.conference_link = non_blank(record.meeting_link.as_deref())
            .map(str::to_string)
            .or_else(|| find_conference_link([record.location.as_deref(), record.description.as_deref()]));
        Ok(event)
    }

    fn normalize_external(&self, record: &ExternalEventRecord) -> Result<CanonicalEvent, RejectReason> {
        if record
            .status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("cancelled"))
        {
            return Err(RejectReason::Cancelled);
        }

        let start = record.start.as_ref().ok_or(RejectReason::MissingStart)?;
        let (start, all_day) = self
            .parse_provider_time(start)
            .ok_or(RejectReason::UnparseableStart)??;

        let end = match record.end.as_ref() {
            Some(end) => match self.parse_provider_time(end) {
                Some(Ok((end, _))) => Some(end),
                Some(Err(_)) => None,
                None => return Err(RejectReason::UnparseableEnd),
            },
            None => None,
        };

        let mut event = build_event(
            EventSource::External,
            &record.id,
            record.summary.as_deref(),
            start,
            end,
            all_day,
        )?;
        event.color = record.color_id.as_deref().and_then(provider_palette_color);
        event.location = non_blank(record.location.as_deref()).map(str::to_string);
        event.conference_link = non_blank(record.hangout_link.as_deref())
            .map(str::to_string)
            .or_else(|| video_entry_point(record))
            .or_else(|| find_conference_link([record.location.as_deref(), record.description.as_deref()]));
        Ok(event)
    }

    /// `None` when a field is present but unparseable, `Some(Err)` when both
    /// `dateTime` and `date` are absent.
    fn parse_provider_time(&self, time: &ProviderTime) -> Option<Result<(NaiveDateTime, bool), RejectReason>> {
        if let Some(raw) = non_blank(time.date_time.as_deref()) {
            return parse_local_datetime(raw, &self.tz).map(|dt| Ok((dt, false)));
        }
        if let Some(raw) = non_blank(time.date.as_deref()) {
            return parse_local_date(raw).map(|date| Ok((local_midnight(date), true)));
        }
        Some(Err(RejectReason::MissingStart))
    }

    fn parse_time_or_date(&self, raw: &str) -> Option<(NaiveDateTime, bool)> {
        if let Some(dt) = parse_local_datetime(raw, &self.tz) {
            return Some((dt, false));
        }
        parse_local_date(raw).map(|date| (local_midnight(date), true))
    }
}

fn build_event(
    source: EventSource,
    raw_id: &str,
    title: Option<&str>,
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
    all_day: bool,
) -> Result<CanonicalEvent, RejectReason> {
    let title = non_blank(title).unwrap_or(UNTITLED).to_string();
    let (start, end) = if all_day {
        let start = local_midnight(start.date());
        (start, Some(end.unwrap_or(start + Duration::days(1))))
    } else {
        (start, end)
    };

    let mut event =
        CanonicalEvent::new(source, raw_id, title, start, end).ok_or(RejectReason::EndBeforeStart)?;
    event.all_day = all_day;
    Ok(event)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn provider_palette_color(color_id: &str) -> Option<String> {
    let color_id = color_id.trim();
    PROVIDER_EVENT_PALETTE
        .iter()
        .find(|(id, _)| *id == color_id)
        .map(|(_, hex)| (*hex).to_string())
}

fn normalize_hex_color(raw: &str) -> Option<String> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('#') {
        return Some(trimmed);
    }
    if matches!(trimmed.len(), 3 | 6) && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(format!("#{trimmed}"));
    }
    Some(trimmed)
}

fn video_entry_point(record: &ExternalEventRecord) -> Option<String> {
    record
        .conference_data
        .as_ref()?
        .entry_points
        .iter()
        .find(|entry| entry.entry_point_type.as_deref() == Some("video"))
        .and_then(|entry| non_blank(entry.uri.as_deref()))
        .map(str::to_string)
}

fn conference_url_regex() -> Option<&'static Regex> {
    static CONFERENCE_URL: OnceLock<Option<Regex>> = OnceLock::new();
    CONFERENCE_URL
        .get_or_init(|| {
            Regex::new(
                r"https?://(?:meet\.google\.com|(?:[\w-]+\.)*zoom\.us|teams\.microsoft\.com|teams\.live\.com)/[^\s<>()]+",
            )
            .map_err(|err| warn!(error = %err, "conference url regex failed to compile"))
            .ok()
        })
        .as_ref()
}

fn find_conference_link<'a>(fields: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let re = conference_url_regex()?;
    fields
        .into_iter()
        .flatten()
        .find_map(|text| re.find(text))
        .map(|m| m.as_str().to_string())
}
