use chrono::NaiveDate;
use serde::Serialize;

use crate::event::CanonicalEvent;
use crate::range::VisibleRange;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub all_day: Vec<CanonicalEvent>,
    pub timed: Vec<CanonicalEvent>,
}

impl DayBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            all_day: Vec::new(),
            timed: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.all_day.is_empty() && self.timed.is_empty()
    }
}

/// One bucket per day of `range`, in order. Each event is filed under its
/// start day only; events starting outside `range` are left out.
#[tracing::instrument(skip_all, fields(range = %range, events = events.len()))]
pub fn bucketize(events: &[CanonicalEvent], range: &VisibleRange) -> Vec<DayBucket> {
    let mut buckets: Vec<DayBucket> = range.days().map(DayBucket::new).collect();
    let first = range.first_day();

    let mut outside = 0usize;
    for event in events {
        let offset = (event.start_date() - first).num_days();
        let Some(bucket) = usize::try_from(offset)
            .ok()
            .and_then(|idx| buckets.get_mut(idx))
        else {
            outside += 1;
            continue;
        };

        if event.all_day {
            bucket.all_day.push(event.clone());
        } else {
            bucket.timed.push(event.clone());
        }
    }

    for bucket in &mut buckets {
        bucket
            .all_day
            .sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        bucket
            .timed
            .sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    }

    tracing::debug!(outside, "bucketized events");
    buckets
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::event::EventSource;
    use crate::range::ViewWidth;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
    }

    fn at(d: u32, hour: u32) -> NaiveDateTime {
        day(d).and_hms_opt(hour, 0, 0).expect("valid time")
    }

    fn event(id: &str, start: NaiveDateTime, end: NaiveDateTime, all_day: bool) -> CanonicalEvent {
        let mut event = CanonicalEvent::new(EventSource::Internal, id, id.to_string(), start, Some(end))
            .expect("valid event");
        event.all_day = all_day;
        event
    }

    #[test]
    fn separates_all_day_from_timed() {
        let range = VisibleRange::from_anchor(day(4), ViewWidth::One);
        let buckets = bucketize(
            &[
                event("open-house", at(4, 0), at(5, 0), true),
                event("showing", at(4, 9), at(4, 10), false),
            ],
            &range,
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].all_day.len(), 1);
        assert_eq!(buckets[0].timed.len(), 1);
        assert_eq!(buckets[0].all_day[0].id.as_str(), "internal:open-house");
        assert_eq!(buckets[0].timed[0].id.as_str(), "internal:showing");
    }

    #[test]
    fn files_midnight_crossers_under_start_day_only() {
        let range = VisibleRange::from_anchor(day(4), ViewWidth::Two);
        let buckets = bucketize(&[event("late", at(4, 23), at(5, 2), false)], &range);
        assert_eq!(buckets[0].timed.len(), 1);
        assert!(buckets[1].is_empty());
    }

    #[test]
    fn drops_events_outside_the_range() {
        let range = VisibleRange::from_anchor(day(4), ViewWidth::Three);
        let buckets = bucketize(
            &[
                event("before", at(3, 9), at(3, 10), false),
                event("inside", at(6, 9), at(6, 10), false),
                event("after", at(7, 9), at(7, 10), false),
            ],
            &range,
        );
        let filed: Vec<&str> = buckets
            .iter()
            .flat_map(|b| b.timed.iter().map(|e| e.id.as_str()))
            .collect();
        assert_eq!(filed, vec!["internal:inside"]);
        assert_eq!(buckets[2].date, day(6));
    }
}
