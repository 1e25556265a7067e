use std::collections::BTreeMap;

use agenda_core::event::{CanonicalEvent, EventId, EventSource};
use agenda_core::grid::GridConfig;
use agenda_core::layout::{LayoutRect, layout_day};
use agenda_core::mapper::InteractionMapper;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 3).expect("valid date")
}

fn midnight() -> NaiveDateTime {
    day().and_hms_opt(0, 0, 0).expect("valid time")
}

fn grid() -> GridConfig {
    GridConfig::new(7, 19, 48.0, 20.0)
}

/// (start minute of day, duration in minutes); zero-length events included.
fn spans() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..1_440, 0i64..240), 0..40)
}

fn events_from(spans: &[(i64, i64)]) -> Vec<CanonicalEvent> {
    spans
        .iter()
        .enumerate()
        .map(|(idx, (start, duration))| {
            let start = midnight() + Duration::minutes(*start);
            let end = start + Duration::minutes(*duration);
            CanonicalEvent::new(EventSource::Internal, &idx.to_string(), format!("event {idx}"), start, Some(end))
                .expect("end after start")
        })
        .collect()
}

fn by_id(events: &[CanonicalEvent]) -> BTreeMap<&EventId, &CanonicalEvent> {
    events.iter().map(|event| (&event.id, event)).collect()
}

/// Peak number of lanes needed at any event start. Zero-length events are
/// points: they need a lane apart from everything in progress at that
/// instant, but points at the same instant can share one.
fn max_concurrency(members: &[&CanonicalEvent]) -> usize {
    members
        .iter()
        .map(|probe| {
            let at = probe.start;
            let in_progress = members
                .iter()
                .filter(|event| event.start <= at && at < event.end)
                .count();
            let point = members.iter().any(|event| event.start == at && event.end == at);
            in_progress + usize::from(point)
        })
        .max()
        .unwrap_or(0)
}

proptest! {
    #[test]
    fn every_event_gets_exactly_one_rect(spans in spans()) {
        let events = events_from(&spans);
        let rects = layout_day(day(), &events, &grid());

        prop_assert_eq!(rects.len(), events.len());
        let mut ids: Vec<&EventId> = rects.iter().map(|rect| &rect.event_id).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), events.len());
    }

    #[test]
    fn rects_stay_inside_the_grid(spans in spans()) {
        let grid = grid();
        let events = events_from(&spans);

        for rect in layout_day(day(), &events, &grid) {
            prop_assert!(rect.top >= 0.0 && rect.top <= grid.height_px());
            prop_assert!(rect.height > 0.0 && rect.height <= grid.height_px());
            prop_assert!(rect.lane < rect.lane_count);
        }
    }

    #[test]
    fn events_sharing_a_lane_never_overlap(spans in spans()) {
        let events = events_from(&spans);
        let lookup = by_id(&events);
        let rects = layout_day(day(), &events, &grid());

        for (idx, a) in rects.iter().enumerate() {
            for b in &rects[idx + 1..] {
                if a.lane != b.lane {
                    continue;
                }
                let (ea, eb) = (lookup[&a.event_id], lookup[&b.event_id]);
                prop_assert!(!ea.overlaps(eb), "{} and {} share lane {}", ea.id, eb.id, a.lane);
            }
        }
    }

    #[test]
    fn lane_count_matches_peak_concurrency(spans in spans()) {
        let events = events_from(&spans);
        let lookup = by_id(&events);
        let rects = layout_day(day(), &events, &grid());

        let mut clusters: BTreeMap<usize, Vec<&LayoutRect>> = BTreeMap::new();
        for rect in &rects {
            clusters.entry(rect.cluster).or_default().push(rect);
        }

        for members in clusters.values() {
            let lane_count = members[0].lane_count;
            prop_assert!(members.iter().all(|rect| rect.lane_count == lane_count));

            let cluster_events: Vec<&CanonicalEvent> =
                members.iter().map(|rect| lookup[&rect.event_id]).collect();
            prop_assert_eq!(lane_count, max_concurrency(&cluster_events));
        }
    }

    #[test]
    fn pointer_mapping_round_trips_within_a_snap(minute in (7 * 60i64)..(19 * 60)) {
        let grid = grid();
        let mapper = InteractionMapper::new(grid);
        let start = midnight() + Duration::minutes(minute);
        let event = CanonicalEvent::new(EventSource::External, "x", "x".to_string(), start, None)
            .expect("default end");

        let rects = layout_day(day(), std::slice::from_ref(&event), &grid);
        let mapped = mapper.time_at(rects[0].top, day());
        prop_assert!((mapped - start).num_minutes().abs() <= 15);
    }
}
