//! Overlap layout for one day column.
//!
//! Timed events are placed into lanes with a first-fit sweep over events
//! sorted by start time. Because the sweep visits events in start order, the
//! number of lanes it opens inside an overlap cluster equals the largest set
//! of events that are simultaneously in progress in that cluster, so every
//! cluster gets the narrowest columns that still avoid collisions.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::bucket::DayBucket;
use crate::datetime::hours_since_midnight;
use crate::event::{CanonicalEvent, EventId};
use crate::grid::GridConfig;

/// Pixel placement of one timed event. Rebuilt on every layout pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutRect {
    pub event_id: EventId,
    pub top: f64,
    pub height: f64,
    pub lane: usize,
    pub lane_count: usize,
    /// Index of the overlap cluster within its day, in start order.
    pub cluster: usize,
}

impl LayoutRect {
    pub fn width_fraction(&self) -> f64 {
        1.0 / self.lane_count.max(1) as f64
    }

    /// `(left, width)` inside a day column `column_width` pixels wide.
    pub fn horizontal(&self, column_width: f64) -> (f64, f64) {
        let width = column_width * self.width_fraction();
        (self.lane as f64 * width, width)
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Everything a single day column renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayLayout {
    pub date: NaiveDate,
    pub all_day: Vec<CanonicalEvent>,
    pub timed: Vec<CanonicalEvent>,
    pub rects: Vec<LayoutRect>,
}

impl DayLayout {
    pub fn from_bucket(bucket: DayBucket, grid: &GridConfig) -> Self {
        let rects = layout_day(bucket.date, &bucket.timed, grid);
        Self {
            date: bucket.date,
            all_day: bucket.all_day,
            timed: bucket.timed,
            rects,
        }
    }

    pub fn rect_for(&self, id: &EventId) -> Option<&LayoutRect> {
        self.rects.iter().find(|rect| &rect.event_id == id)
    }

    /// Lane and rect of the event under a pointer, topmost lane first.
    pub fn hit_test(&self, x_px: f64, y_px: f64, column_width: f64) -> Option<&LayoutRect> {
        self.rects.iter().rev().find(|rect| {
            let (left, width) = rect.horizontal(column_width);
            x_px >= left && x_px < left + width && y_px >= rect.top && y_px < rect.bottom()
        })
    }
}

/// Lays out one day's timed events. Never fails and never drops an event:
/// the output has exactly one rect per input event, ordered by start time,
/// longer events first on ties.
#[tracing::instrument(skip_all, fields(day = %day, events = events.len()))]
pub fn layout_day(day: NaiveDate, events: &[CanonicalEvent], grid: &GridConfig) -> Vec<LayoutRect> {
    let mut order: Vec<&CanonicalEvent> = events.iter().collect();
    order.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.duration().cmp(&a.duration()))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut rects: Vec<LayoutRect> = Vec::with_capacity(order.len());
    let mut lane_ends: Vec<NaiveDateTime> = Vec::new();
    let mut cluster = ClusterTracker::default();

    for event in order {
        if cluster.ends_before(event.start) {
            cluster.close(&mut rects);
            lane_ends.clear();
        }

        let lane = match lane_ends.iter().position(|end| *end <= event.start) {
            Some(free) => {
                lane_ends[free] = event.end;
                free
            }
            None => {
                lane_ends.push(event.end);
                lane_ends.len() - 1
            }
        };
        cluster.extend(event.end, lane_ends.len());

        let (top, height) = grid.vertical_span(
            hours_since_midnight(day, event.start),
            hours_since_midnight(day, event.end),
        );

        rects.push(LayoutRect {
            event_id: event.id.clone(),
            top,
            height,
            lane,
            lane_count: 0,
            cluster: cluster.index,
        });
    }
    cluster.close(&mut rects);

    tracing::trace!(clusters = cluster.index, "laid out day");
    rects
}

#[derive(Debug, Default)]
struct ClusterTracker {
    index: usize,
    first_rect: usize,
    end: Option<NaiveDateTime>,
    lanes: usize,
}

impl ClusterTracker {
    fn ends_before(&self, start: NaiveDateTime) -> bool {
        self.end.is_some_and(|end| end <= start)
    }

    fn extend(&mut self, end: NaiveDateTime, open_lanes: usize) {
        self.end = Some(self.end.map_or(end, |current| current.max(end)));
        self.lanes = self.lanes.max(open_lanes);
    }

    /// Stamps the finished cluster's lane count onto its rects.
    fn close(&mut self, rects: &mut [LayoutRect]) {
        if self.end.is_none() {
            return;
        }
        for rect in &mut rects[self.first_rect..] {
            rect.lane_count = self.lanes;
        }
        self.index += 1;
        self.first_rect = rects.len();
        self.end = None;
        self.lanes = 0;
    }
}
