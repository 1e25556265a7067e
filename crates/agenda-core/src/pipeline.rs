//! Normalizer → range filter → bucketizer → layout engine, plus the
//! bookkeeping that keeps late results from overwriting newer ones.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info};

use crate::bucket::bucketize;
use crate::event::EventSource;
use crate::grid::GridConfig;
use crate::layout::DayLayout;
use crate::normalize::{MergeReport, Normalizer};
use crate::range::{Navigate, RangeSelector, ViewWidth, VisibleRange};
use crate::source::SourceFeed;
use crate::tracker::NowMarker;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarLayout {
    pub range: VisibleRange,
    pub days: Vec<DayLayout>,
    pub report: MergeReport,
}

impl CalendarLayout {
    pub fn day(&self, date: NaiveDate) -> Option<&DayLayout> {
        self.days.iter().find(|day| day.date == date)
    }

    /// Column index the now marker belongs to, if it is visible and its
    /// date is on screen.
    pub fn now_column(&self, marker: &NowMarker) -> Option<usize> {
        marker.top()?;
        self.days.iter().position(|day| day.date == marker.date())
    }

    pub fn event_count(&self) -> usize {
        self.days
            .iter()
            .map(|day| day.all_day.len() + day.timed.len())
            .sum()
    }
}

/// Pure pipeline: the same inputs always produce the same layout.
#[tracing::instrument(skip_all, fields(range = %range))]
pub fn compute_layout(
    internal: &SourceFeed,
    external: &SourceFeed,
    range: &VisibleRange,
    grid: &GridConfig,
    normalizer: &Normalizer,
) -> CalendarLayout {
    let merged = normalizer.merge(internal, external);
    let days = bucketize(&merged.events, range)
        .into_iter()
        .map(|bucket| DayLayout::from_bucket(bucket, grid))
        .collect();

    CalendarLayout {
        range: *range,
        days,
        report: merged.report,
    }
}

/// Identifies the inputs a layout was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ComputationKey {
    pub range: VisibleRange,
    pub internal_version: u64,
    pub external_version: u64,
}

/// A self-contained unit of work; safe to run anywhere and later.
#[derive(Debug, Clone)]
pub struct LayoutJob {
    key: ComputationKey,
    internal: Arc<SourceFeed>,
    external: Arc<SourceFeed>,
    grid: GridConfig,
    normalizer: Normalizer,
}

impl LayoutJob {
    pub fn key(&self) -> ComputationKey {
        self.key
    }

    pub fn run(self) -> ComputedLayout {
        let layout = compute_layout(
            &self.internal,
            &self.external,
            &self.key.range,
            &self.grid,
            &self.normalizer,
        );
        ComputedLayout { key: self.key, layout }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedLayout {
    pub key: ComputationKey,
    pub layout: CalendarLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    Discarded {
        stale: ComputationKey,
        current: ComputationKey,
    },
}

#[derive(Debug, Clone)]
struct VersionedFeed {
    version: u64,
    feed: Arc<SourceFeed>,
}

impl VersionedFeed {
    fn new(source: EventSource) -> Self {
        Self {
            version: 0,
            feed: Arc::new(SourceFeed::empty(source)),
        }
    }
}

/// State behind one calendar widget: visible range, latest delivery from
/// each source, and the last layout that matched them.
#[derive(Debug)]
pub struct CalendarSession {
    selector: RangeSelector,
    grid: GridConfig,
    normalizer: Normalizer,
    internal: VersionedFeed,
    external: VersionedFeed,
    current: Option<ComputedLayout>,
}

impl CalendarSession {
    pub fn new(anchor: NaiveDateTime, width: ViewWidth, grid: GridConfig, tz: Tz) -> Self {
        Self {
            selector: RangeSelector::new(anchor, width),
            grid,
            normalizer: Normalizer::new(tz),
            internal: VersionedFeed::new(EventSource::Internal),
            external: VersionedFeed::new(EventSource::External),
            current: None,
        }
    }

    pub fn grid(&self) -> &GridConfig {
        &self.grid
    }

    pub fn range(&self) -> VisibleRange {
        self.selector.range()
    }

    pub fn key(&self) -> ComputationKey {
        ComputationKey {
            range: self.selector.range(),
            internal_version: self.internal.version,
            external_version: self.external.version,
        }
    }

    pub fn navigate(&mut self, nav: Navigate, today: NaiveDate) -> ComputationKey {
        self.selector.navigate(nav, today);
        self.key()
    }

    pub fn set_width(&mut self, width: ViewWidth) -> ComputationKey {
        self.selector.set_width(width);
        self.key()
    }

    /// Stores a new delivery from one source. Each source is versioned
    /// independently, so a slow source never blocks the other.
    #[tracing::instrument(skip_all, fields(source = %feed.source, failed = feed.is_failed()))]
    pub fn receive(&mut self, feed: SourceFeed) -> ComputationKey {
        let slot = match feed.source {
            EventSource::Internal => &mut self.internal,
            EventSource::External => &mut self.external,
        };
        slot.version += 1;
        slot.feed = Arc::new(feed);
        debug!(version = slot.version, "received source feed");
        self.key()
    }

    pub fn prepare(&self) -> LayoutJob {
        LayoutJob {
            key: self.key(),
            internal: Arc::clone(&self.internal.feed),
            external: Arc::clone(&self.external.feed),
            grid: self.grid,
            normalizer: self.normalizer.clone(),
        }
    }

    /// Keeps `computed` only if it was built from the current inputs.
    pub fn commit(&mut self, computed: ComputedLayout) -> CommitOutcome {
        let current = self.key();
        if computed.key != current {
            debug!(
                stale_range = %computed.key.range,
                current_range = %current.range,
                "discarding layout computed from superseded inputs"
            );
            return CommitOutcome::Discarded {
                stale: computed.key,
                current,
            };
        }

        info!(
            range = %current.range,
            events = computed.layout.event_count(),
            "applied calendar layout"
        );
        self.current = Some(computed);
        CommitOutcome::Applied
    }

    /// Recomputes synchronously against the current inputs.
    pub fn refresh(&mut self) -> &CalendarLayout {
        let computed = self.prepare().run();
        &self.current.insert(computed).layout
    }

    /// The last committed layout, if it still matches the current inputs.
    pub fn layout(&self) -> Option<&CalendarLayout> {
        self.current
            .as_ref()
            .filter(|computed| computed.key == self.key())
            .map(|computed| &computed.layout)
    }
}
