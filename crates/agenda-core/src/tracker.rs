//! Live "now" marker for the day grid.
//!
//! The tracker owns at most one timer task at a time. Mounting spawns it,
//! unmounting (or dropping the tracker) aborts it, and a second mount first
//! tears down the previous task.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::datetime::{hours_since_midnight, now_in};
use crate::grid::GridConfig;

pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the configured timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        now_in(&self.tz)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NowMarker {
    Visible { date: NaiveDate, top: f64 },
    /// `now` lies outside the grid window. Unlike events, the marker is
    /// never clamped to an edge.
    Hidden { date: NaiveDate },
}

impl NowMarker {
    pub fn top(&self) -> Option<f64> {
        match self {
            Self::Visible { top, .. } => Some(*top),
            Self::Hidden { .. } => None,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Visible { date, .. } | Self::Hidden { date } => *date,
        }
    }
}

/// Places `now` on the grid with the same formula used for event tops.
pub fn now_marker(grid: &GridConfig, now: NaiveDateTime) -> NowMarker {
    let date = now.date();
    let hour = hours_since_midnight(date, now);
    if grid.contains_hour(hour) {
        NowMarker::Visible {
            date,
            top: grid.offset_for_hour(hour),
        }
    } else {
        NowMarker::Hidden { date }
    }
}

struct Mounted {
    task: JoinHandle<()>,
    marker: watch::Receiver<NowMarker>,
}

pub struct NowTracker {
    grid: GridConfig,
    clock: Arc<dyn Clock>,
    tick: Duration,
    mounted: Option<Mounted>,
}

impl NowTracker {
    pub fn new(grid: GridConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            grid,
            clock,
            tick: DEFAULT_TICK,
            mounted: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Starts the timer on the current tokio runtime and returns a receiver
    /// that observes every recomputed marker. Replaces any previous timer.
    pub fn mount(&mut self) -> anyhow::Result<watch::Receiver<NowMarker>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| anyhow!("now tracker needs a tokio runtime: {err}"))?;

        if self.unmount() {
            debug!("replaced previously mounted now tracker");
        }

        let grid = self.grid;
        let clock = Arc::clone(&self.clock);
        let tick = self.tick;
        let first_tick = Instant::now() + tick;
        let (tx, rx) = watch::channel(now_marker(&grid, clock.now()));

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let marker = now_marker(&grid, clock.now());
                if tx.send(marker).is_err() {
                    break;
                }
            }
        });

        info!(tick_ms = tick.as_millis() as u64, "mounted now tracker");
        self.mounted = Some(Mounted {
            task,
            marker: rx.clone(),
        });
        Ok(rx)
    }

    /// Cancels the timer. Returns whether one was running.
    pub fn unmount(&mut self) -> bool {
        match self.mounted.take() {
            Some(mounted) => {
                mounted.task.abort();
                info!("unmounted now tracker");
                true
            }
            None => false,
        }
    }

    /// Latest published marker while mounted, otherwise computed on demand.
    pub fn marker(&self) -> NowMarker {
        match &self.mounted {
            Some(mounted) => *mounted.marker.borrow(),
            None => now_marker(&self.grid, self.clock.now()),
        }
    }
}

impl Drop for NowTracker {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 4)
            .expect("valid date")
            .and_hms_opt(hour, minute, 0)
            .expect("valid time")
    }

    fn grid() -> GridConfig {
        GridConfig::new(7, 19, 48.0, 20.0)
    }

    #[test]
    fn marker_uses_the_event_formula() {
        let marker = now_marker(&grid(), at(14, 30));
        assert_eq!(marker.top(), Some(360.0));
    }

    #[test]
    fn marker_outside_the_window_is_hidden_not_clamped() {
        assert_eq!(now_marker(&grid(), at(6, 59)).top(), None);
        assert_eq!(now_marker(&grid(), at(19, 1)).top(), None);
        assert_eq!(now_marker(&grid(), at(7, 0)).top(), Some(0.0));
    }

    #[test]
    fn unmounted_tracker_computes_on_demand() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let tracker = NowTracker::new(grid(), clock.clone());
        assert_eq!(tracker.marker().top(), Some(96.0));
        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(tracker.marker().top(), Some(120.0));
    }

    #[test]
    fn mount_without_runtime_is_an_error() {
        let mut tracker = NowTracker::new(grid(), Arc::new(ManualClock::new(at(9, 0))));
        assert!(tracker.mount().is_err());
        assert!(!tracker.is_mounted());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_publish_fresh_markers() {
        let clock = Arc::new(ManualClock::new(at(14, 30)));
        let mut tracker = NowTracker::new(grid(), clock.clone());
        let mut rx = tracker.mount().expect("mounted");
        assert_eq!(rx.borrow_and_update().top(), Some(360.0));

        clock.set(at(15, 0));
        tokio::time::advance(DEFAULT_TICK).await;
        rx.changed().await.expect("tick delivered");
        assert_eq!(rx.borrow_and_update().top(), Some(384.0));
        assert_eq!(tracker.marker().top(), Some(384.0));

        clock.set(at(20, 0));
        tokio::time::advance(DEFAULT_TICK).await;
        rx.changed().await.expect("tick delivered");
        assert_eq!(rx.borrow_and_update().top(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_stops_the_timer() {
        let clock = Arc::new(ManualClock::new(at(10, 0)));
        let mut tracker = NowTracker::new(grid(), clock);
        let mut rx = tracker.mount().expect("mounted");
        rx.borrow_and_update();

        assert!(tracker.unmount());
        assert!(!tracker.is_mounted());
        assert!(!tracker.unmount());
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn remount_replaces_the_previous_timer() {
        let clock = Arc::new(ManualClock::new(at(10, 0)));
        let mut tracker = NowTracker::new(grid(), clock);
        let mut first = tracker.mount().expect("first mount");
        first.borrow_and_update();
        let mut second = tracker.mount().expect("second mount");
        second.borrow_and_update();

        assert!(first.changed().await.is_err());
        tokio::time::advance(DEFAULT_TICK).await;
        assert!(second.changed().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_tracker_cancels_its_timer() {
        let clock = Arc::new(ManualClock::new(at(10, 0)));
        let mut tracker = NowTracker::new(grid(), clock);
        let mut rx = tracker.mount().expect("mounted");
        rx.borrow_and_update();
        drop(tracker);
        assert!(rx.changed().await.is_err());
    }
}
