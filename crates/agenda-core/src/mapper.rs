use chrono::{
  Duration,
  NaiveDate,
  NaiveDateTime
};
use serde::Serialize;

use crate::datetime::local_midnight;
use crate::event::{
  CanonicalEvent,
  EventId,
  EventSource
};
use crate::grid::GridConfig;
use crate::layout::DayLayout;

pub const DEFAULT_SNAP_MINUTES: u32 = 15;
pub const DEFAULT_EVENT_MINUTES: u32 =
  60;

/// What a click asks the surrounding app to do. Plain data; nothing here
/// creates or persists events.
#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
#[serde(
  tag = "intent",
  rename_all = "snake_case"
)]
pub enum EventIntent {
  Create {
    date:    NaiveDate,
    start:   NaiveDateTime,
    end:     NaiveDateTime,
    all_day: bool
  },
  Edit {
    event_id: EventId,
    source:   EventSource
  }
}

/// Converts a pixel offset inside a day column back into a date-time,
/// snapped to the nearest `snap_minutes`. Offsets outside the grid are
/// pinned to its edges.
pub fn map_pointer(
  grid: &GridConfig,
  y_px: f64,
  date: NaiveDate,
  snap_minutes: u32
) -> NaiveDateTime {
  let y = if y_px.is_finite() {
    y_px.clamp(0.0, grid.height_px())
  } else {
    0.0
  };
  let snap = f64::from(
    snap_minutes.clamp(1, 60)
  );

  let minutes = grid.hour_at(y) * 60.0;
  let snapped = ((minutes / snap)
    .round()
    * snap)
    .clamp(
      f64::from(grid.start_hour) * 60.0,
      f64::from(grid.end_hour) * 60.0
    );

  local_midnight(date)
    + Duration::minutes(snapped as i64)
}

#[derive(Debug, Clone, Copy)]
pub struct InteractionMapper {
  grid:             GridConfig,
  snap_minutes:     u32,
  default_duration: Duration
}

impl InteractionMapper {
  pub fn new(grid: GridConfig) -> Self {
    Self {
      grid,
      snap_minutes: DEFAULT_SNAP_MINUTES,
      default_duration: Duration::minutes(
        i64::from(DEFAULT_EVENT_MINUTES)
      )
    }
  }

  pub fn with_snap_minutes(
    mut self,
    minutes: u32
  ) -> Self {
    self.snap_minutes =
      minutes.clamp(1, 60);
    self
  }

  pub fn with_default_duration_minutes(
    mut self,
    minutes: u32
  ) -> Self {
    self.default_duration =
      Duration::minutes(i64::from(
        minutes.max(1)
      ));
    self
  }

  pub fn snap_minutes(&self) -> u32 {
    self.snap_minutes
  }

  pub fn time_at(
    &self,
    y_px: f64,
    date: NaiveDate
  ) -> NaiveDateTime {
    map_pointer(
      &self.grid,
      y_px,
      date,
      self.snap_minutes
    )
  }

  /// Intent for a click on empty grid space.
  pub fn create_at(
    &self,
    y_px: f64,
    date: NaiveDate
  ) -> EventIntent {
    let start = self.time_at(y_px, date);
    EventIntent::Create {
      date,
      start,
      end: start + self.default_duration,
      all_day: false
    }
  }

  /// Intent for a click in the all-day row.
  pub fn create_all_day(
    &self,
    date: NaiveDate
  ) -> EventIntent {
    let start = local_midnight(date);
    EventIntent::Create {
      date,
      start,
      end: start + Duration::days(1),
      all_day: true
    }
  }

  pub fn edit(
    &self,
    event: &CanonicalEvent
  ) -> EventIntent {
    EventIntent::Edit {
      event_id: event.id.clone(),
      source:   event.source
    }
  }

  /// Edits the event under the pointer, or creates one at the pointer's
  /// time when the spot is empty.
  #[tracing::instrument(skip(self, day), fields(date = %day.date))]
  pub fn click(
    &self,
    day: &DayLayout,
    x_px: f64,
    y_px: f64,
    column_width: f64
  ) -> EventIntent {
    let hit = day
      .hit_test(x_px, y_px, column_width)
      .and_then(|rect| {
        day
          .timed
          .iter()
          .find(|event| {
            event.id == rect.event_id
          })
      });

    match hit {
      | Some(event) => {
        tracing::debug!(id = %event.id, "click hit existing event");
        self.edit(event)
      }
      | None => {
        self.create_at(y_px, day.date)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bucket::DayBucket;

  fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 4)
      .expect("valid date")
  }

  fn at(
    hour: u32,
    minute: u32
  ) -> NaiveDateTime {
    day()
      .and_hms_opt(hour, minute, 0)
      .expect("valid time")
  }

  fn grid() -> GridConfig {
    GridConfig::new(7, 19, 48.0, 20.0)
  }

  #[test]
  fn inverts_the_vertical_formula() {
    assert_eq!(
      map_pointer(&grid(), 360.0, day(), 15),
      at(14, 30)
    );
    assert_eq!(
      map_pointer(&grid(), 0.0, day(), 15),
      at(7, 0)
    );
  }

  #[test]
  fn snaps_to_the_nearest_slot() {
    // 371px is 14:43:45.
    assert_eq!(
      map_pointer(&grid(), 371.0, day(), 15),
      at(14, 45)
    );
    // 365px is 14:36:15.
    assert_eq!(
      map_pointer(&grid(), 365.0, day(), 15),
      at(14, 30)
    );
    assert_eq!(
      map_pointer(&grid(), 365.0, day(), 5),
      at(14, 35)
    );
  }

  #[test]
  fn pins_out_of_range_offsets() {
    assert_eq!(
      map_pointer(&grid(), -40.0, day(), 15),
      at(7, 0)
    );
    assert_eq!(
      map_pointer(
        &grid(),
        10_000.0,
        day(),
        15
      ),
      at(19, 0)
    );
    assert_eq!(
      map_pointer(
        &grid(),
        f64::NAN,
        day(),
        15
      ),
      at(7, 0)
    );
  }

  #[test]
  fn create_intent_uses_default_duration() {
    let mapper = InteractionMapper::new(
      grid()
    )
    .with_default_duration_minutes(30);
    assert_eq!(
      mapper.create_at(96.0, day()),
      EventIntent::Create {
        date:    day(),
        start:   at(9, 0),
        end:     at(9, 30),
        all_day: false
      }
    );
  }

  #[test]
  fn click_on_event_becomes_edit() {
    let event = CanonicalEvent::new(
      EventSource::External,
      "g1",
      "Inspection".to_string(),
      at(9, 0),
      Some(at(10, 0))
    )
    .expect("valid event");
    let layout = DayLayout::from_bucket(
      DayBucket {
        date:    day(),
        all_day: vec![],
        timed:   vec![event.clone()]
      },
      &grid()
    );
    let mapper =
      InteractionMapper::new(grid());

    assert_eq!(
      mapper.click(
        &layout, 20.0, 100.0, 200.0
      ),
      EventIntent::Edit {
        event_id: event.id.clone(),
        source:   EventSource::External
      }
    );
    assert!(matches!(
      mapper.click(&layout, 20.0, 300.0, 200.0),
      EventIntent::Create { all_day: false, .. }
    ));
  }

  #[test]
  fn all_day_intent_spans_the_whole_day() {
    let mapper =
      InteractionMapper::new(grid());
    match mapper.create_all_day(day()) {
      | EventIntent::Create {
        start,
        end,
        all_day,
        ..
      } => {
        assert!(all_day);
        assert_eq!(start, at(0, 0));
        assert_eq!(
          end - start,
          Duration::days(1)
        );
      }
      | other => {
        panic!("unexpected intent {other:?}")
      }
    }
  }
}
