use serde::{
  Deserialize,
  Serialize
};

fn grid_default_start_hour() -> u32 {
  7
}

fn grid_default_end_hour() -> u32 {
  21
}

fn grid_default_hour_height_px() -> f64
{
  48.0
}

fn grid_default_min_event_height_px()
-> f64 {
  20.0
}

/// Vertical coordinate system shared by the layout engine, the now marker
/// and the pointer mapper.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct GridConfig {
  #[serde(
    default = "grid_default_start_hour"
  )]
  pub start_hour:          u32,
  #[serde(
    default = "grid_default_end_hour"
  )]
  pub end_hour:            u32,
  #[serde(
    default = "grid_default_hour_height_px"
  )]
  pub hour_height_px:      f64,
  #[serde(
    default = "grid_default_min_event_height_px"
  )]
  pub min_event_height_px: f64
}

impl Default for GridConfig {
  fn default() -> Self {
    Self {
      start_hour:          grid_default_start_hour(),
      end_hour:            grid_default_end_hour(),
      hour_height_px:      grid_default_hour_height_px(),
      min_event_height_px: grid_default_min_event_height_px()
    }
  }
}

impl GridConfig {
  pub fn new(
    start_hour: u32,
    end_hour: u32,
    hour_height_px: f64,
    min_event_height_px: f64
  ) -> Self {
    let mut grid = Self {
      start_hour,
      end_hour,
      hour_height_px,
      min_event_height_px
    };
    grid.sanitize();
    grid
  }

  /// Repairs values a layout cannot work with. Returns how many fields were
  /// changed.
  pub fn sanitize(&mut self) -> usize {
    let mut fixed = 0;

    if self.start_hour > 23 {
      tracing::warn!(
        start_hour = self.start_hour,
        "grid start hour out of range; \
         clamping to 23"
      );
      self.start_hour = 23;
      fixed += 1;
    }
    if self.end_hour > 24 {
      tracing::warn!(
        end_hour = self.end_hour,
        "grid end hour out of range; \
         clamping to 24"
      );
      self.end_hour = 24;
      fixed += 1;
    }
    if self.end_hour <= self.start_hour
    {
      tracing::warn!(
        start_hour = self.start_hour,
        end_hour = self.end_hour,
        "grid end hour must follow start \
         hour; widening to one hour"
      );
      self.end_hour = self.start_hour + 1;
      fixed += 1;
    }
    if !self.hour_height_px.is_finite()
      || self.hour_height_px <= 0.0
    {
      tracing::warn!(
        hour_height_px =
          self.hour_height_px,
        "invalid hour height; using \
         default"
      );
      self.hour_height_px =
        grid_default_hour_height_px();
      fixed += 1;
    }
    if !self
      .min_event_height_px
      .is_finite()
      || self.min_event_height_px < 0.0
    {
      tracing::warn!(
        min_event_height_px =
          self.min_event_height_px,
        "invalid minimum event height; \
         using default"
      );
      self.min_event_height_px =
        grid_default_min_event_height_px(
        );
      fixed += 1;
    }

    fixed
  }

  pub fn visible_hours(&self) -> f64 {
    f64::from(self.end_hour)
      - f64::from(self.start_hour)
  }

  /// Total pixel height of the grid window.
  pub fn height_px(&self) -> f64 {
    self.visible_hours()
      * self.hour_height_px
  }

  pub fn clamp_hour(
    &self,
    hour: f64
  ) -> f64 {
    let hour = if hour.is_nan() {
      f64::from(self.start_hour)
    } else {
      hour
    };
    hour.clamp(
      f64::from(self.start_hour),
      f64::from(self.end_hour)
    )
  }

  pub fn contains_hour(
    &self,
    hour: f64
  ) -> bool {
    hour >= f64::from(self.start_hour)
      && hour <= f64::from(self.end_hour)
  }

  /// `(hour - start_hour) * hour_height_px`, unclamped.
  pub fn offset_for_hour(
    &self,
    hour: f64
  ) -> f64 {
    (hour - f64::from(self.start_hour))
      * self.hour_height_px
  }

  /// Inverse of [`GridConfig::offset_for_hour`].
  pub fn hour_at(&self, y_px: f64) -> f64 {
    f64::from(self.start_hour)
      + y_px / self.hour_height_px
  }

  /// Top and height of an interval after clamping both ends to the grid
  /// window. The height never drops below the configured minimum nor
  /// exceeds the grid itself.
  pub fn vertical_span(
    &self,
    start_hour: f64,
    end_hour: f64
  ) -> (f64, f64) {
    let start = self.clamp_hour(start_hour);
    let end = self
      .clamp_hour(end_hour)
      .max(start);
    let top = self.offset_for_hour(start);
    let height = ((end - start)
      * self.hour_height_px)
      .max(self.min_event_height_px)
      .min(self.height_px());
    (top, height)
  }
}
