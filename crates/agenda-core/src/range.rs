use std::fmt;

use anyhow::anyhow;
use chrono::{
  NaiveDate,
  NaiveDateTime
};
use serde::{
  Deserialize,
  Serialize
};

use crate::datetime::{
  add_days,
  local_midnight
};

/// Number of day columns shown side by side.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum ViewWidth {
  #[default]
  One,
  Two,
  Three
}

impl ViewWidth {
  pub fn all() -> [Self; 3] {
    [Self::One, Self::Two, Self::Three]
  }

  pub fn days(self) -> i64 {
    match self {
      | Self::One => 1,
      | Self::Two => 2,
      | Self::Three => 3
    }
  }
}

impl TryFrom<u8> for ViewWidth {
  type Error = anyhow::Error;

  fn try_from(
    value: u8
  ) -> Result<Self, Self::Error> {
    match value {
      | 1 => Ok(Self::One),
      | 2 => Ok(Self::Two),
      | 3 => Ok(Self::Three),
      | other => {
        Err(anyhow!(
          "view width must be 1, 2 or \
           3 days, got {other}"
        ))
      }
    }
  }
}

impl From<ViewWidth> for u8 {
  fn from(width: ViewWidth) -> Self {
    width.days() as u8
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Navigate {
  Prev,
  Next,
  Today
}

impl std::str::FromStr for Navigate {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "prev" | "previous" | "back" => {
        Ok(Self::Prev)
      }
      | "next" | "forward" => {
        Ok(Self::Next)
      }
      | "today" => Ok(Self::Today),
      | other => {
        Err(anyhow!(
          "unknown navigation: {other}"
        ))
      }
    }
  }
}

/// Half-open `[start, end)` window of whole local days.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
)]
pub struct VisibleRange {
  pub start: NaiveDateTime,
  pub end:   NaiveDateTime
}

impl VisibleRange {
  pub fn from_anchor(
    anchor: NaiveDate,
    width: ViewWidth
  ) -> Self {
    let start = local_midnight(anchor);
    let end = local_midnight(add_days(
      anchor,
      width.days()
    ));
    Self { start, end }
  }

  pub fn first_day(&self) -> NaiveDate {
    self.start.date()
  }

  pub fn day_count(&self) -> i64 {
    (self.end.date() - self.start.date())
      .num_days()
  }

  pub fn days(
    &self
  ) -> impl Iterator<Item = NaiveDate>
  {
    let first = self.first_day();
    (0..self.day_count())
      .map(move |offset| {
        add_days(first, offset)
      })
  }

  pub fn contains_day(
    &self,
    day: NaiveDate
  ) -> bool {
    let at = local_midnight(day);
    at >= self.start && at < self.end
  }

  pub fn contains(
    &self,
    at: NaiveDateTime
  ) -> bool {
    at >= self.start && at < self.end
  }
}

impl fmt::Display for VisibleRange {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{}..{}",
      self.start.format("%Y-%m-%d"),
      self.end.format("%Y-%m-%d")
    )
  }
}

/// Anchor date plus view width. Pure date arithmetic; never looks at events.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct RangeSelector {
  anchor: NaiveDate,
  width:  ViewWidth
}

impl RangeSelector {
  /// Any time of day on `anchor` selects the same window.
  pub fn new(
    anchor: NaiveDateTime,
    width: ViewWidth
  ) -> Self {
    Self {
      anchor: anchor.date(),
      width
    }
  }

  pub fn anchor(&self) -> NaiveDate {
    self.anchor
  }

  pub fn width(&self) -> ViewWidth {
    self.width
  }

  pub fn set_width(
    &mut self,
    width: ViewWidth
  ) {
    self.width = width;
  }

  /// `today` is only consulted for [`Navigate::Today`].
  pub fn navigate(
    &mut self,
    nav: Navigate,
    today: NaiveDate
  ) -> VisibleRange {
    self.anchor = match nav {
      | Navigate::Prev => add_days(
        self.anchor,
        -self.width.days()
      ),
      | Navigate::Next => add_days(
        self.anchor,
        self.width.days()
      ),
      | Navigate::Today => today
    };
    tracing::debug!(
      ?nav,
      anchor = %self.anchor,
      width = self.width.days(),
      "navigated calendar range"
    );
    self.range()
  }

  pub fn range(&self) -> VisibleRange {
    VisibleRange::from_anchor(
      self.anchor,
      self.width
    )
  }
}
