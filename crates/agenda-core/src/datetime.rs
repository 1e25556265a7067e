use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;

pub const TIMEZONE_ENV_VAR: &str =
  "AGENDA_TIMEZONE";
const DEFAULT_TIMEZONE: &str = "UTC";

const OFFSET_FORMATS: [&str; 2] = [
  "%Y-%m-%d %H:%M:%S%.f%#z",
  "%Y-%m-%dT%H:%M:%S%.f%#z"
];

const NAIVE_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M"
];

/// Resolves the wall-clock timezone: `AGENDA_TIMEZONE`, then the configured
/// value, then UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_TIMEZONE,
    "DEFAULT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured local timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn now_in(tz: &Tz) -> NaiveDateTime {
  Utc::now()
    .with_timezone(tz)
    .naive_local()
}

#[must_use]
pub fn local_midnight(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(NaiveTime::MIN)
}

/// Fractional hours between `day`'s midnight and `at`. Exceeds 24 for
/// instants on later days.
#[must_use]
pub fn hours_since_midnight(
  day: NaiveDate,
  at: NaiveDateTime
) -> f64 {
  let elapsed =
    at - local_midnight(day);
  elapsed.num_seconds() as f64
    / 3_600.0
}

/// Parses a source timestamp into local wall-clock time. Instants carrying
/// an offset are shifted into `tz`; naive ones are taken as already local.
pub fn parse_local_datetime(
  raw: &str,
  tz: &Tz
) -> Option<NaiveDateTime> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(
      dt.with_timezone(tz).naive_local()
    );
  }

  for fmt in OFFSET_FORMATS {
    if let Ok(dt) =
      DateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(
        dt.with_timezone(tz)
          .naive_local()
      );
    }
  }

  for fmt in NAIVE_FORMATS {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(ndt);
    }
  }

  None
}

pub fn parse_local_date(
  raw: &str
) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(
    raw.trim(),
    "%Y-%m-%d"
  )
  .ok()
}

/// Parses a date argument relative to `today`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_arg(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let lower =
    input.trim().to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return Ok(add_days(today, 1));
    }
    | "yesterday" => {
      return Ok(add_days(today, -1));
    }
    | _ => {}
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today, target
    ));
  }

  parse_local_date(&lower)
    .ok_or_else(|| {
      anyhow!(
        "unrecognized date: {input}"
      )
    })
    .with_context(|| {
      "supported formats: \
       today/tomorrow/yesterday, \
       weekday names (e.g. monday), \
       YYYY-MM-DD"
    })
}

#[must_use]
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}
