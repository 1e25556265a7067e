use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info,
  warn
};

use crate::datetime::{
  parse_timezone,
  resolve_timezone
};
use crate::grid::GridConfig;
use crate::mapper::{
  DEFAULT_EVENT_MINUTES,
  DEFAULT_SNAP_MINUTES,
  InteractionMapper
};
use crate::range::ViewWidth;

pub const CONFIG_ENV_VAR: &str =
  "AGENDA_CONFIG";
const CONFIG_DIR_NAME: &str = "agenda";
const CONFIG_FILE_NAME: &str =
  "agenda.toml";

fn view_default_width_days() -> u8 {
  1
}

fn view_default_snap_minutes() -> u32 {
  DEFAULT_SNAP_MINUTES
}

fn view_default_event_minutes() -> u32
{
  DEFAULT_EVENT_MINUTES
}

fn view_true() -> bool {
  true
}

fn tracker_default_tick_seconds() -> u64
{
  60
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct ViewSettings {
  #[serde(
    default = "view_default_width_days"
  )]
  pub width_days:            u8,
  #[serde(
    default = "view_default_snap_minutes"
  )]
  pub snap_minutes:          u32,
  #[serde(
    default = "view_default_event_minutes"
  )]
  pub default_event_minutes: u32,
  #[serde(default = "view_true")]
  pub color:                 bool
}

impl Default for ViewSettings {
  fn default() -> Self {
    Self {
      width_days:            view_default_width_days(),
      snap_minutes:          view_default_snap_minutes(),
      default_event_minutes: view_default_event_minutes(),
      color:                 true
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct TrackerSettings {
  #[serde(
    default = "tracker_default_tick_seconds"
  )]
  pub tick_seconds: u64
}

impl Default for TrackerSettings {
  fn default() -> Self {
    Self {
      tick_seconds:
        tracker_default_tick_seconds()
    }
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct Config {
  #[serde(default)]
  pub timezone:     Option<String>,
  #[serde(default)]
  pub grid:         GridConfig,
  #[serde(default)]
  pub view:         ViewSettings,
  #[serde(default)]
  pub tracker:      TrackerSettings,
  #[serde(skip)]
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let path = resolve_config_path(
      config_override
    )?;

    let mut cfg = match path {
      | Some(path) => {
        info!(config = %path.display(), "loading config");
        Self::load_file(&path)?
      }
      | None => {
        warn!(
          "no config file found; using \
           defaults"
        );
        Self::default()
      }
    };

    cfg.sanitize();
    Ok(cfg)
  }

  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let mut cfg: Self =
      toml::from_str(text)
        .context("invalid config")?;
    cfg.sanitize();
    Ok(cfg)
  }

  #[tracing::instrument]
  fn load_file(
    path: &Path
  ) -> anyhow::Result<Self> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let mut cfg: Self =
      toml::from_str(&text)
        .with_context(|| {
          format!(
            "failed to parse {}",
            path.display()
          )
        })?;
    cfg.loaded_files.push(path);
    Ok(cfg)
  }

  /// Applies `key=value` overrides using dotted keys, e.g.
  /// `grid.start_hour=8`. Values are re-sanitized afterwards.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k.trim();
      let value = v.trim();
      debug!(key = %key, value = %value, "applying override");

      match key {
        | "timezone" => {
          if parse_timezone(value, key)
            .is_none()
          {
            return Err(anyhow!(
              "invalid value for {key}: \
               {value} (unknown timezone)"
            ));
          }
          self.timezone =
            Some(value.to_string());
        }
        | "grid.start_hour" => {
          self.grid.start_hour =
            parse_value(key, value)?;
        }
        | "grid.end_hour" => {
          self.grid.end_hour =
            parse_value(key, value)?;
        }
        | "grid.hour_height_px" => {
          self.grid.hour_height_px =
            parse_value(key, value)?;
        }
        | "grid.min_event_height_px" => {
          self
            .grid
            .min_event_height_px =
            parse_value(key, value)?;
        }
        | "view.width_days" => {
          self.view.width_days =
            parse_value(key, value)?;
        }
        | "view.snap_minutes" => {
          self.view.snap_minutes =
            parse_value(key, value)?;
        }
        | "view.default_event_minutes" => {
          self
            .view
            .default_event_minutes =
            parse_value(key, value)?;
        }
        | "view.color" => {
          self.view.color =
            parse_bool(value).ok_or_else(
              || {
                anyhow!(
                  "invalid value for \
                   {key}: {value} \
                   (expected on/off)"
                )
              }
            )?;
        }
        | "tracker.tick_seconds" => {
          self.tracker.tick_seconds =
            parse_value(key, value)?;
        }
        | other => {
          return Err(anyhow!(
            "unknown config key: {other}"
          ));
        }
      }
    }

    self.sanitize();
    Ok(())
  }

  fn sanitize(&mut self) {
    self.grid.sanitize();

    if ViewWidth::try_from(
      self.view.width_days
    )
    .is_err()
    {
      warn!(
        width_days = self.view.width_days,
        "view width must be 1-3 days; \
         clamping"
      );
      self.view.width_days =
        self.view.width_days.clamp(1, 3);
    }
    if !(1..=60)
      .contains(&self.view.snap_minutes)
    {
      warn!(
        snap_minutes =
          self.view.snap_minutes,
        "snap granularity must be 1-60 \
         minutes; clamping"
      );
      self.view.snap_minutes = self
        .view
        .snap_minutes
        .clamp(1, 60);
    }
    if self.view.default_event_minutes
      == 0
    {
      warn!(
        "default event duration cannot \
         be zero; using default"
      );
      self.view.default_event_minutes =
        view_default_event_minutes();
    }
    if self.tracker.tick_seconds == 0 {
      warn!(
        "tracker tick cannot be zero; \
         using one second"
      );
      self.tracker.tick_seconds = 1;
    }
  }

  pub fn view_width(&self) -> ViewWidth {
    ViewWidth::try_from(
      self.view.width_days
    )
    .unwrap_or_default()
  }

  pub fn tick(&self) -> Duration {
    Duration::from_secs(
      self.tracker.tick_seconds
    )
  }

  pub fn timezone(&self) -> Tz {
    resolve_timezone(
      self.timezone.as_deref()
    )
  }

  pub fn mapper(
    &self
  ) -> InteractionMapper {
    InteractionMapper::new(self.grid)
      .with_snap_minutes(
        self.view.snap_minutes
      )
      .with_default_duration_minutes(
        self.view.default_event_minutes
      )
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(env_path) =
    std::env::var(CONFIG_ENV_VAR)
  {
    if env_path == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      env_path
    )));
  }

  let Some(config_dir) =
    dirs::config_dir()
  else {
    debug!(
      "cannot determine config \
       directory"
    );
    return Ok(None);
  };
  let candidate = config_dir
    .join(CONFIG_DIR_NAME)
    .join(CONFIG_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn parse_value<T>(
  key: &str,
  value: &str
) -> anyhow::Result<T>
where
  T: std::str::FromStr,
  T::Err: std::fmt::Display
{
  value.parse::<T>().map_err(|err| {
    anyhow!(
      "invalid value for {key}: \
       {value} ({err})"
    )
  })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn missing_sections_fall_back_to_defaults() {
    let cfg = Config::from_toml_str(
      "timezone = \"America/Denver\"\n"
    )
    .expect("parse");
    assert_eq!(
      cfg.grid,
      GridConfig::default()
    );
    assert_eq!(
      cfg.view,
      ViewSettings::default()
    );
    assert_eq!(
      cfg.tick(),
      Duration::from_secs(60)
    );
  }

  #[test]
  fn loads_file_and_sanitizes() {
    let mut file =
      tempfile::NamedTempFile::new()
        .expect("temp file");
    writeln!(
      file,
      "[grid]\nstart_hour = 7\nend_hour = \
       19\nhour_height_px = 48.0\n\n\
       [view]\nwidth_days = 9\n\
       snap_minutes = 0\n"
    )
    .expect("write config");

    let cfg = Config::load(Some(
      file.path()
    ))
    .expect("load");
    assert_eq!(cfg.grid.start_hour, 7);
    assert_eq!(cfg.grid.end_hour, 19);
    assert_eq!(
      cfg.view_width(),
      ViewWidth::Three
    );
    assert_eq!(cfg.view.snap_minutes, 1);
    assert_eq!(
      cfg.loaded_files,
      vec![file.path().to_path_buf()]
    );
  }

  #[test]
  fn unreadable_file_is_an_error() {
    let dir = tempfile::tempdir()
      .expect("temp dir");
    let missing =
      dir.path().join("nope.toml");
    assert!(
      Config::load(Some(&missing))
        .is_err()
    );
  }

  #[test]
  fn overrides_use_dotted_keys() {
    let mut cfg = Config::default();
    cfg
      .apply_overrides(vec![
        (
          "grid.start_hour".to_string(),
          "8".to_string()
        ),
        (
          "view.color".to_string(),
          "off".to_string()
        ),
        (
          "tracker.tick_seconds"
            .to_string(),
          "0".to_string()
        ),
      ])
      .expect("apply");
    assert_eq!(cfg.grid.start_hour, 8);
    assert!(!cfg.view.color);
    assert_eq!(
      cfg.tracker.tick_seconds,
      1
    );
  }

  #[test]
  fn unknown_or_bad_overrides_fail() {
    let mut cfg = Config::default();
    assert!(
      cfg
        .apply_overrides(vec![(
          "grid.colour".to_string(),
          "red".to_string()
        )])
        .is_err()
    );
    assert!(
      cfg
        .apply_overrides(vec![(
          "grid.end_hour".to_string(),
          "late".to_string()
        )])
        .is_err()
    );
  }

  #[test]
  fn timezone_and_color_overrides_are_validated() {
    let mut cfg = Config::default();
    assert!(
      cfg
        .apply_overrides(vec![(
          "timezone".to_string(),
          "Mars/Base".to_string()
        )])
        .is_err()
    );
    assert_eq!(cfg.timezone, None);

    assert!(
      cfg
        .apply_overrides(vec![(
          "view.color".to_string(),
          "banana".to_string()
        )])
        .is_err()
    );
    assert!(cfg.view.color);

    cfg
      .apply_overrides(vec![
        (
          "timezone".to_string(),
          "America/Denver".to_string()
        ),
        (
          "view.color".to_string(),
          "no".to_string()
        ),
      ])
      .expect("valid overrides");
    assert_eq!(
      cfg.timezone.as_deref(),
      Some("America/Denver")
    );
    assert!(!cfg.view.color);
  }
}
