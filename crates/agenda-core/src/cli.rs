use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::error::SourceFetchError;
use crate::event::EventSource;
use crate::range::Navigate;
use crate::source::SourceFeed;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "agenda",
    version,
    about = "Agenda: merge calendar sources and lay out day columns",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Config file; defaults to $AGENDA_CONFIG, then the user config dir.
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(
        long = "set",
        value_name = "KEY=VALUE",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub overrides: Vec<KeyVal>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Merge both sources and print the layout of the visible range.
    Layout(LayoutArgs),
    /// Map a pointer position on a day column to a create/edit intent.
    Slot(SlotArgs),
    /// Print the current-time marker.
    Now,
    /// Run the current-time tracker and print each marker it publishes.
    Watch(WatchArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// JSON file with internal event rows. Omitted means not connected.
    #[arg(long = "internal")]
    pub internal: Option<PathBuf>,

    /// JSON file with provider event resources. Omitted means not connected.
    #[arg(long = "external")]
    pub external: Option<PathBuf>,
}

impl SourceArgs {
    pub fn feeds(&self) -> (SourceFeed, SourceFeed) {
        (
            load_feed(EventSource::Internal, self.internal.as_deref()),
            load_feed(EventSource::External, self.external.as_deref()),
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Anchor date: today, tomorrow, a weekday name or YYYY-MM-DD.
    #[arg(long = "date")]
    pub date: Option<String>,

    /// Number of visible days (1-3); defaults to `view.width_days`.
    #[arg(long = "days")]
    pub days: Option<u8>,

    /// Navigation steps applied after anchoring, in order.
    #[arg(
        long = "nav",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Navigate>()),
        action = ArgAction::Append
    )]
    pub nav: Vec<Navigate>,

    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SlotArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Vertical pointer offset in pixels from the top of the grid.
    #[arg(long = "y", default_value_t = 0.0, allow_negative_numbers = true)]
    pub y: f64,

    /// Horizontal pointer offset; when set, events under the pointer are hit-tested.
    #[arg(long = "x", allow_negative_numbers = true)]
    pub x: Option<f64>,

    #[arg(long = "column-width", default_value_t = 240.0)]
    pub column_width: f64,

    #[arg(long = "date")]
    pub date: Option<String>,

    /// Click landed in the all-day row.
    #[arg(long = "all-day")]
    pub all_day: bool,

    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Stop after this many timer ticks.
    #[arg(long = "ticks", default_value_t = 1)]
    pub ticks: u32,

    /// Override `tracker.tick_seconds` for this run.
    #[arg(long = "tick-seconds")]
    pub tick_seconds: Option<u64>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Reads one source's payload from disk. A source without a file is treated
/// as not connected; an unreadable file is a transport failure.
#[tracing::instrument(skip(path), fields(path = ?path))]
pub fn load_feed(source: EventSource, path: Option<&Path>) -> SourceFeed {
    let Some(path) = path else {
        debug!("source not configured");
        return SourceFeed::failed(SourceFetchError::NotConnected { origin: source });
    };

    match std::fs::read_to_string(path) {
        Ok(payload) => SourceFeed::decode_json(source, &payload),
        Err(err) => {
            warn!(error = %err, "failed to read source payload");
            SourceFeed::failed(SourceFetchError::Transport {
                origin: source,
                message: format!("{}: {err}", path.display()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_layout_invocation() {
        let cli = GlobalCli::try_parse_from([
            "agenda",
            "-vv",
            "--set",
            "grid.start_hour=8",
            "layout",
            "--internal",
            "crm.json",
            "--days",
            "3",
            "--nav",
            "next",
            "--nav",
            "prev",
            "--json",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.overrides[0].key, "grid.start_hour");
        assert_eq!(cli.overrides[0].value, "8");
        match cli.command {
            Command::Layout(args) => {
                assert_eq!(args.sources.internal, Some(PathBuf::from("crm.json")));
                assert!(args.sources.external.is_none());
                assert_eq!(args.days, Some(3));
                assert_eq!(args.nav, vec![Navigate::Next, Navigate::Prev]);
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_override() {
        assert!(GlobalCli::try_parse_from(["agenda", "--set", "novalue", "now"]).is_err());
    }

    #[test]
    fn missing_source_is_not_connected() {
        let feed = load_feed(EventSource::External, None);
        assert_eq!(
            feed.outcome,
            Err(SourceFetchError::NotConnected {
                origin: EventSource::External
            })
        );
    }

    #[test]
    fn unreadable_source_is_transport_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let feed = load_feed(EventSource::Internal, Some(&dir.path().join("missing.json")));
        assert!(matches!(
            feed.outcome,
            Err(SourceFetchError::Transport {
                origin: EventSource::Internal,
                ..
            })
        ));
    }

    #[test]
    fn reads_source_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"[{{"id": 7, "title": "Standup", "start_time": "2024-05-06T09:00:00"}}]"#
        )
        .expect("write");

        let feed = load_feed(EventSource::Internal, Some(file.path()));
        let decoded = feed.outcome.expect("decoded");
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.undecodable, 0);
    }
}
