use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument};

use crate::cli::{Command, LayoutArgs, SlotArgs, WatchArgs};
use crate::config::Config;
use crate::datetime::{local_midnight, parse_date_arg};
use crate::normalize::Normalizer;
use crate::pipeline::{CalendarSession, compute_layout};
use crate::range::{ViewWidth, VisibleRange};
use crate::render::Renderer;
use crate::tracker::{NowTracker, SystemClock, now_marker};

#[instrument(skip_all)]
pub fn dispatch(cfg: &Config, renderer: &mut Renderer, command: Command, now: NaiveDateTime) -> anyhow::Result<()> {
    debug!(?command, %now, "dispatching command");

    match command {
        Command::Layout(args) => cmd_layout(cfg, renderer, &args, now),
        Command::Slot(args) => cmd_slot(cfg, renderer, &args, now),
        Command::Now => cmd_now(cfg, renderer, now),
        Command::Watch(args) => cmd_watch(cfg, renderer, &args),
    }
}

fn resolve_date(raw: Option<&str>, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    match raw {
        Some(raw) => parse_date_arg(raw, today).with_context(|| format!("invalid --date: {raw}")),
        None => Ok(today),
    }
}

#[instrument(skip_all)]
fn cmd_layout(cfg: &Config, renderer: &mut Renderer, args: &LayoutArgs, now: NaiveDateTime) -> anyhow::Result<()> {
    info!("command layout");

    let today = now.date();
    let anchor = resolve_date(args.date.as_deref(), today)?;
    let width = match args.days {
        Some(days) => ViewWidth::try_from(days)?,
        None => cfg.view_width(),
    };

    let mut session = CalendarSession::new(local_midnight(anchor), width, cfg.grid, cfg.timezone());
    for nav in &args.nav {
        session.navigate(*nav, today);
    }

    let (internal, external) = args.sources.feeds();
    session.receive(internal);
    session.receive(external);

    let marker = now_marker(&cfg.grid, now);
    let layout = session.refresh();
    info!(
        range = %layout.range,
        events = layout.event_count(),
        "computed calendar layout"
    );

    if args.json {
        renderer.print_json(layout)
    } else {
        renderer.print_layout(layout, &marker)
    }
}

#[instrument(skip_all)]
fn cmd_slot(cfg: &Config, renderer: &mut Renderer, args: &SlotArgs, now: NaiveDateTime) -> anyhow::Result<()> {
    info!("command slot");

    let date = resolve_date(args.date.as_deref(), now.date())?;
    let mapper = cfg.mapper();

    let intent = if args.all_day {
        mapper.create_all_day(date)
    } else if let Some(x) = args.x {
        let (internal, external) = args.sources.feeds();
        let range = VisibleRange::from_anchor(date, ViewWidth::One);
        let normalizer = Normalizer::new(cfg.timezone());
        let layout = compute_layout(&internal, &external, &range, &cfg.grid, &normalizer);
        match layout.day(date) {
            Some(day) => mapper.click(day, x, args.y, args.column_width),
            None => mapper.create_at(args.y, date),
        }
    } else {
        mapper.create_at(args.y, date)
    };

    if args.json {
        renderer.print_json(&intent)
    } else {
        renderer.print_intent(&intent)
    }
}

#[instrument(skip_all)]
fn cmd_now(cfg: &Config, renderer: &mut Renderer, now: NaiveDateTime) -> anyhow::Result<()> {
    info!("command now");
    renderer.print_marker(&now_marker(&cfg.grid, now))
}

#[instrument(skip_all, fields(ticks = args.ticks))]
fn cmd_watch(cfg: &Config, renderer: &mut Renderer, args: &WatchArgs) -> anyhow::Result<()> {
    info!("command watch");

    let tick = args.tick_seconds.map(Duration::from_secs).unwrap_or_else(|| cfg.tick());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start timer runtime")?;

    runtime.block_on(async {
        let clock = Arc::new(SystemClock::new(cfg.timezone()));
        let mut tracker = NowTracker::new(cfg.grid, clock).with_tick(tick);
        let mut markers = tracker.mount()?;

        let initial = *markers.borrow_and_update();
        renderer.print_marker(&initial)?;

        for _ in 0..args.ticks {
            markers.changed().await?;
            let marker = *markers.borrow_and_update();
            renderer.print_marker(&marker)?;
        }

        tracker.unmount();
        Ok::<(), anyhow::Error>(())
    })
}
