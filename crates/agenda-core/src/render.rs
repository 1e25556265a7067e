use std::io::{self, IsTerminal, Write};

use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::event::{CanonicalEvent, EventSource};
use crate::layout::DayLayout;
use crate::mapper::EventIntent;
use crate::normalize::MergeReport;
use crate::pipeline::CalendarLayout;
use crate::tracker::NowMarker;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.view.color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(range = %layout.range))]
    pub fn print_layout(&mut self, layout: &CalendarLayout, marker: &NowMarker) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_layout(&mut out, layout, marker)
    }

    pub fn write_layout<W: Write>(
        &self,
        mut writer: W,
        layout: &CalendarLayout,
        marker: &NowMarker,
    ) -> anyhow::Result<()> {
        self.write_report(&mut writer, &layout.report)?;

        let now_column = layout.now_column(marker);
        for (idx, day) in layout.days.iter().enumerate() {
            let heading = day.date.format("%a %Y-%m-%d").to_string();
            let heading = match (now_column == Some(idx), marker.top()) {
                (true, Some(top)) => format!("{heading}  (now at {top:.1}px)"),
                _ if marker.date() == day.date => format!("{heading}  (now off-grid)"),
                _ => heading,
            };
            writeln!(writer, "{}", self.paint(&heading, "1"))?;

            if day.all_day.is_empty() && day.timed.is_empty() {
                writeln!(writer, "  no events")?;
                writeln!(writer)?;
                continue;
            }

            write_table(&mut writer, day_headers(), self.day_rows(day))?;
            writeln!(writer)?;
        }

        Ok(())
    }

    fn write_report<W: Write>(&self, mut writer: W, report: &MergeReport) -> anyhow::Result<()> {
        for source in EventSource::all() {
            let entry = report.for_source(source);
            if let Some(err) = &entry.fetch_error {
                writeln!(writer, "{}", self.paint(&format!("warning: {err}"), "33"))?;
            }
            if entry.malformed > 0 && !entry.is_degraded() {
                writeln!(
                    writer,
                    "{}",
                    self.paint(
                        &format!("warning: skipped {} malformed {source} record(s)", entry.malformed),
                        "33"
                    )
                )?;
            }
        }
        Ok(())
    }

    fn day_rows(&self, day: &DayLayout) -> Vec<Vec<String>> {
        let mut rows = Vec::with_capacity(day.all_day.len() + day.rects.len());

        for event in &day.all_day {
            rows.push(vec![
                "all-day".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                self.title_cell(event),
                event.source.to_string(),
            ]);
        }

        for rect in &day.rects {
            let Some(event) = day.timed.iter().find(|event| event.id == rect.event_id) else {
                continue;
            };
            rows.push(vec![
                format!("{}-{}", event.start.format("%H:%M"), event.end.format("%H:%M")),
                format!("{}/{}", rect.lane + 1, rect.lane_count),
                format!("{:.1}", rect.top),
                format!("{:.1}", rect.height),
                self.title_cell(event),
                event.source.to_string(),
            ]);
        }

        rows
    }

    fn title_cell(&self, event: &CanonicalEvent) -> String {
        match event.source {
            EventSource::External => self.paint(&event.title, "36"),
            EventSource::Internal => event.title.clone(),
        }
    }

    pub fn print_marker(&mut self, marker: &NowMarker) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match marker {
            NowMarker::Visible { date, top } => {
                writeln!(out, "{date} now at {}", self.paint(&format!("{top:.1}px"), "31"))?;
            }
            NowMarker::Hidden { date } => {
                writeln!(out, "{date} now is outside the grid")?;
            }
        }
        Ok(())
    }

    pub fn print_intent(&mut self, intent: &EventIntent) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match intent {
            EventIntent::Create {
                start, end, all_day, ..
            } => {
                let kind = if *all_day { "create all-day" } else { "create" };
                writeln!(
                    out,
                    "{} {} .. {}",
                    self.paint(kind, "32"),
                    start.format("%Y-%m-%d %H:%M"),
                    end.format("%Y-%m-%d %H:%M")
                )?;
            }
            EventIntent::Edit { event_id, source } => {
                writeln!(out, "{} {event_id} ({source})", self.paint("edit", "33"))?;
            }
        }
        Ok(())
    }

    pub fn print_json<T: Serialize>(&mut self, value: &T) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn day_headers() -> Vec<String> {
    ["Time", "Lane", "Top", "Height", "Title", "Source"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    write!(writer, " ")?;
    for (idx, header) in headers.iter().enumerate() {
        write!(writer, " {:width$}", header, width = widths[idx])?;
    }
    writeln!(writer)?;

    write!(writer, " ")?;
    for width in &widths {
        write!(writer, " {:-<width$}", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        write!(writer, " ")?;
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, " {}{}", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
