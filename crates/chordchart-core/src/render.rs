//! Plain-text lead sheet export built on the shared layout.

use std::{fmt::Write as _, fs, path::Path};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::{
    layout::{self, Line, Slot},
    model::Chart,
};

const CELL_WIDTH: usize = 10;

/// One layout line as text, e.g. `|: G          | Am         :|x2`.
#[must_use]
pub fn render_line(line: &Line) -> String {
    let mut text = line.opening.to_string();
    for slot in &line.slots {
        match slot {
            Slot::Measure(measure) => {
                let chords = measure.chords.join(" ");
                let _ = write!(text, " {chords:<CELL_WIDTH$} {}", measure.closing);
            }
            Slot::Empty => text.push_str(&" ".repeat(CELL_WIDTH + 2)),
        }
    }
    text.trim_end().to_string()
}

#[must_use]
pub fn render_chart_text(chart: &Chart) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{}", chart.title);
    let _ = writeln!(text, "{}", chart.artist);
    let _ = writeln!(text, "Key: {} ({})", chart.key, chart.mode);

    for section in layout::layout_chart(chart) {
        let _ = writeln!(text);
        let _ = writeln!(text, "[{}]", section.name);
        for line in &section.lines {
            let _ = writeln!(text, "{}", render_line(line));
        }
    }

    debug!(bytes = text.len(), "chart rendered as text");
    text
}

#[instrument(skip(chart), fields(chart_id = %chart.id, path = %path.display()))]
pub fn export_text(chart: &Chart, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create text output directory: {}",
                parent.display()
            )
        })?;
    }

    fs::write(path, render_chart_text(chart))
        .with_context(|| format!("failed to write text chart: {}", path.display()))?;
    info!("text export completed");
    Ok(())
}
