use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::model::{Chart, ChartMeta, Key, Mode, Section, ShapeError, normalize_id};

const RECORD_EXTENSION: &str = "json";

/// A chart as the document store keeps it. `sections` is written as
/// JSON-encoded text; a native array is accepted on load as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRecord {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub key: String,
    pub mode: String,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    pub sections: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSummary {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub saved_at: Option<DateTime<Utc>>,
}

impl From<&Chart> for ChartSummary {
    fn from(chart: &Chart) -> Self {
        Self {
            id: chart.id,
            title: chart.title.clone(),
            artist: chart.artist.clone(),
            saved_at: chart.saved_at,
        }
    }
}

#[must_use]
pub fn create_chart(meta: ChartMeta) -> Chart {
    Chart::new(meta)
}

#[instrument(skip(record), fields(chart_id = %record.id))]
pub fn load_chart(record: ChartRecord) -> Result<Chart, ShapeError> {
    let id = normalize_id("chart", &record.id)?;
    let key = Key::parse(&record.key)?;
    let mode: Mode = record.mode.parse()?;
    let sections = decode_sections(record.sections)?;

    let chart = Chart {
        id,
        title: record.title,
        artist: record.artist,
        key,
        mode,
        saved_at: record.saved_at,
        sections,
    };
    chart.validate()?;
    debug!(sections = chart.sections.len(), "chart decoded");
    Ok(chart)
}

pub fn serialize_chart(chart: &Chart) -> Result<ChartRecord, ShapeError> {
    let sections = serde_json::to_string(&chart.sections)
        .map_err(|error| ShapeError::Sections(error.to_string()))?;
    Ok(ChartRecord {
        id: chart.id.to_string(),
        title: chart.title.clone(),
        artist: chart.artist.clone(),
        key: chart.key.to_string(),
        mode: chart.mode.to_string(),
        saved_at: chart.saved_at,
        sections: Value::String(sections),
    })
}

fn decode_sections(payload: Value) -> Result<Vec<Section>, ShapeError> {
    let sections: Vec<Section> = match payload {
        Value::String(text) => serde_json::from_str(&text),
        native @ Value::Array(_) => serde_json::from_value(native),
        other => {
            return Err(ShapeError::Sections(format!(
                "expected encoded text or an array, found {other}"
            )));
        }
    }
    .map_err(|error| ShapeError::Sections(error.to_string()))?;

    if sections.is_empty() {
        return Err(ShapeError::NoSections);
    }
    Ok(sections)
}

/// Parses a record from raw JSON and decodes it into a chart.
pub fn decode_chart(bytes: &[u8]) -> Result<Chart> {
    let record: ChartRecord = serde_json::from_slice(bytes).context("invalid chart record json")?;
    Ok(load_chart(record)?)
}

#[instrument(skip(record), fields(chart_id = %record.id, path = %path.display()))]
pub fn save_record(path: &Path, record: &ChartRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(record).context("failed to serialize chart record")?;
    let mut temp_file = tempfile::NamedTempFile::new_in(
        path.parent()
            .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf),
    )
    .context("failed to create temp chart file")?;

    temp_file
        .write_all(&json)
        .context("failed to write temp chart file")?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist chart: {}", path.display()))?;

    info!("chart record saved");
    Ok(())
}

#[instrument(fields(path = %path.display()))]
pub fn load_record(path: &Path) -> Result<ChartRecord> {
    let content =
        fs::read(path).with_context(|| format!("failed to read chart: {}", path.display()))?;
    let record: ChartRecord =
        serde_json::from_slice(&content).context("invalid chart record json")?;
    debug!(chart_id = %record.id, "chart record read");
    Ok(record)
}

/// Persistence port. The engine hands records over and never touches storage
/// itself.
pub trait ChartStore {
    fn save(&self, record: &ChartRecord) -> Result<()>;
    fn load(&self, chart_id: Uuid) -> Result<ChartRecord>;
    /// Stored charts, most recently saved first.
    fn list(&self) -> Result<Vec<ChartSummary>>;
}

/// One JSON file per chart under `<root>/users/<user_id>/charts/`.
#[derive(Debug, Clone)]
pub struct FileChartStore {
    charts_dir: PathBuf,
}

impl FileChartStore {
    #[must_use]
    pub fn new(root: impl AsRef<Path>, user_id: &str) -> Self {
        Self {
            charts_dir: root.as_ref().join("users").join(user_id).join("charts"),
        }
    }

    #[must_use]
    pub fn charts_dir(&self) -> &Path {
        &self.charts_dir
    }

    #[must_use]
    pub fn record_path(&self, chart_id: Uuid) -> PathBuf {
        self.charts_dir
            .join(format!("{chart_id}.{RECORD_EXTENSION}"))
    }
}

impl ChartStore for FileChartStore {
    fn save(&self, record: &ChartRecord) -> Result<()> {
        let chart_id = Uuid::parse_str(&record.id)
            .with_context(|| format!("record id is not a chart id: {}", record.id))?;
        save_record(&self.record_path(chart_id), record)
    }

    fn load(&self, chart_id: Uuid) -> Result<ChartRecord> {
        load_record(&self.record_path(chart_id))
    }

    #[instrument(skip(self), fields(dir = %self.charts_dir.display()))]
    fn list(&self) -> Result<Vec<ChartSummary>> {
        if !self.charts_dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.charts_dir).with_context(|| {
            format!("failed to list charts: {}", self.charts_dir.display())
        })?;

        let mut summaries = Vec::new();
        for entry in entries {
            let path = entry.context("failed to read chart directory entry")?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match load_record(&path).and_then(|record| Ok(load_chart(record)?)) {
                Ok(chart) => summaries.push(ChartSummary::from(&chart)),
                Err(error) => warn!(path = %path.display(), ?error, "skipping unreadable chart"),
            }
        }

        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        debug!(count = summaries.len(), "charts listed");
        Ok(summaries)
    }
}
