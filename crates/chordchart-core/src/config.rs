use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{ChartMeta, ChordQuality, Key, Mode};

pub const CONFIG_FILE_NAME: &str = "chordchart.config.toml";
pub const CONFIG_PATH_ENV: &str = "CHORDCHART_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chart: ChartConfig,
    pub editor: EditorConfig,
    pub diagnostics: DiagnosticsConfig,
    pub paths: PathsConfig,
}

/// Metadata for newly created charts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub default_title: String,
    pub default_artist: String,
    pub default_key: Key,
    pub default_mode: Mode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub double_chord_mode: bool,
    pub palette_quality: ChordQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
    pub store_dir: PathBuf,
    pub export_dir: PathBuf,
    pub store_user_id: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        let meta = ChartMeta::default();
        Self {
            default_title: meta.title,
            default_artist: meta.artist,
            default_key: meta.key,
            default_mode: meta.mode,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: "info,chordchart_core=trace".to_string(),
            trace_file_prefix: "chordchart".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            store_dir: PathBuf::from("data/store"),
            export_dir: PathBuf::from("data/exports"),
            store_user_id: "local".to_string(),
        }
    }
}

impl ChartConfig {
    #[must_use]
    pub fn meta(&self) -> ChartMeta {
        ChartMeta {
            title: self.default_title.clone(),
            artist: self.default_artist.clone(),
            key: self.default_key.clone(),
            mode: self.default_mode,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::from_path(&config_path)
    }

    /// Like [`AppConfig::load`], but falls back to defaults when no config
    /// file exists. A file that exists and fails to parse is still an error.
    pub fn load_or_default() -> Result<Self> {
        match discover_config_path() {
            Ok(path) => Self::from_path(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}
