pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod fixtures;
pub mod history;
pub mod layout;
pub mod model;
pub mod persistence;
pub mod render;
pub mod selection;
pub mod theory;

pub use config::AppConfig;
pub use diagnostics::{
    TelemetryGuard, init_tracing, init_tracing_from_config, init_tracing_with_options,
};
pub use engine::{BarSymbol, Engine, EngineError, Palette};
pub use history::{DispatchMode, History};
pub use layout::{Barline, Line, MEASURES_PER_LINE, PlacedMeasure, SectionLayout, Slot};
pub use model::{
    Chart, ChartMeta, ChordQuality, Clipboard, EndRepeat, Key, MAJOR_KEYS, MINOR_KEYS, Measure,
    Mode, REPEAT_SHORTHAND, Section, ShapeError,
};
pub use persistence::{
    ChartRecord, ChartStore, ChartSummary, FileChartStore, create_chart, load_chart,
    serialize_chart,
};
pub use selection::{MeasureRef, Selection, SelectionRange};
