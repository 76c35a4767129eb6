use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use chordchart_core::{
    AppConfig, ChartStore, ChordQuality, Engine, FileChartStore, Mode,
    diagnostics::init_tracing_from_config,
    fixtures::demo_chart,
    persistence::{load_record, save_record, serialize_chart},
    render::{export_text, render_chart_text},
    theory::{diatonic_chords, secondary_chords},
};

#[derive(Debug, Parser)]
#[command(name = "chordchart-cli")]
#[command(about = "Headless tools for chord chart records: demo, render, transpose, palette")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides `paths.logs_dir` from the config file.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Writes the starter chart as a record (and optionally as text).
    Demo {
        /// Defaults to `demo.chart.json` in `paths.export_dir`.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also writes `demo.txt` next to the record.
        #[arg(long)]
        text: bool,
    },
    /// Prints a chart record as a text lead sheet.
    Render {
        #[arg(long)]
        input: PathBuf,

        /// Also writes `<chart id>.txt` into `paths.export_dir`.
        #[arg(long)]
        export: bool,
    },
    /// Transposes every chord of a record by N semitones.
    Transpose {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        steps: i32,

        /// Defaults to overwriting the input record.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Prints diatonic and secondary chords for a key.
    Palette {
        /// Defaults to `chart.default_key`.
        #[arg(long)]
        key: Option<String>,

        /// Defaults to `chart.default_mode`.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Defaults to `editor.palette_quality`.
        #[arg(long, value_enum)]
        quality: Option<QualityArg>,
    },
    /// Lists charts in the configured store, newest save first.
    List,
}

#[derive(Debug, Clone, ValueEnum)]
enum ModeArg {
    Major,
    Minor,
}

#[derive(Debug, Clone, ValueEnum)]
enum QualityArg {
    Triad,
    Tetrad,
}

impl From<ModeArg> for Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Major => Self::Major,
            ModeArg::Minor => Self::Minor,
        }
    }
}

impl From<QualityArg> for ChordQuality {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::Triad => Self::Triad,
            QualityArg::Tetrad => Self::Tetrad,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default()?;
    let log_dir = cli.log_dir.unwrap_or_else(|| config.paths.logs_dir.clone());
    let _telemetry = init_tracing_from_config(&log_dir, &config.diagnostics)?;

    match cli.command {
        Commands::Demo { output, text } => {
            let chart = demo_chart();
            let output =
                output.unwrap_or_else(|| config.paths.export_dir.join("demo.chart.json"));
            save_record(&output, &serialize_chart(&chart)?)?;
            if text {
                let text_path = output.with_file_name("demo.txt");
                export_text(&chart, &text_path)?;
            }
            tracing::info!(path = %output.display(), "demo chart written");
        }
        Commands::Render { input, export } => {
            let mut engine = Engine::from_config(&config);
            engine.load_chart(load_record(&input)?)?;
            print!("{}", render_chart_text(engine.chart()));
            if export {
                let text_path = config
                    .paths
                    .export_dir
                    .join(format!("{}.txt", engine.chart().id));
                export_text(engine.chart(), &text_path)?;
            }
        }
        Commands::Transpose {
            input,
            steps,
            output,
        } => {
            let mut engine = Engine::from_config(&config);
            engine.load_chart(load_record(&input)?)?;
            engine.transpose_chart(steps);
            let output = output.unwrap_or(input);
            save_record(&output, &serialize_chart(engine.chart())?)?;
            tracing::info!(
                path = %output.display(),
                key = %engine.chart().key,
                "chart transposed"
            );
        }
        Commands::Palette { key, mode, quality } => {
            let key = key.unwrap_or_else(|| config.chart.default_key.to_string());
            let mode = mode.map_or(config.chart.default_mode, Mode::from);
            let quality = quality.map_or(config.editor.palette_quality, ChordQuality::from);
            println!("diatonic:  {}", diatonic_chords(&key, mode, quality).join(" "));
            println!("secondary: {}", secondary_chords(&key, mode, quality).join(" "));
        }
        Commands::List => {
            let store = FileChartStore::new(&config.paths.store_dir, &config.paths.store_user_id);
            for summary in store.list()? {
                let saved = summary
                    .saved_at
                    .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
                println!("{}  {} - {}  (saved {saved})", summary.id, summary.title, summary.artist);
            }
        }
    }

    Ok(())
}
