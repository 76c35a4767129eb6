use std::num::NonZeroU32;

use chordchart_core::{
    Chart, ChartMeta, ChartStore, ChartSummary, EndRepeat, Engine, EngineError, FileChartStore,
    Key, MAJOR_KEYS, MINOR_KEYS, Measure, Mode, Section, ShapeError, create_chart,
    fixtures::demo_chart,
    load_chart,
    persistence::{ChartRecord, decode_chart},
    serialize_chart,
};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Value, json};
use uuid::Uuid;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + seconds, 0)
        .single()
        .expect("timestamp should be valid")
}

struct FullDiskStore;

impl ChartStore for FullDiskStore {
    fn save(&self, _record: &ChartRecord) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    fn load(&self, chart_id: Uuid) -> anyhow::Result<ChartRecord> {
        anyhow::bail!("chart {chart_id} not stored")
    }

    fn list(&self) -> anyhow::Result<Vec<ChartSummary>> {
        Ok(Vec::new())
    }
}

const CHORDS: [&str; 8] = ["C", "Dm7", "G7/B", "%", "F#m7b5", "Bbmaj7", "Eb", "Asus4"];

fn any_key() -> impl Strategy<Value = Key> {
    prop::sample::select(MAJOR_KEYS.iter().chain(MINOR_KEYS.iter()).copied().collect::<Vec<_>>())
        .prop_map(|name| Key::parse(name).expect("listed keys should parse"))
}

fn any_end_repeat() -> impl Strategy<Value = EndRepeat> {
    prop_oneof![
        Just(EndRepeat::Absent),
        Just(EndRepeat::Repeat(None)),
        (1u32..16).prop_map(|times| EndRepeat::Repeat(NonZeroU32::new(times))),
        Just(EndRepeat::DoubleBar),
    ]
}

fn any_measure() -> impl Strategy<Value = Measure> {
    (
        any::<u128>(),
        prop::collection::vec(prop::sample::select(CHORDS.to_vec()), 1..=2),
        any::<bool>(),
        any_end_repeat(),
    )
        .prop_map(|(id, chords, start_repeat, end_repeat)| Measure {
            id: Uuid::from_u128(id),
            chords: chords.into_iter().map(str::to_string).collect(),
            start_repeat,
            end_repeat,
        })
}

fn any_section() -> impl Strategy<Value = Section> {
    (
        any::<u128>(),
        "\\PC{0,16}",
        prop::collection::vec(any_measure(), 0..9),
    )
        .prop_map(|(id, name, measures)| Section {
            id: Uuid::from_u128(id),
            name,
            measures,
        })
}

fn any_chart() -> impl Strategy<Value = Chart> {
    (
        any::<u128>(),
        "\\PC{0,24}",
        "\\PC{0,24}",
        any_key(),
        prop_oneof![Just(Mode::Major), Just(Mode::Minor)],
        prop::option::of(0i64..4_000_000_000),
        prop::collection::vec(any_section(), 1..5),
    )
        .prop_map(|(id, title, artist, key, mode, saved_at, sections)| Chart {
            id: Uuid::from_u128(id),
            title,
            artist,
            key,
            mode,
            saved_at: saved_at.and_then(|seconds| Utc.timestamp_opt(seconds, 0).single()),
            sections,
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn any_valid_chart_survives_a_record_round_trip(chart in any_chart()) {
        prop_assert!(chart.validate().is_ok());

        let record = serialize_chart(&chart).expect("serialize should succeed");
        prop_assert_eq!(&load_chart(record.clone()).expect("record should load"), &chart);

        let json = serde_json::to_vec(&record).expect("record should encode");
        prop_assert_eq!(decode_chart(&json).expect("bytes should decode"), chart);
    }
}

#[test]
fn record_round_trip_reproduces_chart() {
    let mut chart = demo_chart();
    chart.saved_at = Some(at(5));
    let record = serialize_chart(&chart).expect("serialize should succeed");

    assert!(matches!(record.sections, Value::String(_)));
    assert_eq!(record.mode, "major");

    let json = serde_json::to_vec(&record).expect("record should encode");
    let restored = decode_chart(&json).expect("record should decode");
    assert_eq!(restored, chart);
}

#[test]
fn native_sections_array_is_accepted() {
    let chart = demo_chart();
    let mut record = serialize_chart(&chart).expect("serialize should succeed");
    record.sections =
        serde_json::to_value(&chart.sections).expect("sections should encode as a value");

    assert_eq!(load_chart(record).expect("load should succeed"), chart);
}

#[test]
fn malformed_sections_payload_is_a_shape_error() {
    let mut record = serialize_chart(&demo_chart()).expect("serialize should succeed");
    record.sections = Value::String("[{\"id\":".to_string());
    assert!(matches!(load_chart(record), Err(ShapeError::Sections(_))));

    let mut record = serialize_chart(&demo_chart()).expect("serialize should succeed");
    record.sections = json!(42);
    assert!(matches!(load_chart(record), Err(ShapeError::Sections(_))));

    let mut record = serialize_chart(&demo_chart()).expect("serialize should succeed");
    record.sections = Value::String("[]".to_string());
    assert_eq!(load_chart(record), Err(ShapeError::NoSections));
}

#[test]
fn unknown_key_and_mode_are_rejected() {
    let mut record = serialize_chart(&demo_chart()).expect("serialize should succeed");
    record.key = "H".to_string();
    assert_eq!(
        load_chart(record),
        Err(ShapeError::UnknownKey("H".to_string()))
    );

    let mut record = serialize_chart(&demo_chart()).expect("serialize should succeed");
    record.mode = "dorian".to_string();
    assert_eq!(
        load_chart(record),
        Err(ShapeError::UnknownMode("dorian".to_string()))
    );
}

#[test]
fn legacy_measure_markers_load() {
    let record = ChartRecord {
        id: "3d0c6f7e-2b1a-4c5d-9e8f-7a6b5c4d3e2f".to_string(),
        title: "Vieja".to_string(),
        artist: "Anónimo".to_string(),
        key: "Dm".to_string(),
        mode: "minor".to_string(),
        saved_at: None,
        sections: Value::String(
            json!([{
                "id": "5b7e2a10-8c3d-4f6e-a1b2-c3d4e5f60718",
                "name": "Intro",
                "measures": [
                    {"id": "c1a2b3d4-e5f6-4718-9a0b-1c2d3e4f5a00", "chords": ["Dm"], "endRepeat": true},
                    {"id": "c1a2b3d4-e5f6-4718-9a0b-1c2d3e4f5a01", "chords": ["A7"], "endRepeat": null},
                    {"id": "c1a2b3d4-e5f6-4718-9a0b-1c2d3e4f5a02", "chords": ["Gm", "A7"], "endRepeat": ":|x3"}
                ]
            }])
            .to_string(),
        ),
    };

    let chart = load_chart(record).expect("legacy record should load");
    assert_eq!(chart.key, Key::parse("Dm").expect("Dm is a key"));
    assert_eq!(chart.mode, Mode::Minor);
    let glyphs: Vec<Option<String>> = chart.sections[0]
        .measures
        .iter()
        .map(|measure| measure.end_repeat.glyph())
        .collect();
    assert_eq!(
        glyphs,
        vec![Some(":|".to_string()), None, Some(":|x3".to_string())]
    );
}

#[test]
fn new_chart_starts_with_one_empty_section() {
    let chart = create_chart(ChartMeta::default());
    assert_eq!(chart.title, "Mi Partitura");
    assert_eq!(chart.sections.len(), 1);
    assert!(chart.sections[0].measures.is_empty());
    assert!(chart.saved_at.is_none());
    assert!(chart.validate().is_ok());
}

#[test]
fn save_stamps_time_without_new_undo_step() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let store = FileChartStore::new(temp.path(), "ana");
    let mut engine = Engine::new(demo_chart());
    engine.set_title("Con título");

    let record = engine.save(&store, at(10)).expect("save should succeed");

    assert_eq!(engine.history().depth(), 2);
    assert_eq!(engine.chart().saved_at, Some(at(10)));
    assert_eq!(record.saved_at, Some(at(10)));
    assert!(engine.undo());
    assert_eq!(engine.chart().saved_at, None);

    let stored = store
        .load(demo_chart().id)
        .expect("stored record should load");
    assert!(engine.redo());
    assert_eq!(
        &load_chart(stored).expect("stored chart should decode"),
        engine.chart()
    );
}

#[test]
fn failed_store_leaves_chart_unsaved() {
    let mut engine = Engine::new(demo_chart());
    engine.set_title("Sin guardar");

    let result = engine.save(&FullDiskStore, at(20));

    assert!(matches!(result, Err(EngineError::Store(message)) if message.contains("disk full")));
    assert_eq!(engine.chart().saved_at, None);
    assert_eq!(engine.history().depth(), 2);
    assert!(engine.undo());
    assert_eq!(engine.chart(), &demo_chart());
}

#[test]
fn records_with_legacy_ids_load_with_stable_ids() {
    let sections = json!([{
        "id": 1_718_000_000_000_i64,
        "name": "Intro",
        "measures": [
            {"id": 1, "chords": ["C"]},
            {"id": 2, "chords": ["G"], "startRepeat": true},
            {"id": 3, "chords": ["Am"]},
            {"id": 4.5, "chords": ["F"], "endRepeat": ":|x2"}
        ]
    }]);
    let raw = json!({
        "id": "chart-1718000000000",
        "title": "Mi Partitura",
        "artist": "Anónimo",
        "key": "C",
        "mode": "major",
        "savedAt": "2024-06-10T08:00:00.000Z",
        "sections": sections.to_string()
    });
    let bytes = serde_json::to_vec(&raw).expect("legacy record should encode");

    let chart = decode_chart(&bytes).expect("legacy record should load");
    let again = decode_chart(&bytes).expect("legacy record should load twice");
    assert_eq!(chart, again);
    assert_eq!(chart.title, "Mi Partitura");
    assert_eq!(
        chart.saved_at,
        Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).single()
    );
    let intro = &chart.sections[0];
    assert_eq!(intro.measures.len(), 4);
    assert!(intro.measures[1].start_repeat);
    assert_eq!(intro.measures[3].end_repeat.glyph().as_deref(), Some(":|x2"));
    assert_ne!(intro.measures[0].id, intro.measures[1].id);

    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let store = FileChartStore::new(temp.path(), "ana");
    let mut engine = Engine::new(chart.clone());
    engine.save(&store, at(30)).expect("save should succeed");
    let stored = store.load(chart.id).expect("stored record should load");
    assert_eq!(stored.id, chart.id.to_string());
    assert_eq!(&load_chart(stored).expect("stored chart should decode"), engine.chart());
}

#[test]
fn empty_record_id_is_rejected() {
    let mut record = serialize_chart(&demo_chart()).expect("serialize should succeed");
    record.id = "  ".to_string();
    assert!(matches!(load_chart(record), Err(ShapeError::InvalidId(_))));
}

#[test]
fn store_lists_newest_save_first() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let store = FileChartStore::new(temp.path(), "ana");

    let mut older = Engine::new(demo_chart());
    older.save(&store, at(1)).expect("save should succeed");

    let mut newer = Engine::default();
    newer.create_chart(ChartMeta {
        title: "Segunda".to_string(),
        ..ChartMeta::default()
    });
    newer.save(&store, at(2)).expect("save should succeed");

    std::fs::write(store.charts_dir().join("broken.json"), b"{")
        .expect("writing a broken record should work");

    let summaries = store.list().expect("list should succeed");
    let titles: Vec<&str> = summaries
        .iter()
        .map(|summary| summary.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Segunda", "Mi Partitura"]);
}

#[test]
fn listing_a_missing_store_is_empty() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let store = FileChartStore::new(temp.path(), "nobody");
    assert!(store.list().expect("list should succeed").is_empty());
}

#[test]
fn loading_a_record_resets_history() {
    let mut engine = Engine::default();
    engine.insert_chord("C").expect("append should succeed");
    assert!(engine.can_undo());

    let record = serialize_chart(&demo_chart()).expect("serialize should succeed");
    engine.load_chart(record).expect("load should succeed");

    assert_eq!(engine.history().depth(), 1);
    assert!(!engine.can_undo());
    assert_eq!(
        engine.selection().active_section_id,
        demo_chart().sections[0].id
    );
}
