use std::{fmt, num::NonZeroU32, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use thiserror::Error;
use uuid::Uuid;

pub const MAJOR_KEYS: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];
pub const MINOR_KEYS: [&str; 12] = [
    "Am", "Bbm", "Bm", "Cm", "C#m", "Dm", "Ebm", "Em", "Fm", "F#m", "Gm", "G#m",
];

/// Chord token meaning "same as the previous measure on this line".
pub const REPEAT_SHORTHAND: &str = "%";
pub const MAX_CHORDS_PER_MEASURE: usize = 2;
pub const DEFAULT_SECTION_NAME: &str = "Nueva Sección";
pub const DUPLICATE_SECTION_SUFFIX: &str = " (Copia)";

/// Namespace for ids derived from records written before ids were UUIDs.
const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x8f3b_2c1e_5d4a_4e6f_9a7b_1c2d_3e4f_5a6b);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("invalid chart id: {0}")]
    InvalidId(String),
    #[error("unknown key name: {0}")]
    UnknownKey(String),
    #[error("unknown mode: {0}")]
    UnknownMode(String),
    #[error("invalid end repeat marker: {0}")]
    InvalidEndRepeat(String),
    #[error("measure {measure_id} holds {count} chords; expected 1 or 2")]
    ChordCount { measure_id: Uuid, count: usize },
    #[error("chart has no sections")]
    NoSections,
    #[error("malformed sections payload: {0}")]
    Sections(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Major,
    Minor,
}

impl Mode {
    #[must_use]
    pub fn keys(self) -> &'static [&'static str; 12] {
        match self {
            Self::Major => &MAJOR_KEYS,
            Self::Minor => &MINOR_KEYS,
        }
    }
}

impl FromStr for Mode {
    type Err = ShapeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            other => Err(ShapeError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => f.write_str("major"),
            Self::Minor => f.write_str("minor"),
        }
    }
}

/// Triads ("C", "Dm") or four-note chords ("Cmaj7", "Dm7").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChordQuality {
    Triad,
    #[default]
    Tetrad,
}

/// One of the 24 enumerated key names (`MAJOR_KEYS` and `MINOR_KEYS`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    pub fn parse(name: &str) -> Result<Self, ShapeError> {
        if MAJOR_KEYS.contains(&name) || MINOR_KEYS.contains(&name) {
            Ok(Self(name.to_string()))
        } else {
            Err(ShapeError::UnknownKey(name.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_minor(&self) -> bool {
        MINOR_KEYS.contains(&self.0.as_str())
    }

    /// Moves the key along its own chromatic list (major keys stay major).
    #[must_use]
    pub fn shifted(&self, steps: i32) -> Self {
        let keys = if self.is_minor() {
            &MINOR_KEYS
        } else {
            &MAJOR_KEYS
        };
        let position = keys.iter().position(|key| *key == self.0).unwrap_or(0);
        let shift = usize::try_from(steps.rem_euclid(12)).unwrap_or(0);
        Self(keys[(position + shift) % keys.len()].to_string())
    }
}

impl Default for Key {
    fn default() -> Self {
        Self(MAJOR_KEYS[0].to_string())
    }
}

impl TryFrom<String> for Key {
    type Error = ShapeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Key> for String {
    fn from(value: Key) -> Self {
        value.0
    }
}

impl FromStr for Key {
    type Err = ShapeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closing marker of a measure. Wire form: absent/null, `":|"`, `":|x<N>"` or `"||"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "Option<String>")]
pub enum EndRepeat {
    #[default]
    Absent,
    Repeat(Option<NonZeroU32>),
    DoubleBar,
}

impl EndRepeat {
    pub fn parse(glyph: &str) -> Result<Self, ShapeError> {
        match glyph {
            ":|" => Ok(Self::Repeat(None)),
            "||" => Ok(Self::DoubleBar),
            other => other
                .strip_prefix(":|x")
                .and_then(|count| count.parse::<NonZeroU32>().ok())
                .map(|count| Self::Repeat(Some(count)))
                .ok_or_else(|| ShapeError::InvalidEndRepeat(other.to_string())),
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    #[must_use]
    pub fn glyph(self) -> Option<String> {
        match self {
            Self::Absent => None,
            Self::Repeat(None) => Some(":|".to_string()),
            Self::Repeat(Some(count)) => Some(format!(":|x{count}")),
            Self::DoubleBar => Some("||".to_string()),
        }
    }
}

// Older records stored `endRepeat: true` for a plain repeat.
impl<'de> Deserialize<'de> for EndRepeat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Glyph(String),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None | Some(Raw::Flag(false)) => Ok(Self::Absent),
            Some(Raw::Flag(true)) => Ok(Self::Repeat(None)),
            Some(Raw::Glyph(glyph)) if glyph.is_empty() => Ok(Self::Absent),
            Some(Raw::Glyph(glyph)) => Self::parse(&glyph).map_err(de::Error::custom),
        }
    }
}

impl From<EndRepeat> for Option<String> {
    fn from(value: EndRepeat) -> Self {
        value.glyph()
    }
}

/// Reads a stored id. UUIDs are kept as they are; any other non-empty id
/// (`chart-1718000000000`, `1`, `1718000000000.5`) maps to the same UUID on
/// every load, namespaced by `kind`.
pub fn normalize_id(kind: &str, raw: &str) -> Result<Uuid, ShapeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ShapeError::InvalidId(raw.to_string()));
    }
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(id);
    }
    Ok(Uuid::new_v5(&LEGACY_ID_NAMESPACE, format!("{kind}:{raw}").as_bytes()))
}

fn deserialize_id<'de, D>(deserializer: D, kind: &str) -> Result<Uuid, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    let raw = match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Integer(number) => number.to_string(),
        Raw::Float(number) => number.to_string(),
    };
    normalize_id(kind, &raw).map_err(de::Error::custom)
}

fn section_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
    deserialize_id(deserializer, "section")
}

fn measure_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
    deserialize_id(deserializer, "measure")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    #[serde(deserialize_with = "measure_id")]
    pub id: Uuid,
    pub chords: Vec<String>,
    #[serde(default)]
    pub start_repeat: bool,
    #[serde(default, skip_serializing_if = "EndRepeat::is_absent")]
    pub end_repeat: EndRepeat,
}

impl Measure {
    #[must_use]
    pub fn new(chord: impl Into<String>) -> Self {
        Self::with_chords(vec![chord.into()])
    }

    #[must_use]
    pub fn with_chords(chords: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chords,
            start_repeat: false,
            end_repeat: EndRepeat::Absent,
        }
    }

    /// Same content under a fresh id.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }

    /// True when the measure holds exactly `chord` and nothing else.
    #[must_use]
    pub fn holds_only(&self, chord: &str) -> bool {
        matches!(self.chords.as_slice(), [only] if only == chord)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(deserialize_with = "section_id")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub measures: Vec<Measure>,
}

impl Section {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            measures: Vec::new(),
        }
    }

    /// Deep copy with fresh section and measure ids and a "(Copia)" name.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("{}{DUPLICATE_SECTION_SUFFIX}", self.name),
            measures: self.measures.iter().map(Measure::duplicate).collect(),
        }
    }
}

impl Default for Section {
    fn default() -> Self {
        Self::new(DEFAULT_SECTION_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMeta {
    pub title: String,
    pub artist: String,
    pub key: Key,
    pub mode: Mode,
}

impl Default for ChartMeta {
    fn default() -> Self {
        Self {
            title: "Mi Partitura".to_string(),
            artist: "Anónimo".to_string(),
            key: Key::default(),
            mode: Mode::Major,
        }
    }
}

/// A lead sheet. Equality is field-by-field and order-sensitive, which is
/// what the history uses to detect no-op updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub key: Key,
    pub mode: Mode,
    pub saved_at: Option<DateTime<Utc>>,
    pub sections: Vec<Section>,
}

impl Chart {
    #[must_use]
    pub fn new(meta: ChartMeta) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: meta.title,
            artist: meta.artist,
            key: meta.key,
            mode: meta.mode,
            saved_at: None,
            sections: vec![Section::new("Intro")],
        }
    }

    #[must_use]
    pub fn section(&self, section_id: Uuid) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == section_id)
    }

    #[must_use]
    pub fn section_index(&self, section_id: Uuid) -> Option<usize> {
        self.sections
            .iter()
            .position(|section| section.id == section_id)
    }

    pub fn validate(&self) -> Result<(), ShapeError> {
        if self.sections.is_empty() {
            return Err(ShapeError::NoSections);
        }
        for measure in self.sections.iter().flat_map(|section| &section.measures) {
            let count = measure.chords.len();
            if count == 0 || count > MAX_CHORDS_PER_MEASURE {
                return Err(ShapeError::ChordCount {
                    measure_id: measure.id,
                    count,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clipboard {
    measures: Vec<Measure>,
}

impl Clipboard {
    pub fn replace(&mut self, measures: Vec<Measure>) {
        self.measures = measures;
    }

    #[must_use]
    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_ids_map_to_stable_uuids() {
        let id = Uuid::new_v4();
        assert_eq!(normalize_id("chart", &id.to_string()), Ok(id));

        let first = normalize_id("chart", "chart-1718000000000").expect("legacy id should map");
        let again = normalize_id("chart", " chart-1718000000000 ").expect("legacy id should map");
        assert_eq!(first, again);
        assert_ne!(
            normalize_id("section", "1").expect("numeric id should map"),
            normalize_id("measure", "1").expect("numeric id should map")
        );
        assert!(matches!(normalize_id("chart", ""), Err(ShapeError::InvalidId(_))));
    }

    #[test]
    fn mode_lists_its_keys() {
        assert_eq!(Mode::Major.keys()[0], "C");
        assert!(Mode::Minor.keys().iter().all(|key| key.ends_with('m')));
    }

    #[test]
    fn key_shift_wraps_within_mode() {
        let key = Key::parse("B").expect("B is a major key");
        assert_eq!(key.shifted(1).as_str(), "C");
        assert_eq!(key.shifted(-12).as_str(), "B");

        let minor = Key::parse("Am").expect("Am is a minor key");
        assert_eq!(minor.shifted(-1).as_str(), "G#m");
        assert_eq!(minor.shifted(4).as_str(), "C#m");

        assert_eq!(key.shifted(i32::MAX).as_str(), "Gb");
        assert_eq!(minor.shifted(i32::MIN).as_str(), "C#m");
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert_eq!(
            Key::parse("H"),
            Err(ShapeError::UnknownKey("H".to_string()))
        );
        assert!(Key::parse("A#").is_err());
    }

    #[test]
    fn end_repeat_wire_vocabulary() {
        assert_eq!(EndRepeat::parse(":|"), Ok(EndRepeat::Repeat(None)));
        assert_eq!(EndRepeat::parse("||"), Ok(EndRepeat::DoubleBar));
        assert_eq!(
            EndRepeat::parse(":|x3").map(EndRepeat::glyph),
            Ok(Some(":|x3".to_string()))
        );
        assert!(EndRepeat::parse(":|x0").is_err());
        assert!(EndRepeat::parse(":|x").is_err());
        assert!(EndRepeat::parse("|:").is_err());
    }

    #[test]
    fn legacy_boolean_end_repeat_is_accepted() {
        let measure: Measure = serde_json::from_str(
            r#"{"id":"6f1d3c52-8c43-4a4c-9d4e-3f7f3d9b8a10","chords":["C"],"endRepeat":true}"#,
        )
        .expect("legacy measure should parse");
        assert_eq!(measure.end_repeat, EndRepeat::Repeat(None));
        assert!(!measure.start_repeat);
    }

    #[test]
    fn duplicate_section_gets_fresh_ids() {
        let mut section = Section::new("Coro");
        section.measures.push(Measure::new("C"));
        let copy = section.duplicate();

        assert_eq!(copy.name, "Coro (Copia)");
        assert_ne!(copy.id, section.id);
        assert_ne!(copy.measures[0].id, section.measures[0].id);
        assert_eq!(copy.measures[0].chords, section.measures[0].chords);
    }

    #[test]
    fn validate_rejects_overfull_measure() {
        let mut chart = Chart::new(ChartMeta::default());
        chart.sections[0]
            .measures
            .push(Measure::with_chords(vec!["C".into(), "F".into(), "G".into()]));
        assert!(matches!(
            chart.validate(),
            Err(ShapeError::ChordCount { count: 3, .. })
        ));

        chart.sections.clear();
        assert_eq!(chart.validate(), Err(ShapeError::NoSections));
    }
}
