//! Pitch-class arithmetic, key-aware spelling and chord palettes.
//!
//! Everything here works on plain note/key/chord names so it can be fed
//! straight from user input. Unknown names never fail: lookups return `None`
//! and chord generators return an empty list.

use crate::model::{ChordQuality, Mode, REPEAT_SHORTHAND};

pub const NOTES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
pub const NOTES_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

const FLAT_KEY_ROOTS: [&str; 7] = ["F", "Bb", "Eb", "Ab", "Db", "Gb", "Cb"];
const MINOR_MARKER: char = 'm';
const RELATIVE_MAJOR_OFFSET: i32 = 3;
const PERFECT_FIFTH: i32 = 7;

/// (semitones above the tonic, quality suffix) per scale degree.
type DegreeTable = &'static [(i32, &'static str)];

const MAJOR_TRIADS: DegreeTable = &[(0, ""), (2, "m"), (4, "m"), (5, ""), (7, "7"), (9, "m")];
const MAJOR_TETRADS: DegreeTable = &[
    (0, "maj7"),
    (2, "m7"),
    (4, "m7"),
    (5, "maj7"),
    (7, "7"),
    (9, "m7"),
];
const MINOR_TRIADS: DegreeTable = &[
    (0, "m"),
    (2, "dim"),
    (3, ""),
    (5, "m"),
    (7, ""),
    (8, ""),
    (10, ""),
];
const MINOR_TETRADS: DegreeTable = &[
    (0, "m7"),
    (2, "m7b5"),
    (3, "maj7"),
    (5, "m7"),
    (7, "7"),
    (8, "maj7"),
    (10, "7"),
];

const MAJOR_SECONDARY_TARGETS: &[i32] = &[2, 4, 7, 9];
const MINOR_SECONDARY_TARGETS: &[i32] = &[5, 7];

/// Splits `text` into its leading note name (letter plus optional `#`/`b`)
/// and the rest. Returns `None` when `text` does not start with A-G.
fn split_root(text: &str) -> Option<(&str, &str)> {
    let mut chars = text.char_indices();
    let (_, letter) = chars.next()?;
    if !('A'..='G').contains(&letter) {
        return None;
    }
    let end = match chars.next() {
        Some((index, '#' | 'b')) => index + 1,
        _ => letter.len_utf8(),
    };
    Some(text.split_at(end))
}

/// Pitch class (0..12) of the note name at the start of `name`.
#[must_use]
pub fn note_index(name: &str) -> Option<u8> {
    let (root, _) = split_root(name)?;
    NOTES_SHARP
        .iter()
        .position(|note| *note == root)
        .or_else(|| NOTES_FLAT.iter().position(|note| *note == root))
        .and_then(|index| u8::try_from(index).ok())
}

#[must_use]
pub fn note_name(pitch_class: i32, use_sharp: bool) -> &'static str {
    let table = if use_sharp { &NOTES_SHARP } else { &NOTES_FLAT };
    table[pitch_class.rem_euclid(12) as usize]
}

/// Whether chords in `key` are spelled with sharps.
///
/// Flat keys are F, Bb, Eb, Ab, Db, Gb and Cb; a minor key is also flat when
/// its relative major is one of them.
#[must_use]
pub fn use_sharp_spelling(key: &str) -> bool {
    let minor_root = key.strip_suffix(MINOR_MARKER);
    let root = minor_root.unwrap_or(key);
    if FLAT_KEY_ROOTS.contains(&root) {
        return false;
    }
    if minor_root.is_some() {
        if let Some(index) = note_index(root) {
            let relative_major = note_name(i32::from(index) + RELATIVE_MAJOR_OFFSET, false);
            if FLAT_KEY_ROOTS.contains(&relative_major) {
                return false;
            }
        }
    }
    true
}

/// Chords built on the scale degrees of `key`: six for major, seven for minor.
#[must_use]
pub fn diatonic_chords(key: &str, mode: Mode, quality: ChordQuality) -> Vec<String> {
    let Some(tonic) = note_index(key) else {
        return Vec::new();
    };
    let use_sharp = use_sharp_spelling(key);
    let table = match (mode, quality) {
        (Mode::Major, ChordQuality::Triad) => MAJOR_TRIADS,
        (Mode::Major, ChordQuality::Tetrad) => MAJOR_TETRADS,
        (Mode::Minor, ChordQuality::Triad) => MINOR_TRIADS,
        (Mode::Minor, ChordQuality::Tetrad) => MINOR_TETRADS,
    };

    table
        .iter()
        .map(|(interval, suffix)| {
            format!(
                "{}{suffix}",
                note_name(i32::from(tonic) + interval, use_sharp)
            )
        })
        .collect()
}

/// Secondary dominants for the key's target degrees, plus the borrowed iv,
/// bVI and bVII in major. Duplicates are dropped keeping the first occurrence.
#[must_use]
pub fn secondary_chords(key: &str, mode: Mode, quality: ChordQuality) -> Vec<String> {
    let Some(tonic) = note_index(key) else {
        return Vec::new();
    };
    let tonic = i32::from(tonic);
    let use_sharp = use_sharp_spelling(key);
    let tetrad = quality == ChordQuality::Tetrad;

    let targets = match mode {
        Mode::Major => MAJOR_SECONDARY_TARGETS,
        Mode::Minor => MINOR_SECONDARY_TARGETS,
    };
    let dominant_suffix = if tetrad { "7" } else { "" };
    let mut chords: Vec<String> = targets
        .iter()
        .map(|target| {
            format!(
                "{}{dominant_suffix}",
                note_name(tonic + target + PERFECT_FIFTH, use_sharp)
            )
        })
        .collect();

    if mode == Mode::Major {
        let (minor_four, flat_six, flat_seven) = if tetrad {
            ("m7", "maj7", "7")
        } else {
            ("m", "", "")
        };
        chords.push(format!("{}{minor_four}", note_name(tonic + 5, use_sharp)));
        chords.push(format!("{}{flat_six}", note_name(tonic + 8, false)));
        chords.push(format!("{}{flat_seven}", note_name(tonic + 10, false)));
    }

    let mut unique = Vec::with_capacity(chords.len());
    for chord in chords {
        if !unique.contains(&chord) {
            unique.push(chord);
        }
    }
    unique
}

/// Shifts every root in `token` (including a `/bass` note) by `steps`
/// semitones and spells it for `new_key`. Any `i32` is accepted; only
/// `steps` modulo 12 matters. Quality suffixes are kept verbatim; `%` and
/// unparseable parts pass through unchanged.
#[must_use]
pub fn transpose_chord(token: &str, steps: i32, new_key: &str) -> String {
    if token == REPEAT_SHORTHAND {
        return token.to_string();
    }
    let use_sharp = use_sharp_spelling(new_key);
    let shift = steps.rem_euclid(12);

    token
        .split('/')
        .map(|part| {
            let Some((root, quality)) = split_root(part) else {
                return part.to_string();
            };
            match note_index(root) {
                Some(index) => {
                    format!("{}{quality}", note_name(i32::from(index) + shift, use_sharp))
                }
                None => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
