//! Barline layout shared by every renderer.
//!
//! A section is cut into lines of `MEASURES_PER_LINE` slots. Each line carries
//! its opening barline and each placed measure carries the barline to its
//! right, so a renderer only has to print what it is given.

use std::{fmt, num::NonZeroU32};

use serde::Serialize;
use uuid::Uuid;

use crate::model::{Chart, EndRepeat, Measure, Section};

pub const MEASURES_PER_LINE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Barline {
    Single,
    StartRepeat,
    EndRepeat(Option<NonZeroU32>),
    Double,
}

impl Barline {
    /// The barline a measure's end marker draws, if any.
    #[must_use]
    pub fn from_end_repeat(end_repeat: EndRepeat) -> Option<Self> {
        match end_repeat {
            EndRepeat::Absent => None,
            EndRepeat::Repeat(times) => Some(Self::EndRepeat(times)),
            EndRepeat::DoubleBar => Some(Self::Double),
        }
    }
}

impl fmt::Display for Barline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("|"),
            Self::StartRepeat => f.write_str("|:"),
            Self::EndRepeat(None) => f.write_str(":|"),
            Self::EndRepeat(Some(times)) => write!(f, ":|x{times}"),
            Self::Double => f.write_str("||"),
        }
    }
}

impl From<Barline> for String {
    fn from(value: Barline) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedMeasure {
    /// Position of the measure inside its section.
    pub index: usize,
    pub measure_id: Uuid,
    pub chords: Vec<String>,
    pub closing: Barline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Slot {
    Measure(PlacedMeasure),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub opening: Barline,
    /// Always `MEASURES_PER_LINE` long; unused slots are `Slot::Empty`.
    pub slots: Vec<Slot>,
}

impl Line {
    pub fn measures(&self) -> impl Iterator<Item = &PlacedMeasure> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Measure(measure) => Some(measure),
            Slot::Empty => None,
        })
    }

    #[must_use]
    pub fn filled(&self) -> usize {
        self.measures().count()
    }

    /// Barline at the right edge of the last real measure.
    #[must_use]
    pub fn closing(&self) -> Barline {
        self.measures()
            .last()
            .map_or(Barline::Single, |measure| measure.closing)
    }

    fn placeholder() -> Self {
        Self {
            opening: Barline::Single,
            slots: vec![Slot::Empty; MEASURES_PER_LINE],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionLayout {
    pub section_id: Uuid,
    pub name: String,
    pub lines: Vec<Line>,
}

fn interior_barline(measure: &Measure, next: &Measure) -> Barline {
    Barline::from_end_repeat(measure.end_repeat).unwrap_or(if next.start_repeat {
        Barline::StartRepeat
    } else {
        Barline::Single
    })
}

fn trailing_barline(measure: &Measure, is_final_line: bool) -> Barline {
    Barline::from_end_repeat(measure.end_repeat).unwrap_or(if is_final_line {
        Barline::Double
    } else {
        Barline::Single
    })
}

/// Lays out one section. An empty section still yields one placeholder line.
#[must_use]
pub fn layout_section(section: &Section) -> Vec<Line> {
    if section.measures.is_empty() {
        return vec![Line::placeholder()];
    }

    let line_count = section.measures.len().div_ceil(MEASURES_PER_LINE);
    section
        .measures
        .chunks(MEASURES_PER_LINE)
        .enumerate()
        .map(|(line_index, chunk)| {
            let is_final_line = line_index + 1 == line_count;
            let opening = if chunk[0].start_repeat {
                Barline::StartRepeat
            } else {
                Barline::Single
            };

            let mut slots: Vec<Slot> = chunk
                .iter()
                .enumerate()
                .map(|(offset, measure)| {
                    let closing = match chunk.get(offset + 1) {
                        Some(next) => interior_barline(measure, next),
                        None => trailing_barline(measure, is_final_line),
                    };
                    Slot::Measure(PlacedMeasure {
                        index: line_index * MEASURES_PER_LINE + offset,
                        measure_id: measure.id,
                        chords: measure.chords.clone(),
                        closing,
                    })
                })
                .collect();
            slots.resize(MEASURES_PER_LINE, Slot::Empty);

            Line { opening, slots }
        })
        .collect()
}

#[must_use]
pub fn layout_chart(chart: &Chart) -> Vec<SectionLayout> {
    chart
        .sections
        .iter()
        .map(|section| SectionLayout {
            section_id: section.id,
            name: section.name.clone(),
            lines: layout_section(section),
        })
        .collect()
}

/// Whether two measure indices of a section are drawn on the same line.
#[must_use]
pub fn same_line(a: usize, b: usize) -> bool {
    a / MEASURES_PER_LINE == b / MEASURES_PER_LINE
}
