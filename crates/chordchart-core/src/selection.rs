use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureRef {
    pub section_id: Uuid,
    pub measure_index: usize,
}

impl MeasureRef {
    #[must_use]
    pub fn new(section_id: Uuid, measure_index: usize) -> Self {
        Self {
            section_id,
            measure_index,
        }
    }
}

/// Inclusive measure range inside one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRange {
    pub section_id: Uuid,
    pub first: usize,
    pub last: usize,
}

impl SelectionRange {
    #[must_use]
    pub fn count(&self) -> usize {
        self.last - self.first + 1
    }
}

/// `end` only counts together with `start` and inside the same section.
/// With nothing selected, `active_section_id` is where new measures go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub start: Option<MeasureRef>,
    pub end: Option<MeasureRef>,
    pub active_section_id: Uuid,
}

impl Selection {
    #[must_use]
    pub fn new(active_section_id: Uuid) -> Self {
        Self {
            start: None,
            end: None,
            active_section_id,
        }
    }

    /// Plain click on a measure.
    pub fn select(&mut self, target: MeasureRef) {
        self.start = Some(target);
        self.end = None;
        self.active_section_id = target.section_id;
    }

    /// Shift-click. Extends from the current start when it lives in the same
    /// section, otherwise leaves the selection untouched and returns `false`.
    /// Without a start it behaves like a plain click.
    pub fn extend(&mut self, target: MeasureRef) -> bool {
        match self.start {
            Some(start) if start.section_id != target.section_id => false,
            Some(_) => {
                self.end = Some(target);
                self.active_section_id = target.section_id;
                true
            }
            None => {
                self.select(target);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.start = None;
        self.end = None;
    }

    pub fn set_active_section(&mut self, section_id: Uuid) {
        self.clear();
        self.active_section_id = section_id;
    }

    /// Normalized `[min, max]` range of the selected measures.
    #[must_use]
    pub fn range(&self) -> Option<SelectionRange> {
        let start = self.start?;
        let end_index = self
            .end
            .filter(|end| end.section_id == start.section_id)
            .map_or(start.measure_index, |end| end.measure_index);

        Some(SelectionRange {
            section_id: start.section_id,
            first: start.measure_index.min(end_index),
            last: start.measure_index.max(end_index),
        })
    }
}
