use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::{AppConfig, EditorConfig},
    history::{DispatchMode, History},
    layout,
    model::{
        Chart, ChartMeta, ChordQuality, Clipboard, EndRepeat, MAX_CHORDS_PER_MEASURE, Measure,
        Mode, REPEAT_SHORTHAND, Section, ShapeError,
    },
    persistence::{self, ChartRecord, ChartStore},
    selection::{MeasureRef, Selection, SelectionRange},
    theory,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("section not found: {0}")]
    SectionNotFound(Uuid),
    #[error("measure {index} not found in section {section_id}")]
    MeasureNotFound { section_id: Uuid, index: usize },
    #[error("no measure selected")]
    NoSelection,
    #[error("invalid section move from {from} to {to}")]
    InvalidReorder { from: usize, to: usize },
    #[error("unknown bar symbol: {0}")]
    UnknownBarSymbol(String),
    #[error("chord token is empty")]
    EmptyChord,
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Store(value.to_string())
    }
}

/// Symbols offered by the bar palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarSymbol {
    /// `|:` toggles the start repeat.
    StartRepeat,
    /// `:|` or `:|x<N>` toggles that end repeat.
    EndRepeat(EndRepeat),
    /// `|` clears both markers.
    Plain,
    /// `||` clears the start repeat and closes with a double bar.
    DoubleBar,
}

impl BarSymbol {
    pub fn parse(symbol: &str) -> Result<Self, EngineError> {
        match symbol {
            "|:" => Ok(Self::StartRepeat),
            "|" => Ok(Self::Plain),
            "||" => Ok(Self::DoubleBar),
            other => match EndRepeat::parse(other) {
                Ok(marker @ EndRepeat::Repeat(_)) => Ok(Self::EndRepeat(marker)),
                _ => Err(EngineError::UnknownBarSymbol(other.to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub diatonic: Vec<String>,
    pub secondary: Vec<String>,
}

/// Single-writer editing session over one chart.
///
/// Every chart change goes through the history as a fresh snapshot; the
/// selection, clipboard and insertion settings live beside it and are not
/// undoable.
#[derive(Debug, Clone)]
pub struct Engine {
    history: History<Chart>,
    selection: Selection,
    clipboard: Clipboard,
    double_chord: bool,
    quality: ChordQuality,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Chart::new(ChartMeta::default()))
    }
}

impl Engine {
    #[must_use]
    pub fn new(chart: Chart) -> Self {
        let selection = Selection::new(first_section_id(&chart));
        Self {
            history: History::new(chart),
            selection,
            clipboard: Clipboard::default(),
            double_chord: false,
            quality: ChordQuality::default(),
        }
    }

    /// Starts on a new chart built from `[chart]` with the `[editor]`
    /// insertion settings.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let mut engine = Self::new(persistence::create_chart(config.chart.meta()));
        engine.apply_editor_config(&config.editor);
        engine
    }

    pub fn apply_editor_config(&mut self, editor: &EditorConfig) {
        self.double_chord = editor.double_chord_mode;
        self.quality = editor.palette_quality;
    }

    #[must_use]
    pub fn chart(&self) -> &Chart {
        self.history.current()
    }

    #[must_use]
    pub fn history(&self) -> &History<Chart> {
        &self.history
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    #[must_use]
    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    #[must_use]
    pub fn double_chord_mode(&self) -> bool {
        self.double_chord
    }

    #[must_use]
    pub fn chord_quality(&self) -> ChordQuality {
        self.quality
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    #[instrument(skip(self, meta), fields(title = %meta.title, key = %meta.key))]
    pub fn create_chart(&mut self, meta: ChartMeta) -> &Chart {
        self.replace_chart(persistence::create_chart(meta));
        info!(chart_id = %self.chart().id, "chart created");
        self.chart()
    }

    #[instrument(skip(self, record), fields(chart_id = %record.id))]
    pub fn load_chart(&mut self, record: ChartRecord) -> Result<&Chart, EngineError> {
        let chart = persistence::load_chart(record)?;
        self.replace_chart(chart);
        info!("chart loaded");
        Ok(self.chart())
    }

    /// Starts a fresh, non-undoable history at `chart`.
    #[instrument(skip(self, chart), fields(chart_id = %chart.id))]
    pub fn replace_chart(&mut self, chart: Chart) {
        self.selection = Selection::new(first_section_id(&chart));
        self.history.reset(chart);
        debug!("history reset");
    }

    pub fn undo(&mut self) -> bool {
        let moved = self.history.undo();
        if moved {
            self.reconcile_selection();
            debug!(index = self.history.index(), "undo");
        }
        moved
    }

    pub fn redo(&mut self) -> bool {
        let moved = self.history.redo();
        if moved {
            self.reconcile_selection();
            debug!(index = self.history.index(), "redo");
        }
        moved
    }

    pub fn set_double_chord_mode(&mut self, enabled: bool) {
        self.double_chord = enabled;
    }

    pub fn set_chord_quality(&mut self, quality: ChordQuality) {
        self.quality = quality;
    }

    #[must_use]
    pub fn palette(&self) -> Palette {
        let chart = self.chart();
        Palette {
            diatonic: theory::diatonic_chords(chart.key.as_str(), chart.mode, self.quality),
            secondary: theory::secondary_chords(chart.key.as_str(), chart.mode, self.quality),
        }
    }

    /// Plain click on a measure.
    #[instrument(skip(self), fields(section_id = %section_id, measure_index))]
    pub fn select_measure(
        &mut self,
        section_id: Uuid,
        measure_index: usize,
    ) -> Result<(), EngineError> {
        let target = self.checked_ref(section_id, measure_index)?;
        self.selection.select(target);
        Ok(())
    }

    /// Shift-click. Returns `false` when the click lands in another section
    /// and was ignored.
    #[instrument(skip(self), fields(section_id = %section_id, measure_index))]
    pub fn extend_selection(
        &mut self,
        section_id: Uuid,
        measure_index: usize,
    ) -> Result<bool, EngineError> {
        let target = self.checked_ref(section_id, measure_index)?;
        let extended = self.selection.extend(target);
        if !extended {
            debug!("cross-section extend ignored");
        }
        Ok(extended)
    }

    /// Selects `start`, then extends to `end` under the shift-click rules.
    pub fn set_selection_range(
        &mut self,
        start: MeasureRef,
        end: Option<MeasureRef>,
    ) -> Result<(), EngineError> {
        self.select_measure(start.section_id, start.measure_index)?;
        if let Some(end) = end {
            self.extend_selection(end.section_id, end.measure_index)?;
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn set_active_section(&mut self, section_id: Uuid) -> Result<(), EngineError> {
        if self.chart().section(section_id).is_none() {
            return Err(EngineError::SectionNotFound(section_id));
        }
        self.selection.set_active_section(section_id);
        Ok(())
    }

    /// Writes a chord into the selected measure, or appends it to the active
    /// section when nothing is selected.
    ///
    /// In double-chord mode a measure holding one chord receives the token as
    /// its second chord. A token equal to the lone chord of the previous
    /// measure on the same line is stored as `%`.
    #[instrument(skip(self), fields(chart_id = %self.chart().id, token))]
    pub fn insert_chord(&mut self, token: &str) -> Result<(), EngineError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(EngineError::EmptyChord);
        }
        let double = self.double_chord;

        match self.selection.start {
            Some(target) => {
                let (section_len, _) = self.try_commit(|chart| {
                    let section = section_mut(chart, target.section_id)?;
                    let len = section.measures.len();
                    if target.measure_index >= len {
                        return Err(EngineError::MeasureNotFound {
                            section_id: target.section_id,
                            index: target.measure_index,
                        });
                    }
                    let stored = collapse_repeat(&section.measures, target.measure_index, token);
                    let measure = &mut section.measures[target.measure_index];
                    if double && measure.chords.len() < MAX_CHORDS_PER_MEASURE {
                        measure.chords.push(stored);
                    } else {
                        measure.chords = vec![stored];
                    }
                    Ok(len)
                })?;

                let next_index = target.measure_index + 1;
                if next_index < section_len {
                    self.selection
                        .select(MeasureRef::new(target.section_id, next_index));
                } else {
                    self.selection.clear();
                }
                info!(measure_index = target.measure_index, "chord written");
            }
            None => {
                let section_id = self.selection.active_section_id;
                self.try_commit(|chart| {
                    let section = section_mut(chart, section_id)?;
                    let stack_onto = section
                        .measures
                        .len()
                        .checked_sub(1)
                        .filter(|last| {
                            double && section.measures[*last].chords.len() < MAX_CHORDS_PER_MEASURE
                        });

                    match stack_onto {
                        Some(last) => {
                            let stored = collapse_repeat(&section.measures, last, token);
                            section.measures[last].chords.push(stored);
                        }
                        None => {
                            let index = section.measures.len();
                            let stored = collapse_repeat(&section.measures, index, token);
                            section.measures.push(Measure::new(stored));
                        }
                    }
                    Ok(())
                })?;
                info!(section_id = %section_id, "chord appended");
            }
        }
        Ok(())
    }

    /// Applies a bar-palette symbol to the selected start measure.
    #[instrument(skip(self), fields(chart_id = %self.chart().id, symbol))]
    pub fn insert_bar_symbol(&mut self, symbol: &str) -> Result<(), EngineError> {
        let target = self.selection.start.ok_or(EngineError::NoSelection)?;
        let symbol = BarSymbol::parse(symbol)?;

        self.try_commit(|chart| {
            let measure = measure_mut(chart, target)?;
            match symbol {
                BarSymbol::StartRepeat => measure.start_repeat = !measure.start_repeat,
                BarSymbol::EndRepeat(marker) => {
                    measure.end_repeat = if measure.end_repeat == marker {
                        EndRepeat::Absent
                    } else {
                        marker
                    };
                }
                BarSymbol::Plain => {
                    measure.start_repeat = false;
                    measure.end_repeat = EndRepeat::Absent;
                }
                BarSymbol::DoubleBar => {
                    measure.start_repeat = false;
                    measure.end_repeat = EndRepeat::DoubleBar;
                }
            }
            Ok(())
        })?;
        info!(measure_index = target.measure_index, ?symbol, "bar symbol applied");
        Ok(())
    }

    /// Copies the selected measures, replacing the clipboard.
    #[instrument(skip(self), fields(chart_id = %self.chart().id))]
    pub fn copy(&mut self) -> Result<usize, EngineError> {
        let range = self.selected_range()?;
        let section = self
            .chart()
            .section(range.section_id)
            .ok_or(EngineError::SectionNotFound(range.section_id))?;
        let measures = section.measures[range.first..=range.last].to_vec();
        let count = measures.len();
        self.clipboard.replace(measures);
        info!(count, "measures copied");
        Ok(count)
    }

    #[instrument(skip(self), fields(chart_id = %self.chart().id))]
    pub fn cut(&mut self) -> Result<usize, EngineError> {
        let count = self.copy()?;
        self.delete_selection()?;
        Ok(count)
    }

    /// Removes the selected measures without touching the clipboard.
    #[instrument(skip(self), fields(chart_id = %self.chart().id))]
    pub fn delete_selection(&mut self) -> Result<usize, EngineError> {
        let range = self.selected_range()?;
        self.try_commit(|chart| {
            let section = section_mut(chart, range.section_id)?;
            section.measures.drain(range.first..=range.last);
            Ok(())
        })?;
        self.selection.clear();
        info!(count = range.count(), "measures deleted");
        Ok(range.count())
    }

    /// Inserts the clipboard right after the first selected measure. Pasted
    /// measures get fresh ids so the same clipboard can be pasted repeatedly.
    #[instrument(skip(self), fields(chart_id = %self.chart().id))]
    pub fn paste(&mut self) -> Result<usize, EngineError> {
        let range = self.selected_range()?;
        if self.clipboard.is_empty() {
            debug!("paste ignored: clipboard empty");
            return Ok(0);
        }
        let pasted: Vec<Measure> = self
            .clipboard
            .measures()
            .iter()
            .map(Measure::duplicate)
            .collect();
        let count = pasted.len();

        self.try_commit(|chart| {
            let section = section_mut(chart, range.section_id)?;
            let at = range.first + 1;
            section.measures.splice(at..at, pasted);
            Ok(())
        })?;
        info!(count, after = range.first, "measures pasted");
        Ok(count)
    }

    /// Inserts an empty section after `after_index` (clamped to the end) and
    /// makes it the active section.
    #[instrument(skip(self), fields(chart_id = %self.chart().id, after_index))]
    pub fn add_section(&mut self, after_index: usize) -> Uuid {
        let section = Section::default();
        let section_id = section.id;
        self.history.dispatch_with(
            |chart| {
                let mut next = chart.clone();
                let at = after_index.saturating_add(1).min(next.sections.len());
                next.sections.insert(at, section);
                next
            },
            DispatchMode::Push,
        );
        self.selection.set_active_section(section_id);
        info!(section_id = %section_id, "section added");
        section_id
    }

    #[instrument(skip(self), fields(chart_id = %self.chart().id, section_id = %section_id))]
    pub fn duplicate_section(&mut self, section_id: Uuid) -> Result<Uuid, EngineError> {
        let (copy_id, _) = self.try_commit(|chart| {
            let index = chart
                .section_index(section_id)
                .ok_or(EngineError::SectionNotFound(section_id))?;
            let copy = chart.sections[index].duplicate();
            let copy_id = copy.id;
            chart.sections.insert(index + 1, copy);
            Ok(copy_id)
        })?;
        info!(copy_id = %copy_id, "section duplicated");
        Ok(copy_id)
    }

    /// Removes a section. Removing the last one leaves a fresh empty section.
    #[instrument(skip(self), fields(chart_id = %self.chart().id, section_id = %section_id))]
    pub fn delete_section(&mut self, section_id: Uuid) -> Result<(), EngineError> {
        self.try_commit(|chart| {
            let index = chart
                .section_index(section_id)
                .ok_or(EngineError::SectionNotFound(section_id))?;
            chart.sections.remove(index);
            if chart.sections.is_empty() {
                chart.sections.push(Section::default());
                debug!("last section removed, inserted empty section");
            }
            Ok(())
        })?;
        self.reconcile_selection();
        info!("section deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(chart_id = %self.chart().id, from, to))]
    pub fn move_section(&mut self, from: usize, to: usize) -> Result<(), EngineError> {
        let len = self.chart().sections.len();
        if from >= len || to >= len {
            return Err(EngineError::InvalidReorder { from, to });
        }
        if from == to {
            debug!("move noop");
            return Ok(());
        }

        self.history.dispatch_with(
            |chart| {
                let mut next = chart.clone();
                let section = next.sections.remove(from);
                next.sections.insert(to, section);
                next
            },
            DispatchMode::Push,
        );
        info!("section moved");
        Ok(())
    }

    #[instrument(skip(self, name), fields(chart_id = %self.chart().id, section_id = %section_id))]
    pub fn rename_section(
        &mut self,
        section_id: Uuid,
        name: impl Into<String>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        self.try_commit(|chart| {
            section_mut(chart, section_id)?.name = name;
            Ok(())
        })?;
        Ok(())
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        self.history.dispatch_with(
            |chart| Chart {
                title,
                ..chart.clone()
            },
            DispatchMode::Push,
        );
    }

    pub fn set_artist(&mut self, artist: impl Into<String>) {
        let artist = artist.into();
        self.history.dispatch_with(
            |chart| Chart {
                artist,
                ..chart.clone()
            },
            DispatchMode::Push,
        );
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.history.dispatch_with(
            |chart| Chart {
                mode,
                ..chart.clone()
            },
            DispatchMode::Push,
        );
    }

    /// Moves the key by `steps` semitones and respells every chord for the
    /// new key, as one undo step.
    #[instrument(skip(self), fields(chart_id = %self.chart().id, steps))]
    pub fn transpose_chart(&mut self, steps: i32) {
        if steps.rem_euclid(12) == 0 {
            debug!("transpose noop");
            return;
        }
        self.history.dispatch_with(
            |chart| {
                let mut next = chart.clone();
                next.key = chart.key.shifted(steps);
                let new_key = next.key.as_str().to_string();
                for measure in next
                    .sections
                    .iter_mut()
                    .flat_map(|section| section.measures.iter_mut())
                {
                    for chord in &mut measure.chords {
                        *chord = theory::transpose_chord(chord, steps, &new_key);
                    }
                }
                next
            },
            DispatchMode::Push,
        );
        info!(key = %self.chart().key, "chart transposed");
    }

    /// Records the save time in place; this never adds an undo step.
    pub fn mark_saved(&mut self, at: DateTime<Utc>) {
        self.history.dispatch_with(
            |chart| Chart {
                saved_at: Some(at),
                ..chart.clone()
            },
            DispatchMode::Overwrite,
        );
    }

    /// Hands a record stamped with `at` to `store`. The chart only records
    /// the save time once the store accepted it.
    #[instrument(skip(self, store), fields(chart_id = %self.chart().id))]
    pub fn save(
        &mut self,
        store: &dyn ChartStore,
        at: DateTime<Utc>,
    ) -> Result<ChartRecord, EngineError> {
        let stamped = Chart {
            saved_at: Some(at),
            ..self.chart().clone()
        };
        let record = persistence::serialize_chart(&stamped)?;
        if let Err(error) = store.save(&record) {
            warn!(?error, "chart save failed");
            return Err(error.into());
        }
        self.mark_saved(at);
        info!("chart saved");
        Ok(record)
    }

    fn try_commit<T, F>(&mut self, update: F) -> Result<(T, bool), EngineError>
    where
        F: FnOnce(&mut Chart) -> Result<T, EngineError>,
    {
        let mut next = self.history.current().clone();
        let value = update(&mut next)?;
        let changed = self.history.dispatch(next, DispatchMode::Push);
        Ok((value, changed))
    }

    fn checked_ref(
        &self,
        section_id: Uuid,
        measure_index: usize,
    ) -> Result<MeasureRef, EngineError> {
        let section = self
            .chart()
            .section(section_id)
            .ok_or(EngineError::SectionNotFound(section_id))?;
        if measure_index >= section.measures.len() {
            return Err(EngineError::MeasureNotFound {
                section_id,
                index: measure_index,
            });
        }
        Ok(MeasureRef::new(section_id, measure_index))
    }

    fn selected_range(&self) -> Result<SelectionRange, EngineError> {
        let range = self.selection.range().ok_or(EngineError::NoSelection)?;
        let section = self
            .chart()
            .section(range.section_id)
            .ok_or(EngineError::SectionNotFound(range.section_id))?;
        if range.last >= section.measures.len() {
            return Err(EngineError::MeasureNotFound {
                section_id: range.section_id,
                index: range.last,
            });
        }
        Ok(range)
    }

    /// Drops selection parts that no longer point into the current chart.
    fn reconcile_selection(&mut self) {
        let chart = self.history.current();
        if chart.section(self.selection.active_section_id).is_none() {
            self.selection
                .set_active_section(first_section_id(chart));
        }

        let in_chart = |target: &MeasureRef| {
            chart
                .section(target.section_id)
                .is_some_and(|section| target.measure_index < section.measures.len())
        };
        let stale_start = self.selection.start.is_some_and(|start| !in_chart(&start));
        let stale_end = self.selection.end.is_some_and(|end| !in_chart(&end));
        if stale_start || stale_end {
            self.selection.clear();
        }
    }
}

fn first_section_id(chart: &Chart) -> Uuid {
    chart
        .sections
        .first()
        .map_or_else(Uuid::nil, |section| section.id)
}

fn section_mut(chart: &mut Chart, section_id: Uuid) -> Result<&mut Section, EngineError> {
    chart
        .sections
        .iter_mut()
        .find(|section| section.id == section_id)
        .ok_or(EngineError::SectionNotFound(section_id))
}

fn measure_mut(chart: &mut Chart, target: MeasureRef) -> Result<&mut Measure, EngineError> {
    section_mut(chart, target.section_id)?
        .measures
        .get_mut(target.measure_index)
        .ok_or(EngineError::MeasureNotFound {
            section_id: target.section_id,
            index: target.measure_index,
        })
}

/// `%` when the measure before `index` sits on the same line and holds
/// exactly `token`.
fn collapse_repeat(measures: &[Measure], index: usize, token: &str) -> String {
    let repeats_previous = index
        .checked_sub(1)
        .filter(|previous| layout::same_line(*previous, index))
        .and_then(|previous| measures.get(previous))
        .is_some_and(|previous| previous.holds_only(token));

    if repeats_previous {
        REPEAT_SHORTHAND.to_string()
    } else {
        token.to_string()
    }
}
