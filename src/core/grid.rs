use crate::core::history::History;
use crate::models::{DateKey, HourKey, InputGrid};
use serde::{Deserialize, Serialize};

/// Ordered row (date) and column (hour) axes of the editable grid.
/// Selections resolve against these positions, not against calendar order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridAxes {
    pub dates: Vec<DateKey>,
    pub hours: Vec<HourKey>,
}

impl GridAxes {
    pub fn new(dates: Vec<DateKey>, hours: Vec<HourKey>) -> Self {
        GridAxes { dates, hours }
    }

    /// (row, column) of a cell, if both keys are on the axes.
    pub fn position(&self, cell: &CellRef) -> Option<(usize, usize)> {
        let row = self.dates.iter().position(|d| *d == cell.date)?;
        let col = self.hours.iter().position(|h| *h == cell.hour)?;
        Some((row, col))
    }

    pub fn contains(&self, cell: &CellRef) -> bool {
        self.position(cell).is_some()
    }

    fn full_rect(&self) -> Option<SelectionRect> {
        if self.dates.is_empty() || self.hours.is_empty() {
            return None;
        }
        Some(SelectionRect {
            first_date: 0,
            last_date: self.dates.len() - 1,
            first_hour: 0,
            last_hour: self.hours.len() - 1,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef {
    pub date: DateKey,
    pub hour: HourKey,
}

impl CellRef {
    pub fn new(date: DateKey, hour: HourKey) -> Self {
        CellRef { date, hour }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSelection {
    pub start: CellRef,
    pub end: CellRef,
    pub active: bool,
}

impl CellSelection {
    /// Component-wise min/max of the anchors, by axis position.
    pub fn normalize(&self, axes: &GridAxes) -> Option<SelectionRect> {
        let (start_row, start_col) = axes.position(&self.start)?;
        let (end_row, end_col) = axes.position(&self.end)?;
        Some(SelectionRect {
            first_date: start_row.min(end_row),
            last_date: start_row.max(end_row),
            first_hour: start_col.min(end_col),
            last_hour: start_col.max(end_col),
        })
    }
}

/// Inclusive index rectangle over the axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRect {
    pub first_date: usize,
    pub last_date: usize,
    pub first_hour: usize,
    pub last_hour: usize,
}

impl SelectionRect {
    pub fn cell_count(&self) -> usize {
        (self.last_date - self.first_date + 1) * (self.last_hour - self.first_hour + 1)
    }

    pub fn is_multi_cell(&self) -> bool {
        self.cell_count() > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPhase {
    #[default]
    Idle,
    Selecting,
    SelectionFinal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillDirection {
    Right,
    Below,
    All,
}

/// Operator actions on the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GridCommand {
    PointerDown { cell: CellRef },
    PointerEnter { cell: CellRef },
    PointerUp,
    EditCell { cell: CellRef, text: String },
    ApplyPreset { value: String },
    AutoFill { direction: FillDirection },
    ClearAll,
    ClearSelection,
    Undo,
    Redo,
}

/// Editable part of the grid: inputs plus selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridState {
    pub inputs: InputGrid,
    pub selection: Option<CellSelection>,
    pub phase: SelectionPhase,
}

/// Result of reducing one command: the next state and whether it should be
/// committed to history.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub next: GridState,
    pub commit: bool,
}

impl GridState {
    pub fn new(inputs: InputGrid) -> Self {
        GridState {
            inputs,
            ..Default::default()
        }
    }

    pub fn has_active_selection(&self) -> bool {
        self.selection.map(|s| s.active).unwrap_or(false)
    }

    /// Rectangle bulk operations act on: the active multi-cell selection,
    /// finished or still being dragged, or `None` when they should cover the
    /// whole grid.
    pub fn target_rect(&self, axes: &GridAxes) -> Option<SelectionRect> {
        if self.phase == SelectionPhase::Idle {
            return None;
        }
        self.selection
            .filter(|s| s.active)
            .and_then(|s| s.normalize(axes))
            .filter(|rect| rect.is_multi_cell())
    }

    /// Applies a command without touching history. `Undo` / `Redo` need the
    /// history and are no-ops here; `GridEditor` handles them.
    pub fn reduce(&self, axes: &GridAxes, command: &GridCommand) -> Step {
        let mut next = self.clone();
        let commit = match command {
            GridCommand::PointerDown { cell } => {
                if axes.contains(cell) {
                    next.selection = Some(CellSelection { start: *cell, end: *cell, active: true });
                    next.phase = SelectionPhase::Selecting;
                }
                false
            }
            GridCommand::PointerEnter { cell } => {
                if self.phase == SelectionPhase::Selecting && axes.contains(cell) {
                    if let Some(selection) = next.selection.as_mut() {
                        selection.end = *cell;
                    }
                }
                false
            }
            GridCommand::PointerUp => {
                if self.phase != SelectionPhase::Selecting {
                    false
                } else {
                    let rect = self.selection.and_then(|s| s.normalize(axes));
                    match rect {
                        Some(rect) if rect.is_multi_cell() => {
                            next.phase = SelectionPhase::SelectionFinal;
                            true
                        }
                        // A plain click is not an undoable action
                        _ => {
                            next.phase = SelectionPhase::Idle;
                            next.selection = None;
                            false
                        }
                    }
                }
            }
            GridCommand::EditCell { cell, text } => {
                if !axes.contains(cell) {
                    false
                } else {
                    next.inputs.entry(cell.date).or_default().insert(cell.hour, text.clone());
                    // Edits inside a selection are committed with the selection
                    !self.has_active_selection()
                }
            }
            GridCommand::ApplyPreset { value } => {
                match self.target_rect(axes) {
                    Some(rect) => overwrite_rect(&mut next.inputs, axes, rect, value),
                    None => fill_empty(&mut next.inputs, axes, value),
                }
                true
            }
            GridCommand::AutoFill { direction } => {
                if let Some(rect) = self.target_rect(axes).or_else(|| axes.full_rect()) {
                    match direction {
                        FillDirection::Right => fill_right(&mut next.inputs, axes, rect),
                        FillDirection::Below => fill_below(&mut next.inputs, axes, rect),
                        FillDirection::All => {
                            fill_right(&mut next.inputs, axes, rect);
                            fill_below(&mut next.inputs, axes, rect);
                        }
                    }
                }
                true
            }
            GridCommand::ClearAll => {
                next.inputs = InputGrid::new();
                true
            }
            GridCommand::ClearSelection => {
                next.selection = None;
                next.phase = SelectionPhase::Idle;
                false
            }
            GridCommand::Undo | GridCommand::Redo => false,
        };

        Step { next, commit }
    }
}

fn cell_text<'a>(inputs: &'a InputGrid, date: &DateKey, hour: &HourKey) -> &'a str {
    inputs
        .get(date)
        .and_then(|row| row.get(hour))
        .map(String::as_str)
        .unwrap_or("")
}

fn set_cell(inputs: &mut InputGrid, date: DateKey, hour: HourKey, value: &str) {
    inputs.entry(date).or_default().insert(hour, value.to_string());
}

fn overwrite_rect(inputs: &mut InputGrid, axes: &GridAxes, rect: SelectionRect, value: &str) {
    for date in &axes.dates[rect.first_date..=rect.last_date] {
        for hour in &axes.hours[rect.first_hour..=rect.last_hour] {
            set_cell(inputs, *date, *hour, value);
        }
    }
}

fn fill_empty(inputs: &mut InputGrid, axes: &GridAxes, value: &str) {
    for date in &axes.dates {
        for hour in &axes.hours {
            if cell_text(inputs, date, hour).is_empty() {
                set_cell(inputs, *date, *hour, value);
            }
        }
    }
}

/// Per row, copies the right-most filled value into the empty cells after it.
fn fill_right(inputs: &mut InputGrid, axes: &GridAxes, rect: SelectionRect) {
    let hours = &axes.hours[rect.first_hour..=rect.last_hour];
    for date in &axes.dates[rect.first_date..=rect.last_date] {
        let Some(last_filled) = hours.iter().rposition(|h| !cell_text(inputs, date, h).is_empty()) else {
            continue;
        };
        let value = cell_text(inputs, date, &hours[last_filled]).to_string();
        for hour in &hours[last_filled + 1..] {
            if cell_text(inputs, date, hour).is_empty() {
                set_cell(inputs, *date, *hour, &value);
            }
        }
    }
}

/// Per column, copies the last filled value into the empty cells below it.
fn fill_below(inputs: &mut InputGrid, axes: &GridAxes, rect: SelectionRect) {
    let dates = &axes.dates[rect.first_date..=rect.last_date];
    for hour in &axes.hours[rect.first_hour..=rect.last_hour] {
        let Some(last_filled) = dates.iter().rposition(|d| !cell_text(inputs, d, hour).is_empty()) else {
            continue;
        };
        let value = cell_text(inputs, &dates[last_filled], hour).to_string();
        for date in &dates[last_filled + 1..] {
            if cell_text(inputs, date, hour).is_empty() {
                set_cell(inputs, *date, *hour, &value);
            }
        }
    }
}

/// What a dispatched command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub inputs_changed: bool,
    pub committed: bool,
}

/// Grid state plus its linear undo/redo history.
#[derive(Debug, Clone)]
pub struct GridEditor {
    axes: GridAxes,
    state: GridState,
    history: History<InputGrid>,
}

impl GridEditor {
    pub fn new(axes: GridAxes, inputs: InputGrid) -> Self {
        GridEditor {
            axes,
            history: History::new(inputs.clone()),
            state: GridState::new(inputs),
        }
    }

    pub fn axes(&self) -> &GridAxes {
        &self.axes
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn inputs(&self) -> &InputGrid {
        &self.state.inputs
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn selection_rect(&self) -> Option<SelectionRect> {
        self.state.target_rect(&self.axes)
    }

    pub fn dispatch(&mut self, command: GridCommand) -> DispatchOutcome {
        match command {
            GridCommand::Undo => {
                let restored = self.history.undo();
                self.restore(restored)
            }
            GridCommand::Redo => {
                let restored = self.history.redo();
                self.restore(restored)
            }
            command => {
                let step = self.state.reduce(&self.axes, &command);
                let inputs_changed = step.next.inputs != self.state.inputs;
                self.state = step.next;
                if step.commit {
                    self.history.commit(self.state.inputs.clone());
                }
                DispatchOutcome { inputs_changed, committed: step.commit }
            }
        }
    }

    fn restore(&mut self, snapshot: Option<InputGrid>) -> DispatchOutcome {
        match snapshot {
            Some(inputs) => {
                let inputs_changed = inputs != self.state.inputs;
                self.state.inputs = inputs;
                DispatchOutcome { inputs_changed, committed: false }
            }
            None => DispatchOutcome { inputs_changed: false, committed: false },
        }
    }
}
