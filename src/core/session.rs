use crate::core::grid::{DispatchOutcome, GridAxes, GridCommand, GridEditor};
use crate::core::shift::{self, ShiftWindow, UnparsedCell};
use crate::error::ShiftboardError;
use crate::models::{date_range, CalculatedGrid, DateKey, HourKey, InputGrid, RuntimeGrid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Which site and reporting range the operator is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSelection {
    pub site_id: String,
    pub start: DateKey,
    pub end: DateKey,
}

/// Grids for one ICCID within the current selection.
#[derive(Debug, Clone)]
pub struct IccidWorkspace {
    pub runtime: RuntimeGrid,
    pub editor: GridEditor,
    pub calculated: CalculatedGrid,
    pub dirty: bool,
}

/// Copy of one ICCID's grids taken for a save; the session keeps editing
/// while the copy is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveSnapshot {
    pub site_id: String,
    pub iccid: String,
    pub dates: Vec<DateKey>,
    pub inputs: InputGrid,
    pub calculated: CalculatedGrid,
}

/// Per-ICCID totals as shown next to the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IccidTotals {
    pub iccid: String,
    pub day_totals: Vec<(DateKey, f64)>,
    pub progressive_total: f64,
}

/// Editing state for one site and date range.
///
/// Changing the site or the range drops every loaded workspace; grids are
/// only ever valid for the selection they were loaded under.
#[derive(Debug, Clone)]
pub struct EditorSession {
    selection: SiteSelection,
    axes: GridAxes,
    window: ShiftWindow,
    workspaces: BTreeMap<String, IccidWorkspace>,
}

impl EditorSession {
    pub fn new(selection: SiteSelection, window: ShiftWindow) -> Result<Self, ShiftboardError> {
        let dates = date_range(selection.start, selection.end)?;
        Ok(EditorSession {
            selection,
            axes: GridAxes::new(dates, HourKey::all()),
            window,
            workspaces: BTreeMap::new(),
        })
    }

    pub fn selection(&self) -> &SiteSelection {
        &self.selection
    }

    pub fn axes(&self) -> &GridAxes {
        &self.axes
    }

    pub fn window(&self) -> ShiftWindow {
        self.window
    }

    /// Switches site or range. Returns `true` when loaded grids were discarded.
    pub fn select(&mut self, selection: SiteSelection) -> Result<bool, ShiftboardError> {
        if selection == self.selection {
            return Ok(false);
        }
        let dates = date_range(selection.start, selection.end)?;
        debug!(site = %selection.site_id, start = %selection.start, end = %selection.end, "Selection changed, resetting grids");
        self.selection = selection;
        self.axes = GridAxes::new(dates, HourKey::all());
        self.workspaces.clear();
        Ok(true)
    }

    pub fn load_iccid(
        &mut self,
        iccid: &str,
        runtime: RuntimeGrid,
        inputs: InputGrid,
        calculated: CalculatedGrid,
    ) {
        let editor = GridEditor::new(self.axes.clone(), inputs);
        self.workspaces.insert(
            iccid.to_string(),
            IccidWorkspace { runtime, editor, calculated, dirty: false },
        );
    }

    /// Swaps in fresh runtime data (after a requery) without touching the
    /// operator's inputs or undo history. Purple figures stay stale until the
    /// next calculate.
    pub fn replace_runtime(&mut self, iccid: &str, runtime: RuntimeGrid) -> Result<(), ShiftboardError> {
        let workspace = self.workspace_mut(iccid)?;
        workspace.runtime = runtime;
        Ok(())
    }

    pub fn iccids(&self) -> Vec<String> {
        self.workspaces.keys().cloned().collect()
    }

    pub fn workspace(&self, iccid: &str) -> Result<&IccidWorkspace, ShiftboardError> {
        self.workspaces
            .get(iccid)
            .ok_or_else(|| ShiftboardError::UnknownIccid(iccid.to_string()))
    }

    fn workspace_mut(&mut self, iccid: &str) -> Result<&mut IccidWorkspace, ShiftboardError> {
        self.workspaces
            .get_mut(iccid)
            .ok_or_else(|| ShiftboardError::UnknownIccid(iccid.to_string()))
    }

    pub fn dispatch(&mut self, iccid: &str, command: GridCommand) -> Result<DispatchOutcome, ShiftboardError> {
        let workspace = self.workspace_mut(iccid)?;
        let outcome = workspace.editor.dispatch(command);
        if outcome.inputs_changed {
            workspace.dirty = true;
        }
        Ok(outcome)
    }

    /// "Calculate": rebuilds one ICCID's purple figures from its inputs.
    pub fn calculate(&mut self, iccid: &str) -> Result<&CalculatedGrid, ShiftboardError> {
        let dates = self.axes.dates.clone();
        let hours = self.axes.hours.clone();
        let workspace = self.workspace_mut(iccid)?;
        let calculated = shift::calculate_grid(&dates, &hours, &workspace.runtime, workspace.editor.inputs());
        if calculated != workspace.calculated {
            workspace.dirty = true;
        }
        workspace.calculated = calculated;
        Ok(&workspace.calculated)
    }

    /// "Calculate All": every loaded ICCID.
    pub fn calculate_all(&mut self) -> Result<usize, ShiftboardError> {
        let iccids = self.iccids();
        for iccid in &iccids {
            self.calculate(iccid)?;
        }
        Ok(iccids.len())
    }

    pub fn totals(&self, iccid: &str) -> Result<IccidTotals, ShiftboardError> {
        let workspace = self.workspace(iccid)?;
        let day_totals = self.window.day_totals(&self.axes.dates, &workspace.calculated, &self.axes.hours);
        let progressive_total = day_totals.iter().map(|(_, total)| total).sum();
        Ok(IccidTotals {
            iccid: iccid.to_string(),
            day_totals,
            progressive_total,
        })
    }

    pub fn progressive_total(&self, iccid: &str) -> Result<f64, ShiftboardError> {
        let workspace = self.workspace(iccid)?;
        Ok(self.window.compute_progressive_total(&self.axes.dates, &workspace.calculated, &self.axes.hours))
    }

    /// Sum of progressive totals across every loaded ICCID.
    pub fn grand_total(&self) -> f64 {
        let per_iccid: BTreeMap<String, CalculatedGrid> = self
            .workspaces
            .iter()
            .map(|(iccid, ws)| (iccid.clone(), ws.calculated.clone()))
            .collect();
        self.window.compute_grand_total(&self.axes.dates, &per_iccid, &self.axes.hours)
    }

    pub fn unparseable(&self, iccid: &str) -> Result<Vec<UnparsedCell>, ShiftboardError> {
        Ok(shift::flag_unparseable(self.workspace(iccid)?.editor.inputs()))
    }

    pub fn save_snapshot(&self, iccid: &str) -> Result<SaveSnapshot, ShiftboardError> {
        let workspace = self.workspace(iccid)?;
        Ok(SaveSnapshot {
            site_id: self.selection.site_id.clone(),
            iccid: iccid.to_string(),
            dates: self.axes.dates.clone(),
            inputs: workspace.editor.inputs().clone(),
            calculated: workspace.calculated.clone(),
        })
    }

    /// Clears the dirty flag if the grids still match what was saved.
    pub fn mark_saved(&mut self, snapshot: &SaveSnapshot) {
        if snapshot.site_id != self.selection.site_id {
            return;
        }
        if let Some(workspace) = self.workspaces.get_mut(&snapshot.iccid) {
            if *workspace.editor.inputs() == snapshot.inputs && workspace.calculated == snapshot.calculated {
                workspace.dirty = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::CellRef;

    fn d(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn h(s: &str) -> HourKey {
        s.parse().unwrap()
    }

    fn selection(site: &str, start: &str, end: &str) -> SiteSelection {
        SiteSelection { site_id: site.into(), start: d(start), end: d(end) }
    }

    fn session() -> EditorSession {
        let mut session = EditorSession::new(selection("north", "2024-01-01", "2024-01-02"), ShiftWindow::default()).unwrap();
        let mut runtime = RuntimeGrid::new();
        runtime.entry(d("2024-01-01")).or_default().insert(h("06"), 2.0);
        runtime.entry(d("2024-01-02")).or_default().insert(h("02"), 5.0);
        session.load_iccid("8901", runtime, InputGrid::new(), CalculatedGrid::new());
        session
    }

    fn edit(session: &mut EditorSession, date: &str, hour: &str, text: &str) {
        session
            .dispatch("8901", GridCommand::EditCell { cell: CellRef::new(d(date), h(hour)), text: text.into() })
            .unwrap();
    }

    #[test]
    fn test_edit_calculate_total() {
        let mut session = session();
        edit(&mut session, "2024-01-01", "06", "3");
        edit(&mut session, "2024-01-02", "02", "2");
        assert!(session.workspace("8901").unwrap().dirty);

        session.calculate_all().unwrap();
        let totals = session.totals("8901").unwrap();
        assert_eq!(totals.day_totals[0], (d("2024-01-01"), 16.0));
        assert_eq!(totals.progressive_total, 16.0);
        assert_eq!(session.grand_total(), 16.0);
    }

    #[test]
    fn test_range_change_discards_grids() {
        let mut session = session();
        assert!(!session.select(selection("north", "2024-01-01", "2024-01-02")).unwrap());
        assert_eq!(session.iccids().len(), 1);

        assert!(session.select(selection("north", "2024-01-01", "2024-01-05")).unwrap());
        assert!(session.iccids().is_empty());
        assert_eq!(session.axes().dates.len(), 5);
        assert!(matches!(session.totals("8901"), Err(ShiftboardError::UnknownIccid(_))));

        assert!(session.select(selection("north", "2024-01-09", "2024-01-05")).is_err());
    }

    #[test]
    fn test_replace_runtime_keeps_inputs() {
        let mut session = session();
        edit(&mut session, "2024-01-01", "06", "3");

        let mut runtime = RuntimeGrid::new();
        runtime.entry(d("2024-01-01")).or_default().insert(h("06"), 4.0);
        session.replace_runtime("8901", runtime).unwrap();

        let ws = session.workspace("8901").unwrap();
        assert_eq!(ws.editor.inputs()[&d("2024-01-01")][&h("06")], "3");
        assert!(ws.editor.can_undo());

        session.calculate("8901").unwrap();
        assert_eq!(session.progressive_total("8901").unwrap(), 12.0);
        assert!(session.replace_runtime("0000", RuntimeGrid::new()).is_err());
    }

    #[test]
    fn test_mark_saved_only_when_unchanged() {
        let mut session = session();
        edit(&mut session, "2024-01-01", "06", "3");
        session.calculate("8901").unwrap();

        let snapshot = session.save_snapshot("8901").unwrap();
        edit(&mut session, "2024-01-01", "07", "1");
        session.mark_saved(&snapshot);
        assert!(session.workspace("8901").unwrap().dirty);

        let snapshot = session.save_snapshot("8901").unwrap();
        session.mark_saved(&snapshot);
        assert!(!session.workspace("8901").unwrap().dirty);
    }
}
