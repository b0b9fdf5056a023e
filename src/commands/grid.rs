use serde::Serialize;
use tauri::State;
use tracing::{info, warn};
use crate::commands::AppState;
use crate::core::export::{self, ExportMode};
use crate::core::grid::{GridCommand, SelectionPhase, SelectionRect};
use crate::core::orchestrator;
use crate::core::session::{EditorSession, IccidTotals, SiteSelection};
use crate::core::shift::UnparsedCell;
use crate::db;
use crate::error::ShiftboardError;
use crate::models::{CalculatedGrid, DateKey, HourKey, InputGrid, RuntimeGrid};

/// Everything the grid view renders for one ICCID.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridView {
    pub iccid: String,
    pub dates: Vec<DateKey>,
    pub hours: Vec<HourKey>,
    pub runtime: RuntimeGrid,
    pub inputs: InputGrid,
    pub calculated: CalculatedGrid,
    pub selection: Option<SelectionRect>,
    pub phase: SelectionPhase,
    pub can_undo: bool,
    pub can_redo: bool,
    pub dirty: bool,
    pub totals: IccidTotals,
    pub unparseable: Vec<UnparsedCell>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    pub iccids: Vec<IccidTotals>,
    pub grand_total: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub saved: Vec<String>,
    pub failed: Vec<(String, String)>,
}

fn grid_view(session: &EditorSession, iccid: &str) -> Result<GridView, ShiftboardError> {
    let workspace = session.workspace(iccid)?;
    let axes = session.axes();
    Ok(GridView {
        iccid: iccid.to_string(),
        dates: axes.dates.clone(),
        hours: axes.hours.clone(),
        runtime: workspace.runtime.clone(),
        inputs: workspace.editor.inputs().clone(),
        calculated: workspace.calculated.clone(),
        selection: workspace.editor.selection_rect(),
        phase: workspace.editor.state().phase,
        can_undo: workspace.editor.can_undo(),
        can_redo: workspace.editor.can_redo(),
        dirty: workspace.dirty,
        totals: session.totals(iccid)?,
        unparseable: session.unparseable(iccid)?,
    })
}

fn session_totals(session: &EditorSession) -> Result<SessionTotals, ShiftboardError> {
    let iccids = session
        .iccids()
        .iter()
        .map(|iccid| session.totals(iccid))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SessionTotals { iccids, grand_total: session.grand_total() })
}

/// Runs `f` against the open session.
fn with_session<T>(
    state: &AppState,
    f: impl FnOnce(&mut EditorSession) -> Result<T, ShiftboardError>,
) -> Result<T, String> {
    let mut guard = state.session();
    let session = guard.as_mut().ok_or_else(|| "No site selected".to_string())?;
    f(session).map_err(|e| e.to_string())
}

/// Opens or switches the site/range. Returns `true` if loaded grids were dropped.
#[tauri::command]
pub async fn select_range(state: State<'_, AppState>, site_id: String, start: String, end: String) -> Result<bool, String> {
    let start: DateKey = start.parse().map_err(|e: ShiftboardError| e.to_string())?;
    let end: DateKey = end.parse().map_err(|e: ShiftboardError| e.to_string())?;

    if db::get_site(&state.pool, &site_id).await.map_err(|e| e.to_string())?.is_none() {
        return Err(ShiftboardError::UnknownSite(site_id).to_string());
    }

    let selection = SiteSelection { site_id, start, end };
    let window = state.config().window();
    let mut guard = state.session();
    if let Some(session) = guard.as_mut().filter(|s| s.window() == window) {
        return session.select(selection).map_err(|e| e.to_string());
    }
    // First selection, or the day boundary changed in settings
    *guard = Some(EditorSession::new(selection, window).map_err(|e| e.to_string())?);
    Ok(true)
}

/// Loads grids for the given ICCIDs, or for every ICCID of the site.
#[tauri::command]
pub async fn load_iccids(state: State<'_, AppState>, iccids: Option<Vec<String>>) -> Result<Vec<String>, String> {
    let selection = with_session(&state, |s| Ok(s.selection().clone()))?;
    let SiteSelection { site_id, start, end } = &selection;

    let iccids = match iccids {
        Some(list) => list,
        None => orchestrator::site_iccids(&state.pool, site_id, *start, *end)
            .await
            .map_err(|e| e.to_string())?,
    };

    let mut loaded = Vec::with_capacity(iccids.len());
    for iccid in iccids {
        let grids = orchestrator::load_iccid(&state.pool, site_id, &iccid, *start, *end)
            .await
            .map_err(|e| format!("Failed to load {}: {}", iccid, e))?;
        loaded.push((iccid, grids));
    }

    with_session(&state, |session| {
        if *session.selection() != selection {
            warn!("Selection changed while loading, discarding fetched grids");
            return Ok(Vec::new());
        }
        let mut names = Vec::with_capacity(loaded.len());
        for (iccid, grids) in loaded {
            session.load_iccid(&iccid, grids.runtime, grids.inputs, grids.calculated);
            names.push(iccid);
        }
        Ok(names)
    })
}

#[tauri::command]
pub async fn get_grid(state: State<'_, AppState>, iccid: String) -> Result<GridView, String> {
    with_session(&state, |s| grid_view(s, &iccid))
}

#[tauri::command]
pub async fn dispatch_grid_command(state: State<'_, AppState>, iccid: String, command: GridCommand) -> Result<GridView, String> {
    with_session(&state, |s| {
        s.dispatch(&iccid, command)?;
        grid_view(s, &iccid)
    })
}

#[tauri::command]
pub async fn calculate(state: State<'_, AppState>, iccid: String) -> Result<GridView, String> {
    with_session(&state, |s| {
        s.calculate(&iccid)?;
        grid_view(s, &iccid)
    })
}

#[tauri::command]
pub async fn calculate_all(state: State<'_, AppState>) -> Result<SessionTotals, String> {
    with_session(&state, |s| {
        s.calculate_all()?;
        session_totals(s)
    })
}

#[tauri::command]
pub async fn get_totals(state: State<'_, AppState>) -> Result<SessionTotals, String> {
    with_session(&state, |s| session_totals(s))
}

async fn save_one(state: &AppState, iccid: &str) -> Result<(), String> {
    let (snapshot, window) = with_session(state, |s| Ok((s.save_snapshot(iccid)?, s.window())))?;

    orchestrator::save_iccid(&state.pool, &state.save_guard, &window, &snapshot)
        .await
        .map_err(|e| e.to_string())?;

    // The session may have moved on while the save ran
    let mut guard = state.session();
    if let Some(session) = guard.as_mut() {
        session.mark_saved(&snapshot);
    }
    Ok(())
}

#[tauri::command]
pub async fn save_iccid(state: State<'_, AppState>, iccid: String) -> Result<GridView, String> {
    save_one(&state, &iccid).await?;
    with_session(&state, |s| grid_view(s, &iccid))
}

/// Saves every loaded ICCID; one failure does not stop the others.
#[tauri::command]
pub async fn save_all(state: State<'_, AppState>) -> Result<SaveReport, String> {
    let iccids = with_session(&state, |s| Ok(s.iccids()))?;
    let mut report = SaveReport::default();

    for iccid in iccids {
        match save_one(&state, &iccid).await {
            Ok(()) => report.saved.push(iccid),
            Err(e) => {
                warn!(%iccid, error = %e, "Save failed");
                report.failed.push((iccid, e));
            }
        }
    }

    info!(saved = report.saved.len(), failed = report.failed.len(), "Save all finished");
    Ok(report)
}

#[tauri::command]
pub async fn export_csv(state: State<'_, AppState>, mode: ExportMode, iccid: Option<String>) -> Result<String, String> {
    with_session(&state, |s| export::export_session(s, mode, iccid.as_deref()))
}
