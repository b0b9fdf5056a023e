use tauri::{AppHandle, State};
use tracing::warn;
use crate::commands::AppState;
use crate::core::alerts::{StatusMessage, StatusSink};
use crate::core::orchestrator::{self, ReportOutcome};
use crate::db;
use crate::error::ShiftboardError;
use crate::models::{DateKey, ReportRun};
use crate::report::{ReportKind, ReportRequest};

fn parse_date(raw: Option<String>, fallback: Option<DateKey>) -> Result<DateKey, String> {
    match raw {
        Some(text) => text.parse().map_err(|e: ShiftboardError| e.to_string()),
        None => fallback.ok_or_else(|| "A date is required when no site is selected".to_string()),
    }
}

/// Triggers a report for the given site and range, defaulting to the
/// current selection. A requery also refreshes the loaded runtime grids.
#[tauri::command]
pub async fn trigger_report(
    app: AppHandle,
    state: State<'_, AppState>,
    kind: ReportKind,
    site_id: Option<String>,
    start: Option<String>,
    end: Option<String>,
    iccids: Option<Vec<String>>,
) -> Result<ReportOutcome, String> {
    let backend = state
        .backend()
        .ok_or_else(|| "Report service URL is not configured".to_string())?;

    // 1. Build the request from the arguments and the open selection
    let current = state.session().as_ref().map(|s| s.selection().clone());
    let site_id = site_id
        .or_else(|| current.as_ref().map(|c| c.site_id.clone()))
        .ok_or_else(|| "No site selected".to_string())?;
    let request = ReportRequest {
        kind,
        site_id,
        start_date: parse_date(start, current.as_ref().map(|c| c.start))?,
        end_date: parse_date(end, current.as_ref().map(|c| c.end))?,
        iccids: iccids.unwrap_or_default(),
    };
    if request.start_date > request.end_date {
        return Err(ShiftboardError::InvalidRange {
            start: request.start_date.to_string(),
            end: request.end_date.to_string(),
        }
        .to_string());
    }

    // 2. Trigger and publish the result
    let title = format!("{} report", kind.as_str());
    let outcome = match orchestrator::run_report(&state.pool, backend.as_ref(), &request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            app.publish(StatusMessage::error(title, e.to_string()));
            return Err(e.to_string());
        }
    };
    let body = outcome.message.clone().unwrap_or_else(|| outcome.status.clone());
    app.publish(StatusMessage::success(title, body));

    // 3. Refresh runtime grids the requery touched
    if outcome.samples_saved > 0 {
        refresh_runtime(&state, &request.site_id, &outcome.refreshed_iccids).await;
    }

    Ok(outcome)
}

async fn refresh_runtime(state: &AppState, site_id: &str, touched: &[String]) {
    let Some((selection, iccids)) = state
        .session()
        .as_ref()
        .filter(|s| s.selection().site_id == site_id)
        .map(|s| {
            let loaded: Vec<String> = s.iccids().into_iter().filter(|i| touched.contains(i)).collect();
            (s.selection().clone(), loaded)
        })
    else {
        return;
    };

    for iccid in iccids {
        let runtime = match db::get_runtime_grid(&state.pool, site_id, &iccid, selection.start, selection.end).await {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(%iccid, error = %e, "Could not reload runtime after requery");
                continue;
            }
        };

        let mut guard = state.session();
        if let Some(session) = guard.as_mut().filter(|s| *s.selection() == selection) {
            let _ = session.replace_runtime(&iccid, runtime);
        }
    }
}

#[tauri::command]
pub async fn get_report_runs(state: State<'_, AppState>, site_id: String, limit: Option<i64>) -> Result<Vec<ReportRun>, String> {
    db::get_report_runs(&state.pool, &site_id, limit.unwrap_or(50).clamp(1, 500))
        .await
        .map_err(|e| e.to_string())
}
