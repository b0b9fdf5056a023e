use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use crate::core::session::SaveSnapshot;
use crate::core::shift::ShiftWindow;
use crate::db;
use crate::error::ShiftboardError;
use crate::models::{group_runtime_samples, CalculatedGrid, DateKey, HourKey, InputGrid, RuntimeGrid};
use crate::report::{ReportBackend, ReportKind, ReportRequest};

/// Grids of one ICCID as read back from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedGrids {
    pub runtime: RuntimeGrid,
    pub inputs: InputGrid,
    pub calculated: CalculatedGrid,
}

pub async fn load_iccid(
    pool: &SqlitePool,
    site_id: &str,
    iccid: &str,
    start: DateKey,
    end: DateKey,
) -> Result<LoadedGrids> {
    let runtime = db::get_runtime_grid(pool, site_id, iccid, start, end).await?;
    let inputs = db::get_input_grid(pool, site_id, iccid, start, end).await?;
    let calculated = db::get_calculated_grid(pool, site_id, iccid, start, end).await?;
    Ok(LoadedGrids { runtime, inputs, calculated })
}

/// ICCIDs worth showing for a range: the site's active scales plus anything
/// that has runtime data in the range.
pub async fn site_iccids(pool: &SqlitePool, site_id: &str, start: DateKey, end: DateKey) -> Result<Vec<String>> {
    let site = db::get_site(pool, site_id)
        .await?
        .ok_or_else(|| ShiftboardError::UnknownSite(site_id.to_string()))?;

    let mut iccids: BTreeSet<String> = site.active_iccids().into_iter().collect();
    iccids.extend(db::list_runtime_iccids(pool, site_id, start, end).await?);
    Ok(iccids.into_iter().collect())
}

/// Tracks which (site, ICCID) pairs have a save running.
#[derive(Debug, Clone, Default)]
pub struct SaveGuard {
    in_flight: Arc<Mutex<HashSet<(String, String)>>>,
}

/// Held for the duration of one save; releases its slot on drop.
#[derive(Debug)]
pub struct SaveTicket {
    guard: SaveGuard,
    key: (String, String),
}

impl SaveGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, site_id: &str, iccid: &str) -> Result<SaveTicket, ShiftboardError> {
        let key = (site_id.to_string(), iccid.to_string());
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key.clone()) {
            return Err(ShiftboardError::SaveInFlight {
                site_id: site_id.to_string(),
                iccid: iccid.to_string(),
            });
        }
        Ok(SaveTicket { guard: self.clone(), key })
    }

    pub fn is_saving(&self, site_id: &str, iccid: &str) -> bool {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.contains(&(site_id.to_string(), iccid.to_string()))
    }
}

impl Drop for SaveTicket {
    fn drop(&mut self) {
        let mut in_flight = self.guard.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
    }
}

/// Persists a snapshot and returns the day totals that were written with it.
///
/// Rejected with `SaveInFlight` while another save of the same ICCID runs.
/// The caller's in-memory grids are never touched here, so a failed save
/// leaves the session exactly as it was.
pub async fn save_iccid(
    pool: &SqlitePool,
    guard: &SaveGuard,
    window: &ShiftWindow,
    snapshot: &SaveSnapshot,
) -> Result<BTreeMap<DateKey, f64>> {
    let _ticket = guard.try_acquire(&snapshot.site_id, &snapshot.iccid)?;

    let hours = HourKey::all();
    let day_totals: BTreeMap<DateKey, f64> = window
        .day_totals(&snapshot.dates, &snapshot.calculated, &hours)
        .into_iter()
        .collect();

    db::save_grids(pool, snapshot, &day_totals).await?;
    info!(site = %snapshot.site_id, iccid = %snapshot.iccid, dates = snapshot.dates.len(), "Saved grids");
    Ok(day_totals)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub run_id: i64,
    pub kind: ReportKind,
    pub status: String,
    pub message: Option<String>,
    pub samples_saved: usize,
    /// ICCIDs the returned samples belong to.
    pub refreshed_iccids: Vec<String>,
}

/// Triggers a report and records the run, successful or not.
/// Runtime samples carried back by the service are upserted for the site.
pub async fn run_report(
    pool: &SqlitePool,
    backend: &dyn ReportBackend,
    request: &ReportRequest,
) -> Result<ReportOutcome> {
    let kind = request.kind.as_str();

    match backend.trigger(request).await {
        Ok(response) => {
            let by_iccid = group_runtime_samples(&response.samples);
            for (iccid, grid) in &by_iccid {
                debug!(site = %request.site_id, %iccid, dates = grid.len(), "Runtime samples returned");
            }

            let samples_saved = if response.samples.is_empty() {
                0
            } else {
                match db::save_runtime_samples(pool, &request.site_id, &response.samples).await {
                    Ok(saved) => saved,
                    Err(e) => {
                        let e = e.context("Report succeeded but its runtime samples could not be saved");
                        return Err(record_failure(pool, backend, request, e).await);
                    }
                }
            };

            let run_id = db::record_report_run(
                pool,
                &request.site_id,
                kind,
                &response.status,
                response.message.as_deref(),
            )
            .await?;

            let refreshed_iccids: Vec<String> = by_iccid.into_keys().collect();
            info!(site = %request.site_id, kind, backend = backend.name(), samples_saved, "Report completed");
            Ok(ReportOutcome {
                run_id,
                kind: request.kind,
                status: response.status,
                message: response.message,
                samples_saved,
                refreshed_iccids,
            })
        }
        Err(e) => Err(record_failure(pool, backend, request, e).await),
    }
}

async fn record_failure(
    pool: &SqlitePool,
    backend: &dyn ReportBackend,
    request: &ReportRequest,
    e: anyhow::Error,
) -> anyhow::Error {
    let kind = request.kind.as_str();
    error!(site = %request.site_id, kind, backend = backend.name(), error = %format!("{:#}", e), "Report failed");
    if let Err(record_err) =
        db::record_report_run(pool, &request.site_id, kind, "failed", Some(&format!("{:#}", e))).await
    {
        warn!(error = %record_err, "Could not record failed report run");
    }
    e
}
