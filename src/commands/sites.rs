use serde::{Deserialize, Serialize};
use tauri::State;
use crate::commands::AppState;
use crate::config::{self, AppConfig};
use crate::db;
use crate::models::{Site, SiteSummary};

#[tauri::command]
pub async fn list_sites(state: State<'_, AppState>) -> Result<Vec<SiteSummary>, String> {
    db::list_sites(&state.pool).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_site(state: State<'_, AppState>, site_id: String) -> Result<Site, String> {
    db::get_site(&state.pool, &site_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Site '{}' not found", site_id))
}

/// Schedule changes take effect on the next start.
#[tauri::command]
pub async fn save_site(state: State<'_, AppState>, site: Site) -> Result<(), String> {
    if site.id.trim().is_empty() {
        return Err("Site id is required".to_string());
    }
    for time in site
        .schedule
        .shift_report_times
        .iter()
        .chain(site.schedule.audit_report_time.iter())
        .chain(site.schedule.stockpile_report_time.iter())
    {
        crate::core::scheduler::cron_for_time(time).map_err(|e| e.to_string())?;
    }

    db::save_site(&state.pool, &site).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn delete_site(state: State<'_, AppState>, site_id: String) -> Result<bool, String> {
    let deleted = db::delete_site(&state.pool, &site_id).await.map_err(|e| e.to_string())?;

    if deleted {
        let mut session = state.session();
        if session.as_ref().is_some_and(|s| s.selection().site_id == site_id) {
            *session = None;
        }
    }
    Ok(deleted)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSettings {
    pub report_api_url: String,
    pub report_api_key: String,
    pub day_boundary_hour: u8,
    pub report_timeout_secs: u64,
}

impl From<&AppConfig> for ReportSettings {
    fn from(config: &AppConfig) -> Self {
        ReportSettings {
            report_api_url: config.report_api_url.clone().unwrap_or_default(),
            report_api_key: config.report_api_key.clone().unwrap_or_default(),
            day_boundary_hour: config.day_boundary_hour,
            report_timeout_secs: config.report_timeout_secs,
        }
    }
}

#[tauri::command]
pub async fn get_report_settings(state: State<'_, AppState>) -> Result<ReportSettings, String> {
    Ok(ReportSettings::from(&state.config()))
}

#[tauri::command]
pub async fn save_report_settings(state: State<'_, AppState>, settings: ReportSettings) -> Result<(), String> {
    // 1. Validate against a copy before anything is stored
    let mut next = state.config();
    next.report_api_url = Some(settings.report_api_url.trim().to_string()).filter(|s| !s.is_empty());
    next.report_api_key = Some(settings.report_api_key.trim().to_string()).filter(|s| !s.is_empty());
    next.day_boundary_hour = crate::core::shift::ShiftWindow::new(settings.day_boundary_hour)
        .map_err(|e| e.to_string())?
        .boundary()
        .value();
    if settings.report_timeout_secs == 0 {
        return Err("Report timeout must be greater than zero".to_string());
    }
    next.report_timeout_secs = settings.report_timeout_secs;
    next.report_client().map_err(|e| e.to_string())?;

    // 2. Persist
    let pool = &state.pool;
    db::save_setting(pool, config::REPORT_API_URL, next.report_api_url.as_deref().unwrap_or(""))
        .await
        .map_err(|e| e.to_string())?;
    db::save_setting(pool, config::REPORT_API_KEY, next.report_api_key.as_deref().unwrap_or(""))
        .await
        .map_err(|e| e.to_string())?;
    db::save_setting(pool, config::DAY_BOUNDARY_HOUR, &next.day_boundary_hour.to_string())
        .await
        .map_err(|e| e.to_string())?;
    db::save_setting(pool, config::REPORT_TIMEOUT_SECS, &next.report_timeout_secs.to_string())
        .await
        .map_err(|e| e.to_string())?;

    // 3. Apply
    state.replace_config(next);
    Ok(())
}
