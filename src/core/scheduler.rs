use anyhow::Result;
use chrono::{Local, NaiveDateTime, Timelike};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use crate::core::alerts::{StatusMessage, StatusSink};
use crate::core::orchestrator;
use crate::core::shift::ShiftWindow;
use crate::db;
use crate::error::ShiftboardError;
use crate::models::{DateKey, Site};
use crate::report::{ReportBackend, ReportKind, ReportRequest};

/// Turns a site's "HH:MM" into a six-field cron expression firing daily.
pub fn cron_for_time(time: &str) -> Result<String, ShiftboardError> {
    let invalid = || ShiftboardError::InvalidScheduleTime(time.to_string());

    let (hh, mm) = time.trim().split_once(':').ok_or_else(invalid)?;
    if hh.is_empty() || hh.len() > 2 || mm.len() != 2 {
        return Err(invalid());
    }
    if !hh.chars().chain(mm.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hour: u32 = hh.parse().map_err(|_| invalid())?;
    let minute: u32 = mm.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }

    Ok(format!("0 {} {} * * *", minute, hour))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledReport {
    pub site_id: String,
    pub kind: ReportKind,
    pub time: String,
    pub cron: String,
}

impl ScheduledReport {
    /// Every scheduled report covers the last completed reporting day.
    pub fn request_at(&self, now: NaiveDateTime, window: &ShiftWindow) -> ReportRequest {
        let current = window.reporting_day(now.date(), now.hour() as u8);
        let day = DateKey::new(current).previous_day().unwrap_or(DateKey::new(current));
        ReportRequest {
            kind: self.kind,
            site_id: self.site_id.clone(),
            start_date: day,
            end_date: day,
            iccids: Vec::new(),
        }
    }
}

/// Jobs for every schedule entry of every site. Bad times are logged and skipped.
pub fn plan_jobs(sites: &[Site]) -> Vec<ScheduledReport> {
    let mut jobs = Vec::new();

    for site in sites {
        let entries = site
            .schedule
            .shift_report_times
            .iter()
            .map(|t| (ReportKind::Shift, t))
            .chain(site.schedule.audit_report_time.iter().map(|t| (ReportKind::Audit, t)))
            .chain(site.schedule.stockpile_report_time.iter().map(|t| (ReportKind::Stockpile, t)));

        for (kind, time) in entries {
            match cron_for_time(time) {
                Ok(cron) => jobs.push(ScheduledReport {
                    site_id: site.id.clone(),
                    kind,
                    time: time.clone(),
                    cron,
                }),
                Err(e) => warn!(site = %site.id, kind = kind.as_str(), error = %e, "Skipping schedule entry"),
            }
        }
    }

    jobs
}

async fn load_sites(pool: &SqlitePool) -> Result<Vec<Site>> {
    let mut sites = Vec::new();
    for summary in db::list_sites(pool).await? {
        match db::get_site(pool, &summary.id).await {
            Ok(Some(site)) => sites.push(site),
            Ok(None) => {}
            Err(e) => warn!(site = %summary.id, error = %e, "Skipping unreadable site"),
        }
    }
    Ok(sites)
}

pub async fn run_scheduled(
    pool: &SqlitePool,
    backend: &dyn ReportBackend,
    sink: &dyn StatusSink,
    job: &ScheduledReport,
    window: &ShiftWindow,
) {
    let request = job.request_at(Local::now().naive_local(), window);
    let title = format!("{} report ({})", job.kind.as_str(), job.site_id);

    match orchestrator::run_report(pool, backend, &request).await {
        Ok(outcome) => {
            let body = outcome
                .message
                .unwrap_or_else(|| format!("{} for {}", outcome.status, request.start_date));
            sink.publish(StatusMessage::success(title, body));
        }
        Err(e) => sink.publish(StatusMessage::error(title, e.to_string())),
    }
}

/// Starts a scheduler with one daily job per site schedule entry.
/// Times are the operator's local wall clock.
pub async fn init(
    pool: SqlitePool,
    backend: Arc<dyn ReportBackend>,
    sink: Arc<dyn StatusSink>,
    window: ShiftWindow,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await?;

    let sites = load_sites(&pool).await?;
    let jobs = plan_jobs(&sites);

    for job in jobs.iter().cloned() {
        let pool = pool.clone();
        let backend = backend.clone();
        let sink = sink.clone();
        let cron = job.cron.clone();

        sched
            .add(Job::new_async_tz(cron.as_str(), Local, move |_uuid, _l| {
                let pool = pool.clone();
                let backend = backend.clone();
                let sink = sink.clone();
                let job = job.clone();
                Box::pin(async move {
                    info!(site = %job.site_id, kind = job.kind.as_str(), time = %job.time, "Running scheduled report");
                    run_scheduled(&pool, backend.as_ref(), sink.as_ref(), &job, &window).await;
                })
            })?)
            .await?;
    }

    sched.start().await?;
    info!(sites = sites.len(), jobs = jobs.len(), "Report scheduler started");
    Ok(sched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleTimes;

    #[test]
    fn test_cron_for_time() {
        assert_eq!(cron_for_time("06:00").unwrap(), "0 0 6 * * *");
        assert_eq!(cron_for_time("18:30").unwrap(), "0 30 18 * * *");
        assert_eq!(cron_for_time("7:05").unwrap(), "0 5 7 * * *");
        assert_eq!(cron_for_time(" 00:59 ").unwrap(), "0 59 0 * * *");

        for bad in ["24:00", "12:60", "1200", "12:5", "ab:cd", "", ":30", "-1:30"] {
            assert!(
                matches!(cron_for_time(bad), Err(ShiftboardError::InvalidScheduleTime(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_plan_jobs_skips_bad_times() {
        let site = Site {
            id: "north".into(),
            name: "North Pit".into(),
            schedule: ScheduleTimes {
                shift_report_times: vec!["06:00".into(), "nope".into(), "18:00".into()],
                audit_report_time: Some("07:15".into()),
                stockpile_report_time: None,
            },
            ..Site::default()
        };

        let jobs = plan_jobs(&[site]);
        let kinds: Vec<_> = jobs.iter().map(|j| (j.kind, j.cron.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ReportKind::Shift, "0 0 6 * * *"),
                (ReportKind::Shift, "0 0 18 * * *"),
                (ReportKind::Audit, "0 15 7 * * *"),
            ]
        );
    }

    #[test]
    fn test_request_covers_previous_reporting_day() {
        let job = ScheduledReport {
            site_id: "north".into(),
            kind: ReportKind::Shift,
            time: "06:00".into(),
            cron: "0 0 6 * * *".into(),
        };
        let window = ShiftWindow::default();

        // 06:00 on the 2nd: reporting day of the 2nd just began, the 1st is complete
        let now = "2024-01-02T06:00:00".parse::<NaiveDateTime>().unwrap();
        let req = job.request_at(now, &window);
        assert_eq!(req.start_date.to_string(), "2024-01-01");
        assert_eq!(req.end_date, req.start_date);

        // 02:00 on the 2nd still belongs to the 1st, so the 31st is the last complete day
        let now = "2024-01-02T02:00:00".parse::<NaiveDateTime>().unwrap();
        assert_eq!(job.request_at(now, &window).start_date.to_string(), "2023-12-31");
    }
}
