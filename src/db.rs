use sqlx::sqlite::{SqlitePoolOptions, SqlitePool};
use sqlx::Row;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use crate::core::session::SaveSnapshot;
use crate::models::{
    CalculatedGrid, DateKey, HourKey, InputGrid, ReportRun, RuntimeGrid, RuntimeSample, Site, SiteSummary,
};

pub async fn init(data_dir: &Path) -> Result<SqlitePool> {
    let db_path = data_dir.join("shiftboard.db");
    let database_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
    connect(&database_url, 5).await
}

/// Opens a pool and runs the embedded migrations.
/// `sqlite::memory:` needs `max_connections = 1`, each connection is its own database.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    info!(url = %database_url, "Connecting to SQLite database");

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!("Running migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

// =====================================================================
// SITES
// =====================================================================

pub async fn save_site(pool: &SqlitePool, site: &Site) -> Result<()> {
    let data = site.to_json()?;
    sqlx::query(
        "INSERT INTO sites (id, name, data) VALUES ($1, $2, $3)
         ON CONFLICT (id) DO UPDATE
         SET name = EXCLUDED.name, data = EXCLUDED.data, updated_at = CURRENT_TIMESTAMP"
    )
    .bind(&site.id)
    .bind(&site.name)
    .bind(data)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_site(pool: &SqlitePool, site_id: &str) -> Result<Option<Site>> {
    let row = sqlx::query("SELECT data FROM sites WHERE id = $1")
        .bind(site_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(record) => {
            let data: String = record.try_get("data")?;
            Ok(Some(Site::from_json(&data)?))
        }
        None => Ok(None),
    }
}

pub async fn list_sites(pool: &SqlitePool) -> Result<Vec<SiteSummary>> {
    sqlx::query_as::<_, SiteSummary>(
        "SELECT id, name, updated_at FROM sites ORDER BY name"
    )
    .fetch_all(pool)
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

/// Deletes a site and every grid row recorded under it.
pub async fn delete_site(pool: &SqlitePool, site_id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    for table in ["runtime_samples", "input_values", "purple_figures"] {
        sqlx::query(&format!("DELETE FROM {} WHERE site_id = $1", table))
            .bind(site_id)
            .execute(&mut *tx)
            .await?;
    }

    let deleted = sqlx::query("DELETE FROM sites WHERE id = $1")
        .bind(site_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(deleted > 0)
}

// =====================================================================
// RUNTIME SAMPLES
// =====================================================================

pub async fn save_runtime_samples(pool: &SqlitePool, site_id: &str, samples: &[RuntimeSample]) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for sample in samples {
        sqlx::query(
            "INSERT INTO runtime_samples (site_id, iccid, date, hour, delta)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (site_id, iccid, date, hour) DO UPDATE
             SET delta = EXCLUDED.delta, updated_at = CURRENT_TIMESTAMP"
        )
        .bind(site_id)
        .bind(&sample.iccid)
        .bind(sample.date.to_string())
        .bind(sample.hour.to_string())
        .bind(sample.delta)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(samples.len())
}

/// Runtime grid of one ICCID for `start..=end`.
pub async fn get_runtime_grid(
    pool: &SqlitePool,
    site_id: &str,
    iccid: &str,
    start: DateKey,
    end: DateKey,
) -> Result<RuntimeGrid> {
    let rows = sqlx::query(
        "SELECT date, hour, delta FROM runtime_samples
         WHERE site_id = $1 AND iccid = $2 AND date >= $3 AND date <= $4
         ORDER BY date, hour"
    )
    .bind(site_id)
    .bind(iccid)
    .bind(start.to_string())
    .bind(end.to_string())
    .fetch_all(pool)
    .await?;

    let mut grid = RuntimeGrid::new();
    for row in rows {
        let date: String = row.try_get("date")?;
        let hour: String = row.try_get("hour")?;
        let delta: f64 = row.try_get("delta")?;
        match (date.parse::<DateKey>(), hour.parse::<HourKey>()) {
            (Ok(date), Ok(hour)) => {
                grid.entry(date).or_default().insert(hour, delta);
            }
            _ => warn!(%site_id, %iccid, %date, %hour, "Skipping runtime sample with malformed key"),
        }
    }
    Ok(grid)
}

/// ICCIDs that have runtime data in `start..=end`.
pub async fn list_runtime_iccids(pool: &SqlitePool, site_id: &str, start: DateKey, end: DateKey) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT DISTINCT iccid FROM runtime_samples
         WHERE site_id = $1 AND date >= $2 AND date <= $3
         ORDER BY iccid"
    )
    .bind(site_id)
    .bind(start.to_string())
    .bind(end.to_string())
    .fetch_all(pool)
    .await?;

    let mut iccids = Vec::with_capacity(rows.len());
    for row in rows {
        iccids.push(row.try_get("iccid")?);
    }
    Ok(iccids)
}

// =====================================================================
// INPUT VALUES / PURPLE FIGURES
// =====================================================================

/// Writes one ICCID's inputs and purple figures for every date of the
/// snapshot in a single transaction. Rows are upserted by
/// (site, iccid, date), so repeating a save is harmless.
pub async fn save_grids(
    pool: &SqlitePool,
    snapshot: &SaveSnapshot,
    day_totals: &BTreeMap<DateKey, f64>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for date in &snapshot.dates {
        let inputs = snapshot.inputs.get(date).cloned().unwrap_or_default();
        let figures = snapshot.calculated.get(date).cloned().unwrap_or_default();
        let day_total = day_totals.get(date).copied().unwrap_or(0.0);

        sqlx::query(
            "INSERT INTO input_values (site_id, iccid, date, hours)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (site_id, iccid, date) DO UPDATE
             SET hours = EXCLUDED.hours, updated_at = CURRENT_TIMESTAMP"
        )
        .bind(&snapshot.site_id)
        .bind(&snapshot.iccid)
        .bind(date.to_string())
        .bind(serde_json::to_string(&inputs)?)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO purple_figures (site_id, iccid, date, hours, day_total)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (site_id, iccid, date) DO UPDATE
             SET hours = EXCLUDED.hours, day_total = EXCLUDED.day_total, updated_at = CURRENT_TIMESTAMP"
        )
        .bind(&snapshot.site_id)
        .bind(&snapshot.iccid)
        .bind(date.to_string())
        .bind(serde_json::to_string(&figures)?)
        .bind(day_total)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn get_hour_documents(
    pool: &SqlitePool,
    table: &str,
    site_id: &str,
    iccid: &str,
    start: DateKey,
    end: DateKey,
) -> Result<Vec<(DateKey, String)>> {
    let rows = sqlx::query(&format!(
        "SELECT date, hours FROM {}
         WHERE site_id = $1 AND iccid = $2 AND date >= $3 AND date <= $4
         ORDER BY date",
        table
    ))
    .bind(site_id)
    .bind(iccid)
    .bind(start.to_string())
    .bind(end.to_string())
    .fetch_all(pool)
    .await?;

    let mut docs = Vec::with_capacity(rows.len());
    for row in rows {
        let date: String = row.try_get("date")?;
        let hours: String = row.try_get("hours")?;
        match date.parse::<DateKey>() {
            Ok(date) => docs.push((date, hours)),
            Err(_) => warn!(%table, %site_id, %iccid, %date, "Skipping row with malformed date"),
        }
    }
    Ok(docs)
}

pub async fn get_input_grid(
    pool: &SqlitePool,
    site_id: &str,
    iccid: &str,
    start: DateKey,
    end: DateKey,
) -> Result<InputGrid> {
    let mut grid = InputGrid::new();
    for (date, hours) in get_hour_documents(pool, "input_values", site_id, iccid, start, end).await? {
        match serde_json::from_str::<BTreeMap<HourKey, String>>(&hours) {
            Ok(row) if !row.is_empty() => {
                grid.insert(date, row);
            }
            Ok(_) => {}
            Err(e) => warn!(%site_id, %iccid, %date, error = %e, "Skipping unreadable input row"),
        }
    }
    Ok(grid)
}

pub async fn get_calculated_grid(
    pool: &SqlitePool,
    site_id: &str,
    iccid: &str,
    start: DateKey,
    end: DateKey,
) -> Result<CalculatedGrid> {
    let mut grid = CalculatedGrid::new();
    for (date, hours) in get_hour_documents(pool, "purple_figures", site_id, iccid, start, end).await? {
        match serde_json::from_str::<BTreeMap<HourKey, f64>>(&hours) {
            Ok(row) if !row.is_empty() => {
                grid.insert(date, row);
            }
            Ok(_) => {}
            Err(e) => warn!(%site_id, %iccid, %date, error = %e, "Skipping unreadable purple figure row"),
        }
    }
    Ok(grid)
}

// =====================================================================
// REPORT RUNS
// =====================================================================

pub async fn record_report_run(
    pool: &SqlitePool,
    site_id: &str,
    kind: &str,
    status: &str,
    message: Option<&str>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO report_runs (site_id, kind, requested_at, status, message)
         VALUES ($1, $2, $3, $4, $5) RETURNING id"
    )
    .bind(site_id)
    .bind(kind)
    .bind(chrono::Utc::now())
    .bind(status)
    .bind(message)
    .fetch_one(pool)
    .await?;

    let id: i64 = rec.try_get("id")?;
    Ok(id)
}

pub async fn get_report_runs(pool: &SqlitePool, site_id: &str, limit: i64) -> Result<Vec<ReportRun>> {
    sqlx::query_as::<_, ReportRun>(
        r#"
        SELECT id, site_id, kind, requested_at, status, message
        FROM report_runs
        WHERE site_id = $1
        ORDER BY requested_at DESC, id DESC
        LIMIT $2
        "#
    )
    .bind(site_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

// =====================================================================
// SETTINGS
// =====================================================================

pub async fn save_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = CURRENT_TIMESTAMP"
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<String> {
    let row = sqlx::query("SELECT value FROM settings WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(record) => Ok(record.try_get("value").unwrap_or_default()),
        None => Ok("".to_string())
    }
}
