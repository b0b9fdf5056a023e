use clap::Parser;
use shiftboard_lib::config::AppConfig;
use shiftboard_lib::db;
use sqlx::Row;
use std::path::PathBuf;

/// Prints what the local database holds per site.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory holding shiftboard.db (defaults to SHIFTBOARD_DATA_DIR or ./data)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of report runs to show per site
    #[arg(long, default_value_t = 5)]
    runs: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shiftboard_lib::init_logging();
    let args = Args::parse();
    let config = AppConfig::from_env()?;

    let data_dir = args
        .data_dir
        .or(config.data_dir)
        .unwrap_or_else(|| PathBuf::from("./data"));
    if !data_dir.join("shiftboard.db").exists() {
        println!("No database found in {:?}", data_dir);
        return Ok(());
    }
    let pool = db::init(&data_dir).await?;

    let sites = db::list_sites(&pool).await?;
    println!("{} site(s) in {:?}", sites.len(), data_dir);

    for summary in sites {
        println!();
        println!("== {} ({}) ==", summary.name, summary.id);
        let site = db::get_site(&pool, &summary.id).await.ok().flatten();

        let rows = sqlx::query(
            r#"
            SELECT iccid, COUNT(*) as samples, MIN(date) as first_date, MAX(date) as last_date
            FROM runtime_samples
            WHERE site_id = $1
            GROUP BY iccid
            ORDER BY iccid
            "#,
        )
        .bind(&summary.id)
        .fetch_all(&pool)
        .await?;

        println!("{:<24} | {:<16} | {:<8} | {:<10} | {:<10}", "ICCID", "Scale", "Samples", "First", "Last");
        println!("{}", "-".repeat(81));
        for row in rows {
            let iccid: String = row.try_get("iccid").unwrap_or_default();
            let count: i64 = row.try_get("samples").unwrap_or(0);
            let first: Option<String> = row.try_get("first_date").ok().flatten();
            let last: Option<String> = row.try_get("last_date").ok().flatten();
            let scale = match site.as_ref().and_then(|s| s.scale(&iccid)) {
                Some(scale) if scale.active => scale.name.clone(),
                Some(scale) => format!("{} (inactive)", scale.name),
                None => "-".to_string(),
            };
            println!(
                "{:<24} | {:<16} | {:<8} | {:<10} | {:<10}",
                iccid,
                scale,
                count,
                first.unwrap_or_else(|| "-".into()),
                last.unwrap_or_else(|| "-".into())
            );
        }

        let runs = db::get_report_runs(&pool, &summary.id, args.runs).await?;
        if !runs.is_empty() {
            println!("Recent reports:");
            for run in runs {
                println!(
                    "  #{:<5} {:<12} {:<8} {} {}",
                    run.id,
                    run.kind,
                    run.status,
                    run.requested_at.format("%Y-%m-%d %H:%M"),
                    run.message.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
