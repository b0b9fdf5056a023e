use anyhow::anyhow;
use clap::Parser;
use shiftboard_lib::config::AppConfig;
use shiftboard_lib::core::orchestrator;
use shiftboard_lib::db;
use shiftboard_lib::models::DateKey;
use shiftboard_lib::report::{ReportKind, ReportRequest};
use std::path::PathBuf;

/// Triggers one report against the configured report service and records the run.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long)]
    site: String,
    /// audit, shift, progressive, stockpile or requery
    #[arg(long)]
    kind: ReportKind,
    #[arg(long)]
    start: DateKey,
    /// Defaults to --start
    #[arg(long)]
    end: Option<DateKey>,
    /// Limit a requery to these ICCIDs
    #[arg(long)]
    iccid: Vec<String>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shiftboard_lib::init_logging();
    let args = Args::parse();
    let mut config = AppConfig::from_env()?;

    let data_dir = args
        .data_dir
        .clone()
        .or(config.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from("./data"));
    let pool = db::init(&data_dir).await?;
    config.apply_settings(&pool).await?;

    let client = config
        .report_client()?
        .ok_or_else(|| anyhow!("REPORT_API_URL is not set"))?;

    let request = ReportRequest {
        kind: args.kind,
        site_id: args.site,
        start_date: args.start,
        end_date: args.end.unwrap_or(args.start),
        iccids: args.iccid,
    };

    let outcome = orchestrator::run_report(&pool, &client, &request).await?;
    println!(
        "Run #{}: {} ({} runtime samples saved){}",
        outcome.run_id,
        outcome.status,
        outcome.samples_saved,
        outcome.message.map(|m| format!(" - {}", m)).unwrap_or_default()
    );
    Ok(())
}
