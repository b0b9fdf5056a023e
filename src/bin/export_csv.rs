use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use shiftboard_lib::config::AppConfig;
use shiftboard_lib::core::export::{self, ExportMode};
use shiftboard_lib::core::orchestrator;
use shiftboard_lib::core::session::{EditorSession, SiteSelection};
use shiftboard_lib::db;
use shiftboard_lib::models::DateKey;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Hourly,
    All,
}

/// Exports stored grids and purple figures as CSV.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long)]
    site: String,
    #[arg(long)]
    start: DateKey,
    #[arg(long)]
    end: DateKey,
    /// Required for hourly mode
    #[arg(long)]
    iccid: Option<String>,
    #[arg(long, value_enum, default_value = "all")]
    mode: Mode,
    /// Recompute purple figures from runtime and inputs instead of using the stored ones
    #[arg(long)]
    recalculate: bool,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Write here instead of stdout
    #[arg(long, short)]
    out: Option<PathBuf>,
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

    // 1. Open a session over the range
    let selection = SiteSelection { site_id: args.site.clone(), start: args.start, end: args.end };
    let mut session = EditorSession::new(selection, config.window())?;

    // 2. Load the ICCIDs the export needs
    let iccids = match (&args.mode, &args.iccid) {
        (Mode::Hourly, Some(iccid)) => vec![iccid.clone()],
        (Mode::Hourly, None) => return Err(anyhow!("--iccid is required for hourly mode")),
        (Mode::All, _) => orchestrator::site_iccids(&pool, &args.site, args.start, args.end).await?,
    };
    for iccid in &iccids {
        let grids = orchestrator::load_iccid(&pool, &args.site, iccid, args.start, args.end).await?;
        session.load_iccid(iccid, grids.runtime, grids.inputs, grids.calculated);
    }
    if args.recalculate {
        session.calculate_all()?;
    }

    // 3. Render
    let mode = match args.mode {
        Mode::Hourly => ExportMode::Hourly,
        Mode::All => ExportMode::AllIccids,
    };
    let csv = export::export_session(&session, mode, args.iccid.as_deref())?;

    match args.out {
        Some(path) => {
            std::fs::write(&path, csv)?;
            eprintln!("Wrote {:?}", path);
        }
        None => print!("{}", csv),
    }
    Ok(())
}
