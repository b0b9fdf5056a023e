use shiftboard_lib::core::orchestrator::{self, SaveGuard};
use shiftboard_lib::core::session::{EditorSession, SiteSelection};
use shiftboard_lib::core::shift::ShiftWindow;
use shiftboard_lib::db;
use shiftboard_lib::models::{DateKey, HourKey, RuntimeSample, Scale, Site};
use sqlx::SqlitePool;

async fn pool() -> SqlitePool {
    db::connect("sqlite::memory:", 1).await.expect("in-memory database")
}

fn d(s: &str) -> DateKey {
    s.parse().unwrap()
}

fn h(s: &str) -> HourKey {
    s.parse().unwrap()
}

fn site() -> Site {
    Site {
        id: "north".into(),
        name: "North Pit".into(),
        scales: vec![
            Scale { iccid: "8901".into(), name: "Crusher".into(), product: None, active: true },
            Scale { iccid: "8903".into(), name: "Spare".into(), product: None, active: false },
        ],
        ..Site::default()
    }
}

fn sample(iccid: &str, date: &str, hour: &str, delta: f64) -> RuntimeSample {
    RuntimeSample { iccid: iccid.into(), date: d(date), hour: h(hour), delta }
}

#[tokio::test]
async fn site_document_round_trips() {
    let pool = pool().await;
    let site = site();
    db::save_site(&pool, &site).await.unwrap();

    let loaded = db::get_site(&pool, "north").await.unwrap().unwrap();
    assert_eq!(loaded, site);
    assert!(db::get_site(&pool, "south").await.unwrap().is_none());

    let mut renamed = site.clone();
    renamed.name = "North Pit 2".into();
    db::save_site(&pool, &renamed).await.unwrap();

    let summaries = db::list_sites(&pool).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "North Pit 2");
}

#[tokio::test]
async fn runtime_samples_upsert_by_hour() {
    let pool = pool().await;
    let samples = vec![
        sample("8901", "2024-01-01", "06", 2.0),
        sample("8901", "2024-01-02", "02", 5.0),
        sample("8902", "2024-01-05", "10", 1.0),
    ];
    assert_eq!(db::save_runtime_samples(&pool, "north", &samples).await.unwrap(), 3);
    db::save_runtime_samples(&pool, "north", &[sample("8901", "2024-01-01", "06", 2.5)]).await.unwrap();

    let grid = db::get_runtime_grid(&pool, "north", "8901", d("2024-01-01"), d("2024-01-02")).await.unwrap();
    assert_eq!(grid[&d("2024-01-01")][&h("06")], 2.5);
    assert_eq!(grid[&d("2024-01-02")][&h("02")], 5.0);

    let iccids = db::list_runtime_iccids(&pool, "north", d("2024-01-01"), d("2024-01-02")).await.unwrap();
    assert_eq!(iccids, vec!["8901".to_string()]);
}

#[tokio::test]
async fn save_then_load_restores_session() {
    let pool = pool().await;
    db::save_site(&pool, &site()).await.unwrap();
    db::save_runtime_samples(
        &pool,
        "north",
        &[sample("8901", "2024-01-01", "06", 2.0), sample("8901", "2024-01-02", "02", 5.0)],
    )
    .await
    .unwrap();

    let selection = SiteSelection { site_id: "north".into(), start: d("2024-01-01"), end: d("2024-01-02") };
    let window = ShiftWindow::default();
    let mut session = EditorSession::new(selection.clone(), window).unwrap();

    let iccids = orchestrator::site_iccids(&pool, "north", d("2024-01-01"), d("2024-01-02")).await.unwrap();
    assert_eq!(iccids, vec!["8901".to_string()]);

    let grids = orchestrator::load_iccid(&pool, "north", "8901", d("2024-01-01"), d("2024-01-02")).await.unwrap();
    session.load_iccid("8901", grids.runtime, grids.inputs, grids.calculated);

    use shiftboard_lib::core::grid::{CellRef, GridCommand};
    session
        .dispatch("8901", GridCommand::EditCell { cell: CellRef::new(d("2024-01-01"), h("06")), text: "3".into() })
        .unwrap();
    session
        .dispatch("8901", GridCommand::EditCell { cell: CellRef::new(d("2024-01-02"), h("02")), text: "2".into() })
        .unwrap();
    session.calculate("8901").unwrap();

    let guard = SaveGuard::new();
    let snapshot = session.save_snapshot("8901").unwrap();
    let totals = orchestrator::save_iccid(&pool, &guard, &window, &snapshot).await.unwrap();
    assert_eq!(totals[&d("2024-01-01")], 16.0);
    assert_eq!(totals[&d("2024-01-02")], 0.0);

    // Saving the same snapshot again is harmless
    orchestrator::save_iccid(&pool, &guard, &window, &snapshot).await.unwrap();
    assert!(!guard.is_saving("north", "8901"));

    let reloaded = orchestrator::load_iccid(&pool, "north", "8901", d("2024-01-01"), d("2024-01-02")).await.unwrap();
    assert_eq!(reloaded.inputs, snapshot.inputs);
    assert_eq!(reloaded.calculated, snapshot.calculated);

    let mut fresh = EditorSession::new(selection, window).unwrap();
    fresh.load_iccid("8901", reloaded.runtime, reloaded.inputs, reloaded.calculated);
    assert_eq!(fresh.progressive_total("8901").unwrap(), 16.0);
}

#[tokio::test]
async fn cleared_inputs_overwrite_stored_rows() {
    let pool = pool().await;
    let selection = SiteSelection { site_id: "north".into(), start: d("2024-01-01"), end: d("2024-01-01") };
    let window = ShiftWindow::default();
    let guard = SaveGuard::new();

    let mut session = EditorSession::new(selection, window).unwrap();
    session.load_iccid("8901", Default::default(), Default::default(), Default::default());

    use shiftboard_lib::core::grid::{CellRef, GridCommand};
    session
        .dispatch("8901", GridCommand::EditCell { cell: CellRef::new(d("2024-01-01"), h("08")), text: "4".into() })
        .unwrap();
    orchestrator::save_iccid(&pool, &guard, &window, &session.save_snapshot("8901").unwrap()).await.unwrap();

    session.dispatch("8901", GridCommand::ClearAll).unwrap();
    orchestrator::save_iccid(&pool, &guard, &window, &session.save_snapshot("8901").unwrap()).await.unwrap();

    let inputs = db::get_input_grid(&pool, "north", "8901", d("2024-01-01"), d("2024-01-01")).await.unwrap();
    assert!(inputs.is_empty());
}

#[tokio::test]
async fn save_is_rejected_while_in_flight() {
    let pool = pool().await;
    let window = ShiftWindow::default();
    let selection = SiteSelection { site_id: "north".into(), start: d("2024-01-01"), end: d("2024-01-01") };
    let mut session = EditorSession::new(selection, window).unwrap();
    session.load_iccid("8901", Default::default(), Default::default(), Default::default());
    let snapshot = session.save_snapshot("8901").unwrap();

    let guard = SaveGuard::new();
    let _held = guard.try_acquire("north", "8901").unwrap();
    let err = orchestrator::save_iccid(&pool, &guard, &window, &snapshot).await.unwrap_err();
    assert!(err.to_string().contains("already in flight"));
}

#[tokio::test]
async fn delete_site_removes_its_rows() {
    let pool = pool().await;
    db::save_site(&pool, &site()).await.unwrap();
    db::save_runtime_samples(&pool, "north", &[sample("8901", "2024-01-01", "06", 2.0)]).await.unwrap();

    assert!(db::delete_site(&pool, "north").await.unwrap());
    assert!(!db::delete_site(&pool, "north").await.unwrap());
    let grid = db::get_runtime_grid(&pool, "north", "8901", d("2024-01-01"), d("2024-01-01")).await.unwrap();
    assert!(grid.is_empty());
}

#[tokio::test]
async fn settings_override_environment() {
    use shiftboard_lib::config::{self, AppConfig};

    let pool = pool().await;
    assert_eq!(db::get_setting(&pool, config::REPORT_API_URL).await.unwrap(), "");

    db::save_setting(&pool, config::REPORT_API_URL, "https://stored.example.com").await.unwrap();
    db::save_setting(&pool, config::DAY_BOUNDARY_HOUR, "7").await.unwrap();
    db::save_setting(&pool, config::REPORT_TIMEOUT_SECS, "abc").await.unwrap();

    let mut cfg = AppConfig::from_lookup(|key| match key {
        "REPORT_API_URL" => Some("https://env.example.com".into()),
        "REPORT_TIMEOUT_SECS" => Some("12".into()),
        _ => None,
    })
    .unwrap();
    cfg.apply_settings(&pool).await.unwrap();

    assert_eq!(cfg.report_api_url.as_deref(), Some("https://stored.example.com"));
    assert_eq!(cfg.day_boundary_hour, 7);
    // unreadable stored value leaves the environment's
    assert_eq!(cfg.report_timeout_secs, 12);
}
