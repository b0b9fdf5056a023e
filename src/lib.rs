pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod models;
pub mod report;

#[cfg(feature = "desktop")]
pub mod commands;

use tracing_subscriber::EnvFilter;

/// Installs the `tracing` subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tokio_cron_scheduler=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;
    use tauri::menu::{Menu, MenuItem};
    use tauri::tray::{MouseButton, TrayIconBuilder, TrayIconEvent};
    use tauri::Manager;
    use tracing::{error, info, warn};
    use crate::commands::AppState;
    use crate::config::AppConfig;
    use crate::core::alerts::StatusSink;

    init_logging();

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_notification::init())
        .setup(|app| {
            let app_handle = app.handle().clone();

            // 1. Configuration (.env first, stored settings applied once the DB is up)
            let mut config = AppConfig::from_env()?;
            let data_dir = match &config.data_dir {
                Some(dir) => dir.clone(),
                None => app_handle
                    .path()
                    .app_data_dir()
                    .unwrap_or_else(|_| std::path::PathBuf::from("./data")),
            };
            std::fs::create_dir_all(&data_dir)?;

            // 2. Database + scheduler
            tauri::async_runtime::block_on(async {
                let pool = crate::db::init(&data_dir).await?;
                if let Err(e) = config.apply_settings(&pool).await {
                    warn!(error = %e, "Could not read stored settings");
                }

                let state = AppState::new(pool.clone(), config.clone());
                match state.backend() {
                    Some(backend) => {
                        let sink: Arc<dyn StatusSink> = Arc::new(app_handle.clone());
                        match crate::core::scheduler::init(pool, backend, sink, config.window()).await {
                            Ok(sched) => {
                                app_handle.manage(sched);
                            }
                            Err(e) => error!(error = %e, "Failed to init scheduler"),
                        }
                    }
                    None => info!("No report service configured, scheduled reports disabled"),
                }

                app_handle.manage(state);
                Ok::<_, anyhow::Error>(())
            })?;

            // 3. System tray
            let quit_i = MenuItem::with_id(&app_handle, "quit", "Quit", true, None::<&str>)?;
            let show_i = MenuItem::with_id(&app_handle, "show", "Show", true, None::<&str>)?;
            let menu = Menu::with_items(&app_handle, &[&show_i, &quit_i])?;

            let mut tray = TrayIconBuilder::with_id("tray")
                .menu(&menu)
                .on_menu_event(|app, event| match event.id.as_ref() {
                    "quit" => app.exit(0),
                    "show" => {
                        if let Some(window) = app.get_webview_window("main") {
                            let _ = window.show();
                            let _ = window.set_focus();
                        }
                    }
                    _ => {}
                })
                .on_tray_icon_event(|tray, event| {
                    if let TrayIconEvent::Click { button: MouseButton::Left, .. } = event {
                        if let Some(window) = tray.app_handle().get_webview_window("main") {
                            let _ = window.show();
                            let _ = window.set_focus();
                        }
                    }
                });
            if let Some(icon) = app_handle.default_window_icon() {
                tray = tray.icon(icon.clone());
            }
            tray.build(&app_handle)?;

            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::CloseRequested { api, .. } = event {
                let _ = window.hide();
                api.prevent_close();
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::sites::list_sites,
            commands::sites::get_site,
            commands::sites::save_site,
            commands::sites::delete_site,
            commands::sites::get_report_settings,
            commands::sites::save_report_settings,
            commands::grid::select_range,
            commands::grid::load_iccids,
            commands::grid::get_grid,
            commands::grid::dispatch_grid_command,
            commands::grid::calculate,
            commands::grid::calculate_all,
            commands::grid::get_totals,
            commands::grid::save_iccid,
            commands::grid::save_all,
            commands::grid::export_csv,
            commands::reports::trigger_report,
            commands::reports::get_report_runs,
        ])
        .run(tauri::generate_context!())
        .unwrap_or_else(|e| error!(error = %e, "error while running tauri application"));
}
