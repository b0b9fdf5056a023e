use sqlx::SqlitePool;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::warn;
use crate::config::AppConfig;
use crate::core::orchestrator::SaveGuard;
use crate::core::session::EditorSession;
use crate::report::ReportBackend;

pub mod grid;
pub mod reports;
pub mod sites;

/// Shared state behind every command.
///
/// The session mutex is only ever held for synchronous work. Commands copy
/// what they need out of it before awaiting the store or the report service.
pub struct AppState {
    pub pool: SqlitePool,
    pub config: RwLock<AppConfig>,
    pub session: Mutex<Option<EditorSession>>,
    pub save_guard: SaveGuard,
    backend: RwLock<Option<Arc<dyn ReportBackend>>>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let state = AppState {
            pool,
            config: RwLock::new(AppConfig::default()),
            session: Mutex::new(None),
            save_guard: SaveGuard::new(),
            backend: RwLock::new(None),
        };
        state.replace_config(config);
        state
    }

    pub fn session(&self) -> MutexGuard<'_, Option<EditorSession>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn backend(&self) -> Option<Arc<dyn ReportBackend>> {
        self.backend.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Swaps the configuration and rebuilds the report client from it.
    pub fn replace_config(&self, config: AppConfig) {
        let backend: Option<Arc<dyn ReportBackend>> = match config.report_client() {
            Ok(Some(client)) => Some(Arc::new(client)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Report client could not be built");
                None
            }
        };
        *self.backend.write().unwrap_or_else(|e| e.into_inner()) = backend;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }
}
