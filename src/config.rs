use anyhow::{Result, anyhow};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use crate::core::shift::ShiftWindow;
use crate::db;
use crate::report::http::HttpReportClient;

pub const REPORT_API_URL: &str = "REPORT_API_URL";
pub const REPORT_API_KEY: &str = "REPORT_API_KEY";
pub const DAY_BOUNDARY_HOUR: &str = "DAY_BOUNDARY_HOUR";
pub const REPORT_TIMEOUT_SECS: &str = "REPORT_TIMEOUT_SECS";
pub const DATA_DIR: &str = "SHIFTBOARD_DATA_DIR";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub report_api_url: Option<String>,
    pub report_api_key: Option<String>,
    pub day_boundary_hour: u8,
    pub report_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            report_api_url: None,
            report_api_key: None,
            day_boundary_hour: ShiftWindow::DEFAULT_BOUNDARY_HOUR,
            report_timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Reads the process environment after loading `.env` if there is one.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig {
            report_api_url: non_empty(lookup(REPORT_API_URL)),
            report_api_key: non_empty(lookup(REPORT_API_KEY)),
            data_dir: non_empty(lookup(DATA_DIR)).map(PathBuf::from),
            ..AppConfig::default()
        };

        if let Some(raw) = non_empty(lookup(DAY_BOUNDARY_HOUR)) {
            config.set_boundary(&raw)?;
        }
        if let Some(raw) = non_empty(lookup(REPORT_TIMEOUT_SECS)) {
            config.set_timeout(&raw)?;
        }

        Ok(config)
    }

    fn set_boundary(&mut self, raw: &str) -> Result<()> {
        let hour: u8 = raw
            .parse()
            .map_err(|_| anyhow!("{} must be an hour between 0 and 23, got '{}'", DAY_BOUNDARY_HOUR, raw))?;
        ShiftWindow::new(hour)?;
        self.day_boundary_hour = hour;
        Ok(())
    }

    fn set_timeout(&mut self, raw: &str) -> Result<()> {
        let secs: u64 = raw
            .parse()
            .map_err(|_| anyhow!("{} must be a number of seconds, got '{}'", REPORT_TIMEOUT_SECS, raw))?;
        if secs == 0 {
            return Err(anyhow!("{} must be greater than zero", REPORT_TIMEOUT_SECS));
        }
        self.report_timeout_secs = secs;
        Ok(())
    }

    /// Values saved from the settings screen win over the environment.
    /// A bad stored value is logged and skipped so the app still starts.
    pub async fn apply_settings(&mut self, pool: &SqlitePool) -> Result<()> {
        if let Some(url) = non_empty(Some(db::get_setting(pool, REPORT_API_URL).await?)) {
            self.report_api_url = Some(url);
        }
        if let Some(key) = non_empty(Some(db::get_setting(pool, REPORT_API_KEY).await?)) {
            self.report_api_key = Some(key);
        }
        if let Some(raw) = non_empty(Some(db::get_setting(pool, DAY_BOUNDARY_HOUR).await?)) {
            if let Err(e) = self.set_boundary(&raw) {
                warn!(error = %e, "Ignoring stored day boundary");
            }
        }
        if let Some(raw) = non_empty(Some(db::get_setting(pool, REPORT_TIMEOUT_SECS).await?)) {
            if let Err(e) = self.set_timeout(&raw) {
                warn!(error = %e, "Ignoring stored report timeout");
            }
        }
        Ok(())
    }

    pub fn window(&self) -> ShiftWindow {
        ShiftWindow::new(self.day_boundary_hour).unwrap_or_default()
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout_secs)
    }

    /// `None` when no report service is configured.
    pub fn report_client(&self) -> Result<Option<HttpReportClient>> {
        match &self.report_api_url {
            Some(url) => Ok(Some(HttpReportClient::new(
                url,
                self.report_api_key.as_deref(),
                self.report_timeout(),
            )?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.window().boundary().value(), 6);
        assert!(config.report_client().unwrap().is_none());
    }

    #[test]
    fn test_reads_values() {
        let config = AppConfig::from_lookup(lookup(&[
            (REPORT_API_URL, "https://reports.example.com"),
            (REPORT_API_KEY, "  "),
            (DAY_BOUNDARY_HOUR, "7"),
            (REPORT_TIMEOUT_SECS, "10"),
            (DATA_DIR, "/var/lib/shiftboard"),
        ]))
        .unwrap();

        assert_eq!(config.report_api_url.as_deref(), Some("https://reports.example.com"));
        assert_eq!(config.report_api_key, None);
        assert_eq!(config.window().boundary().value(), 7);
        assert_eq!(config.report_timeout(), Duration::from_secs(10));
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/shiftboard")));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(AppConfig::from_lookup(lookup(&[(DAY_BOUNDARY_HOUR, "24")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[(DAY_BOUNDARY_HOUR, "six")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[(REPORT_TIMEOUT_SECS, "0")])).is_err());
    }
}
