use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// Status messages shown to the operator
// 1. Save / load results
// 2. Report trigger results (ad hoc and scheduled)

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Dismissible message for the dashboard's status bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub title: String,
    pub body: String,
    pub timestamp: String,
    pub dismissible: bool,
}

impl StatusMessage {
    pub fn new(level: StatusLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        StatusMessage {
            level,
            title: title.into(),
            body: body.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            dismissible: true,
        }
    }

    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(StatusLevel::Success, title, body)
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(StatusLevel::Error, title, body)
    }
}

/// Where status messages go. The desktop shell forwards them to the webview;
/// headless runs only log them.
pub trait StatusSink: Send + Sync {
    fn publish(&self, message: StatusMessage);
}

pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, message: StatusMessage) {
        match message.level {
            StatusLevel::Error => error!(title = %message.title, "{}", message.body),
            StatusLevel::Warning => warn!(title = %message.title, "{}", message.body),
            StatusLevel::Info | StatusLevel::Success => info!(title = %message.title, "{}", message.body),
        }
    }
}

#[cfg(feature = "desktop")]
mod desktop {
    use super::{StatusLevel, StatusMessage, StatusSink};
    use tauri::{AppHandle, Emitter};
    use tauri_plugin_notification::NotificationExt;

    impl StatusSink for AppHandle {
        fn publish(&self, message: StatusMessage) {
            tracing::info!(title = %message.title, level = ?message.level, "Publishing status message");

            // Errors also raise a desktop notification, the operator may be on another window
            if message.level == StatusLevel::Error {
                let _ = self
                    .notification()
                    .builder()
                    .title(&message.title)
                    .body(&message.body)
                    .show();
            }

            let _ = self.emit("status", message);
        }
    }
}
