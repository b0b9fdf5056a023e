use async_trait::async_trait;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use crate::models::{DateKey, HourKey, RuntimeSample};

pub mod http;

/// Reports the external service can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Audit,
    Shift,
    Progressive,
    Stockpile,
    /// Re-pulls runtime samples from the meters for the range.
    Requery,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Audit => "audit",
            ReportKind::Shift => "shift",
            ReportKind::Progressive => "progressive",
            ReportKind::Stockpile => "stockpile",
            ReportKind::Requery => "requery",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            ReportKind::Audit => "audit-report",
            ReportKind::Shift => "shift-report",
            ReportKind::Progressive => "progressive-report",
            ReportKind::Stockpile => "stockpile-report",
            ReportKind::Requery => "requery",
        }
    }
}

impl std::str::FromStr for ReportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audit" => Ok(ReportKind::Audit),
            "shift" => Ok(ReportKind::Shift),
            "progressive" => Ok(ReportKind::Progressive),
            "stockpile" => Ok(ReportKind::Stockpile),
            "requery" => Ok(ReportKind::Requery),
            other => Err(anyhow!("Unknown report kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub site_id: String,
    pub start_date: DateKey,
    pub end_date: DateKey,
    #[serde(default)]
    pub iccids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResponse {
    pub status: String,
    pub message: Option<String>,
    /// Runtime rows carried back by a requery; empty for the other kinds.
    pub samples: Vec<RuntimeSample>,
    pub body: Value,
}

#[async_trait]
pub trait ReportBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn trigger(&self, request: &ReportRequest) -> Result<ReportResponse>;
}

/// Reads the service's JSON reply. An empty body counts as success.
pub fn parse_response(json: &Value) -> Result<ReportResponse> {
    if json.is_null() {
        return Ok(ReportResponse {
            status: "ok".to_string(),
            message: None,
            samples: Vec::new(),
            body: Value::Null,
        });
    }

    if !json.is_object() {
        return Err(anyhow!("Unexpected report response: {}", json));
    }

    if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
        let text = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(anyhow!("Report service error: {}", text));
    }

    let status = json["status"].as_str().unwrap_or("ok").to_string();
    let message = json["message"].as_str().map(str::to_string);

    let mut samples = Vec::new();
    if let Some(rows) = json["samples"].as_array() {
        for row in rows {
            match parse_sample(row) {
                Some(sample) => samples.push(sample),
                None => warn!(row = %row, "Skipping malformed runtime sample"),
            }
        }
    }

    Ok(ReportResponse {
        status,
        message,
        samples,
        body: json.clone(),
    })
}

fn parse_sample(row: &Value) -> Option<RuntimeSample> {
    let iccid = match &row["iccid"] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let date: DateKey = row["date"].as_str()?.parse().ok()?;

    // Hours arrive as "06", "6" or 6
    let hour = match &row["hour"] {
        Value::String(s) => s.trim().parse::<u8>().ok()?,
        Value::Number(n) => u8::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    let hour = HourKey::new(hour).ok()?;

    let delta = match &row["delta"] {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !delta.is_finite() || delta < 0.0 {
        return None;
    }

    Some(RuntimeSample { iccid, date, hour, delta })
}
