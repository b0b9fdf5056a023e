use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use crate::error::ShiftboardError;

/// Hour of the day, displayed and serialized as "00".."23".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HourKey(u8);

impl HourKey {
    pub fn new(hour: u8) -> Result<Self, ShiftboardError> {
        if hour < 24 {
            Ok(Self(hour))
        } else {
            Err(ShiftboardError::InvalidHour(hour.to_string()))
        }
    }

    /// Hour modulo 24, for constants known to be in range.
    pub const fn wrapping(hour: u8) -> Self {
        Self(hour % 24)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The full ordered hour axis, "00" through "23".
    pub fn all() -> Vec<HourKey> {
        (0..24).map(HourKey).collect()
    }
}

impl fmt::Display for HourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for HourKey {
    type Err = ShiftboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Exactly two ASCII digits, zero padded
        if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ShiftboardError::InvalidHour(s.to_string()));
        }
        let hour: u8 = s.parse().map_err(|_| ShiftboardError::InvalidHour(s.to_string()))?;
        HourKey::new(hour).map_err(|_| ShiftboardError::InvalidHour(s.to_string()))
    }
}

impl TryFrom<String> for HourKey {
    type Error = ShiftboardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HourKey> for String {
    fn from(value: HourKey) -> Self {
        value.to_string()
    }
}

/// Calendar date, displayed and serialized as "YYYY-MM-DD".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    pub fn next_day(self) -> Option<DateKey> {
        self.0.succ_opt().map(DateKey)
    }

    pub fn previous_day(self) -> Option<DateKey> {
        self.0.pred_opt().map(DateKey)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateKey {
    type Err = ShiftboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(DateKey)
            .map_err(|_| ShiftboardError::InvalidDate(s.to_string()))
    }
}

impl TryFrom<String> for DateKey {
    type Error = ShiftboardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateKey> for String {
    fn from(value: DateKey) -> Self {
        value.to_string()
    }
}

/// Inclusive calendar range `start..=end`, in order.
pub fn date_range(start: DateKey, end: DateKey) -> Result<Vec<DateKey>, ShiftboardError> {
    if start > end {
        return Err(ShiftboardError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let mut dates = Vec::new();
    let mut current = Some(start);
    while let Some(date) = current {
        if date > end {
            break;
        }
        dates.push(date);
        current = date.next_day();
    }
    Ok(dates)
}

/// Operator-entered multiplier text per date and hour.
pub type InputGrid = BTreeMap<DateKey, BTreeMap<HourKey, String>>;

/// Derived purple figures (runtime x multiplier) per date and hour.
pub type CalculatedGrid = BTreeMap<DateKey, BTreeMap<HourKey, f64>>;

/// Runtime deltas per date and hour for one ICCID.
pub type RuntimeGrid = BTreeMap<DateKey, BTreeMap<HourKey, f64>>;

/// One hourly runtime delta for a metered scale.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RuntimeSample {
    pub iccid: String,
    pub date: DateKey,
    pub hour: HourKey,
    pub delta: f64,
}

/// Groups flat samples into one runtime grid per ICCID.
pub fn group_runtime_samples(samples: &[RuntimeSample]) -> BTreeMap<String, RuntimeGrid> {
    let mut grouped: BTreeMap<String, RuntimeGrid> = BTreeMap::new();
    for sample in samples {
        grouped
            .entry(sample.iccid.clone())
            .or_default()
            .entry(sample.date)
            .or_default()
            .insert(sample.hour, sample.delta);
    }
    grouped
}

// =====================================================================
// SITE AGGREGATE
// =====================================================================

/// Site configuration. Stored as one JSON document; `from_json` / `to_json`
/// are the only places the blob is parsed or written.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub constants: Vec<SiteConstant>,
    #[serde(default)]
    pub schedule: ScheduleTimes,
    #[serde(default)]
    pub scales: Vec<Scale>,
    #[serde(default)]
    pub formulas: Vec<Formula>,
    #[serde(default)]
    pub dynamic_inputs: Vec<DynamicInput>,
    #[serde(default)]
    pub dynamic_tables: Vec<DynamicTable>,
}

impl Site {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid site document: {}", e))
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// ICCIDs of the active scales, in configuration order.
    pub fn active_iccids(&self) -> Vec<String> {
        self.scales
            .iter()
            .filter(|s| s.active)
            .map(|s| s.iccid.clone())
            .collect()
    }

    pub fn scale(&self, iccid: &str) -> Option<&Scale> {
        self.scales.iter().find(|s| s.iccid == iccid)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteConstant {
    pub key: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Wall-clock "HH:MM" times at which reports are generated for a site.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTimes {
    #[serde(default)]
    pub shift_report_times: Vec<String>,
    #[serde(default)]
    pub audit_report_time: Option<String>,
    #[serde(default)]
    pub stockpile_report_time: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scale {
    pub iccid: String,
    pub name: String,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Formula {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DynamicInput {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DynamicTable {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One triggered report, kept for the operator's activity log.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct ReportRun {
    pub id: i64,
    pub site_id: String,
    pub kind: String,
    pub requested_at: DateTime<Utc>,
    pub status: String,
    pub message: Option<String>,
}
