use thiserror::Error;

/// Domain errors raised by key parsing, range building and the save path.
///
/// Everything that talks to the store or the report service returns
/// `anyhow::Result`; these variants travel inside it and can be recovered
/// with `downcast_ref` where a caller needs to tell them apart.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShiftboardError {
    #[error("invalid hour key '{0}' (expected \"00\"..\"23\")")]
    InvalidHour(String),
    #[error("invalid date key '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: String, end: String },
    #[error("day boundary hour must be between 0 and 23, got {0}")]
    InvalidBoundary(u8),
    #[error("invalid schedule time '{0}' (expected HH:MM)")]
    InvalidScheduleTime(String),
    #[error("unknown site: {0}")]
    UnknownSite(String),
    #[error("no grid loaded for ICCID {0}")]
    UnknownIccid(String),
    #[error("a save for {site_id}/{iccid} is already in flight")]
    SaveInFlight { site_id: String, iccid: String },
}
