use crate::core::session::EditorSession;
use crate::core::shift::ShiftWindow;
use crate::error::ShiftboardError;
use crate::models::{CalculatedGrid, DateKey, HourKey, InputGrid, RuntimeGrid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// One ICCID: date,hour,runtime,input,purple
    Hourly,
    /// Every loaded ICCID: iccid,date,hour,runtime,input,purple
    AllIccids,
}

/// Borrowed grids of one ICCID.
pub struct IccidGrids<'a> {
    pub iccid: &'a str,
    pub runtime: &'a RuntimeGrid,
    pub inputs: &'a InputGrid,
    pub calculated: &'a CalculatedGrid,
}

/// Quotes a field when it would otherwise break the row.
fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// Display for f64 is the shortest text that parses back to the same value,
// so the exported totals compare equal to the computed ones.
fn number(value: f64) -> String {
    format!("{}", value)
}

fn hour_row(grids: &IccidGrids<'_>, date: &DateKey, hour: &HourKey) -> [String; 3] {
    let runtime = grids
        .runtime
        .get(date)
        .and_then(|r| r.get(hour))
        .map(|v| number(*v))
        .unwrap_or_default();
    let input = grids
        .inputs
        .get(date)
        .and_then(|r| r.get(hour))
        .map(|v| escape_field(v))
        .unwrap_or_default();
    let purple = grids
        .calculated
        .get(date)
        .and_then(|r| r.get(hour))
        .copied()
        .unwrap_or(0.0);
    [runtime, input, number(purple)]
}

pub fn export_hourly(window: &ShiftWindow, dates: &[DateKey], hours: &[HourKey], grids: &IccidGrids<'_>) -> String {
    let mut out = String::from("date,hour,runtime,input,purple\n");

    for date in dates {
        for hour in hours {
            let [runtime, input, purple] = hour_row(grids, date, hour);
            let _ = writeln!(out, "{},{},{},{},{}", date, hour, runtime, input, purple);
        }
    }

    let day_totals = window.day_totals(dates, grids.calculated, hours);
    for (date, total) in &day_totals {
        let _ = writeln!(out, "{},day_total,,,{}", date, number(*total));
    }
    let progressive = window.compute_progressive_total(dates, grids.calculated, hours);
    let _ = writeln!(out, ",progressive_total,,,{}", number(progressive));

    out
}

pub fn export_all(window: &ShiftWindow, dates: &[DateKey], hours: &[HourKey], all: &[IccidGrids<'_>]) -> String {
    let mut out = String::from("iccid,date,hour,runtime,input,purple\n");

    for grids in all {
        let iccid = escape_field(grids.iccid);
        for date in dates {
            for hour in hours {
                let [runtime, input, purple] = hour_row(grids, date, hour);
                let _ = writeln!(out, "{},{},{},{},{},{}", iccid, date, hour, runtime, input, purple);
            }
        }
    }

    for grids in all {
        let iccid = escape_field(grids.iccid);
        for (date, total) in window.day_totals(dates, grids.calculated, hours) {
            let _ = writeln!(out, "{},{},day_total,,,{}", iccid, date, number(total));
        }
        let progressive = window.compute_progressive_total(dates, grids.calculated, hours);
        let _ = writeln!(out, "{},,progressive_total,,,{}", iccid, number(progressive));
    }

    let per_iccid: BTreeMap<String, CalculatedGrid> = all
        .iter()
        .map(|g| (g.iccid.to_string(), g.calculated.clone()))
        .collect();
    let grand = window.compute_grand_total(dates, &per_iccid, hours);
    let _ = writeln!(out, ",,grand_total,,,{}", number(grand));

    out
}

/// Exports the session's current grids. `Hourly` needs an ICCID.
pub fn export_session(session: &EditorSession, mode: ExportMode, iccid: Option<&str>) -> Result<String, ShiftboardError> {
    let axes = session.axes();
    let window = session.window();

    match mode {
        ExportMode::Hourly => {
            let iccid = iccid.ok_or_else(|| ShiftboardError::UnknownIccid(String::new()))?;
            let ws = session.workspace(iccid)?;
            let grids = IccidGrids {
                iccid,
                runtime: &ws.runtime,
                inputs: ws.editor.inputs(),
                calculated: &ws.calculated,
            };
            Ok(export_hourly(&window, &axes.dates, &axes.hours, &grids))
        }
        ExportMode::AllIccids => {
            let iccids = session.iccids();
            let mut all = Vec::with_capacity(iccids.len());
            for iccid in &iccids {
                let ws = session.workspace(iccid)?;
                all.push(IccidGrids {
                    iccid,
                    runtime: &ws.runtime,
                    inputs: ws.editor.inputs(),
                    calculated: &ws.calculated,
                });
            }
            Ok(export_all(&window, &axes.dates, &axes.hours, &all))
        }
    }
}
