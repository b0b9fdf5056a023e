use crate::error::ShiftboardError;
use crate::models::{CalculatedGrid, DateKey, HourKey, InputGrid, RuntimeGrid};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reporting-day window. A reporting day runs from `boundary` on its own
/// date through `boundary - 1` on the following date (06:00 - 05:59 by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    boundary: HourKey,
}

impl Default for ShiftWindow {
    fn default() -> Self {
        ShiftWindow {
            boundary: HourKey::wrapping(Self::DEFAULT_BOUNDARY_HOUR),
        }
    }
}

impl ShiftWindow {
    pub const DEFAULT_BOUNDARY_HOUR: u8 = 6;

    pub fn new(boundary_hour: u8) -> Result<Self, ShiftboardError> {
        let boundary = HourKey::new(boundary_hour).map_err(|_| ShiftboardError::InvalidBoundary(boundary_hour))?;
        Ok(Self { boundary })
    }

    pub fn boundary(&self) -> HourKey {
        self.boundary
    }

    /// Hours that count toward the reporting day of their own date.
    pub fn in_day_part(&self, hour: HourKey) -> bool {
        hour >= self.boundary
    }

    /// Hours that count toward the reporting day of the previous date.
    pub fn in_night_tail(&self, hour: HourKey) -> bool {
        hour < self.boundary
    }

    /// Reporting day that a wall-clock (date, hour) falls into.
    pub fn reporting_day(&self, date: NaiveDate, hour: u8) -> NaiveDate {
        if hour < self.boundary.value() {
            date.pred_opt().unwrap_or(date)
        } else {
            date
        }
    }

    /// Day total for `date`: its own hours from the boundary onward plus the
    /// night tail of the date that follows it in `dates`.
    ///
    /// The follow-up date is positional, not calendar + 1. The last date of
    /// `dates` has no follow-up, so its night tail is not counted.
    pub fn compute_day_total(
        &self,
        date: &DateKey,
        dates: &[DateKey],
        calculated: &CalculatedGrid,
        hours: &[HourKey],
    ) -> f64 {
        // 1. Same-day part
        let current_part = sum_hours(calculated.get(date), hours, |h| self.in_day_part(h));

        // 2. Night tail of the next displayed date
        let next_date = dates
            .iter()
            .position(|d| d == date)
            .and_then(|idx| dates.get(idx + 1));

        let next_part = match next_date {
            Some(next) => sum_hours(calculated.get(next), hours, |h| self.in_night_tail(h)),
            None => 0.0,
        };

        current_part + next_part
    }

    /// Ordered (date, day total) pairs for every date of the range.
    pub fn day_totals(
        &self,
        dates: &[DateKey],
        calculated: &CalculatedGrid,
        hours: &[HourKey],
    ) -> Vec<(DateKey, f64)> {
        dates
            .iter()
            .map(|date| (*date, self.compute_day_total(date, dates, calculated, hours)))
            .collect()
    }

    /// Sum of the day totals over `dates`, in order.
    pub fn compute_progressive_total(
        &self,
        dates: &[DateKey],
        calculated: &CalculatedGrid,
        hours: &[HourKey],
    ) -> f64 {
        self.day_totals(dates, calculated, hours)
            .into_iter()
            .map(|(_, total)| total)
            .sum()
    }

    /// Sum of the per-ICCID progressive totals.
    pub fn compute_grand_total(
        &self,
        dates: &[DateKey],
        per_iccid: &BTreeMap<String, CalculatedGrid>,
        hours: &[HourKey],
    ) -> f64 {
        per_iccid
            .values()
            .map(|grid| self.compute_progressive_total(dates, grid, hours))
            .sum()
    }
}

fn sum_hours(
    row: Option<&BTreeMap<HourKey, f64>>,
    hours: &[HourKey],
    include: impl Fn(HourKey) -> bool,
) -> f64 {
    let Some(row) = row else {
        return 0.0;
    };
    hours
        .iter()
        .filter(|h| include(**h))
        .map(|h| row.get(h).copied().unwrap_or(0.0))
        .sum()
}

/// Lenient numeric parse of operator text.
///
/// Mirrors a browser `parseFloat(text) || 0`: leading whitespace is skipped,
/// the longest numeric prefix wins ("3 t/h" is 3), and anything that does
/// not start with a number is 0. An empty string is 0.
pub fn parse_multiplier(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    match parse_float_prefix(text) {
        Some((value, _)) if value != 0.0 && !value.is_nan() => value,
        _ => 0.0,
    }
}

/// Longest numeric prefix after leading whitespace, with the number of
/// bytes it used (counted from the first non-whitespace byte).
fn parse_float_prefix(text: &str) -> Option<(f64, usize)> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    let negative = i < len && bytes[i] == b'-';
    if i < len && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }

    if s[i..].starts_with("Infinity") {
        let value = if negative { f64::NEG_INFINITY } else { f64::INFINITY };
        return Some((value, i + "Infinity".len()));
    }

    let int_start = i;
    while i < len && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;

    if i < len && bytes[i] == b'.' {
        let mut j = i + 1;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        let frac_digits = j - (i + 1);
        if digits > 0 || frac_digits > 0 {
            digits += frac_digits;
            i = j;
        }
    }

    if digits == 0 {
        return None;
    }

    // Exponent only counts when it has digits
    if i < len && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < len && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }

    s[..i].parse::<f64>().ok().map(|value| (value, i))
}

/// True when the whole text (outer whitespace aside) is one finite number.
fn is_plain_number(text: &str) -> bool {
    let s = text.trim();
    match parse_float_prefix(s) {
        Some((value, used)) => used == s.len() && value.is_finite(),
        None => false,
    }
}

/// Purple figure for one cell. Missing runtime yields 0.
pub fn recompute_cell(runtime: Option<f64>, input_text: &str) -> f64 {
    let multiplier = if input_text.is_empty() { 0.0 } else { parse_multiplier(input_text) };
    match runtime {
        Some(delta) => delta * multiplier,
        None => 0.0,
    }
}

/// Dense purple-figure grid for every date and hour of the range.
pub fn calculate_grid(
    dates: &[DateKey],
    hours: &[HourKey],
    runtime: &RuntimeGrid,
    inputs: &InputGrid,
) -> CalculatedGrid {
    let mut calculated = CalculatedGrid::new();
    for date in dates {
        let runtime_row = runtime.get(date);
        let input_row = inputs.get(date);
        let row = calculated.entry(*date).or_default();
        for hour in hours {
            let delta = runtime_row.and_then(|r| r.get(hour)).copied();
            let text = input_row.and_then(|r| r.get(hour)).map(String::as_str).unwrap_or("");
            row.insert(*hour, recompute_cell(delta, text));
        }
    }
    calculated
}

/// A cell whose text only partly parses (or not at all) and was counted as
/// something other than what the operator typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnparsedCell {
    pub date: DateKey,
    pub hour: HourKey,
    pub text: String,
    pub counted_as: f64,
}

/// Cells whose non-empty text is not a plain number. Values are still
/// computed leniently; this only lets the UI highlight them.
pub fn flag_unparseable(inputs: &InputGrid) -> Vec<UnparsedCell> {
    let mut flagged = Vec::new();
    for (date, row) in inputs {
        for (hour, text) in row {
            if text.is_empty() {
                continue;
            }
            if !is_plain_number(text) {
                flagged.push(UnparsedCell {
                    date: *date,
                    hour: *hour,
                    text: text.clone(),
                    counted_as: parse_multiplier(text),
                });
            }
        }
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn h(s: &str) -> HourKey {
        s.parse().unwrap()
    }

    fn scenario() -> (Vec<DateKey>, Vec<HourKey>, RuntimeGrid, InputGrid) {
        let dates = vec![d("2024-01-01"), d("2024-01-02")];
        let hours = HourKey::all();

        let mut runtime = RuntimeGrid::new();
        runtime.entry(d("2024-01-01")).or_default().insert(h("06"), 2.0);
        runtime.entry(d("2024-01-02")).or_default().insert(h("02"), 5.0);

        let mut inputs = InputGrid::new();
        inputs.entry(d("2024-01-01")).or_default().insert(h("06"), "3".to_string());
        inputs.entry(d("2024-01-02")).or_default().insert(h("02"), "2".to_string());

        (dates, hours, runtime, inputs)
    }

    #[test]
    fn test_same_day_contribution() {
        let (dates, hours, runtime, mut inputs) = scenario();
        inputs.remove(&d("2024-01-02"));

        let calc = calculate_grid(&dates, &hours, &runtime, &inputs);
        assert_eq!(calc[&d("2024-01-01")][&h("06")], 6.0);

        let window = ShiftWindow::default();
        assert_eq!(window.compute_day_total(&d("2024-01-01"), &dates, &calc, &hours), 6.0);
    }

    #[test]
    fn test_next_day_tail_is_carried_back() {
        let (dates, hours, runtime, inputs) = scenario();
        let calc = calculate_grid(&dates, &hours, &runtime, &inputs);
        assert_eq!(calc[&d("2024-01-02")][&h("02")], 10.0);

        let window = ShiftWindow::default();
        assert_eq!(window.compute_day_total(&d("2024-01-01"), &dates, &calc, &hours), 16.0);
        // Last date has no follow-up: its own early hours belong to the previous day
        assert_eq!(window.compute_day_total(&d("2024-01-02"), &dates, &calc, &hours), 0.0);
    }

    #[test]
    fn test_day_total_is_pure() {
        let (dates, hours, runtime, inputs) = scenario();
        let calc = calculate_grid(&dates, &hours, &runtime, &inputs);
        let before = calc.clone();
        let window = ShiftWindow::default();

        let first = window.compute_day_total(&d("2024-01-01"), &dates, &calc, &hours);
        let second = window.compute_day_total(&d("2024-01-01"), &dates, &calc, &hours);
        assert_eq!(first, second);
        assert_eq!(calc, before);
    }

    #[test]
    fn test_progressive_is_sum_of_day_totals() {
        let (dates, hours, mut runtime, mut inputs) = scenario();
        let extra = d("2024-01-03");
        let dates: Vec<DateKey> = dates.into_iter().chain(std::iter::once(extra)).collect();
        runtime.entry(extra).or_default().insert(h("05"), 4.0);
        runtime.entry(extra).or_default().insert(h("12"), 1.5);
        inputs.entry(extra).or_default().insert(h("05"), "1".to_string());
        inputs.entry(extra).or_default().insert(h("12"), "2".to_string());

        let calc = calculate_grid(&dates, &hours, &runtime, &inputs);
        let window = ShiftWindow::default();

        let expected: f64 = dates.iter().map(|x| window.compute_day_total(x, &dates, &calc, &hours)).sum();
        assert_eq!(window.compute_progressive_total(&dates, &calc, &hours), expected);
        // 16 + (4 tail of the 3rd) + 3
        assert_eq!(expected, 23.0);
    }

    #[test]
    fn test_next_date_is_positional() {
        let hours = HourKey::all();
        // Gap in the displayed dates: the 5th follows the 1st
        let dates = vec![d("2024-01-01"), d("2024-01-05")];
        let mut calc = CalculatedGrid::new();
        calc.entry(d("2024-01-05")).or_default().insert(h("03"), 7.0);

        let window = ShiftWindow::default();
        assert_eq!(window.compute_day_total(&d("2024-01-01"), &dates, &calc, &hours), 7.0);
    }

    #[test]
    fn test_configurable_boundary() {
        let dates = vec![d("2024-01-01"), d("2024-01-02")];
        let hours = HourKey::all();
        let mut calc = CalculatedGrid::new();
        calc.entry(d("2024-01-01")).or_default().insert(h("06"), 1.0);
        calc.entry(d("2024-01-02")).or_default().insert(h("06"), 10.0);
        calc.entry(d("2024-01-02")).or_default().insert(h("07"), 100.0);

        let late = ShiftWindow::new(7).unwrap();
        // 01-01 keeps nothing before 07, takes 02's 06 hour as its tail
        assert_eq!(late.compute_day_total(&d("2024-01-01"), &dates, &calc, &hours), 10.0);

        let midnight = ShiftWindow::new(0).unwrap();
        assert_eq!(midnight.compute_day_total(&d("2024-01-01"), &dates, &calc, &hours), 1.0);

        assert_eq!(ShiftWindow::new(24), Err(ShiftboardError::InvalidBoundary(24)));
    }

    #[test]
    fn test_grand_total_sums_iccids() {
        let (dates, hours, runtime, inputs) = scenario();
        let calc = calculate_grid(&dates, &hours, &runtime, &inputs);
        let mut per_iccid = BTreeMap::new();
        per_iccid.insert("8901".to_string(), calc.clone());
        per_iccid.insert("8902".to_string(), calc);

        let window = ShiftWindow::default();
        assert_eq!(window.compute_grand_total(&dates, &per_iccid, &hours), 32.0);
    }

    #[test]
    fn test_empty_input_is_zero_not_nan() {
        let value = recompute_cell(Some(4.0), "");
        assert_eq!(value, 0.0);
        assert!(!value.is_nan());
        assert_eq!(recompute_cell(None, "3"), 0.0);
    }

    #[test]
    fn test_parse_multiplier_leniency() {
        assert_eq!(parse_multiplier("2.5"), 2.5);
        assert_eq!(parse_multiplier("  3"), 3.0);
        assert_eq!(parse_multiplier("3 t/h"), 3.0);
        assert_eq!(parse_multiplier(".5"), 0.5);
        assert_eq!(parse_multiplier("5."), 5.0);
        assert_eq!(parse_multiplier("-1.5"), -1.5);
        assert_eq!(parse_multiplier("1e2"), 100.0);
        assert_eq!(parse_multiplier("1e"), 1.0);
        assert_eq!(parse_multiplier("abc"), 0.0);
        assert_eq!(parse_multiplier("."), 0.0);
        assert_eq!(parse_multiplier("-"), 0.0);
        assert_eq!(parse_multiplier("Infinity"), f64::INFINITY);
    }

    #[test]
    fn test_recalculation_is_idempotent() {
        let (dates, hours, runtime, inputs) = scenario();
        let first = calculate_grid(&dates, &hours, &runtime, &inputs);
        let second = calculate_grid(&dates, &hours, &runtime, &inputs);
        assert_eq!(first, second);
        assert_eq!(first[&d("2024-01-01")].len(), 24);
    }

    #[test]
    fn test_flag_unparseable() {
        let mut inputs = InputGrid::new();
        let row = inputs.entry(d("2024-01-01")).or_default();
        row.insert(h("00"), "".to_string());
        row.insert(h("01"), "2".to_string());
        row.insert(h("02"), "2 x".to_string());
        row.insert(h("03"), "n/a".to_string());
        row.insert(h("04"), " 1.5e2 ".to_string());
        row.insert(h("05"), "inf".to_string());
        row.insert(h("06"), "NaN".to_string());
        row.insert(h("07"), "infinity".to_string());
        row.insert(h("08"), "Infinity".to_string());
        row.insert(h("09"), ".5".to_string());

        let flagged = flag_unparseable(&inputs);
        let hours: Vec<HourKey> = flagged.iter().map(|c| c.hour).collect();
        assert_eq!(hours, vec![h("02"), h("03"), h("05"), h("06"), h("07"), h("08")]);
        assert_eq!(flagged[0].counted_as, 2.0);
        assert_eq!(flagged[1].counted_as, 0.0);

        // Texts a strict float parser would accept are still zeroed here
        for cell in &flagged[2..5] {
            assert_eq!(cell.counted_as, 0.0, "{}", cell.text);
        }
        assert!(flagged[5].counted_as.is_infinite());
    }

    #[test]
    fn test_reporting_day() {
        let window = ShiftWindow::default();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(window.reporting_day(date, 5), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(window.reporting_day(date, 6), date);
    }
}
