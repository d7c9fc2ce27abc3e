//! Date normalization for history rows.
//!
//! Date cells arrive as native workbook dates, day-first slash strings,
//! ISO-like hyphen strings, or spreadsheet serial numbers (as text or as
//! numbers). Slash strings are always read as day/month/year; the order is
//! never guessed from the values.

use super::grid::Cell;
use crate::error::NormalizationFailure;
use chrono::{Duration, NaiveDate};
use serde::{Serialize, Serializer};
use std::fmt;

/// Display and persistence format of a normalized date.
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Origin of the legacy spreadsheet serial.
///
/// Serial 1 is 1900-01-01, but the originating software counts a
/// non-existent 1900-02-29, so every serial past February 1900 lands one
/// day late if counted from 1900-01-01. Anchoring one day earlier absorbs
/// that offset for all modern dates.
pub fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 31).unwrap_or(NaiveDate::MIN)
}

/// A normalized date: either a real calendar date or text kept verbatim
/// because it could not be read as one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PointDate {
    Calendar(NaiveDate),
    PassThrough(String),
}

impl PointDate {
    pub fn calendar(&self) -> Option<NaiveDate> {
        match self {
            PointDate::Calendar(date) => Some(*date),
            PointDate::PassThrough(_) => None,
        }
    }

    /// Rendered form: `dd/mm/yyyy` for calendar dates, the literal text otherwise.
    pub fn rendered(&self) -> String {
        self.to_string()
    }

    /// Ordering key: the rendered form split on `/`, reversed and joined
    /// with `-`, so `dd/mm/yyyy` becomes `yyyy-mm-dd`.
    pub fn sort_key(&self) -> String {
        let rendered = self.rendered();
        let mut parts: Vec<&str> = rendered.split('/').collect();
        parts.reverse();
        parts.join("-")
    }
}

impl fmt::Display for PointDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointDate::Calendar(date) => write!(f, "{}", date.format(DISPLAY_FORMAT)),
            PointDate::PassThrough(text) => write!(f, "{}", text),
        }
    }
}

impl Serialize for PointDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalizes a date cell.
///
/// # Errors
/// Returns `NormalizationFailure` for empty cells, text that matches none of
/// the known shapes, and serials outside the representable range.
pub fn normalize(cell: &Cell) -> Result<PointDate, NormalizationFailure> {
    let failure = || NormalizationFailure {
        raw: cell.to_string(),
    };

    match cell {
        Cell::Date(date) => Ok(PointDate::Calendar(*date)),
        Cell::Text(text) => normalize_text(text.trim()).ok_or_else(failure),
        Cell::Number(serial) => from_serial(*serial)
            .map(PointDate::Calendar)
            .ok_or_else(failure),
        Cell::FormulaResult(inner) => normalize(inner),
        Cell::Empty => Err(failure()),
    }
}

fn normalize_text(text: &str) -> Option<PointDate> {
    if text.contains('/') {
        return Some(from_slashed(text));
    }
    if text.contains('-') {
        return Some(from_hyphenated(text));
    }
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        let serial: i64 = text.parse().ok()?;
        return from_serial_days(serial).map(PointDate::Calendar);
    }
    None
}

/// `dd/mm/yyyy` (day first, always), optionally followed by a time part.
/// Anything that does not split into three integers forming a real date is
/// kept as text.
fn from_slashed(text: &str) -> PointDate {
    let parts: Vec<&str> = text.split('/').collect();
    let [day, month, year] = parts.as_slice() else {
        return PointDate::PassThrough(text.to_string());
    };

    parse_day_first(day, month, year)
        .map(PointDate::Calendar)
        .unwrap_or_else(|| PointDate::PassThrough(text.to_string()))
}

fn parse_day_first(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day: u32 = day.trim().parse().ok()?;
    let month: u32 = month.trim().parse().ok()?;
    // a trailing time part (`dd/mm/yyyy hh:mm:ss`) is ignored
    let year_text = year
        .trim()
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    let mut year: i32 = year_text.parse().ok()?;
    // two-digit years pivot at 50
    if year_text.len() <= 2 {
        year += if year < 50 { 2000 } else { 1900 };
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `yyyy-mm-dd`, optionally followed by a time part.
fn from_hyphenated(text: &str) -> PointDate {
    let date_part = text
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or(text);

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(PointDate::Calendar)
        .unwrap_or_else(|_| PointDate::PassThrough(text.to_string()))
}

/// Converts a (possibly fractional) serial; the time of day is discarded.
pub fn from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 || serial > i32::MAX as f64 {
        return None;
    }
    from_serial_days(serial.trunc() as i64)
}

fn from_serial_days(serial: i64) -> Option<NaiveDate> {
    if serial < 0 {
        return None;
    }
    serial_epoch().checked_add_signed(Duration::try_days(serial - 1)?)
}

/// Serial of a calendar date, the inverse of `from_serial` for dates after the origin.
pub fn to_serial(date: NaiveDate) -> i64 {
    (date - serial_epoch()).num_days() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_known_serials() {
        assert_eq!(normalize(&Cell::Number(45352.0)).unwrap(), PointDate::Calendar(ymd(2024, 3, 1)));
        assert_eq!(normalize(&text("44927")).unwrap(), PointDate::Calendar(ymd(2023, 1, 1)));
        assert_eq!(normalize(&Cell::Number(45000.75)).unwrap(), PointDate::Calendar(ymd(2023, 3, 15)));
    }

    #[test]
    fn test_serial_is_one_day_before_naive_epoch_addition() {
        for serial in [61_i64, 10_000, 36_526, 45_352, 60_000] {
            let naive = serial_epoch() + Duration::days(serial);
            let normalized = normalize(&text(&serial.to_string())).unwrap();
            assert_eq!(normalized.calendar(), Some(naive - Duration::days(1)));
        }
    }

    #[test]
    fn test_slash_is_day_first() {
        assert_eq!(normalize(&text("02/03/2024")).unwrap(), PointDate::Calendar(ymd(2024, 3, 2)));
        assert_eq!(normalize(&text("2/3/24")).unwrap(), PointDate::Calendar(ymd(2024, 3, 2)));
        assert_eq!(normalize(&text("31/12/99")).unwrap(), PointDate::Calendar(ymd(1999, 12, 31)));
    }

    #[test]
    fn test_slash_date_with_time_part() {
        assert_eq!(
            normalize(&text("01/03/2024 00:00:00")).unwrap(),
            PointDate::Calendar(ymd(2024, 3, 1))
        );
        assert_eq!(
            normalize(&text("15/02/2024T13:45")).unwrap(),
            PointDate::Calendar(ymd(2024, 2, 15))
        );
        assert_eq!(
            normalize(&text("01/03/ 00:00")).unwrap(),
            PointDate::PassThrough("01/03/ 00:00".into())
        );
    }

    #[test]
    fn test_slash_without_three_parts_passes_through() {
        assert_eq!(
            normalize(&text("03/2024")).unwrap(),
            PointDate::PassThrough("03/2024".into())
        );
        assert_eq!(
            normalize(&text("31/02/2024")).unwrap(),
            PointDate::PassThrough("31/02/2024".into())
        );
    }

    #[test]
    fn test_hyphenated_dates() {
        assert_eq!(normalize(&text("2023-12-08")).unwrap(), PointDate::Calendar(ymd(2023, 12, 8)));
        assert_eq!(
            normalize(&text("2023-12-08T00:00:00.000Z")).unwrap(),
            PointDate::Calendar(ymd(2023, 12, 8))
        );
        assert_eq!(
            normalize(&text("dez-2023")).unwrap(),
            PointDate::PassThrough("dez-2023".into())
        );
    }

    #[test]
    fn test_native_and_formula_dates() {
        let date = ymd(2024, 3, 1);
        assert_eq!(normalize(&Cell::Date(date)).unwrap(), PointDate::Calendar(date));
        assert_eq!(
            normalize(&Cell::FormulaResult(Box::new(Cell::Number(45352.0)))).unwrap(),
            PointDate::Calendar(date)
        );
    }

    #[test]
    fn test_unrecognised_cells_fail() {
        assert!(normalize(&Cell::Empty).is_err());
        assert!(normalize(&text("ontem")).is_err());
        assert!(normalize(&Cell::Number(-3.0)).is_err());
        assert!(normalize(&Cell::Number(f64::NAN)).is_err());
        let err = normalize(&text("12.03.2024")).unwrap_err();
        assert_eq!(err.raw, "12.03.2024");
    }

    #[test]
    fn test_rendered_form_round_trips() {
        let mut date = ymd(1900, 1, 1);
        while date < ymd(2100, 1, 1) {
            let rendered = PointDate::Calendar(date).rendered();
            assert_eq!(normalize(&text(&rendered)).unwrap(), PointDate::Calendar(date));
            assert_eq!(from_serial_days(to_serial(date)), Some(date));
            date += Duration::days(97);
        }
    }

    #[test]
    fn test_sort_key_reverses_rendered_parts() {
        assert_eq!(PointDate::Calendar(ymd(2024, 3, 2)).sort_key(), "2024-03-02");
        assert_eq!(PointDate::PassThrough("03/2024".into()).sort_key(), "2024-03");
        assert_eq!(PointDate::PassThrough("dez-2023".into()).sort_key(), "dez-2023");
    }
}
