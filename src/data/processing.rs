use super::dates::{normalize, PointDate, DISPLAY_FORMAT};
use super::demux::{InstrumentBlock, RawRow};
use super::grid::{Cell, Grid};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info};

/// One observation of an instrument's history.
///
/// Serialized with the persisted field names `data`, `preco`, `volume`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    #[serde(rename = "data")]
    pub date: PointDate,
    #[serde(rename = "preco")]
    pub price: f64,
    pub volume: Option<f64>,
}

/// An instrument's deduplicated history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentHistory {
    #[serde(rename = "empresa")]
    pub name: String,
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "historicoPrecos")]
    pub points: Vec<HistoryPoint>,
    /// Latest real calendar date among the points; pass-through dates do not count.
    #[serde(skip)]
    pub latest: Option<NaiveDate>,
}

/// Outcome of assembling every instrument of one grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestResult {
    pub histories: Vec<InstrumentHistory>,
    pub most_recent_date: Option<NaiveDate>,
    /// Codes of instruments that had identity but no surviving rows.
    pub without_data: Vec<String>,
}

impl IngestResult {
    pub fn most_recent_display(&self) -> String {
        self.most_recent_date
            .map(|d| d.format(DISPLAY_FORMAT).to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// Reads a cell as a finite number. Text may use a decimal comma.
pub fn coerce_number(cell: &Cell) -> Option<f64> {
    let value = match cell.value() {
        Cell::Number(n) => *n,
        Cell::Text(text) => text.trim().replacen(',', ".", 1).parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Empty date cells, and numeric zeros left behind by formulas over empty
/// ranges, mark rows without a date.
fn is_blank_date(cell: &Cell) -> bool {
    cell.is_empty() || matches!(cell.value(), Cell::Number(n) if *n == 0.0)
}

/// Builds one instrument's history from its raw rows.
///
/// Rows with an empty (or zero) or unreadable date, or a price that is not a
/// non-negative number, are dropped. An unreadable volume becomes `None`.
/// When two rows render to the same date, the later row wins. Returns
/// `None` when no row survives.
pub fn assemble<'a>(
    block: &InstrumentBlock,
    rows: impl IntoIterator<Item = RawRow<'a>>,
) -> Option<InstrumentHistory> {
    let mut points: Vec<HistoryPoint> = Vec::new();
    let mut by_date: HashMap<String, usize> = HashMap::new();
    let mut dropped = 0usize;

    for row in rows {
        if is_blank_date(row.date) {
            continue;
        }

        let date = match normalize(row.date) {
            Ok(date) => date,
            Err(failure) => {
                debug!(code = %block.code, raw = %failure.raw, "dropping row with unreadable date");
                dropped += 1;
                continue;
            }
        };

        let Some(price) = coerce_number(row.price).filter(|p| *p >= 0.0) else {
            debug!(code = %block.code, date = %date, raw = %row.price, "dropping row without price");
            dropped += 1;
            continue;
        };

        let point = HistoryPoint {
            volume: coerce_number(row.volume),
            price,
            date,
        };

        match by_date.entry(point.date.rendered()) {
            Entry::Occupied(slot) => points[*slot.get()] = point,
            Entry::Vacant(slot) => {
                slot.insert(points.len());
                points.push(point);
            }
        }
    }

    info!(
        code = %block.code,
        rows = points.len(),
        dropped,
        "rows processed"
    );

    if points.is_empty() {
        return None;
    }

    points.sort_by_cached_key(|p| std::cmp::Reverse(p.date.sort_key()));
    let latest = points.iter().filter_map(|p| p.date.calendar()).max();

    let latest_display = latest
        .map(|d| d.format(DISPLAY_FORMAT).to_string())
        .unwrap_or_else(|| "N/A".to_string());
    info!(code = %block.code, latest = %latest_display, "latest date for instrument");

    Some(InstrumentHistory {
        name: block.name.clone(),
        code: block.code.clone(),
        points,
        latest,
    })
}

/// Assembles every block of the grid. The run's most recent date is the
/// maximum of the per-instrument latest dates.
pub fn assemble_all(grid: &Grid, blocks: &[InstrumentBlock]) -> IngestResult {
    let mut histories = Vec::with_capacity(blocks.len());
    let mut without_data = Vec::new();

    for block in blocks {
        info!(name = %block.name, code = %block.code, "processing instrument");
        match assemble(block, block.rows(grid)) {
            Some(history) => histories.push(history),
            None => without_data.push(block.code.clone()),
        }
    }

    let most_recent_date = histories.iter().filter_map(|h| h.latest).max();

    IngestResult {
        histories,
        most_recent_date,
        without_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::demux::demux;
    use crate::data::grid::decode_delimited;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn block() -> InstrumentBlock {
        InstrumentBlock {
            name: "Empresa A".into(),
            code: "AAAA3".into(),
            start: 0,
        }
    }

    fn raw<'a>(date: &'a Cell, price: &'a Cell, volume: &'a Cell) -> RawRow<'a> {
        RawRow { date, price, volume }
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&text("10,5")), Some(10.5));
        assert_eq!(coerce_number(&text(" 11.0 ")), Some(11.0));
        assert_eq!(coerce_number(&Cell::Number(3.0)), Some(3.0));
        assert_eq!(
            coerce_number(&Cell::FormulaResult(Box::new(Cell::Number(4.0)))),
            Some(4.0)
        );
        assert_eq!(coerce_number(&text("")), None);
        assert_eq!(coerce_number(&text("n/d")), None);
        assert_eq!(coerce_number(&text("inf")), None);
        assert_eq!(coerce_number(&Cell::Empty), None);
        assert_eq!(coerce_number(&Cell::Date(ymd(2024, 1, 1))), None);
    }

    #[test]
    fn test_two_instrument_table_scenario() {
        let csv = "Empresa A,AAAA3,,,,,,\n01/03/2024,\"10,5\",100\n02/03/2024,\"11,0\",\n";
        let grid = decode_delimited(csv.as_bytes()).unwrap();
        let result = assemble_all(&grid, &demux(&grid));

        assert_eq!(result.histories.len(), 1);
        let history = &result.histories[0];
        assert_eq!(history.code, "AAAA3");
        assert_eq!(history.points.len(), 2);
        assert_eq!(history.points[0].date.rendered(), "02/03/2024");
        assert_eq!(history.points[0].price, 11.0);
        assert_eq!(history.points[0].volume, None);
        assert_eq!(history.points[1].date.rendered(), "01/03/2024");
        assert_eq!(history.points[1].volume, Some(100.0));
        assert_eq!(result.most_recent_date, Some(ymd(2024, 3, 2)));
    }

    #[test]
    fn test_rows_are_filtered_and_later_duplicates_win() {
        let cells = [
            (text("01/03/2024"), text("10"), text("5")),
            (text("44927"), text("9"), Cell::Empty),
            (Cell::Empty, text("12"), text("1")),
            (text("ontem"), text("12"), text("1")),
            (text("04/03/2024"), text("abc"), text("1")),
            (text("05/03/2024"), text("-1"), text("1")),
            (text("2024-03-01"), text("10,75"), text("x")),
        ];
        let rows = cells.iter().map(|(d, p, v)| raw(d, p, v));
        let history = assemble(&block(), rows).unwrap();

        assert_eq!(history.points.len(), 2);
        assert_eq!(history.points[0].date.rendered(), "01/03/2024");
        assert_eq!(history.points[0].price, 10.75);
        assert_eq!(history.points[0].volume, None);
        assert_eq!(history.points[1].date.rendered(), "01/01/2023");
        assert_eq!(history.latest, Some(ymd(2024, 3, 1)));
    }

    #[test]
    fn test_zero_date_cells_are_skipped() {
        let cells = [
            (Cell::Number(0.0), text("10"), text("1")),
            (Cell::FormulaResult(Box::new(Cell::Number(0.0))), text("11"), text("1")),
            (text("15/02/2024"), text("9"), text("1")),
        ];
        let history = assemble(&block(), cells.iter().map(|(d, p, v)| raw(d, p, v))).unwrap();

        assert_eq!(history.points.len(), 1);
        assert_eq!(history.points[0].date.rendered(), "15/02/2024");
    }

    #[test]
    fn test_slash_dates_with_time_count_towards_latest() {
        let grid = decode_delimited("A,AAAA3\n01/03/2024 00:00:00,10,1\n15/02/2024,9,1\n".as_bytes())
            .unwrap();
        let result = assemble_all(&grid, &demux(&grid));

        let points = &result.histories[0].points;
        assert_eq!(points[0].date, PointDate::Calendar(ymd(2024, 3, 1)));
        assert_eq!(points[1].date.rendered(), "15/02/2024");
        assert_eq!(result.most_recent_date, Some(ymd(2024, 3, 1)));
    }

    #[test]
    fn test_points_are_strictly_descending_and_unique() {
        let dates = ["15/01/2023", "02/12/2022", "15/01/2023", "31/12/2023", "01/01/2024"];
        let cells: Vec<_> = dates.iter().map(|d| (text(d), text("1"), Cell::Empty)).collect();
        let history = assemble(&block(), cells.iter().map(|(d, p, v)| raw(d, p, v))).unwrap();

        let calendar: Vec<_> = history.points.iter().filter_map(|p| p.date.calendar()).collect();
        assert_eq!(calendar.len(), 4);
        assert!(calendar.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_pass_through_dates_sort_by_text_and_skip_latest() {
        let cells = [
            (text("03/2024"), text("1"), Cell::Empty),
            (text("10/01/2024"), text("2"), Cell::Empty),
        ];
        let history = assemble(&block(), cells.iter().map(|(d, p, v)| raw(d, p, v))).unwrap();

        // "2024-03" sorts after "2024-01-10"
        assert_eq!(history.points[0].date, PointDate::PassThrough("03/2024".into()));
        assert_eq!(history.latest, Some(ymd(2024, 1, 10)));
    }

    #[test]
    fn test_instrument_without_rows_is_omitted() {
        let grid = decode_delimited(
            "Empresa A,AAAA3,,,Empresa B,BBBB4\n01/03/2024,10,,,sem data,abc\n".as_bytes(),
        )
        .unwrap();
        let result = assemble_all(&grid, &demux(&grid));

        assert_eq!(result.histories.len(), 1);
        assert_eq!(result.histories[0].code, "AAAA3");
        assert_eq!(result.without_data, vec!["BBBB4".to_string()]);
    }

    #[test]
    fn test_most_recent_date_is_max_over_instruments() {
        let grid = decode_delimited(
            "A,AAAA3,,,B,BBBB4\n01/03/2024,10,,,05/02/2024,1\n,,,,07/03/2024,2\n".as_bytes(),
        )
        .unwrap();
        let result = assemble_all(&grid, &demux(&grid));

        assert_eq!(result.histories[0].latest, Some(ymd(2024, 3, 1)));
        assert_eq!(result.histories[1].latest, Some(ymd(2024, 3, 7)));
        assert_eq!(result.most_recent_date, Some(ymd(2024, 3, 7)));
        assert_eq!(result.most_recent_display(), "07/03/2024");
    }

    #[test]
    fn test_serialized_shape() {
        let history = InstrumentHistory {
            name: "Empresa A".into(),
            code: "AAAA3".into(),
            points: vec![HistoryPoint {
                date: PointDate::Calendar(ymd(2024, 3, 2)),
                price: 11.0,
                volume: None,
            }],
            latest: Some(ymd(2024, 3, 2)),
        };
        let json = serde_json::to_value(&history).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "empresa": "Empresa A",
                "codigo": "AAAA3",
                "historicoPrecos": [{"data": "02/03/2024", "preco": 11.0, "volume": null}]
            })
        );
    }
}
