use super::ingestion::RawDocument;
use super::sniffer::FormatKind;
use crate::error::DecodeError;
use calamine::{Data, Range, Reader, Xlsx};
use chrono::NaiveDate;
use std::fmt;
use std::io::{BufReader, Read};
use tracing::{debug, info};

/// A single decoded cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    /// Cached result of a workbook formula. Never wraps `Empty`.
    FormulaResult(Box<Cell>),
}

impl Cell {
    /// Empty cells and whitespace-only text both count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            Cell::FormulaResult(inner) => inner.is_empty(),
            Cell::Number(_) | Cell::Date(_) => false,
        }
    }

    /// The value with any formula wrapper removed.
    pub fn value(&self) -> &Cell {
        match self {
            Cell::FormulaResult(inner) => inner.value(),
            other => other,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(text) => write!(f, "{}", text.trim()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Date(date) => write!(f, "{}", date.format("%d/%m/%Y")),
            Cell::FormulaResult(inner) => inner.fmt(f),
        }
    }
}

pub type Row = Vec<Cell>;

/// Rows of cells as laid out in the document. Rows may be shorter than the
/// header row; missing cells read as `Cell::Empty`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Row>,
}

static EMPTY: Cell = Cell::Empty;

impl Grid {
    /// Wraps decoded rows; the first one is the header.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// All rows, header included.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// First row, or an empty slice for an empty grid.
    pub fn header(&self) -> &[Cell] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Data rows, i.e. everything after the header.
    pub fn body(&self) -> &[Row] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Positional access; anything outside a row reads as empty.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

/// Decodes a fetched document into a grid according to its sniffed format.
///
/// # Errors
/// Returns a `DecodeError` if the archive cannot be opened or the text
/// table is malformed.
pub fn decode(document: &RawDocument) -> Result<Grid, DecodeError> {
    let file = document.open()?;
    let grid = match document.kind() {
        FormatKind::WorkbookArchive => {
            info!("processing workbook archive");
            decode_workbook(BufReader::new(file))?
        }
        FormatKind::DelimitedText => {
            info!("processing delimited text table");
            decode_delimited(file)?
        }
    };
    info!(rows = grid.len(), "rows decoded");
    Ok(grid)
}

/// Reads the first sheet of an XLSX package, substituting cached results for formulas.
pub fn decode_workbook<R>(reader: R) -> Result<Grid, DecodeError>
where
    R: Read + std::io::Seek,
{
    let mut workbook = Xlsx::new(reader)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(DecodeError::NoSheet)?;
    info!(sheet = %sheet_name, "worksheet found");

    let values = workbook
        .worksheet_range_at(0)
        .ok_or(DecodeError::NoSheet)??;
    let formulas = workbook.worksheet_formula(&sheet_name)?;

    Ok(grid_from_range(&values, &formulas))
}

fn grid_from_range(values: &Range<Data>, formulas: &Range<String>) -> Grid {
    let Some((first_row, first_col)) = values.start() else {
        return Grid::default();
    };

    let mut rows: Vec<Row> = vec![Vec::new(); first_row as usize];
    let mut formula_cells = 0usize;

    for (r, source) in values.rows().enumerate() {
        let abs_row = first_row + r as u32;
        let mut row: Row = vec![Cell::Empty; first_col as usize];

        for (c, data) in source.iter().enumerate() {
            let abs_col = first_col + c as u32;
            let cell = cell_from_data(data);
            let is_formula = formulas
                .get_value((abs_row, abs_col))
                .is_some_and(|f| !f.is_empty());

            row.push(match cell {
                Cell::Empty => Cell::Empty,
                cell if is_formula => {
                    formula_cells += 1;
                    Cell::FormulaResult(Box::new(cell))
                }
                cell => cell,
            });
        }

        while row.last() == Some(&Cell::Empty) {
            row.pop();
        }
        rows.push(row);
    }

    if formula_cells > 0 {
        debug!(formula_cells, "using cached formula results");
    }
    Grid::new(rows)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) if dt.is_datetime() => Cell::Date(datetime.date()),
            _ => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d")
            .map(Cell::Date)
            .unwrap_or_else(|_| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

/// Parses a comma-delimited table with no header inference; every non-empty field is text.
pub fn decode_delimited<R: Read>(reader: R) -> Result<Grid, DecodeError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (index, record) in csv_reader.byte_records().enumerate() {
        let record = record.map_err(|source| DecodeError::Table {
            line: source
                .position()
                .map(|p| p.line())
                .unwrap_or(index as u64 + 1),
            source,
        })?;

        let row: Row = record
            .iter()
            .map(|field| match String::from_utf8_lossy(field).trim() {
                "" => Cell::Empty,
                text => Cell::Text(text.to_string()),
            })
            .collect();
        rows.push(row);
    }

    Ok(Grid::new(rows))
}
