use super::grid::{Cell, Grid};
use tracing::debug;

/// Columns occupied by one instrument.
pub const BLOCK_WIDTH: usize = 4;

const DATE_OFFSET: usize = 0;
const PRICE_OFFSET: usize = 1;
const VOLUME_OFFSET: usize = 2;

/// One instrument's column span in the grid.
///
/// The header row carries identity (`name`, `code` in the first two
/// columns); every later row carries `date`, `price`, `volume` in the
/// first three columns of the same span.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentBlock {
    pub name: String,
    pub code: String,
    pub start: usize,
}

/// Raw cells of one body row within a block.
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    pub date: &'a Cell,
    pub price: &'a Cell,
    pub volume: &'a Cell,
}

impl InstrumentBlock {
    /// Body rows reaching into this block. Rows that end before the block
    /// starts are not part of it.
    pub fn rows<'a>(&self, grid: &'a Grid) -> impl Iterator<Item = RawRow<'a>> + 'a {
        let start = self.start;
        grid.body()
            .iter()
            .enumerate()
            .filter(move |(_, row)| row.len() > start)
            .map(move |(i, _)| RawRow {
                date: grid.cell(i + 1, start + DATE_OFFSET),
                price: grid.cell(i + 1, start + PRICE_OFFSET),
                volume: grid.cell(i + 1, start + VOLUME_OFFSET),
            })
    }
}

/// Splits the grid into instrument blocks.
///
/// Blocks whose header name or code is empty are skipped, and the scan
/// carries on to the end of the header row.
pub fn demux(grid: &Grid) -> Vec<InstrumentBlock> {
    let header = grid.header();

    (0..header.len())
        .step_by(BLOCK_WIDTH)
        .filter_map(|start| {
            let name = identity(grid.cell(0, start));
            let code = identity(grid.cell(0, start + 1));
            match (name, code) {
                (Some(name), Some(code)) => Some(InstrumentBlock { name, code, start }),
                _ => {
                    debug!(column = start, "skipping block without name or code");
                    None
                }
            }
        })
        .collect()
}

fn identity(cell: &Cell) -> Option<String> {
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}
