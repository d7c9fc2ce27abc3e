pub mod dates;
pub mod demux;
pub mod grid;
pub mod ingestion;
pub mod processing;
pub mod sniffer;

pub use dates::{normalize, PointDate};
pub use demux::{demux, InstrumentBlock};
pub use grid::{decode, Cell, Grid};
pub use ingestion::{DocumentFetcher, FetchPolicy, RawDocument};
pub use processing::{assemble, assemble_all, HistoryPoint, IngestResult, InstrumentHistory};
pub use sniffer::{classify, FormatKind};
