//! Reconstructs per-instrument price histories from a spreadsheet hosted
//! behind a virus-scan interstitial page.

pub mod config;
pub mod data;
pub mod error;
pub mod output;
pub mod pipeline;

pub use config::Config;
pub use error::{DecodeError, FetchError, PipelineError};
pub use pipeline::{Pipeline, PipelineState, RunOutcome};
