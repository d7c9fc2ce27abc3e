//! Run orchestration: fetch, operator checkpoint, decode, demultiplex, assemble.
//!
//! A run walks `Idle → Fetching → Fetched → AwaitingConfirmation → Decoding
//! → Demuxing → Assembling → Done`, ending early in `FetchFailed`,
//! `Cancelled` or `DecodeFailed`. The fetched document owns the temporary
//! store, so leaving `run` on any path releases it.

use crate::data::demux::{demux, BLOCK_WIDTH};
use crate::data::grid::decode;
use crate::data::processing::{assemble_all, IngestResult};
use crate::data::sniffer::FormatKind;
use crate::data::DocumentFetcher;
use crate::error::PipelineError;
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Where a run currently is.
///
/// A run moves forward only: `Idle`, `Fetching`, `Fetched`,
/// `AwaitingConfirmation`, `Decoding`, `Demuxing`, `Assembling`, `Done`.
/// `FetchFailed`, `Cancelled` and `DecodeFailed` end it early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Fetching,
    FetchFailed,
    Fetched,
    AwaitingConfirmation,
    Cancelled,
    Decoding,
    DecodeFailed,
    Demuxing,
    Assembling,
    Done,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::FetchFailed
                | PipelineState::Cancelled
                | PipelineState::DecodeFailed
                | PipelineState::Done
        )
    }
}

/// What the operator is shown before deciding whether to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    pub bytes: u64,
    pub kind: FormatKind,
}

/// Operator checkpoint between fetch and decode.
#[async_trait]
pub trait Confirmation: Send + Sync {
    /// Returns `true` to continue with decoding, `false` to cancel the run.
    async fn confirm(&self, document_id: &str, summary: &FetchSummary) -> io::Result<bool>;
}

/// Asks on the terminal and waits for one line of input.
pub struct StdinPrompt {
    affirmative: String,
}

impl StdinPrompt {
    pub fn new(affirmative: impl Into<String>) -> Self {
        Self {
            affirmative: affirmative.into(),
        }
    }
}

#[async_trait]
impl Confirmation for StdinPrompt {
    async fn confirm(&self, document_id: &str, summary: &FetchSummary) -> io::Result<bool> {
        let question = format!(
            "\nDownloaded {} ({} bytes, {}). Continue processing the file? ({}/n): ",
            document_id, summary.bytes, summary.kind, self.affirmative
        );
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await?;
        stdout.flush().await?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await?;
        Ok(is_affirmative(&answer, &self.affirmative))
    }
}

/// Fixed answer, for embedders without a terminal.
pub struct AssumeAnswer(pub bool);

#[async_trait]
impl Confirmation for AssumeAnswer {
    async fn confirm(&self, _document_id: &str, _summary: &FetchSummary) -> io::Result<bool> {
        Ok(self.0)
    }
}

/// Only the exact affirmative token (ignoring case and surrounding whitespace) continues.
pub fn is_affirmative(answer: &str, affirmative: &str) -> bool {
    answer.trim().to_lowercase() == affirmative.trim().to_lowercase()
}

/// How a run that did not fail ended.
///
/// # Variants
/// * `Completed`: the assembled histories, ready for a sink
/// * `Cancelled`: the operator declined after the download
#[derive(Debug)]
pub enum RunOutcome {
    Completed(IngestResult),
    Cancelled,
}

/// One ingestion run for one document.
pub struct Pipeline {
    document_id: String,
    fetcher: DocumentFetcher,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(document_id: impl Into<String>, fetcher: DocumentFetcher) -> Self {
        Self {
            document_id: document_id.into(),
            fetcher,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
    }

    /// Runs the pipeline once.
    ///
    /// # Errors
    /// Fetch and decode failures are fatal and leave the pipeline in
    /// `FetchFailed` / `DecodeFailed`. A failed confirmation prompt leaves it
    /// in `Cancelled`. A pipeline that already left `Idle` cannot run again.
    pub async fn run(
        &mut self,
        confirmation: &dyn Confirmation,
    ) -> Result<RunOutcome, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRun {
                document_id: self.document_id.clone(),
            });
        }

        self.transition(PipelineState::Fetching);
        let document = match self.fetcher.fetch(&self.document_id).await {
            Ok(document) => document,
            Err(source) => {
                self.transition(PipelineState::FetchFailed);
                return Err(PipelineError::Fetch {
                    document_id: self.document_id.clone(),
                    source,
                });
            }
        };
        self.transition(PipelineState::Fetched);

        let summary = FetchSummary {
            bytes: document.len(),
            kind: document.kind(),
        };
        self.transition(PipelineState::AwaitingConfirmation);
        let proceed = match confirmation.confirm(&self.document_id, &summary).await {
            Ok(proceed) => proceed,
            Err(source) => {
                self.transition(PipelineState::Cancelled);
                return Err(PipelineError::Confirmation {
                    document_id: self.document_id.clone(),
                    source,
                });
            }
        };
        if !proceed {
            info!(document_id = %self.document_id, "processing cancelled by operator");
            self.transition(PipelineState::Cancelled);
            return Ok(RunOutcome::Cancelled);
        }

        self.transition(PipelineState::Decoding);
        info!(format = %summary.kind, "-- Starting -- file processing");
        let grid = match decode(&document) {
            Ok(grid) => grid,
            Err(source) => {
                self.transition(PipelineState::DecodeFailed);
                return Err(PipelineError::Decode {
                    document_id: self.document_id.clone(),
                    source,
                });
            }
        };
        drop(document);

        self.transition(PipelineState::Demuxing);
        let blocks = demux(&grid);
        let skipped = grid.header().len().div_ceil(BLOCK_WIDTH) - blocks.len();
        info!(instruments = blocks.len(), skipped, "instrument blocks found");

        self.transition(PipelineState::Assembling);
        let result = assemble_all(&grid, &blocks);

        self.transition(PipelineState::Done);
        Ok(RunOutcome::Completed(result))
    }
}
