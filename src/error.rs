use thiserror::Error;

/// Failures while retrieving a document from the remote host.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("interstitial page found but {missing} could not be extracted")]
    InterstitialUnparsable { missing: &'static str },

    #[error("host did not answer with the expected interstitial page")]
    UnexpectedResponse,

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("temporary store failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural failures while turning a fetched document into a grid.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unreadable workbook archive: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("workbook archive has no worksheet")]
    NoSheet,

    #[error("malformed delimited table at line {line}: {source}")]
    Table {
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("could not read temporary store: {0}")]
    Io(#[from] std::io::Error),
}

/// A date cell that could not be turned into a calendar date.
///
/// Local to a single row: the row is dropped, the run continues.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot normalize date cell `{raw}`")]
pub struct NormalizationFailure {
    pub raw: String,
}

/// Failures writing the assembled histories.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("could not write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize histories: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Missing or malformed settings, reported before any network traffic.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set (environment or first argument)")]
    Missing(&'static str),

    #[error("{name} has invalid boolean value `{value}`")]
    InvalidBool { name: &'static str, value: String },
}

/// Fatal run failures, tagged with the document being processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetching document {document_id} failed: {source}")]
    Fetch {
        document_id: String,
        #[source]
        source: FetchError,
    },

    #[error("operator confirmation for document {document_id} failed: {source}")]
    Confirmation {
        document_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decoding document {document_id} failed: {source}")]
    Decode {
        document_id: String,
        #[source]
        source: DecodeError,
    },

    #[error("pipeline for document {document_id} was already run")]
    AlreadyRun { document_id: String },
}
