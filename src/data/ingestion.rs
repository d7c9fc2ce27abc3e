use super::sniffer::{classify, FormatKind};
use crate::error::FetchError;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Text the host embeds in the page it serves instead of large files.
pub const INTERSTITIAL_MARKER: &str = "Google Drive can't scan this file for viruses";

pub const DEFAULT_HOST_URL: &str = "https://drive.google.com";

/// What to do when the host answers without the interstitial page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Only the interstitial flow is trusted; anything else is an error.
    #[default]
    RequireInterstitial,
    /// A response without the interstitial is taken as the document itself.
    AcceptDirect,
}

/// A fetched document held in a temporary store.
///
/// The store is deleted when the document is dropped, so every exit path of
/// a run (failure, cancellation, success) releases it.
#[derive(Debug)]
pub struct RawDocument {
    store: NamedTempFile,
    kind: FormatKind,
    len: u64,
}

impl RawDocument {
    /// Wraps a filled temporary store, sniffing its format from the first bytes.
    fn from_store(mut store: NamedTempFile) -> io::Result<Self> {
        let file = store.as_file_mut();
        file.flush()?;
        let len = file.metadata()?.len();

        file.seek(SeekFrom::Start(0))?;
        let mut header = Vec::with_capacity(4);
        Read::by_ref(file).take(4).read_to_end(&mut header)?;

        Ok(Self {
            kind: classify(&header),
            store,
            len,
        })
    }

    /// Builds a document from bytes already in memory (non-network embedders, tests).
    ///
    /// # Arguments
    /// * `bytes`: Raw document content
    /// * `temp_dir`: Directory for the temporary store, or the system default when `None`
    pub fn from_bytes(bytes: &[u8], temp_dir: Option<&Path>) -> io::Result<Self> {
        let mut store = new_store(temp_dir)?;
        store.write_all(bytes)?;
        Self::from_store(store)
    }

    /// Format sniffed from the first bytes of the content.
    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    /// Size of the stored content in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Location of the temporary store. Only valid while `self` is alive.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Opens an independent read handle positioned at the start of the content.
    pub(crate) fn open(&self) -> io::Result<File> {
        self.store.reopen()
    }
}

fn new_store(temp_dir: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("downloaded_historic").suffix(".tmp");
    match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

lazy_static! {
    /// Submission URL of the interstitial download form
    static ref FORM_ACTION_REGEX: Regex =
        Regex::new(r#"action="([^"]+)""#).expect("Invalid regex pattern");

    /// Hidden `confirm` input of the download form
    static ref CONFIRM_TOKEN_REGEX: Regex =
        Regex::new(r#"name="confirm" value="([^"]+)""#).expect("Invalid regex pattern");

    /// Hidden `uuid` input of the download form (optional)
    static ref UUID_TOKEN_REGEX: Regex =
        Regex::new(r#"name="uuid" value="([^"]+)""#).expect("Invalid regex pattern");
}

/// Parameters of the download form embedded in the interstitial page.
#[derive(Debug, Clone, PartialEq)]
struct Interstitial {
    action: String,
    confirm: String,
    uuid: String,
}

impl Interstitial {
    fn parse(page: &str) -> Result<Self, FetchError> {
        let action = capture(&FORM_ACTION_REGEX, page).ok_or(
            FetchError::InterstitialUnparsable {
                missing: "form action",
            },
        )?;
        let confirm = capture(&CONFIRM_TOKEN_REGEX, page).ok_or(
            FetchError::InterstitialUnparsable {
                missing: "confirm token",
            },
        )?;
        let uuid = capture(&UUID_TOKEN_REGEX, page).unwrap_or_default();

        Ok(Self {
            action: action.replace("&amp;", "&"),
            confirm,
            uuid,
        })
    }
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Retrieves documents from the remote host.
///
/// The host answers a download request for large files with a virus-scan
/// warning page; the fetcher extracts the confirmation form from that page
/// and streams the real content into a temporary store.
pub struct DocumentFetcher {
    client: reqwest::Client,
    host_url: String,
    temp_dir: Option<PathBuf>,
    policy: FetchPolicy,
}

impl DocumentFetcher {
    /// Creates a fetcher for the host at `host_url` (scheme and authority, no path).
    pub fn new(host_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host_url: host_url.into(),
            temp_dir: None,
            policy: FetchPolicy::default(),
        }
    }

    /// Stages downloads in `temp_dir` instead of the system temporary directory.
    ///
    /// # Arguments
    /// * `temp_dir`: Directory for the temporary store, `None` for the system default
    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Sets how a response without the interstitial page is treated.
    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetches a document by its host identifier.
    ///
    /// # Errors
    /// - `UnexpectedResponse` if the host did not serve the interstitial page
    ///   (unless the policy accepts direct responses)
    /// - `InterstitialUnparsable` if the form action or confirm token is missing
    /// - `Transport` on any network or status failure
    /// - `Io` if the temporary store cannot be written
    pub async fn fetch(&self, document_id: &str) -> Result<RawDocument, FetchError> {
        let url = format!("{}/uc", self.host_url.trim_end_matches('/'));
        info!(document_id, "-- Starting -- document download");

        let response = self
            .client
            .get(&url)
            .query(&[("export", "download"), ("id", document_id)])
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        let page = String::from_utf8_lossy(&body);

        if !page.contains(INTERSTITIAL_MARKER) {
            return match self.policy {
                FetchPolicy::AcceptDirect if status.is_success() => {
                    warn!(document_id, "no interstitial page, keeping response as document");
                    let document = RawDocument::from_bytes(&body, self.temp_dir.as_deref())?;
                    info!(bytes = document.len(), format = %document.kind(), "download complete");
                    Ok(document)
                }
                _ => Err(FetchError::UnexpectedResponse),
            };
        }

        info!("virus-scan warning received, extracting direct download link");
        let form = Interstitial::parse(&page)?;
        debug!(action = %form.action, uuid = %form.uuid, "interstitial form parsed");

        let mut response = self
            .client
            .get(&form.action)
            .query(&[
                ("id", document_id),
                ("export", "download"),
                ("confirm", form.confirm.as_str()),
                ("uuid", form.uuid.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let mut store = new_store(self.temp_dir.as_deref())?;
        while let Some(chunk) = response.chunk().await? {
            store.write_all(&chunk)?;
        }

        let document = RawDocument::from_store(store)?;
        info!(bytes = document.len(), format = %document.kind(), "download complete");
        Ok(document)
    }
}
