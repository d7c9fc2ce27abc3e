use crate::data::ingestion::{FetchPolicy, DEFAULT_HOST_URL};
use crate::error::ConfigError;
use crate::output::DEFAULT_OUTPUT_PATH;
use std::env;
use std::path::PathBuf;

/// Runtime settings, read from the environment (a `.env` file is loaded first by the binary).
///
/// # Variables
/// * `HISTORY_DOCUMENT_ID`: host identifier of the history workbook (or first argument)
/// * `HISTORY_HOST_URL`: document host, defaults to Google Drive
/// * `HISTORY_OUTPUT_PATH`: JSON destination
/// * `HISTORY_TEMP_DIR`: where the download is staged, system default when unset
/// * `HISTORY_AFFIRMATIVE`: answer that continues past the confirmation prompt
/// * `HISTORY_ASSUME_YES`: skip the prompt and continue
/// * `HISTORY_ACCEPT_DIRECT`: accept a response served without the interstitial page
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub document_id: String,
    pub host_url: String,
    pub output_path: PathBuf,
    pub temp_dir: Option<PathBuf>,
    pub affirmative: String,
    pub assume_yes: bool,
    pub fetch_policy: FetchPolicy,
}

impl Config {
    /// Reads the settings from the process environment.
    ///
    /// The first command-line argument, when present, overrides `HISTORY_DOCUMENT_ID`.
    /// Blank values count as unset.
    ///
    /// # Errors
    /// `ConfigError::Missing` without a document id, `ConfigError::InvalidBool`
    /// for an unreadable flag
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), env::args().nth(1))
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        argument: Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let document_id = argument
            .or_else(|| var("HISTORY_DOCUMENT_ID"))
            .ok_or(ConfigError::Missing("HISTORY_DOCUMENT_ID"))?;

        let accept_direct = match var("HISTORY_ACCEPT_DIRECT") {
            Some(value) => parse_bool("HISTORY_ACCEPT_DIRECT", &value)?,
            None => false,
        };
        let assume_yes = match var("HISTORY_ASSUME_YES") {
            Some(value) => parse_bool("HISTORY_ASSUME_YES", &value)?,
            None => false,
        };

        Ok(Self {
            document_id,
            host_url: var("HISTORY_HOST_URL").unwrap_or_else(|| DEFAULT_HOST_URL.to_string()),
            output_path: var("HISTORY_OUTPUT_PATH")
                .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string())
                .into(),
            temp_dir: var("HISTORY_TEMP_DIR").map(PathBuf::from),
            affirmative: var("HISTORY_AFFIRMATIVE").unwrap_or_else(|| "s".to_string()),
            assume_yes,
            fetch_policy: if accept_direct {
                FetchPolicy::AcceptDirect
            } else {
                FetchPolicy::RequireInterstitial
            },
        })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "s" | "sim" => Ok(true),
        "0" | "false" | "no" | "n" | "nao" | "não" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}
