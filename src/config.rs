//! Sweep configuration file.
//!
//! The file is YAML with kebab-case keys. Generic keys (`days-before-stale`,
//! `stale-label`, `exempt-labels`) apply to both item classes; the `-issue-`
//! and `-pr-` forms override them per class.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use thiserror::Error;

use crate::policy::{Policies, Policy, SweepOptions, Threshold};

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".github/stale.yaml";
/// Default GitHub REST API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const DEFAULT_DAYS_BEFORE_STALE: i64 = 60;
const DEFAULT_DAYS_BEFORE_CLOSE: i64 = 7;
const DEFAULT_STALE_LABEL: &str = "Stale";
const DEFAULT_OPERATIONS_PER_RUN: u32 = 30;
const DEFAULT_GRACE_SECONDS: u32 = 60;

/// Errors raised while loading or resolving a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid YAML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
    /// The values parse but do not form a usable policy.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A label set written either as a YAML list or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LabelList {
    /// `[a, b]`
    Many(Vec<String>),
    /// `"a,b"`
    Joined(String),
}

impl LabelList {
    fn to_set(&self) -> BTreeSet<String> {
        let labels: Box<dyn Iterator<Item = &str>> = match self {
            LabelList::Many(labels) => Box::new(labels.iter().map(String::as_str)),
            LabelList::Joined(joined) => Box::new(joined.split(',')),
        };
        labels.map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect()
    }
}

/// Raw contents of a sweep config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
#[allow(missing_docs)]
pub struct SweepConfig {
    /// Repository identity guard, `owner/name`.
    pub repository: Option<String>,
    pub api_url: Option<String>,
    pub operations_per_run: Option<u32>,
    pub remove_stale_when_updated: Option<bool>,
    pub remove_stale_when_exempt: Option<bool>,
    pub stale_activity_grace_seconds: Option<u32>,
    pub dry_run: Option<bool>,

    pub days_before_stale: Option<i64>,
    pub days_before_close: Option<i64>,
    pub days_before_issue_stale: Option<i64>,
    pub days_before_issue_close: Option<i64>,
    pub days_before_pr_stale: Option<i64>,
    pub days_before_pr_close: Option<i64>,

    pub exempt_labels: Option<LabelList>,
    pub exempt_issue_labels: Option<LabelList>,
    pub exempt_pr_labels: Option<LabelList>,

    pub stale_label: Option<String>,
    pub stale_issue_label: Option<String>,
    pub stale_pr_label: Option<String>,

    pub stale_issue_message: Option<String>,
    pub stale_pr_message: Option<String>,
    pub close_issue_message: Option<String>,
    pub close_pr_message: Option<String>,

    pub close_issue_label: Option<String>,
    pub close_pr_label: Option<String>,
}

/// Fully resolved settings for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Policies per item class.
    pub policies: Policies,
    /// Run-wide options.
    pub options: SweepOptions,
    /// Repository the sweep is meant for, if guarded.
    pub repository: Option<String>,
    /// Tracker API base URL.
    pub api_url: String,
}

/// Class-specific keys of a [`SweepConfig`], borrowed for resolution.
struct ClassKeys<'a> {
    days_before_stale: Option<i64>,
    days_before_close: Option<i64>,
    exempt_labels: Option<&'a LabelList>,
    stale_label: Option<&'a String>,
    stale_message: Option<&'a String>,
    close_message: Option<&'a String>,
    close_label: Option<&'a String>,
}

impl SweepConfig {
    /// Loads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid config YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_yaml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Resolves defaults and per-class overrides into [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a stale label is empty or is also
    /// listed as an exempt label for the same class, or when
    /// `operations-per-run` cannot cover a single transition.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let issue = self.resolve_policy(&ClassKeys {
            days_before_stale: self.days_before_issue_stale,
            days_before_close: self.days_before_issue_close,
            exempt_labels: self.exempt_issue_labels.as_ref(),
            stale_label: self.stale_issue_label.as_ref(),
            stale_message: self.stale_issue_message.as_ref(),
            close_message: self.close_issue_message.as_ref(),
            close_label: self.close_issue_label.as_ref(),
        })?;
        let pull_request = self.resolve_policy(&ClassKeys {
            days_before_stale: self.days_before_pr_stale,
            days_before_close: self.days_before_pr_close,
            exempt_labels: self.exempt_pr_labels.as_ref(),
            stale_label: self.stale_pr_label.as_ref(),
            stale_message: self.stale_pr_message.as_ref(),
            close_message: self.close_pr_message.as_ref(),
            close_label: self.close_pr_label.as_ref(),
        })?;

        let options = SweepOptions {
            operations_per_run: self.operations_per_run.unwrap_or(DEFAULT_OPERATIONS_PER_RUN),
            remove_stale_when_updated: self.remove_stale_when_updated.unwrap_or(false),
            remove_stale_when_exempt: self.remove_stale_when_exempt.unwrap_or(false),
            activity_grace: Duration::seconds(i64::from(
                self.stale_activity_grace_seconds.unwrap_or(DEFAULT_GRACE_SECONDS),
            )),
            dry_run: self.dry_run.unwrap_or(false),
        };

        // Transitions are never split, so a smaller budget could never issue one.
        let needed = issue.largest_transition().max(pull_request.largest_transition());
        if options.operations_per_run < needed {
            return Err(ConfigError::Invalid(format!(
                "operations-per-run is {} but a single transition takes {needed} operations",
                options.operations_per_run
            )));
        }

        Ok(Settings {
            policies: Policies { issue, pull_request },
            options,
            repository: self.repository.clone().filter(|r| !r.trim().is_empty()),
            api_url: self.api_url.clone().unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        })
    }

    fn resolve_policy(&self, keys: &ClassKeys<'_>) -> Result<Policy, ConfigError> {
        let stale_label = keys
            .stale_label
            .or(self.stale_label.as_ref())
            .map_or(DEFAULT_STALE_LABEL, String::as_str)
            .trim()
            .to_string();
        if stale_label.is_empty() {
            return Err(ConfigError::Invalid("stale label must not be empty".to_string()));
        }

        let exempt_labels =
            keys.exempt_labels.or(self.exempt_labels.as_ref()).map(LabelList::to_set).unwrap_or_default();
        if exempt_labels.contains(&stale_label) {
            return Err(ConfigError::Invalid(format!(
                "stale label {stale_label:?} is also an exempt label"
            )));
        }

        Ok(Policy {
            days_before_stale: Threshold::from(
                keys.days_before_stale.or(self.days_before_stale).unwrap_or(DEFAULT_DAYS_BEFORE_STALE),
            ),
            days_before_close: Threshold::from(
                keys.days_before_close.or(self.days_before_close).unwrap_or(DEFAULT_DAYS_BEFORE_CLOSE),
            ),
            exempt_labels,
            stale_label,
            stale_message: non_blank(keys.stale_message),
            close_message: non_blank(keys.close_message),
            close_label: non_blank(keys.close_label),
        })
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(String::from)
}
