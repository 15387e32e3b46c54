//! Error types for the utilization core and the Cromwell client

use thiserror::Error;

/// Failures raised while parsing monitoring logs or aggregating utilization.
#[derive(Debug, Error)]
pub enum UtilizationError {
    /// A log block did not match the expected layout, or a field failed to parse.
    #[error("malformed monitoring log at line {line}: {reason}")]
    MalformedLog { line: usize, reason: String },

    /// A record reported zero available memory or disk, so no ratio can be computed.
    #[error("malformed monitoring log for task {task}: available {resource} is zero")]
    ZeroAvailable { task: String, resource: &'static str },

    /// A task produced no usable monitoring samples.
    #[error("no utilization data available for task {task}")]
    NoUtilizationData { task: String },

    /// A fold over one task was handed a record belonging to another.
    #[error("cannot merge utilization of task {found} into task {expected}")]
    TaskMismatch { expected: String, found: String },
}

impl UtilizationError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedLog {
            line,
            reason: reason.into(),
        }
    }

    /// True for every variant that signals an unreadable log rather than missing data.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedLog { .. } | Self::ZeroAvailable { .. })
    }
}

/// Errors surfaced by the Cromwell client, storage fetchers and reports.
#[derive(Debug, Error)]
pub enum CromwellError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cromwell API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to fetch {uri}: {reason}")]
    Storage { uri: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workflow {id} did not reach any of [{statuses}] within {timeout_secs}s (last status: {last})")]
    Timeout {
        id: String,
        statuses: String,
        last: String,
        timeout_secs: u64,
    },

    #[error("unusable workflow metadata: {0}")]
    Metadata(String),

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("invalid price list: {0}")]
    InvalidPriceList(String),

    #[error("cost calculation failed for task {task}: {reason}")]
    Cost { task: String, reason: String },

    #[error(transparent)]
    Utilization(#[from] UtilizationError),
}

pub type Result<T, E = CromwellError> = std::result::Result<T, E>;
