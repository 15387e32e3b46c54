//! Request and response payloads of the Cromwell REST API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Submitted,
    #[serde(rename = "On Hold")]
    OnHold,
    Running,
    Aborting,
    Aborted,
    Failed,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl WorkflowState {
    /// States reached right after a successful submission
    pub const ACCEPTED: [WorkflowState; 3] = [Self::Submitted, Self::Running, Self::Succeeded];

    /// States a workflow never leaves
    pub const TERMINAL: [WorkflowState; 3] = [Self::Aborted, Self::Failed, Self::Succeeded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::OnHold => "On Hold",
            Self::Running => "Running",
            Self::Aborting => "Aborting",
            Self::Aborted => "Aborted",
            Self::Failed => "Failed",
            Self::Succeeded => "Succeeded",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "submitted" => Ok(Self::Submitted),
            "onhold" => Ok(Self::OnHold),
            "running" => Ok(Self::Running),
            "aborting" => Ok(Self::Aborting),
            "aborted" => Ok(Self::Aborted),
            "failed" => Ok(Self::Failed),
            "succeeded" => Ok(Self::Succeeded),
            other => Err(format!("unknown workflow status '{}'", other)),
        }
    }
}

/// Response of the submit, status and abort endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub id: String,
    pub status: WorkflowState,
}

/// Filters for the query endpoint. Empty filters are omitted.
#[derive(Debug, Clone, Default)]
pub struct WorkflowQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub names: Vec<String>,
    pub ids: Vec<String>,
    pub statuses: Vec<WorkflowState>,
    pub labels: BTreeMap<String, String>,
}

impl WorkflowQuery {
    /// Query-string pairs, repeated keys for list filters
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = &self.start {
            pairs.push(("start".to_string(), start.to_rfc3339()));
        }
        if let Some(end) = &self.end {
            pairs.push(("end".to_string(), end.to_rfc3339()));
        }
        pairs.extend(self.names.iter().map(|n| ("name".to_string(), n.clone())));
        pairs.extend(self.ids.iter().map(|i| ("id".to_string(), i.clone())));
        pairs.extend(
            self.statuses
                .iter()
                .map(|s| ("status".to_string(), s.as_str().to_string())),
        );
        pairs.extend(
            self.labels
                .iter()
                .map(|(k, v)| ("label".to_string(), format!("{}:{}", k, v))),
        );
        pairs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
    #[serde(default)]
    pub total_results_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<WorkflowState>,
    #[serde(default)]
    pub submission: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// Where a submission file comes from
#[derive(Debug, Clone)]
pub enum SubmissionSource {
    /// Local path, `file://`, `gs://` or `http(s)://` location
    Location(String),
    /// Content already in memory
    Inline(Vec<u8>),
}

impl From<&str> for SubmissionSource {
    fn from(location: &str) -> Self {
        Self::Location(location.to_string())
    }
}

/// Files and labels for a new workflow
#[derive(Debug, Clone)]
pub struct Submission {
    pub workflow_source: SubmissionSource,
    pub inputs: SubmissionSource,
    pub options: Option<SubmissionSource>,
    pub labels: BTreeMap<String, String>,
    /// Pre-zipped imports archive
    pub dependencies: Option<SubmissionSource>,
}

impl Submission {
    pub fn new(workflow_source: impl Into<SubmissionSource>, inputs: impl Into<SubmissionSource>) -> Self {
        Self {
            workflow_source: workflow_source.into(),
            inputs: inputs.into(),
            options: None,
            labels: BTreeMap::new(),
            dependencies: None,
        }
    }

    pub fn with_options(mut self, options: impl Into<SubmissionSource>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_dependencies(mut self, archive: impl Into<SubmissionSource>) -> Self {
        self.dependencies = Some(archive.into());
        self
    }
}
