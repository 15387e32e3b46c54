//! Typed workflow metadata
//!
//! Cromwell's metadata document is decoded into explicit records at the
//! boundary. Every call record must carry an `executionStatus`; a document
//! missing it is rejected as a whole instead of failing later.

use crate::error::Result;
use crate::models::WorkflowState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Label Cromwell attaches to every call with the bare task name
pub const TASK_NAME_LABEL: &str = "wdl-task-name";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub status: Option<WorkflowState>,
    #[serde(default)]
    pub workflow_root: Option<String>,
    #[serde(default)]
    pub inputs: Option<Value>,
    #[serde(default)]
    pub outputs: Option<Value>,
    /// Call records keyed by fully qualified call name, one entry per shard/attempt
    #[serde(default)]
    pub calls: BTreeMap<String, Vec<CallMetadata>>,
}

impl WorkflowMetadata {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Execution status of one call attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    NotStarted,
    QueuedInCromwell,
    Starting,
    Running,
    Aborting,
    Aborted,
    Failed,
    RetryableFailure,
    Preempted,
    Done,
    Bypassed,
    Unstartable,
    #[serde(other)]
    Other,
}

impl ExecutionStatus {
    /// Still waiting or executing; no cost or utilization is final yet
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Running | Self::NotStarted | Self::Starting)
    }

    /// Lost to preemption; RetryableFailure is its general form
    pub fn is_preempted(&self) -> bool {
        matches!(self, Self::Preempted | Self::RetryableFailure)
    }
}

/// One shard/attempt of a call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub execution_status: ExecutionStatus,
    #[serde(default = "unscattered")]
    pub shard_index: i64,
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    #[serde(default)]
    pub monitoring_log: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub sub_workflow_id: Option<String>,
    /// Present when metadata was requested with `expandSubWorkflows=true`
    #[serde(default)]
    pub sub_workflow_metadata: Option<Box<WorkflowMetadata>>,
    #[serde(default)]
    pub runtime_attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub jes: Option<JesInfo>,
    #[serde(default)]
    pub call_caching: Option<CallCaching>,
    #[serde(default)]
    pub execution_events: Vec<ExecutionEvent>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

fn unscattered() -> i64 {
    -1
}

fn first_attempt() -> u32 {
    1
}

impl CallMetadata {
    /// Bare task name from the call labels, falling back to the call key.
    pub fn task_name<'a>(&'a self, call_key: &'a str) -> &'a str {
        self.labels
            .get(TASK_NAME_LABEL)
            .map(String::as_str)
            .unwrap_or(call_key)
    }

    pub fn is_subworkflow(&self) -> bool {
        self.sub_workflow_id.is_some() || self.sub_workflow_metadata.is_some()
    }

    /// Runtime attribute as text; Cromwell reports most of them as strings.
    pub fn runtime_attribute(&self, key: &str) -> Option<String> {
        match self.runtime_attributes.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn cache_hit(&self) -> bool {
        self.call_caching.as_ref().is_some_and(|c| c.hit)
    }

    /// Machine type without its zone prefix, e.g. `n1-standard-1`
    pub fn machine_type(&self) -> Option<&str> {
        let full = self.jes.as_ref()?.machine_type.as_deref()?;
        full.rsplit('/').next().filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JesInfo {
    #[serde(default)]
    pub machine_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallCaching {
    #[serde(default)]
    pub hit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
