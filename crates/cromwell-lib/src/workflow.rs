//! A single workflow run and its resource utilization report

use crate::aggregate::aggregate_task;
use crate::client::CromwellClient;
use crate::error::{CromwellError, Result};
use crate::metadata::WorkflowMetadata;
use crate::models::{Submission, WorkflowState, WorkflowStatus};
use crate::monitoring::parse_monitoring_bytes;
use crate::observability::ToolMetrics;
use crate::storage::ObjectFetcher;
use crate::utilization::ResourceUtilization;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Handle binding a workflow id to the server that runs it
pub struct Workflow<'a> {
    id: String,
    client: &'a CromwellClient,
}

impl<'a> Workflow<'a> {
    pub fn new(id: impl Into<String>, client: &'a CromwellClient) -> Self {
        Self {
            id: id.into(),
            client,
        }
    }

    /// Submit and wait until the server has accepted the workflow
    pub async fn submit(
        client: &'a CromwellClient,
        submission: &Submission,
        fetcher: &dyn ObjectFetcher,
        timeout: Option<Duration>,
        delay: Duration,
    ) -> Result<Workflow<'a>> {
        let status = client.submit(submission, fetcher).await?;
        let workflow = Self::new(status.id, client);
        client
            .wait_for_status(&workflow.id, &WorkflowState::ACCEPTED, timeout, delay)
            .await?;
        Ok(workflow)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn status(&self) -> Result<WorkflowStatus> {
        self.client.status(&self.id).await
    }

    pub async fn metadata(&self) -> Result<WorkflowMetadata> {
        self.client.metadata(&self.id, true).await
    }

    pub async fn outputs(&self) -> Result<Value> {
        self.client.outputs(&self.id).await
    }

    pub async fn logs(&self) -> Result<Value> {
        self.client.logs(&self.id).await
    }

    pub async fn abort(&self) -> Result<WorkflowStatus> {
        self.client.abort(&self.id).await
    }

    pub fn timing_url(&self) -> Result<Url> {
        self.client.timing_url(&self.id)
    }

    pub async fn wait_until_complete(
        &self,
        timeout: Option<Duration>,
        delay: Duration,
    ) -> Result<WorkflowStatus> {
        self.client
            .wait_for_status(&self.id, &WorkflowState::TERMINAL, timeout, delay)
            .await
    }

    /// Fetch every call's monitoring logs and merge them per call
    pub async fn resource_utilization(&self, fetcher: &dyn ObjectFetcher) -> Result<UtilizationReport> {
        let metadata = self.metadata().await?;
        let mut report = UtilizationReport::default();
        collect_utilization(&metadata, fetcher, &mut report).await;

        info!(
            workflow_id = %self.id,
            tasks = report.tasks.len(),
            failures = report.failures.len(),
            "Collected resource utilization"
        );
        Ok(report)
    }
}

/// Merged utilization of one call across its shards and attempts
#[derive(Debug, Clone)]
pub struct TaskUtilization {
    /// Fully qualified call name
    pub call: String,
    pub utilization: ResourceUtilization,
    /// Number of monitoring logs merged
    pub shards: usize,
}

#[derive(Debug)]
pub struct TaskFailure {
    pub call: String,
    pub error: CromwellError,
}

#[derive(Debug, Default)]
pub struct UtilizationReport {
    pub tasks: Vec<TaskUtilization>,
    pub failures: Vec<TaskFailure>,
}

impl UtilizationReport {
    /// Write one summary block per task
    pub fn write_summary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for task in &self.tasks {
            write!(writer, "{}", task.utilization)?;
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::create(path.as_ref())?;
        self.write_summary(&mut file)?;
        file.flush()?;
        Ok(())
    }

    pub fn summary(&self) -> String {
        self.tasks
            .iter()
            .map(|task| task.utilization.to_string())
            .collect()
    }

    fn fail(&mut self, call: &str, error: CromwellError) {
        warn!(call = %call, error = %error, "Skipping call utilization");
        ToolMetrics::new().inc_task_failures();
        self.failures.push(TaskFailure {
            call: call.to_string(),
            error,
        });
    }
}

/// Walk the call records of `metadata`, descending into embedded subworkflows.
///
/// Calls without any monitoring log are reported as failures; a call whose
/// logs cannot all be fetched and parsed is not reported at all.
pub async fn collect_utilization(
    metadata: &WorkflowMetadata,
    fetcher: &dyn ObjectFetcher,
    report: &mut UtilizationReport,
) {
    let metrics = ToolMetrics::new();

    for (call, shards) in &metadata.calls {
        // every shard of a call is folded under one name
        let task_name = shards
            .iter()
            .find(|shard| !shard.is_subworkflow())
            .map(|shard| shard.task_name(call))
            .unwrap_or(call.as_str());
        let mut samples = Vec::new();
        let mut has_tasks = false;
        let mut failed = false;

        for shard in shards {
            if shard.is_subworkflow() {
                match &shard.sub_workflow_metadata {
                    Some(sub) => {
                        debug!(call = %call, "Descending into subworkflow");
                        Box::pin(collect_utilization(sub, fetcher, report)).await;
                    }
                    None => report.fail(
                        call,
                        CromwellError::Metadata(format!(
                            "subworkflow {} was not expanded in the metadata",
                            shard.sub_workflow_id.as_deref().unwrap_or_default()
                        )),
                    ),
                }
                continue;
            }

            has_tasks = true;
            let Some(log) = &shard.monitoring_log else {
                continue;
            };

            let parsed = match fetcher.fetch(log).await {
                Ok(bytes) => parse_monitoring_bytes(task_name, &bytes)
                    .map_err(CromwellError::from),
                Err(e) => Err(e),
            };

            match parsed {
                Ok(sample) => {
                    metrics.inc_logs_parsed();
                    metrics.add_samples_parsed(1);
                    samples.push(sample);
                }
                Err(e) => {
                    metrics.inc_parse_failures();
                    report.fail(call, e);
                    failed = true;
                    break;
                }
            }
        }

        if !has_tasks || failed {
            continue;
        }

        let count = samples.len();
        match aggregate_task(task_name, samples) {
            Ok(utilization) => {
                metrics.inc_tasks_aggregated();
                report.tasks.push(TaskUtilization {
                    call: call.clone(),
                    utilization,
                    shards: count,
                });
            }
            Err(e) => report.fail(call, e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UtilizationError;
    use crate::monitoring::parse_summary_text;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MemoryFetcher {
        objects: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ObjectFetcher for MemoryFetcher {
        async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
            self.objects
                .get(uri)
                .cloned()
                .ok_or_else(|| CromwellError::Storage {
                    uri: uri.to_string(),
                    reason: "no such object".to_string(),
                })
        }
    }

    fn sidecar_log(memory_mb: &[u64], disk_kb: &[u64]) -> Vec<u8> {
        let mut log = String::from(
            "--- General Information ---\n\
             #CPU: 1\n\
             Total Memory (MB): 3000\n\
             Total Disk space (KB): 10190136\n\
             --- Runtime Information ---\n",
        );
        for (mem, disk) in memory_mb.iter().zip(disk_kb) {
            log.push_str(&format!("* Memory usage (MB): {}\n", mem));
            log.push_str(&format!("* Disk usage (KB): {}\n", disk));
        }
        log.into_bytes()
    }

    const METADATA: &str = r#"{
        "id": "wf-1",
        "calls": {
            "scaling.align": [
                {"executionStatus": "Done", "shardIndex": 0,
                 "labels": {"wdl-task-name": "align"},
                 "monitoringLog": "gs://bucket/align/shard-0/monitoring.log"},
                {"executionStatus": "Done", "shardIndex": 1,
                 "labels": {"wdl-task-name": "align"},
                 "monitoringLog": "gs://bucket/align/shard-1/monitoring.log"},
                {"executionStatus": "Done", "shardIndex": 2,
                 "labels": {"wdl-task-name": "align"}}
            ],
            "scaling.sort": [
                {"executionStatus": "Done",
                 "labels": {"wdl-task-name": "sort"},
                 "monitoringLog": "gs://bucket/sort/missing.log"}
            ],
            "scaling.count": [
                {"executionStatus": "Done", "labels": {"wdl-task-name": "count"}}
            ],
            "scaling.sub": [
                {"executionStatus": "Done",
                 "subWorkflowMetadata": {
                    "id": "wf-2",
                    "calls": {
                        "inner.merge": [
                            {"executionStatus": "Done",
                             "labels": {"wdl-task-name": "merge"},
                             "monitoringLog": "gs://bucket/merge/monitoring.log"}
                        ]
                    }
                 }}
            ]
        }
    }"#;

    fn fetcher() -> MemoryFetcher {
        let mut objects = HashMap::new();
        objects.insert(
            "gs://bucket/align/shard-0/monitoring.log".to_string(),
            sidecar_log(&[100, 300, 200], &[1000, 1500, 1200]),
        );
        objects.insert(
            "gs://bucket/align/shard-1/monitoring.log".to_string(),
            sidecar_log(&[400, 250, 120], &[900, 800, 700]),
        );
        objects.insert(
            "gs://bucket/merge/monitoring.log".to_string(),
            sidecar_log(&[50], &[10]),
        );
        MemoryFetcher { objects }
    }

    #[tokio::test]
    async fn test_collects_each_call_once() {
        let metadata = WorkflowMetadata::from_json(METADATA).unwrap();
        let mut report = UtilizationReport::default();
        collect_utilization(&metadata, &fetcher(), &mut report).await;

        let calls: Vec<&str> = report.tasks.iter().map(|t| t.call.as_str()).collect();
        assert_eq!(calls, vec!["scaling.align", "inner.merge"]);

        let align = &report.tasks[0];
        assert_eq!(align.shards, 2);
        assert_eq!(align.utilization.task_name(), "align");
        assert_eq!(align.utilization.max_memory_mb(), 400);
        assert_eq!(align.utilization.max_disk_kb(), 1500);
        assert_eq!(align.utilization.available_memory_mb(), 3000);
        assert!(align.utilization.robust());

        let merge = &report.tasks[1];
        assert!(!merge.utilization.robust());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_calls() {
        let metadata = WorkflowMetadata::from_json(METADATA).unwrap();
        let mut report = UtilizationReport::default();
        collect_utilization(&metadata, &fetcher(), &mut report).await;

        let failed: Vec<&str> = report.failures.iter().map(|f| f.call.as_str()).collect();
        assert_eq!(failed, vec!["scaling.count", "scaling.sort"]);

        assert!(matches!(
            report.failures[0].error,
            CromwellError::Utilization(UtilizationError::NoUtilizationData { .. })
        ));
        assert!(matches!(
            report.failures[1].error,
            CromwellError::Storage { .. }
        ));
    }

    #[tokio::test]
    async fn test_shards_with_differing_labels_fold_under_one_name() {
        let metadata = WorkflowMetadata::from_json(
            r#"{"calls": {"scaling.align": [
                {"executionStatus": "Done", "shardIndex": 0,
                 "labels": {"wdl-task-name": "align"},
                 "monitoringLog": "gs://bucket/align/shard-0/monitoring.log"},
                {"executionStatus": "Done", "shardIndex": 1,
                 "monitoringLog": "gs://bucket/align/shard-1/monitoring.log"}
            ]}}"#,
        )
        .unwrap();
        let mut report = UtilizationReport::default();
        collect_utilization(&metadata, &fetcher(), &mut report).await;

        assert!(report.failures.is_empty());
        assert_eq!(report.tasks.len(), 1);
        let align = &report.tasks[0];
        assert_eq!(align.shards, 2);
        assert_eq!(align.utilization.task_name(), "align");
        assert_eq!(align.utilization.max_memory_mb(), 400);
    }

    #[tokio::test]
    async fn test_unexpanded_subworkflow_is_reported() {
        let metadata = WorkflowMetadata::from_json(
            r#"{"calls": {"wf.sub": [{"executionStatus": "Done", "subWorkflowId": "abc"}]}}"#,
        )
        .unwrap();
        let mut report = UtilizationReport::default();
        collect_utilization(&metadata, &fetcher(), &mut report).await;

        assert!(report.tasks.is_empty());
        assert!(matches!(report.failures[0].error, CromwellError::Metadata(_)));
    }

    #[tokio::test]
    async fn test_saved_summary_reparses() {
        let metadata = WorkflowMetadata::from_json(METADATA).unwrap();
        let mut report = UtilizationReport::default();
        collect_utilization(&metadata, &fetcher(), &mut report).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utilization.txt");
        report.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, report.summary());
        let records = parse_summary_text(&text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].task_name(), "align");
        assert_eq!(records[0].max_memory_mb(), 400);
    }

    #[tokio::test]
    async fn test_resource_utilization_from_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/workflows/v1/wf-1/metadata")
            .match_query(mockito::Matcher::UrlEncoded(
                "expandSubWorkflows".into(),
                "true".into(),
            ))
            .with_status(200)
            .with_body(METADATA)
            .create_async()
            .await;

        let client = CromwellClient::new(&server.url()).unwrap();
        let workflow = Workflow::new("wf-1", &client);
        let report = workflow.resource_utilization(&fetcher()).await.unwrap();

        assert_eq!(report.tasks.len(), 2);
        assert_eq!(report.failures.len(), 2);
    }
}
