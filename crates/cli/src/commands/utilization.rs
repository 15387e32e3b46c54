//! Resource utilization commands

use anyhow::{Context, Result};
use cromwell_lib::monitoring::parse_monitoring_log;
use cromwell_lib::{aggregate_by_task, CromwellClient, StorageFetcher, ToolMetrics, Workflow};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::output::{print_json, print_success, print_table, print_warning, OutputFormat, UtilizationRow};

#[derive(Serialize)]
struct FailureEntry {
    task: String,
    error: String,
}

/// Fetch monitoring logs of a workflow and report per-call utilization
pub async fn workflow_utilization(
    client: &CromwellClient,
    fetcher: &StorageFetcher,
    id: &str,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let report = Workflow::new(id, client).resource_utilization(fetcher).await?;

    if let Some(path) = &output {
        report
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    match format {
        OutputFormat::Json => {
            let tasks: BTreeMap<&str, _> = report
                .tasks
                .iter()
                .map(|t| (t.call.as_str(), &t.utilization))
                .collect();
            let failures: Vec<FailureEntry> = report
                .failures
                .iter()
                .map(|f| FailureEntry {
                    task: f.call.clone(),
                    error: f.error.to_string(),
                })
                .collect();
            print_json(&serde_json::json!({ "tasks": tasks, "failures": failures }))?;
        }
        OutputFormat::Table => {
            let rows: Vec<UtilizationRow> = report
                .tasks
                .iter()
                .map(|t| UtilizationRow::new(&t.call, &t.utilization))
                .collect();
            print_table(&rows);
            for failure in &report.failures {
                print_warning(&format!("{}: {}", failure.call, failure.error));
            }
            if let Some(path) = &output {
                print_success(&format!("Summary written to {}", path.display()));
            }
        }
    }

    Ok(())
}

/// Task name for a log file: its stem, or its directory for `monitoring.log`
fn task_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem == "monitoring" {
        if let Some(dir) = path.parent().and_then(Path::file_name) {
            return dir.to_string_lossy().into_owned();
        }
    }
    stem
}

/// Summarize local sidecar monitoring logs, merged per task
pub fn summarize(logs: &[PathBuf], task: Option<&str>, format: OutputFormat) -> Result<()> {
    let metrics = ToolMetrics::new();
    let mut samples = Vec::new();
    let mut failures = Vec::new();

    for path in logs {
        let name = task.map(str::to_string).unwrap_or_else(|| task_name_for(path));
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        match parse_monitoring_log(&name, text.lines()) {
            Ok(sample) => {
                metrics.inc_logs_parsed();
                metrics.add_samples_parsed(1);
                samples.push(sample);
            }
            Err(e) => {
                metrics.inc_parse_failures();
                failures.push(FailureEntry {
                    task: path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let aggregation = aggregate_by_task(samples);
    for _ in &aggregation.tasks {
        metrics.inc_tasks_aggregated();
    }
    for (task, error) in aggregation.failures {
        metrics.inc_task_failures();
        failures.push(FailureEntry {
            task,
            error: error.to_string(),
        });
    }

    match format {
        OutputFormat::Json => {
            print_json(&serde_json::json!({ "tasks": aggregation.tasks, "failures": failures }))?;
        }
        OutputFormat::Table => {
            let rows: Vec<UtilizationRow> = aggregation
                .tasks
                .iter()
                .map(|(name, record)| UtilizationRow::new(name, record))
                .collect();
            print_table(&rows);
            for failure in &failures {
                print_warning(&format!("{}: {}", failure.task, failure.error));
            }
        }
    }

    Ok(())
}
