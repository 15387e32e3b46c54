//! Workflow lifecycle commands

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cromwell_lib::{
    CromwellClient, QueryResult, StorageFetcher, Submission, SubmissionSource, Workflow,
    WorkflowQuery, WorkflowState, WorkflowStatus,
};
use std::time::Duration;
use tabled::Tabled;

use crate::config::Config;
use crate::output::{color_status, print_info, print_json, print_success, print_table, OutputFormat};

/// Row for workflow query results
#[derive(Tabled)]
struct QueryRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Submitted")]
    submission: String,
    #[tabled(rename = "Ended")]
    end: String,
}

impl From<&QueryResult> for QueryRow {
    fn from(result: &QueryResult) -> Self {
        Self {
            id: result.id.clone(),
            name: result.name.clone().unwrap_or_else(|| "-".to_string()),
            status: result
                .status
                .map(color_status)
                .unwrap_or_else(|| "-".to_string()),
            submission: result.submission.clone().unwrap_or_else(|| "-".to_string()),
            end: result.end.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Arguments of the submit command
pub struct SubmitArgs {
    pub wdl: String,
    pub inputs: String,
    pub options: Option<String>,
    pub labels: Vec<(String, String)>,
    pub dependencies: Option<String>,
    pub no_wait: bool,
}

fn print_status(status: &WorkflowStatus, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(status),
        OutputFormat::Table => {
            println!("{}  {}", status.id, color_status(status.status));
            Ok(())
        }
    }
}

pub async fn submit(
    client: &CromwellClient,
    fetcher: &StorageFetcher,
    config: &Config,
    args: SubmitArgs,
    format: OutputFormat,
) -> Result<()> {
    let mut submission = Submission::new(
        SubmissionSource::Location(args.wdl),
        SubmissionSource::Location(args.inputs),
    );
    if let Some(options) = args.options {
        submission = submission.with_options(SubmissionSource::Location(options));
    }
    for (key, value) in args.labels {
        submission = submission.with_label(key, value);
    }
    if let Some(archive) = args.dependencies {
        submission = submission.with_dependencies(SubmissionSource::Location(archive));
    }

    let status = if args.no_wait {
        client.submit(&submission, fetcher).await?
    } else {
        let workflow = Workflow::submit(
            client,
            &submission,
            fetcher,
            Some(config.timeout()),
            config.poll_interval(),
        )
        .await
        .context("Workflow was not accepted")?;
        workflow.status().await?
    };

    if matches!(format, OutputFormat::Table) {
        print_success(&format!("Submitted workflow {}", status.id));
    }
    print_status(&status, format)
}

pub async fn status(client: &CromwellClient, id: &str, format: OutputFormat) -> Result<()> {
    let status = client.status(id).await?;
    print_status(&status, format)
}

/// Metadata is always printed as JSON
pub async fn metadata(client: &CromwellClient, id: &str, expand_subworkflows: bool) -> Result<()> {
    let metadata = client.raw_metadata(id, expand_subworkflows).await?;
    print_json(&metadata)
}

pub async fn abort(client: &CromwellClient, id: &str, format: OutputFormat) -> Result<()> {
    let status = client.abort(id).await?;
    if matches!(format, OutputFormat::Table) {
        print_success(&format!("Abort requested for {}", id));
    }
    print_status(&status, format)
}

/// Filters of the query command
pub struct QueryArgs {
    pub names: Vec<String>,
    pub ids: Vec<String>,
    pub statuses: Vec<WorkflowState>,
    pub labels: Vec<(String, String)>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

pub async fn query(client: &CromwellClient, args: QueryArgs, format: OutputFormat) -> Result<()> {
    let query = WorkflowQuery {
        start: args.start,
        end: args.end,
        names: args.names,
        ids: args.ids,
        statuses: args.statuses,
        labels: args.labels.into_iter().collect(),
    };

    let response = client.query(&query).await?;
    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let rows: Vec<QueryRow> = response.results.iter().map(QueryRow::from).collect();
            print_table(&rows);
            if let Some(total) = response.total_results_count {
                print_info(&format!("{} workflows matched", total));
            }
        }
    }
    Ok(())
}

pub async fn wait(
    client: &CromwellClient,
    config: &Config,
    id: &str,
    statuses: Vec<WorkflowState>,
    timeout_secs: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let targets = if statuses.is_empty() {
        WorkflowState::TERMINAL.to_vec()
    } else {
        statuses
    };

    let status = client
        .wait_for_status(
            id,
            &targets,
            timeout_secs.map(Duration::from_secs),
            config.poll_interval(),
        )
        .await?;
    print_status(&status, format)
}
