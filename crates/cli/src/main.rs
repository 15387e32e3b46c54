//! Cromwell CLI
//!
//! A command-line tool for submitting and inspecting Cromwell workflows,
//! summarizing task resource utilization and estimating workflow cost.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{cost, scaling, utilization, workflow};
use cromwell_lib::cost::CostOptions;
use cromwell_lib::{CromwellClient, StorageFetcher, ToolMetrics, UtilizationAttribute, WorkflowState};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Cromwell CLI
#[derive(Parser)]
#[command(name = "cromwell")]
#[command(author, version, about = "CLI for Cromwell workflows and resource utilization", long_about = None)]
pub struct Cli {
    /// Cromwell server URL (default http://localhost:8000)
    #[arg(long, env = "CROMWELL_URL")]
    pub url: Option<String>,

    /// Basic auth username
    #[arg(long, env = "CROMWELL_USERNAME")]
    pub username: Option<String>,

    /// Basic auth password
    #[arg(long, env = "CROMWELL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// REST API version
    #[arg(long, env = "CROMWELL_API_VERSION")]
    pub api_version: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Write logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Print collected metrics to stderr on exit
    #[arg(long)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a workflow
    Submit {
        /// WDL file (local path, gs:// or http(s):// URI)
        wdl: String,

        /// Inputs JSON file
        inputs: String,

        /// Workflow options JSON file
        #[arg(long)]
        options: Option<String>,

        /// Workflow label, repeatable
        #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        labels: Vec<(String, String)>,

        /// Pre-zipped archive of imported WDL files
        #[arg(long)]
        dependencies: Option<String>,

        /// Return right after submission instead of waiting for acceptance
        #[arg(long)]
        no_wait: bool,
    },

    /// Show workflow status
    Status {
        /// Workflow ID
        id: String,
    },

    /// Print workflow metadata as JSON
    Metadata {
        /// Workflow ID
        id: String,

        /// Embed subworkflow metadata
        #[arg(long)]
        expand_subworkflows: bool,
    },

    /// Abort a running workflow
    Abort {
        /// Workflow ID
        id: String,
    },

    /// Query workflows
    Query {
        /// Filter by workflow name, repeatable
        #[arg(long = "name")]
        names: Vec<String>,

        /// Filter by workflow ID, repeatable
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Filter by status, repeatable
        #[arg(long = "status")]
        statuses: Vec<WorkflowState>,

        /// Filter by label, repeatable
        #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        labels: Vec<(String, String)>,

        /// Only workflows started after this RFC 3339 time
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Only workflows ended before this RFC 3339 time
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },

    /// Wait until a workflow reaches a status
    Wait {
        /// Workflow ID
        id: String,

        /// Target status, repeatable (default: any terminal status)
        #[arg(long = "status")]
        statuses: Vec<WorkflowState>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Report per-task resource utilization of a workflow
    Utilization {
        /// Workflow ID
        id: String,

        /// Also write the summary report to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Summarize local task monitoring logs
    Summarize {
        /// Monitoring log files
        #[arg(required = true)]
        logs: Vec<PathBuf>,

        /// Task name for every log (default: derived from the file name)
        #[arg(long)]
        task: Option<String>,
    },

    /// Compare utilization summaries of runs with different input sizes
    Scaling {
        /// Summary report per run
        #[arg(required = true, value_name = "SIZE=FILE", value_parser = scaling::parse_run)]
        runs: Vec<(u64, PathBuf)>,

        /// Attribute to chart
        #[arg(long, short)]
        attribute: UtilizationAttribute,

        /// Shift each series so its minimum is 1
        #[arg(long)]
        remove_constant: bool,
    },

    /// Estimate Compute Engine cost of a workflow from its metadata
    Cost {
        /// Metadata JSON file
        #[arg(long, short)]
        metadata: PathBuf,

        /// Bill preempted attempts as zero hours
        #[arg(long)]
        ignore_preempted: bool,

        /// Only print the workflow total
        #[arg(long)]
        only_total: bool,

        /// Print per-task rows as tab-separated values
        #[arg(long)]
        tsv: bool,

        /// Local price list JSON instead of downloading it
        #[arg(long)]
        price_list: Option<PathBuf>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = config::Config::load()?.with_overrides(
        cli.url.clone(),
        cli.username.clone(),
        cli.password.clone(),
        cli.api_version.clone(),
    );
    debug!(url = %config.url, api_version = %config.api_version, "CLI configured");

    let client = CromwellClient::with_config(&config.client_config())
        .context("Invalid Cromwell server configuration")?;
    let mut fetcher = StorageFetcher::new(&config.storage_endpoint)
        .context("Invalid storage endpoint")?;
    if let Some(token) = &config.storage_token {
        fetcher = fetcher.with_token(token.clone());
    }

    let format = cli.format;
    let result = match cli.command {
        Commands::Submit {
            wdl,
            inputs,
            options,
            labels,
            dependencies,
            no_wait,
        } => {
            let args = workflow::SubmitArgs {
                wdl,
                inputs,
                options,
                labels,
                dependencies,
                no_wait,
            };
            workflow::submit(&client, &fetcher, &config, args, format).await
        }
        Commands::Status { id } => workflow::status(&client, &id, format).await,
        Commands::Metadata {
            id,
            expand_subworkflows,
        } => workflow::metadata(&client, &id, expand_subworkflows).await,
        Commands::Abort { id } => workflow::abort(&client, &id, format).await,
        Commands::Query {
            names,
            ids,
            statuses,
            labels,
            start,
            end,
        } => {
            let args = workflow::QueryArgs {
                names,
                ids,
                statuses,
                labels,
                start,
                end,
            };
            workflow::query(&client, args, format).await
        }
        Commands::Wait {
            id,
            statuses,
            timeout,
        } => workflow::wait(&client, &config, &id, statuses, timeout, format).await,
        Commands::Utilization { id, output } => {
            utilization::workflow_utilization(&client, &fetcher, &id, output, format).await
        }
        Commands::Summarize { logs, task } => utilization::summarize(&logs, task.as_deref(), format),
        Commands::Scaling {
            runs,
            attribute,
            remove_constant,
        } => scaling::scaling(&runs, attribute, remove_constant, format),
        Commands::Cost {
            metadata,
            ignore_preempted,
            only_total,
            tsv,
            price_list,
        } => {
            let options = CostOptions { ignore_preempted };
            cost::cost(
                &client,
                &metadata,
                price_list.as_deref(),
                options,
                only_total,
                tsv,
                format,
            )
            .await
        }
    };

    if cli.print_metrics {
        eprint!("{}", ToolMetrics::new().render());
    }

    result
}
