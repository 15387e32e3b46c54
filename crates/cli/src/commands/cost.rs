//! Workflow cost estimate from saved metadata

use anyhow::{Context, Result};
use colored::Colorize;
use cromwell_lib::cost::{calculate_cost, CostOptions, CostReport, PriceList, GCE_PRICE_LIST_URL};
use cromwell_lib::metadata::WorkflowMetadata;
use cromwell_lib::CromwellClient;
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_currency, print_json, print_table, OutputFormat};

/// Row for per-task costs
#[derive(Tabled)]
struct CostRow {
    #[tabled(rename = "Task")]
    task: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Machine")]
    machine_type: String,
    #[tabled(rename = "Hours")]
    hours: String,
    #[tabled(rename = "PE Hours")]
    pe_hours: String,
    #[tabled(rename = "Preempted Hours")]
    failed_pe_hours: String,
    #[tabled(rename = "Disk")]
    disk: String,
    #[tabled(rename = "Cost")]
    cost: String,
}

async fn load_prices(client: &CromwellClient, price_list: Option<&Path>) -> Result<PriceList> {
    match price_list {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(PriceList::from_slice(&bytes)?)
        }
        None => client
            .fetch_price_list(GCE_PRICE_LIST_URL)
            .await
            .context("Failed to download the Compute Engine price list"),
    }
}

pub async fn cost(
    client: &CromwellClient,
    metadata: &Path,
    price_list: Option<&Path>,
    options: CostOptions,
    only_total: bool,
    tsv: bool,
    format: OutputFormat,
) -> Result<()> {
    let bytes = std::fs::read(metadata)
        .with_context(|| format!("Failed to read {}", metadata.display()))?;
    let metadata = WorkflowMetadata::from_slice(&bytes).context("Invalid workflow metadata")?;
    let prices = load_prices(client, price_list).await?;

    let report = calculate_cost(&metadata, &prices, options, CostReport::default())?;

    match format {
        OutputFormat::Json if only_total => {
            print_json(&serde_json::json!({ "total_cost": report.total_cost }))?;
        }
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table if only_total => {
            println!("Total Cost: {}", report.total_cost);
        }
        OutputFormat::Table if tsv => print!("{}", report.to_tsv()),
        OutputFormat::Table => {
            let rows: Vec<CostRow> = report
                .tasks
                .iter()
                .map(|t| CostRow {
                    task: t.task_name.clone(),
                    status: if t.complete {
                        t.status().green().to_string()
                    } else {
                        t.status().yellow().to_string()
                    },
                    machine_type: t.machine_type.clone(),
                    hours: format!("{:.2}", t.total_hours),
                    pe_hours: format!("{:.2}", t.pe_total_hours),
                    failed_pe_hours: format!("{:.2}", t.failed_pe_total_hours),
                    disk: format!("{} GB {}", t.disk_size, t.disk_type),
                    cost: format_currency(t.total_cost),
                })
                .collect();
            print_table(&rows);
            println!(
                "{} {}",
                "Total Cost:".bold(),
                format_currency(report.total_cost).green().bold()
            );
        }
    }

    Ok(())
}
