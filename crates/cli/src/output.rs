//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use cromwell_lib::{ChartRenderer, ResourceUtilization, WorkflowState};
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_currency(amount: f64) -> String {
    format!("${:.2}", amount)
}

pub fn format_percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Color a workflow state
pub fn color_status(status: WorkflowState) -> String {
    let text = status.as_str();
    match status {
        WorkflowState::Submitted | WorkflowState::OnHold => text.yellow().to_string(),
        WorkflowState::Running => text.blue().to_string(),
        WorkflowState::Succeeded => text.green().to_string(),
        WorkflowState::Failed | WorkflowState::Aborted | WorkflowState::Aborting => {
            text.red().to_string()
        }
        WorkflowState::Unknown => text.to_string(),
    }
}

/// Color a utilization fraction; low usage means over-provisioned
pub fn color_fraction(fraction: f64) -> String {
    let formatted = format_percent(fraction);
    if fraction >= 0.9 {
        formatted.red().to_string()
    } else if fraction >= 0.5 {
        formatted.green().to_string()
    } else {
        formatted.yellow().to_string()
    }
}

/// Row for utilization tables
#[derive(Tabled)]
pub struct UtilizationRow {
    #[tabled(rename = "Task")]
    task: String,
    #[tabled(rename = "Max Memory (MB)")]
    max_memory: u64,
    #[tabled(rename = "Available Memory (MB)")]
    available_memory: u64,
    #[tabled(rename = "Memory Used")]
    memory_used: String,
    #[tabled(rename = "Max Disk (KB)")]
    max_disk: u64,
    #[tabled(rename = "Available Disk (KB)")]
    available_disk: u64,
    #[tabled(rename = "Disk Used")]
    disk_used: String,
    #[tabled(rename = "Robust")]
    robust: String,
}

impl UtilizationRow {
    pub fn new(label: &str, record: &ResourceUtilization) -> Self {
        Self {
            task: label.to_string(),
            max_memory: record.max_memory_mb(),
            available_memory: record.available_memory_mb(),
            memory_used: color_fraction(record.fraction_memory_used()),
            max_disk: record.max_disk_kb(),
            available_disk: record.available_disk_kb(),
            disk_used: color_fraction(record.fraction_disk_used()),
            robust: if record.robust() {
                "yes".green().to_string()
            } else {
                "no".yellow().to_string()
            },
        }
    }
}

#[derive(Tabled)]
struct ChartRow {
    #[tabled(rename = "Task")]
    task: String,
    #[tabled(rename = "Input")]
    input: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Renders chart series as a table, one row per point
#[derive(Default)]
pub struct TableChart {
    rows: Vec<ChartRow>,
}

impl TableChart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print(&self) {
        print_table(&self.rows);
    }
}

impl<X: Display> ChartRenderer<X> for TableChart {
    type Error = Infallible;

    fn render(&mut self, x: &[X], y: &[f64], label: &str) -> Result<(), Infallible> {
        for (input, value) in x.iter().zip(y) {
            self.rows.push(ChartRow {
                task: label.to_string(),
                input: input.to_string(),
                value: format!("{:.3}", value),
            });
        }
        Ok(())
    }
}
