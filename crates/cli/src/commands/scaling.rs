//! Scaling analysis over summary reports of differently sized runs

use anyhow::{bail, Context, Result};
use cromwell_lib::{aggregate_across_runs, ToolMetrics, UtilizationAttribute};
use serde::Serialize;
use std::path::PathBuf;

use crate::output::{print_info, print_json, print_warning, OutputFormat, TableChart};

/// Parse a `SIZE=FILE` run argument
pub fn parse_run(s: &str) -> Result<(u64, PathBuf), String> {
    let (size, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SIZE=FILE, got '{}'", s))?;
    let size = size
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid run size '{}'", size))?;
    if path.is_empty() {
        return Err(format!("missing report file in '{}'", s));
    }
    Ok((size, PathBuf::from(path)))
}

#[derive(Serialize)]
struct FailureEntry {
    input: u64,
    task: Option<String>,
    error: String,
}

pub fn scaling(
    runs: &[(u64, PathBuf)],
    attribute: UtilizationAttribute,
    remove_constant: bool,
    format: OutputFormat,
) -> Result<()> {
    if runs.is_empty() {
        bail!("at least one SIZE=FILE run is required");
    }

    let mut reports = Vec::with_capacity(runs.len());
    for (size, path) in runs {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        reports.push((*size, text));
    }

    let aggregation = aggregate_across_runs(reports);
    let metrics = ToolMetrics::new();
    for _ in aggregation.failures.iter() {
        metrics.inc_task_failures();
    }

    let failures: Vec<FailureEntry> = aggregation
        .failures
        .iter()
        .map(|f| FailureEntry {
            input: f.input,
            task: f.task.clone(),
            error: f.error.to_string(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let series = aggregation
                .series
                .series_for_attribute(attribute, remove_constant);
            print_json(&serde_json::json!({
                "attribute": attribute.as_str(),
                "series": series,
                "failures": failures,
            }))?;
        }
        OutputFormat::Table => {
            print_info(&format!(
                "{} across {} runs{}",
                attribute,
                runs.len(),
                if remove_constant { " (constant removed)" } else { "" }
            ));
            let mut chart = TableChart::new();
            if let Err(never) = aggregation
                .series
                .plot_attribute(attribute, remove_constant, &mut chart)
            {
                match never {}
            }
            chart.print();
            for failure in &failures {
                let task = failure.task.as_deref().unwrap_or("<block>");
                print_warning(&format!("run {} {}: {}", failure.input, task, failure.error));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        assert_eq!(parse_run("100=runs/100.txt").unwrap(), (100, PathBuf::from("runs/100.txt")));
        assert!(parse_run("runs/100.txt").is_err());
        assert!(parse_run("big=runs/100.txt").is_err());
        assert!(parse_run("100=").is_err());
    }
}
