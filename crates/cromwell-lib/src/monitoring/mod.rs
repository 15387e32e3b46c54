//! Monitoring log ingestion
//!
//! Two log producers exist in a Cromwell deployment, and each has its own
//! entry point. Both yield [`ResourceUtilization`] records:
//! - [`parse_summary_log`] reads the 8-line "Monitoring Summary" blocks
//!   written by a utilization report, lazily, one record per block.
//! - [`parse_monitoring_log`] scans the raw log written by the monitoring
//!   sidecar of a running task and reduces it to a single record.
//!
//! Neither parser performs I/O; callers hand in lines they already read.

mod scan;
mod summary;


pub use scan::{parse_monitoring_log, ROBUST_SAMPLE_THRESHOLD};
pub use summary::{parse_summary_log, SummaryParser, SUMMARY_BLOCK_LINES};

use crate::error::UtilizationError;
use crate::utilization::ResourceUtilization;

/// Parse a raw sidecar log fetched as bytes. Invalid UTF-8 is replaced.
pub fn parse_monitoring_bytes(
    task_name: &str,
    bytes: &[u8],
) -> Result<ResourceUtilization, UtilizationError> {
    let text = String::from_utf8_lossy(bytes);
    parse_monitoring_log(task_name, text.lines())
}

/// Eagerly parse a whole summary report, stopping at the first bad block.
pub fn parse_summary_text(text: &str) -> Result<Vec<ResourceUtilization>, UtilizationError> {
    parse_summary_log(text.lines()).collect()
}

/// Last whitespace-delimited token of a line.
fn last_token(line: &str) -> Option<&str> {
    line.split_whitespace().last()
}

fn parse_int(line_no: usize, line: &str) -> Result<u64, UtilizationError> {
    let token = last_token(line)
        .ok_or_else(|| UtilizationError::malformed(line_no, "line has no value"))?;
    token.parse::<u64>().map_err(|_| {
        UtilizationError::malformed(
            line_no,
            format!("expected a non-negative integer, found '{}' in '{}'", token, line.trim()),
        )
    })
}

fn parse_float(line_no: usize, line: &str) -> Result<f64, UtilizationError> {
    let token = last_token(line)
        .ok_or_else(|| UtilizationError::malformed(line_no, "line has no value"))?;
    token.parse::<f64>().map_err(|_| {
        UtilizationError::malformed(
            line_no,
            format!("expected a number, found '{}' in '{}'", token, line.trim()),
        )
    })
}
