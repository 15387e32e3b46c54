//! Scanner for raw sidecar monitoring logs
//!
//! The monitoring sidecar prints the provisioned totals once and a usage
//! sample every tick. Matching is case-insensitive on these prefixes:
//! - `total memory (mb):` and `total disk space (kb):` (last one wins)
//! - `* memory usage (mb):` and `* disk usage (kb):` (running maximum)
//!
//! Every other line is ignored.

use super::parse_int;
use crate::error::UtilizationError;
use crate::utilization::ResourceUtilization;
use tracing::debug;

/// Usage lines required before a log counts as a robust estimate
pub const ROBUST_SAMPLE_THRESHOLD: usize = 5;

const TOTAL_MEMORY: &str = "total memory (mb):";
const TOTAL_DISK: &str = "total disk space (kb):";
const MEMORY_USAGE: &str = "* memory usage (mb):";
const DISK_USAGE: &str = "* disk usage (kb):";

/// Reduce a raw monitoring log to one utilization record for `task_name`.
///
/// `robust` is set when at least [`ROBUST_SAMPLE_THRESHOLD`] usage lines
/// (memory and disk samples together) were seen. A log without any
/// recognised line, or without both totals, is malformed.
pub fn parse_monitoring_log<I, S>(
    task_name: &str,
    lines: I,
) -> Result<ResourceUtilization, UtilizationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut total_memory: Option<u64> = None;
    let mut total_disk: Option<u64> = None;
    let mut max_memory = 0u64;
    let mut max_disk = 0u64;
    let mut usage_lines = 0usize;
    let mut lines_read = 0usize;

    for (idx, line) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        lines_read = line_no;
        let line = line.as_ref().trim().to_lowercase();

        if line.starts_with(TOTAL_MEMORY) {
            total_memory = Some(parse_int(line_no, &line)?);
        } else if line.starts_with(TOTAL_DISK) {
            total_disk = Some(parse_int(line_no, &line)?);
        } else if line.starts_with(MEMORY_USAGE) {
            max_memory = max_memory.max(parse_int(line_no, &line)?);
            usage_lines += 1;
        } else if line.starts_with(DISK_USAGE) {
            max_disk = max_disk.max(parse_int(line_no, &line)?);
            usage_lines += 1;
        }
    }

    if total_memory.is_none() && total_disk.is_none() && usage_lines == 0 {
        return Err(UtilizationError::malformed(
            lines_read,
            format!("no monitoring lines found for task {}", task_name),
        ));
    }
    let total_memory = total_memory.ok_or_else(|| {
        UtilizationError::malformed(lines_read, "missing 'Total Memory (MB):' line")
    })?;
    let total_disk = total_disk.ok_or_else(|| {
        UtilizationError::malformed(lines_read, "missing 'Total Disk space (KB):' line")
    })?;

    let robust = usage_lines >= ROBUST_SAMPLE_THRESHOLD;
    debug!(
        task = %task_name,
        lines = lines_read,
        usage_lines,
        robust,
        "Scanned monitoring log"
    );

    ResourceUtilization::new(
        task_name,
        max_memory,
        total_memory,
        max_disk,
        total_disk,
        robust,
    )
}
