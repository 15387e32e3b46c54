//! Reader for "Monitoring Summary" blocks
//!
//! Each block is eight non-empty lines in a fixed order:
//!
//! ```text
//! align Monitoring Summary:
//! Max Memory Usage (MB): 126
//! Available Memory (MB): 1700
//! Max disk usage   (KB): 23048
//! Available disk   (KB): 10190136
//! Disk Utilized     (%): 0.002
//! Memory Utilized   (%): 0.074
//! Robust Estimate?     : False
//! ```

use super::{last_token, parse_float, parse_int};
use crate::error::UtilizationError;
use crate::utilization::ResourceUtilization;
use tracing::{debug, warn};

/// Number of lines in one summary block
pub const SUMMARY_BLOCK_LINES: usize = 8;

const HEADER_SUFFIX: &str = "Monitoring Summary:";

/// A parsed block and the task named in its header, if the header was readable
pub type NamedBlock = (Option<String>, Result<ResourceUtilization, UtilizationError>);

/// Lazy, single-pass parser over summary blocks.
///
/// Blank lines are skipped. A trailing block with fewer than eight lines is
/// dropped. A complete block whose fields fail to parse yields an error for
/// that block only; iteration continues with the next block.
pub struct SummaryParser<I> {
    lines: I,
    line_no: usize,
}

/// Parse summary blocks from a sequence of lines.
pub fn parse_summary_log<I, S>(lines: I) -> SummaryParser<I::IntoIter>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    SummaryParser {
        lines: lines.into_iter(),
        line_no: 0,
    }
}

impl<I, S> Iterator for SummaryParser<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = Result<ResourceUtilization, UtilizationError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().map(|(_, result)| result)
    }
}

impl<I, S> SummaryParser<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    /// Next block together with its task name, when the header was readable.
    pub fn next_block(&mut self) -> Option<NamedBlock> {
        let block = self.read_block()?;
        Some(match header_task(&block) {
            Ok(task) => (Some(task.to_string()), parse_fields(&block, task)),
            Err(error) => (None, Err(error)),
        })
    }

    fn read_block(&mut self) -> Option<Vec<(usize, String)>> {
        let mut block: Vec<(usize, String)> = Vec::with_capacity(SUMMARY_BLOCK_LINES);

        while block.len() < SUMMARY_BLOCK_LINES {
            let Some(line) = self.lines.next() else {
                if !block.is_empty() {
                    warn!(
                        lines = block.len(),
                        first_line = block[0].0,
                        "Dropping incomplete trailing summary block"
                    );
                }
                return None;
            };
            self.line_no += 1;

            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            block.push((self.line_no, line.to_string()));
        }

        Some(block)
    }
}

fn header_task(block: &[(usize, String)]) -> Result<&str, UtilizationError> {
    let (header_no, header) = &block[0];
    let header = header.trim();
    if !header.ends_with(HEADER_SUFFIX) {
        return Err(UtilizationError::malformed(
            *header_no,
            format!("expected '<task> {}', found '{}'", HEADER_SUFFIX, header),
        ));
    }
    header
        .split_whitespace()
        .next()
        .filter(|name| *name != "Monitoring")
        .ok_or_else(|| UtilizationError::malformed(*header_no, "summary header has no task name"))
}

fn parse_fields(
    block: &[(usize, String)],
    task_name: &str,
) -> Result<ResourceUtilization, UtilizationError> {
    let header_no = block[0].0;
    let int_at = |idx: usize| parse_int(block[idx].0, &block[idx].1);
    let float_at = |idx: usize| parse_float(block[idx].0, &block[idx].1);

    let max_memory = int_at(1)?;
    let available_memory = int_at(2)?;
    let max_disk = int_at(3)?;
    let available_disk = int_at(4)?;
    // the percentages are re-derived from the fields above, only their syntax is checked
    float_at(5)?;
    float_at(6)?;
    let robust = last_token(&block[7].1) == Some("True");

    debug!(
        task = %task_name,
        line = header_no,
        max_memory,
        max_disk,
        robust,
        "Parsed summary block"
    );

    ResourceUtilization::new(
        task_name,
        max_memory,
        available_memory,
        max_disk,
        available_disk,
        robust,
    )
}
