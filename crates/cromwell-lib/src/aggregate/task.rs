//! Per-task aggregation

use crate::error::UtilizationError;
use crate::utilization::ResourceUtilization;
use std::collections::BTreeMap;
use tracing::warn;

/// Merge all records of one task into its worst case.
///
/// Every record must belong to `task_name`. An empty input is reported as
/// [`UtilizationError::NoUtilizationData`], never as a zero record.
pub fn aggregate_task<I>(task_name: &str, samples: I) -> Result<ResourceUtilization, UtilizationError>
where
    I: IntoIterator<Item = ResourceUtilization>,
{
    let mut merged: Option<ResourceUtilization> = None;

    for sample in samples {
        if sample.task_name() != task_name {
            return Err(UtilizationError::TaskMismatch {
                expected: task_name.to_string(),
                found: sample.task_name().to_string(),
            });
        }
        merged = Some(sample.merge(merged.as_ref()));
    }

    merged.ok_or_else(|| UtilizationError::NoUtilizationData {
        task: task_name.to_string(),
    })
}

/// Group records by task name, keeping encounter order inside each group.
pub fn group_by_task<I>(samples: I) -> BTreeMap<String, Vec<ResourceUtilization>>
where
    I: IntoIterator<Item = ResourceUtilization>,
{
    let mut groups: BTreeMap<String, Vec<ResourceUtilization>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry(sample.task_name().to_string())
            .or_default()
            .push(sample);
    }
    groups
}

/// Result of aggregating a mixed batch of records.
#[derive(Debug, Default)]
pub struct TaskAggregation {
    /// One merged record per task, keyed by task name
    pub tasks: BTreeMap<String, ResourceUtilization>,
    /// Tasks that could not be aggregated
    pub failures: Vec<(String, UtilizationError)>,
}

/// Group a mixed batch by task and merge each group.
///
/// A failing task is recorded and does not stop the others.
pub fn aggregate_by_task<I>(samples: I) -> TaskAggregation
where
    I: IntoIterator<Item = ResourceUtilization>,
{
    let mut result = TaskAggregation::default();

    for (task, group) in group_by_task(samples) {
        match aggregate_task(&task, group) {
            Ok(merged) => {
                result.tasks.insert(task, merged);
            }
            Err(e) => {
                warn!(task = %task, error = %e, "Failed to aggregate task utilization");
                result.failures.push((task, e));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(task: &str, max_mem: u64, max_disk: u64, robust: bool) -> ResourceUtilization {
        ResourceUtilization::new(task, max_mem, 1700, max_disk, 10_190_136, robust).unwrap()
    }

    #[test]
    fn test_empty_input_is_no_data() {
        let err = aggregate_task("align", Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            UtilizationError::NoUtilizationData { ref task } if task == "align"
        ));
    }

    #[test]
    fn test_single_sample_passes_through() {
        let s = sample("align", 50, 1000, false);
        assert_eq!(aggregate_task("align", vec![s.clone()]).unwrap(), s);
    }

    #[test]
    fn test_fold_order_independent() {
        let samples = vec![
            sample("align", 50, 1000, false),
            sample("align", 126, 23_048, false),
            sample("align", 80, 500, true),
            sample("align", 40, 200, false),
        ];
        let forward = aggregate_task("align", samples.clone()).unwrap();
        let backward = aggregate_task("align", samples.into_iter().rev()).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.max_memory_mb(), 126);
        assert_eq!(forward.max_disk_kb(), 23_048);
        assert!(forward.robust());
    }

    #[test]
    fn test_foreign_task_rejected() {
        let samples = vec![sample("align", 50, 1000, false), sample("sort", 60, 10, false)];
        let err = aggregate_task("align", samples).unwrap_err();
        assert!(matches!(err, UtilizationError::TaskMismatch { .. }));
    }

    #[test]
    fn test_aggregate_by_task_groups_mixed_batch() {
        let samples = vec![
            sample("align", 50, 1000, false),
            sample("sort", 300, 4096, true),
            sample("align", 126, 23_048, false),
        ];
        let result = aggregate_by_task(samples);

        assert!(result.failures.is_empty());
        assert_eq!(result.tasks.len(), 2);
        assert_eq!(result.tasks["align"].max_memory_mb(), 126);
        assert_eq!(result.tasks["sort"].max_memory_mb(), 300);
    }

    #[test]
    fn test_group_keeps_encounter_order() {
        let groups = group_by_task(vec![
            sample("align", 3, 0, false),
            sample("align", 1, 0, false),
            sample("align", 2, 0, false),
        ]);
        let order: Vec<u64> = groups["align"].iter().map(|s| s.max_memory_mb()).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }
}
