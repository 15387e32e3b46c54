//! Cross-run aggregation for scaling analysis
//!
//! Each run is a summary report produced for one value of an independent
//! variable (input size, thread count, ...). Runs are merged per task and then
//! collected into one ascending series per task.

use super::task::{aggregate_task, group_by_task};
use crate::error::UtilizationError;
use crate::monitoring::parse_summary_log;
use crate::plot::{ChartRenderer, ChartSeries};
use crate::utilization::{ResourceUtilization, UtilizationAttribute};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Per-task series of `(independent variable, merged utilization)` pairs,
/// sorted ascending by the independent variable.
#[derive(Debug, Clone, Serialize)]
pub struct ScalingSeries<X> {
    tasks: BTreeMap<String, Vec<(X, ResourceUtilization)>>,
}

impl<X> ScalingSeries<X> {
    /// Task names in ascending order
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn get(&self, task: &str) -> Option<&[(X, ResourceUtilization)]> {
        self.tasks.get(task).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[(X, ResourceUtilization)])> {
        self.tasks.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<X: Clone> ScalingSeries<X> {
    /// Extract one attribute per task as a plain `(x, y)` series.
    ///
    /// With `remove_constant`, every `y` is shifted by `min(y) - 1` so the
    /// smallest value becomes exactly 1, which keeps log axes valid.
    pub fn series_for_attribute(
        &self,
        attribute: UtilizationAttribute,
        remove_constant: bool,
    ) -> Vec<ChartSeries<X>> {
        self.tasks
            .iter()
            .map(|(task, points)| {
                let x: Vec<X> = points.iter().map(|(x, _)| x.clone()).collect();
                let mut y: Vec<f64> = points.iter().map(|(_, r)| r.value(attribute)).collect();

                if remove_constant && !y.is_empty() {
                    let min = y.iter().copied().fold(f64::INFINITY, f64::min);
                    let shift = min - 1.0;
                    y.iter_mut().for_each(|v| *v -= shift);
                }

                ChartSeries {
                    label: task.clone(),
                    x,
                    y,
                }
            })
            .collect()
    }

    /// Hand every task's series for `attribute` to a chart renderer.
    pub fn plot_attribute<R>(
        &self,
        attribute: UtilizationAttribute,
        remove_constant: bool,
        renderer: &mut R,
    ) -> Result<(), R::Error>
    where
        R: ChartRenderer<X>,
    {
        for series in self.series_for_attribute(attribute, remove_constant) {
            renderer.render(&series.x, &series.y, &series.label)?;
        }
        Ok(())
    }
}

/// A task (or whole block) that failed inside one run.
#[derive(Debug)]
pub struct ScalingFailure<X> {
    pub input: X,
    /// Task name, when the failure could be attributed to one
    pub task: Option<String>,
    pub error: UtilizationError,
}

/// Series plus every per-task failure met while building it.
#[derive(Debug)]
pub struct ScalingAggregation<X> {
    pub series: ScalingSeries<X>,
    pub failures: Vec<ScalingFailure<X>>,
}

/// Incremental builder over runs.
///
/// Runs may be added in any order; equal independent-variable values keep
/// the order in which they were added.
#[derive(Debug)]
pub struct ScalingAggregator<X> {
    points: BTreeMap<String, Vec<(X, ResourceUtilization)>>,
    failures: Vec<ScalingFailure<X>>,
}

impl<X> Default for ScalingAggregator<X> {
    fn default() -> Self {
        Self {
            points: BTreeMap::new(),
            failures: Vec::new(),
        }
    }
}

impl<X: Ord + Clone> ScalingAggregator<X> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one run given as summary-report lines.
    pub fn add_run<I, S>(&mut self, input: X, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut samples = Vec::new();
        let mut parser = parse_summary_log(lines);
        while let Some((task, result)) = parser.next_block() {
            match result {
                Ok(sample) => samples.push(sample),
                Err(error) => {
                    warn!(task = ?task, error = %error, "Skipping unreadable summary block");
                    self.failures.push(ScalingFailure {
                        input: input.clone(),
                        task,
                        error,
                    });
                }
            }
        }
        self.add_samples(input, samples);
    }

    /// Add one run given as already-parsed records.
    pub fn add_samples<I>(&mut self, input: X, samples: I)
    where
        I: IntoIterator<Item = ResourceUtilization>,
    {
        for (task, group) in group_by_task(samples) {
            match aggregate_task(&task, group) {
                Ok(merged) => {
                    debug!(task = %task, "Merged run utilization");
                    self.points
                        .entry(task)
                        .or_default()
                        .push((input.clone(), merged));
                }
                Err(error) => {
                    warn!(task = %task, error = %error, "Failed to aggregate task for run");
                    self.failures.push(ScalingFailure {
                        input: input.clone(),
                        task: Some(task),
                        error,
                    });
                }
            }
        }
    }

    pub fn finish(self) -> ScalingAggregation<X> {
        let mut tasks = self.points;
        for points in tasks.values_mut() {
            // stable sort, ties keep insertion order
            points.sort_by(|a, b| a.0.cmp(&b.0));
        }

        ScalingAggregation {
            series: ScalingSeries { tasks },
            failures: self.failures,
        }
    }
}

/// Aggregate summary reports keyed by an independent variable.
pub fn aggregate_across_runs<X, I, S>(runs: I) -> ScalingAggregation<X>
where
    X: Ord + Clone,
    I: IntoIterator<Item = (X, S)>,
    S: AsRef<str>,
{
    let mut aggregator = ScalingAggregator::new();
    for (input, text) in runs {
        aggregator.add_run(input, text.as_ref().lines());
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn block(task: &str, max_mem: u64, max_disk: u64) -> String {
        ResourceUtilization::new(task, max_mem, 1700, max_disk, 10_000, false)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_series_sorted_regardless_of_input_order() {
        let mut runs = HashMap::new();
        runs.insert(100u64, block("align", 900, 5000));
        runs.insert(10u64, block("align", 90, 500));

        let result = aggregate_across_runs(runs);
        assert!(result.failures.is_empty());

        let points = result.series.get("align").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].0, 10);
        assert_eq!(points[0].1.max_memory_mb(), 90);
        assert_eq!(points[1].0, 100);
        assert_eq!(points[1].1.max_memory_mb(), 900);
    }

    #[test]
    fn test_run_merged_per_task() {
        let run = format!("{}{}{}", block("align", 50, 10), block("sort", 7, 7), block("align", 126, 3));
        let result = aggregate_across_runs(vec![(1u64, run)]);

        assert_eq!(result.series.len(), 2);
        let align = result.series.get("align").unwrap();
        assert_eq!(align.len(), 1);
        assert_eq!(align[0].1.max_memory_mb(), 126);
        assert_eq!(align[0].1.max_disk_kb(), 10);
    }

    #[test]
    fn test_equal_inputs_keep_insertion_order() {
        let runs = vec![
            (5u64, block("align", 3, 1)),
            (1u64, block("align", 1, 1)),
            (5u64, block("align", 2, 1)),
        ];
        let result = aggregate_across_runs(runs);
        let memory: Vec<u64> = result
            .series
            .get("align")
            .unwrap()
            .iter()
            .map(|(_, r)| r.max_memory_mb())
            .collect();
        assert_eq!(memory, vec![1, 3, 2]);
    }

    #[test]
    fn test_bad_block_does_not_abort_other_tasks() {
        let bad = block("align", 50, 10).replace("Max Memory Usage (MB): 50", "Max Memory Usage (MB): ?");
        let run_a = format!("{}{}", bad, block("sort", 7, 7));
        let run_b = format!("{}{}", block("align", 60, 10), block("sort", 8, 7));
        let result = aggregate_across_runs(vec![(10u64, run_a), (20u64, run_b)]);

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].input, 10);
        assert_eq!(result.failures[0].task.as_deref(), Some("align"));
        assert!(result.failures[0].error.is_malformed());

        assert_eq!(result.series.get("sort").unwrap().len(), 2);
        let align = result.series.get("align").unwrap();
        assert_eq!(align.len(), 1);
        assert_eq!(align[0].0, 20);
    }

    #[test]
    fn test_unreadable_header_has_no_task() {
        let bad = block("align", 50, 10).replace("align Monitoring Summary:", "align summary");
        let result = aggregate_across_runs(vec![(10u64, bad)]);

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].task, None);
        assert!(result.series.is_empty());
    }

    #[test]
    fn test_series_for_attribute_remove_constant() {
        let runs = vec![
            (10u64, block("align", 500, 1)),
            (100u64, block("align", 520, 1)),
            (1000u64, block("align", 700, 1)),
        ];
        let result = aggregate_across_runs(runs);

        let raw = result
            .series
            .series_for_attribute(UtilizationAttribute::MaxMemory, false);
        assert_eq!(raw[0].y, vec![500.0, 520.0, 700.0]);

        let shifted = result
            .series
            .series_for_attribute(UtilizationAttribute::MaxMemory, true);
        assert_eq!(shifted.len(), 1);
        assert_eq!(shifted[0].label, "align");
        assert_eq!(shifted[0].x, vec![10, 100, 1000]);
        assert_eq!(shifted[0].y, vec![1.0, 21.0, 201.0]);
        assert!(shifted[0].y.iter().all(|v| *v >= 1.0));
    }

    #[test]
    fn test_remove_constant_keeps_order_for_unsorted_values() {
        let runs = vec![(1u64, block("align", 40, 1)), (2u64, block("align", 10, 1)), (3u64, block("align", 25, 1))];
        let result = aggregate_across_runs(runs);
        let series = result
            .series
            .series_for_attribute(UtilizationAttribute::MaxMemory, true);
        assert_eq!(series[0].y, vec![31.0, 1.0, 16.0]);
    }

    struct Recorder {
        calls: Vec<(Vec<u64>, Vec<f64>, String)>,
    }

    impl ChartRenderer<u64> for Recorder {
        type Error = std::convert::Infallible;

        fn render(&mut self, x: &[u64], y: &[f64], label: &str) -> Result<(), Self::Error> {
            self.calls.push((x.to_vec(), y.to_vec(), label.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_plot_attribute_renders_each_task() {
        let runs = vec![
            (10u64, format!("{}{}", block("sort", 1, 40), block("align", 1, 20))),
            (20u64, format!("{}{}", block("sort", 1, 80), block("align", 1, 30))),
        ];
        let result = aggregate_across_runs(runs);

        let mut recorder = Recorder { calls: Vec::new() };
        result
            .series
            .plot_attribute(UtilizationAttribute::MaxDisk, false, &mut recorder)
            .unwrap();

        assert_eq!(recorder.calls.len(), 2);
        assert_eq!(recorder.calls[0].2, "align");
        assert_eq!(recorder.calls[0].1, vec![20.0, 30.0]);
        assert_eq!(recorder.calls[1].2, "sort");
        assert_eq!(recorder.calls[1].0, vec![10, 20]);
    }
}
