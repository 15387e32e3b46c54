//! Folding utilization records per task and across runs
//!
//! - [`aggregate_task`] merges every shard/attempt record of one task.
//! - [`ScalingAggregator`] merges per run, then lines runs up per task by
//!   an independent variable such as input size.

mod scaling;
mod task;

pub use scaling::{
    aggregate_across_runs, ScalingAggregation, ScalingAggregator, ScalingFailure, ScalingSeries,
};
pub use task::{aggregate_by_task, aggregate_task, group_by_task, TaskAggregation};
