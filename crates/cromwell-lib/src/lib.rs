//! Cromwell workflow tooling
//!
//! This crate provides the core functionality for:
//! - Parsing task monitoring logs into resource utilization records
//! - Merging records per task and across differently sized runs
//! - A REST client for submitting and inspecting Cromwell workflows
//! - Workflow utilization reports and Compute Engine cost estimates

pub mod aggregate;
pub mod client;
pub mod cost;
pub mod error;
pub mod metadata;
pub mod models;
pub mod monitoring;
pub mod observability;
pub mod plot;
pub mod storage;
pub mod utilization;
pub mod workflow;

pub use aggregate::{
    aggregate_across_runs, aggregate_by_task, aggregate_task, ScalingAggregation,
    ScalingAggregator, ScalingSeries, TaskAggregation,
};
pub use client::{ClientConfig, CromwellClient};
pub use error::{CromwellError, Result, UtilizationError};
pub use models::*;
pub use monitoring::{parse_monitoring_log, parse_summary_log};
pub use observability::ToolMetrics;
pub use plot::{ChartRenderer, ChartSeries};
pub use storage::{ObjectFetcher, StorageFetcher};
pub use utilization::{ResourceUtilization, UtilizationAttribute};
pub use workflow::{UtilizationReport, Workflow};
