//! Subcommand implementations

pub mod cost;
pub mod scaling;
pub mod utilization;
pub mod workflow;
