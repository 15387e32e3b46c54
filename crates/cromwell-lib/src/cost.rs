//! Compute Engine cost estimate of a finished workflow
//!
//! Costs are derived from call metadata alone: billed VM hours per machine
//! type, split into regular, preemptible and preempted runs, plus persistent
//! disk GB-hours. Subworkflows are costed recursively into the same report.

use crate::error::{CromwellError, Result};
use crate::metadata::{CallMetadata, ExecutionStatus, WorkflowMetadata};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Public Compute Engine price list
pub const GCE_PRICE_LIST_URL: &str =
    "http://cloudpricingcalculator.appspot.com/static/data/pricelist.json";

const VM_IMAGE_PREFIX: &str = "CP-COMPUTEENGINE-VMIMAGE-";
const SSD_PRICE_KEY: &str = "CP-COMPUTEENGINE-STORAGE-PD-SSD";
const HDD_PRICE_KEY: &str = "CP-COMPUTEENGINE-STORAGE-PD-CAPACITY";
const PRICE_REGION: &str = "us";

const HOURS_PER_MONTH: f64 = 24.0 * 365.0 / 12.0;
const MIN_BILLED_MINUTES: f64 = 10.0;
const UNKNOWN_MACHINE: &str = "unknown";

/// Column names of [`TaskCost::tsv_row`]
pub const TSV_HEADER: [&str; 18] = [
    "task_name",
    "status",
    "machine_type",
    "total_hours",
    "cpu_cost_per_hour",
    "cpu_cost",
    "pe_total_hours",
    "pe_cpu_cost_per_hour",
    "pe_cpu_cost",
    "failed_pe_total_hours",
    "failed_pe_cpu_cost",
    "disk_type",
    "disk_size",
    "disk_gb_hours",
    "disk_cost",
    "failed_pe_ssd_gb_hours",
    "failed_pe_ssd_cost",
    "total_cost",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiskType {
    #[serde(rename = "PERSISTENT_SSD")]
    PersistentSsd,
    #[serde(rename = "PERSISTENT_HDD")]
    PersistentHdd,
}

impl DiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersistentSsd => "PERSISTENT_SSD",
            Self::PersistentHdd => "PERSISTENT_HDD",
        }
    }
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// US prices for machine types and persistent disks
#[derive(Debug, Clone)]
pub struct PriceList {
    /// Hourly price by lowercase machine type, e.g. `n1-standard-1-preemptible`
    machines: HashMap<String, f64>,
    ssd_per_gb_month: f64,
    hdd_per_gb_month: f64,
}

impl PriceList {
    pub fn new(machines: HashMap<String, f64>, ssd_per_gb_month: f64, hdd_per_gb_month: f64) -> Self {
        Self {
            machines,
            ssd_per_gb_month,
            hdd_per_gb_month,
        }
    }

    /// Read the `gcp_price_list` section of the public price list document
    pub fn from_json(document: &Value) -> Result<Self> {
        let list = document
            .get("gcp_price_list")
            .and_then(Value::as_object)
            .ok_or_else(|| CromwellError::InvalidPriceList("missing gcp_price_list".to_string()))?;

        let us_price = |entry: &Value| entry.get(PRICE_REGION).and_then(Value::as_f64);

        let mut machines = HashMap::new();
        for (key, entry) in list {
            let Some(machine) = key.strip_prefix(VM_IMAGE_PREFIX) else {
                continue;
            };
            match us_price(entry) {
                Some(price) => {
                    machines.insert(machine.to_lowercase(), price);
                }
                None => debug!(key = %key, "Price list entry has no US price"),
            }
        }

        let disk_price = |key: &str| {
            list.get(key).and_then(us_price).ok_or_else(|| {
                CromwellError::InvalidPriceList(format!("missing US price for {}", key))
            })
        };

        Ok(Self {
            ssd_per_gb_month: disk_price(SSD_PRICE_KEY)?,
            hdd_per_gb_month: disk_price(HDD_PRICE_KEY)?,
            machines,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_json(&serde_json::from_slice(bytes)?)
    }

    pub fn machine_per_hour(&self, machine_type: &str) -> Option<f64> {
        self.machines.get(machine_type).copied()
    }

    pub fn disk_per_gb_hour(&self, disk_type: DiskType) -> f64 {
        let monthly = match disk_type {
            DiskType::PersistentSsd => self.ssd_per_gb_month,
            DiskType::PersistentHdd => self.hdd_per_gb_month,
        };
        monthly / HOURS_PER_MONTH
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CostOptions {
    /// Bill preempted attempts as zero hours
    pub ignore_preempted: bool,
}

/// Cost breakdown of one call key
#[derive(Debug, Clone, Serialize)]
pub struct TaskCost {
    pub task_name: String,
    /// False while any attempt is in flight or has failed
    pub complete: bool,
    pub machine_type: String,
    pub total_hours: f64,
    pub cpu_cost_per_hour: f64,
    pub cpu_cost: f64,
    pub pe_total_hours: f64,
    pub pe_cpu_cost_per_hour: f64,
    pub pe_cpu_cost: f64,
    pub failed_pe_total_hours: f64,
    pub failed_pe_cpu_cost: f64,
    pub disk_type: DiskType,
    pub disk_size: f64,
    pub disk_gb_hours: f64,
    pub disk_cost: f64,
    pub failed_pe_disk_gb_hours: f64,
    pub failed_pe_disk_cost: f64,
    pub total_cost: f64,
}

impl TaskCost {
    pub fn status(&self) -> &'static str {
        if self.complete {
            "complete"
        } else {
            "incomplete"
        }
    }

    /// Tab-separated values in [`TSV_HEADER`] order
    pub fn tsv_row(&self) -> String {
        [
            self.task_name.clone(),
            self.status().to_string(),
            self.machine_type.clone(),
            self.total_hours.to_string(),
            self.cpu_cost_per_hour.to_string(),
            self.cpu_cost.to_string(),
            self.pe_total_hours.to_string(),
            self.pe_cpu_cost_per_hour.to_string(),
            self.pe_cpu_cost.to_string(),
            self.failed_pe_total_hours.to_string(),
            self.failed_pe_cpu_cost.to_string(),
            self.disk_type.to_string(),
            self.disk_size.to_string(),
            self.disk_gb_hours.to_string(),
            self.disk_cost.to_string(),
            self.failed_pe_disk_gb_hours.to_string(),
            self.failed_pe_disk_cost.to_string(),
            self.total_cost.to_string(),
        ]
        .join("\t")
    }
}

/// Accumulated cost rows and the running workflow total
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostReport {
    pub tasks: Vec<TaskCost>,
    pub total_cost: f64,
}

impl CostReport {
    fn add(&mut self, task: TaskCost) {
        self.total_cost += task.total_cost;
        self.tasks.push(task);
    }

    pub fn to_tsv(&self) -> String {
        let mut out = TSV_HEADER.join("\t");
        out.push('\n');
        for task in &self.tasks {
            out.push_str(&task.tsv_row());
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DiskInfo {
    size_gb: f64,
    disk_type: DiskType,
}

impl Default for DiskInfo {
    fn default() -> Self {
        Self {
            size_gb: 0.0,
            disk_type: DiskType::PersistentSsd,
        }
    }
}

/// Cost every call of `metadata` into `acc` and return it.
///
/// Calls whose attempts are all subworkflows produce no row of their own;
/// their subworkflow's calls are costed instead.
pub fn calculate_cost(
    metadata: &WorkflowMetadata,
    prices: &PriceList,
    options: CostOptions,
    mut acc: CostReport,
) -> Result<CostReport> {
    for (call, attempts) in &metadata.calls {
        let mut total_hours = 0.0;
        let mut pe_total_hours = 0.0;
        let mut failed_pe_total_hours = 0.0;
        let mut machine_type: Option<String> = None;
        let mut disk = DiskInfo::default();
        let mut complete = true;
        let mut costed_attempts = 0usize;

        for attempt in attempts {
            if attempt.is_subworkflow() {
                if let Some(sub) = &attempt.sub_workflow_metadata {
                    acc = calculate_cost(sub, prices, options, acc)?;
                } else {
                    debug!(call = %call, "Subworkflow metadata not expanded, not costed");
                }
                continue;
            }
            costed_attempts += 1;

            if attempt.execution_status.is_in_flight() {
                complete = false;
                continue;
            }
            if attempt.execution_status == ExecutionStatus::Failed {
                complete = false;
            }

            if machine_type.is_none() {
                machine_type = attempt.machine_type().map(str::to_string);
            }
            disk = disk_info(call, attempt)?;

            let hours = run_hours(call, attempt, options)?;
            if was_preemptible_vm(call, attempt)? {
                if attempt.execution_status.is_preempted() {
                    failed_pe_total_hours += hours;
                } else {
                    pe_total_hours += hours;
                }
            } else {
                total_hours += hours;
            }
        }

        if costed_attempts == 0 {
            continue;
        }

        let machine_type = machine_type.unwrap_or_else(|| UNKNOWN_MACHINE.to_string());
        let (cpu_cost_per_hour, pe_cpu_cost_per_hour) = if machine_type == UNKNOWN_MACHINE {
            (0.0, 0.0)
        } else {
            let price = |machine: &str| {
                prices.machine_per_hour(machine).ok_or_else(|| CromwellError::Cost {
                    task: call.clone(),
                    reason: format!("no price for machine type {}", machine),
                })
            };
            (
                price(&machine_type)?,
                price(&format!("{}-preemptible", machine_type))?,
            )
        };

        let cpu_cost = total_hours * cpu_cost_per_hour;
        let pe_cpu_cost = pe_total_hours * pe_cpu_cost_per_hour;
        let failed_pe_cpu_cost = failed_pe_total_hours * pe_cpu_cost_per_hour;

        let disk_per_gb_hour = prices.disk_per_gb_hour(disk.disk_type);
        let disk_gb_hours = disk.size_gb * (total_hours + pe_total_hours);
        let disk_cost = disk_gb_hours * disk_per_gb_hour;
        let failed_pe_disk_gb_hours = disk.size_gb * failed_pe_total_hours;
        let failed_pe_disk_cost = failed_pe_disk_gb_hours * disk_per_gb_hour;

        let total_cost = cpu_cost + pe_cpu_cost + failed_pe_cpu_cost + disk_cost + failed_pe_disk_cost;
        debug!(call = %call, total_cost, complete, "Costed call");

        acc.add(TaskCost {
            task_name: call.clone(),
            complete,
            machine_type,
            total_hours,
            cpu_cost_per_hour,
            cpu_cost,
            pe_total_hours,
            pe_cpu_cost_per_hour,
            pe_cpu_cost,
            failed_pe_total_hours,
            failed_pe_cpu_cost,
            disk_type: disk.disk_type,
            disk_size: disk.size_gb,
            disk_gb_hours,
            disk_cost,
            failed_pe_disk_gb_hours,
            failed_pe_disk_cost,
            total_cost,
        });
    }

    Ok(acc)
}

fn cost_error(call: &str, reason: impl Into<String>) -> CromwellError {
    CromwellError::Cost {
        task: call.to_string(),
        reason: reason.into(),
    }
}

/// Requested disk plus boot disk, both billed as the requested disk type
fn disk_info(call: &str, attempt: &CallMetadata) -> Result<DiskInfo> {
    let Some(disks) = attempt.runtime_attribute("disks") else {
        return Ok(DiskInfo::default());
    };

    let boot_gb = match attempt.runtime_attribute("bootDiskSizeGb") {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| cost_error(call, format!("invalid bootDiskSizeGb '{}'", raw)))?,
        None => 0.0,
    };

    let fields: Vec<&str> = disks.split_whitespace().collect();
    let [_, size, kind] = fields.as_slice() else {
        return Err(cost_error(call, format!("unexpected disks attribute '{}'", disks)));
    };
    let size: f64 = size
        .parse()
        .map_err(|_| cost_error(call, format!("invalid disk size in '{}'", disks)))?;
    let disk_type = match kind.to_uppercase().as_str() {
        "SSD" => DiskType::PersistentSsd,
        "HDD" => DiskType::PersistentHdd,
        other => return Err(cost_error(call, format!("unsupported disk type '{}'", other))),
    };

    Ok(DiskInfo {
        size_gb: size + boot_gb,
        disk_type,
    })
}

/// An attempt ran on a preemptible VM while `attempt <= preemptible`
fn was_preemptible_vm(call: &str, attempt: &CallMetadata) -> Result<bool> {
    let Some(raw) = attempt.runtime_attribute("preemptible") else {
        return Ok(false);
    };
    let tries: i64 = raw
        .parse()
        .map_err(|_| cost_error(call, format!("invalid preemptible count '{}'", raw)))?;
    Ok(i64::from(attempt.attempt) <= tries)
}

fn run_hours(call: &str, attempt: &CallMetadata, options: CostOptions) -> Result<f64> {
    let preempted = attempt.execution_status.is_preempted();
    if preempted && options.ignore_preempted {
        return Ok(0.0);
    }

    let mut start: Option<DateTime<Utc>> = None;
    let mut end: Option<DateTime<Utc>> = None;
    for event in &attempt.execution_events {
        if event.description.starts_with("start") {
            start = Some(event.start_time);
        }
        if event.description.starts_with("ok") {
            end = Some(event.end_time);
        }
    }

    // preempted and cached calls carry no backend events, use Cromwell's own times
    if preempted || attempt.cache_hit() {
        start = start.or(attempt.start);
        end = end.or(attempt.end);
    }

    let (Some(start), Some(end)) = (start, end) else {
        return Err(cost_error(
            call,
            format!("unable to find start or end time of attempt {}", attempt.attempt),
        ));
    };

    let minutes = ((end - start).num_milliseconds() as f64 / 60_000.0).ceil();
    Ok(minutes.max(MIN_BILLED_MINUTES) / 60.0)
}
