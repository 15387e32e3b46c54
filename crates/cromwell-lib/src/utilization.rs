//! Peak resource utilization of a single workflow task
//!
//! A [`ResourceUtilization`] is produced once per monitoring log (one per
//! shard or attempt) and combined with [`ResourceUtilization::merge`] into a
//! worst-case record for the whole task. Records are never mutated in place:
//! every merge returns a new value.

use crate::error::UtilizationError;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;
use std::str::FromStr;

/// Peak memory and disk usage observed for one task.
///
/// The used fractions are always derived from the stored maxima and
/// availables; they cannot be set independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUtilization {
    task_name: String,
    max_memory_mb: u64,
    available_memory_mb: u64,
    max_disk_kb: u64,
    available_disk_kb: u64,
    robust: bool,
}

impl ResourceUtilization {
    /// Build a record, rejecting zero available memory or disk.
    pub fn new(
        task_name: impl Into<String>,
        max_memory_mb: u64,
        available_memory_mb: u64,
        max_disk_kb: u64,
        available_disk_kb: u64,
        robust: bool,
    ) -> Result<Self, UtilizationError> {
        let task_name = task_name.into();
        if available_memory_mb == 0 {
            return Err(UtilizationError::ZeroAvailable {
                task: task_name,
                resource: "memory",
            });
        }
        if available_disk_kb == 0 {
            return Err(UtilizationError::ZeroAvailable {
                task: task_name,
                resource: "disk",
            });
        }

        Ok(Self {
            task_name,
            max_memory_mb,
            available_memory_mb,
            max_disk_kb,
            available_disk_kb,
            robust,
        })
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn max_memory_mb(&self) -> u64 {
        self.max_memory_mb
    }

    pub fn available_memory_mb(&self) -> u64 {
        self.available_memory_mb
    }

    pub fn max_disk_kb(&self) -> u64 {
        self.max_disk_kb
    }

    pub fn available_disk_kb(&self) -> u64 {
        self.available_disk_kb
    }

    /// Whether enough monitoring ticks were observed to trust the peaks.
    pub fn robust(&self) -> bool {
        self.robust
    }

    pub fn fraction_memory_used(&self) -> f64 {
        self.max_memory_mb as f64 / self.available_memory_mb as f64
    }

    pub fn fraction_disk_used(&self) -> f64 {
        self.max_disk_kb as f64 / self.available_disk_kb as f64
    }

    /// Combine two records of the same task into their worst case.
    ///
    /// Maxima and availables take the larger value, `robust` is true if
    /// either side is robust. Merging with `None` returns a copy of `self`.
    /// Task names are not compared; group records by task before folding.
    pub fn merge(&self, other: Option<&ResourceUtilization>) -> ResourceUtilization {
        let Some(other) = other else {
            return self.clone();
        };

        // availables are non-zero on both sides, so their max is non-zero too
        ResourceUtilization {
            task_name: self.task_name.clone(),
            max_memory_mb: self.max_memory_mb.max(other.max_memory_mb),
            available_memory_mb: self.available_memory_mb.max(other.available_memory_mb),
            max_disk_kb: self.max_disk_kb.max(other.max_disk_kb),
            available_disk_kb: self.available_disk_kb.max(other.available_disk_kb),
            robust: self.robust || other.robust,
        }
    }

    /// Numeric value of a single attribute, for charting.
    pub fn value(&self, attribute: UtilizationAttribute) -> f64 {
        match attribute {
            UtilizationAttribute::MaxMemory => self.max_memory_mb as f64,
            UtilizationAttribute::AvailableMemory => self.available_memory_mb as f64,
            UtilizationAttribute::MaxDisk => self.max_disk_kb as f64,
            UtilizationAttribute::AvailableDisk => self.available_disk_kb as f64,
            UtilizationAttribute::FractionMemoryUsed => self.fraction_memory_used(),
            UtilizationAttribute::FractionDiskUsed => self.fraction_disk_used(),
        }
    }
}

/// Renders the monitoring summary block read back by
/// [`parse_summary_log`](crate::monitoring::parse_summary_log).
impl fmt::Display for ResourceUtilization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} Monitoring Summary:", self.task_name)?;
        writeln!(f, "Max Memory Usage (MB): {}", self.max_memory_mb)?;
        writeln!(f, "Available Memory (MB): {}", self.available_memory_mb)?;
        writeln!(f, "Max disk usage   (KB): {}", self.max_disk_kb)?;
        writeln!(f, "Available disk   (KB): {}", self.available_disk_kb)?;
        writeln!(f, "Disk Utilized     (%): {:.3}", self.fraction_disk_used())?;
        writeln!(f, "Memory Utilized   (%): {:.3}", self.fraction_memory_used())?;
        writeln!(
            f,
            "Robust Estimate?     : {}",
            if self.robust { "True" } else { "False" }
        )
    }
}

impl Serialize for ResourceUtilization {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResourceUtilization", 8)?;
        state.serialize_field("task_name", &self.task_name)?;
        state.serialize_field("max_memory_mb", &self.max_memory_mb)?;
        state.serialize_field("available_memory_mb", &self.available_memory_mb)?;
        state.serialize_field("max_disk_kb", &self.max_disk_kb)?;
        state.serialize_field("available_disk_kb", &self.available_disk_kb)?;
        state.serialize_field("fraction_memory_used", &self.fraction_memory_used())?;
        state.serialize_field("fraction_disk_used", &self.fraction_disk_used())?;
        state.serialize_field("robust", &self.robust)?;
        state.end()
    }
}

/// A single numeric field of [`ResourceUtilization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtilizationAttribute {
    MaxMemory,
    AvailableMemory,
    MaxDisk,
    AvailableDisk,
    FractionMemoryUsed,
    FractionDiskUsed,
}

impl UtilizationAttribute {
    pub const ALL: [UtilizationAttribute; 6] = [
        Self::MaxMemory,
        Self::AvailableMemory,
        Self::MaxDisk,
        Self::AvailableDisk,
        Self::FractionMemoryUsed,
        Self::FractionDiskUsed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxMemory => "max_memory",
            Self::AvailableMemory => "available_memory",
            Self::MaxDisk => "max_disk",
            Self::AvailableDisk => "available_disk",
            Self::FractionMemoryUsed => "fraction_memory_used",
            Self::FractionDiskUsed => "fraction_disk_used",
        }
    }
}

impl fmt::Display for UtilizationAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UtilizationAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "max_memory" | "max_mem" => Ok(Self::MaxMemory),
            "available_memory" | "available_mem" | "total_memory" => Ok(Self::AvailableMemory),
            "max_disk" => Ok(Self::MaxDisk),
            "available_disk" | "total_disk" => Ok(Self::AvailableDisk),
            "fraction_memory_used" | "mem_utilized" => Ok(Self::FractionMemoryUsed),
            "fraction_disk_used" | "disk_utilized" => Ok(Self::FractionDiskUsed),
            other => Err(format!(
                "unknown attribute '{}', expected one of: {}",
                other,
                Self::ALL.map(|a| a.as_str()).join(", ")
            )),
        }
    }
}
