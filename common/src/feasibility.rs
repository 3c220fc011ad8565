//! Pre-allocation feasibility checks.
//!
//! The checks close the window between "decided to allocate" and "the OS
//! grants the allocation", but they are advisory: another allocator can
//! consume the same pool in between. That race is documented behavior,
//! not an error condition.

use std::path::PathBuf;

use clap::Args;
use error_stack::ResultExt;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FormattedSize, Result, SlabError};
use crate::segment::DEFAULT_SHM_MOUNT;
use crate::system::{available_system_memory, shm_mount_stats};

/// Default meminfo file used for system memory accounting.
pub const DEFAULT_MEMINFO: &str = "/proc/meminfo";

/// Refuse allocations above this fraction of available system memory.
///
/// A deliberately conservative safety margin, not a hard OS limit.
pub const DEFAULT_PRESSURE_THRESHOLD: f64 = 0.90;

/// Options controlling the feasibility check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityOptions {
    /// Mount point of the shared memory backed filesystem.
    pub shm_mount: PathBuf,
    /// File with system memory accounting, in meminfo format.
    pub meminfo: PathBuf,
    /// Maximum accepted ratio of required bytes to available memory.
    pub pressure_threshold: f64,
}

impl Default for FeasibilityOptions {
    fn default() -> Self {
        Self {
            shm_mount: DEFAULT_SHM_MOUNT.into(),
            meminfo: DEFAULT_MEMINFO.into(),
            pressure_threshold: DEFAULT_PRESSURE_THRESHOLD,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct FeasibilityArgs {
    /// Mount point of the shared memory backed filesystem.
    #[arg(long, env)]
    pub shm_mount: Option<PathBuf>,
    /// Maximum accepted ratio of required bytes to available system memory.
    #[arg(long, env)]
    pub pressure_threshold: Option<f64>,
}

impl FeasibilityArgs {
    /// Convert the feasibility arguments into feasibility options.
    pub fn to_feasibility_options(&self) -> FeasibilityOptions {
        let mut options = FeasibilityOptions::default();

        if let Some(shm_mount) = &self.shm_mount {
            options.shm_mount = shm_mount.clone();
        }
        if let Some(pressure_threshold) = self.pressure_threshold {
            options.pressure_threshold = pressure_threshold;
        }

        options
    }
}

/// Measured figures behind a successful feasibility check.
#[derive(Debug, Clone, Copy)]
pub struct FeasibilityReport {
    /// Ratio of required bytes to available system memory.
    pub pressure: f64,
    pub shm_available: u64,
    pub sys_available: u64,
}

/// Check that allocating `required` bytes of shared memory is advisable.
pub fn check_feasibility(required: u64, options: &FeasibilityOptions) -> Result<FeasibilityReport> {
    let mount = shm_mount_stats(&options.shm_mount)?;
    let sys_available = available_system_memory(&options.meminfo)?;

    let report = evaluate(
        required,
        mount.available,
        sys_available,
        options.pressure_threshold,
    )?;

    info!(
        pressure = report.pressure,
        required = %FormattedSize(required),
        shm_available = %FormattedSize(report.shm_available),
        sys_available = %FormattedSize(report.sys_available),
        "slab allocation is feasible"
    );

    Ok(report)
}

/// Decide feasibility from already-measured capacity figures.
pub fn evaluate(
    required: u64,
    shm_available: u64,
    sys_available: u64,
    pressure_threshold: f64,
) -> Result<FeasibilityReport> {
    if required > shm_available {
        return Err(SlabError::InsufficientShmCapacity {
            required,
            available: shm_available,
        })
        .attach_printable("the shared memory mount cannot hold the slab");
    }

    let pressure = required as f64 / sys_available as f64;
    if pressure > pressure_threshold {
        return Err(SlabError::MemoryPressureTooHigh {
            pressure,
            required,
            available: sys_available,
        })
        .attach_printable_lazy(|| format!("threshold: {:.2}", pressure_threshold));
    }

    Ok(FeasibilityReport {
        pressure,
        shm_available,
        sys_available,
    })
}
