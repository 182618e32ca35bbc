//! Host/accelerator residency.
//!
//! Accelerator support is a pluggable [`DeviceBackend`]. Builds without one
//! report zero devices and refuse every upload; callers branch on
//! [`device_count`] instead of on build flags.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{QuiverError, Result};
use crate::index::structure::Structure;
use crate::index::Index;
use crate::metrics::observe;
use crate::types::Residency;

pub trait DeviceBackend: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Number of usable devices. Zero is a normal answer.
    fn device_count(&self) -> u32;

    /// Copy `structure` into the memory of `device`. `device` has already
    /// been checked against `device_count()`.
    fn upload(&self, structure: &Structure, device: u32) -> Result<Structure>;
}

/// No accelerator compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostOnly;

impl DeviceBackend for HostOnly {
    fn name(&self) -> &'static str {
        "host-only"
    }

    fn device_count(&self) -> u32 {
        0
    }

    fn upload(&self, _structure: &Structure, device: u32) -> Result<Structure> {
        Err(QuiverError::unavailable(format!(
            "no accelerator backend compiled in (requested device {device})"
        )))
    }
}

/// Devices emulated in host memory, for exercising the residency contract
/// without hardware.
#[cfg(feature = "emulated-accelerator")]
#[derive(Debug, Clone, Copy)]
pub struct EmulatedDevices {
    devices: u32,
}

#[cfg(feature = "emulated-accelerator")]
impl EmulatedDevices {
    pub fn new(devices: u32) -> Self {
        Self { devices }
    }
}

#[cfg(feature = "emulated-accelerator")]
impl DeviceBackend for EmulatedDevices {
    fn name(&self) -> &'static str {
        "emulated"
    }

    fn device_count(&self) -> u32 {
        self.devices
    }

    fn upload(&self, structure: &Structure, device: u32) -> Result<Structure> {
        debug!(device, "copying structure to emulated device");
        Ok(structure.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ResidencyMigrator {
    backend: Arc<dyn DeviceBackend>,
}

impl ResidencyMigrator {
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self { backend }
    }

    /// Migrator over the process-wide backend installed by `runtime::init`.
    pub fn global() -> Self {
        Self::new(crate::runtime::backend())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn device_count(&self) -> u32 {
        self.backend.device_count()
    }

    /// Deep copy of `index` resident on `device`. Never falls back to host.
    #[instrument(skip(self, index), fields(backend = self.backend.name(), d = index.dim()))]
    pub fn to_accelerator(&self, index: &Index, device: i32) -> Result<Index> {
        let count = self.backend.device_count();
        if count == 0 {
            return Err(QuiverError::unavailable(format!(
                "backend '{}' has no devices",
                self.backend.name()
            )));
        }
        let device = u32::try_from(device)
            .ok()
            .filter(|&d| d < count)
            .ok_or_else(|| {
                QuiverError::unavailable(format!(
                    "device {device} out of range (backend '{}' has {count})",
                    self.backend.name()
                ))
            })?;

        let structure = observe("clone_to_gpu", || self.backend.upload(index.structure(), device))?;
        debug!(device, n_total = index.n_total(), "index copied to device");
        Ok(Index::from_parts(
            index.description().to_string(),
            index.metric(),
            structure,
            Residency::Device(device),
            index.is_read_only(),
        ))
    }
}

pub fn device_count() -> u32 {
    ResidencyMigrator::global().device_count()
}

pub fn to_accelerator(index: &Index, device: i32) -> Result<Index> {
    ResidencyMigrator::global().to_accelerator(index, device)
}
