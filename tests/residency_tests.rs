mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::assertions::assert_unavailable_error;
use common::vectors::random_vectors;

use quiver::index::Structure;
use quiver::residency::{self, DeviceBackend, HostOnly, ResidencyMigrator};
use quiver::{Index, Metric, QuiverError, Residency, Result};

/// Backend with a fixed number of fake devices that counts uploads.
#[derive(Debug, Default)]
struct CountingDevices {
    devices: u32,
    uploads: AtomicUsize,
}

impl DeviceBackend for CountingDevices {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn device_count(&self) -> u32 {
        self.devices
    }

    fn upload(&self, structure: &Structure, _device: u32) -> Result<Structure> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(structure.clone())
    }
}

/// Backend whose transfers always fail.
#[derive(Debug)]
struct BrokenBus;

impl DeviceBackend for BrokenBus {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn device_count(&self) -> u32 {
        1
    }

    fn upload(&self, _structure: &Structure, device: u32) -> Result<Structure> {
        Err(QuiverError::unavailable(format!("device {device} lost")))
    }
}

fn populated() -> Index {
    let mut index = Index::new(4, "Flat", Metric::L2).unwrap();
    index.add(20, &random_vectors(20, 4)).unwrap();
    index
}

#[test]
fn test_default_build_reports_no_devices() {
    // Without `runtime::init` the process backend is host-only.
    assert_eq!(residency::device_count(), 0);
    assert_eq!(ResidencyMigrator::global().backend_name(), "host-only");
}

#[test]
fn test_clone_to_gpu_without_devices_is_unavailable() {
    let index = populated();
    assert_unavailable_error(&index.clone_to_gpu(0));
    assert_unavailable_error(&residency::to_accelerator(&index, 0));
    assert_eq!(index.residency(), Residency::Host);
}

#[test]
fn test_host_only_never_falls_back() {
    let migrator = ResidencyMigrator::new(Arc::new(HostOnly));
    assert_eq!(migrator.device_count(), 0);
    assert_unavailable_error(&migrator.to_accelerator(&populated(), 0));
}

#[test]
fn test_upload_produces_independent_device_copy() {
    let backend = Arc::new(CountingDevices {
        devices: 2,
        ..Default::default()
    });
    let migrator = ResidencyMigrator::new(backend.clone());
    let source = populated();

    let mut on_device = migrator.to_accelerator(&source, 1).unwrap();
    assert_eq!(on_device.residency(), Residency::Device(1));
    assert_eq!(source.residency(), Residency::Host);
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);

    let queries = random_vectors(3, 4);
    assert_eq!(
        on_device.search(3, &queries, 4).unwrap(),
        source.search(3, &queries, 4).unwrap()
    );

    on_device.reset().unwrap();
    assert_eq!(on_device.n_total(), 0);
    assert_eq!(source.n_total(), 20);

    let back = on_device.clone_to_host();
    assert_eq!(back.residency(), Residency::Host);
}

#[test]
fn test_device_out_of_range() {
    let migrator = ResidencyMigrator::new(Arc::new(CountingDevices {
        devices: 2,
        ..Default::default()
    }));
    let index = populated();
    assert_unavailable_error(&migrator.to_accelerator(&index, 2));
    assert_unavailable_error(&migrator.to_accelerator(&index, -1));
}

#[test]
fn test_upload_failure_propagates() {
    let migrator = ResidencyMigrator::new(Arc::new(BrokenBus));
    let err = migrator.to_accelerator(&populated(), 0).unwrap_err();
    assert!(err.to_string().contains("device 0 lost"));
}

#[cfg(feature = "emulated-accelerator")]
#[test]
fn test_emulated_devices() {
    use quiver::residency::EmulatedDevices;

    let migrator = ResidencyMigrator::new(Arc::new(EmulatedDevices::new(3)));
    assert_eq!(migrator.device_count(), 3);
    let copy = migrator.to_accelerator(&populated(), 2).unwrap();
    assert_eq!(copy.residency(), Residency::Device(2));
    assert_eq!(copy.n_total(), 20);
}
