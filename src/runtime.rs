//! One-time process setup: configuration, logging, metrics and the
//! accelerator backend.
//!
//! Engine operations work before (or without) [`init`]; they fall back to
//! default settings and the host-only backend.

use std::sync::{Arc, OnceLock};

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::residency::{DeviceBackend, HostOnly};

struct Runtime {
    config: Config,
    backend: Arc<dyn DeviceBackend>,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static DEFAULTS: OnceLock<Config> = OnceLock::new();

/// Install `config` for the process. Returns `false` if already initialised,
/// in which case nothing changes.
pub fn init(config: Config) -> bool {
    init_with_backend(config.clone(), select_backend(&config))
}

/// Like [`init`] with an explicit accelerator backend.
pub fn init_with_backend(config: Config, backend: Arc<dyn DeviceBackend>) -> bool {
    let mut installed = false;
    RUNTIME.get_or_init(|| {
        installed = true;
        init_logging(&config);
        crate::metrics::init();
        tracing::info!(backend = backend.name(), devices = backend.device_count(), "quiver initialised");
        Runtime { config, backend }
    });
    installed
}

/// Read `.env`, load [`Config`] from the environment and initialise.
pub fn init_from_env() -> Result<bool> {
    let _ = dotenvy::dotenv();
    let config = Config::load(None)?;
    Ok(init(config))
}

pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}

/// Active settings, or defaults before initialisation.
pub fn settings() -> &'static Config {
    match RUNTIME.get() {
        Some(rt) => &rt.config,
        None => DEFAULTS.get_or_init(Config::default),
    }
}

pub fn backend() -> Arc<dyn DeviceBackend> {
    match RUNTIME.get() {
        Some(rt) => rt.backend.clone(),
        None => Arc::new(HostOnly),
    }
}

#[cfg(feature = "emulated-accelerator")]
fn select_backend(config: &Config) -> Arc<dyn DeviceBackend> {
    Arc::new(crate::residency::EmulatedDevices::new(
        config.accelerator.emulated_devices,
    ))
}

#[cfg(not(feature = "emulated-accelerator"))]
fn select_backend(_config: &Config) -> Arc<dyn DeviceBackend> {
    Arc::new(HostOnly)
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // A host application may already own the global subscriber.
    let _ = match config.logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
}
