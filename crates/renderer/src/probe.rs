//! One-shot detection of a usable rendering backend.

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

/// Summary of the adapter that passed the probe.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
            || self.name.to_ascii_lowercase().contains("llvmpipe")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    Unknown,
    Ready(AdapterProfile),
    Unavailable(String),
}

impl Capability {
    pub fn is_ready(&self) -> bool {
        matches!(self, Capability::Ready(_))
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no compatible GPU adapter: {0}")]
    NoAdapter(String),
    #[error("failed to create GPU device: {0}")]
    NoDevice(String),
}

/// Resolves [`Capability`] exactly once; later runs return the cached answer.
#[derive(Debug)]
pub struct CapabilityProbe {
    state: Capability,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        Self {
            state: Capability::Unknown,
        }
    }

    pub fn state(&self) -> &Capability {
        &self.state
    }

    pub fn run<F>(&mut self, detect: F) -> &Capability
    where
        F: FnOnce() -> Result<AdapterProfile, ProbeError>,
    {
        if matches!(self.state, Capability::Unknown) {
            self.state = match detect() {
                Ok(profile) => {
                    info!(
                        adapter = %profile.name,
                        backend = ?profile.backend,
                        software = profile.is_software(),
                        "rendering backend available"
                    );
                    Capability::Ready(profile)
                }
                Err(err) => {
                    warn!(error = %err, "rendering backend unavailable; using static fallback");
                    Capability::Unavailable(err.to_string())
                }
            };
        }
        &self.state
    }
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens and immediately drops a throwaway adapter and device.
pub fn detect_wgpu() -> Result<AdapterProfile, ProbeError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .map_err(|err| ProbeError::NoAdapter(err.to_string()))?;

    let profile = AdapterProfile::from_wgpu(&adapter.get_info(), &adapter.limits());
    let (device, _queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("capability probe"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .map_err(|err| ProbeError::NoDevice(err.to_string()))?;
    device.destroy();
    Ok(profile)
}

/// Static stand-in shown when layering cannot run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPanel {
    pub background: [u8; 3],
    pub title: String,
    pub detail: String,
}

impl FallbackPanel {
    pub const BACKGROUND: [u8; 3] = [0x11, 0x11, 0x11];

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            background: Self::BACKGROUND,
            title: "Mythic layering unavailable".to_string(),
            detail: format!(
                "Mythic layering requires GPU rendering support ({})",
                reason.into()
            ),
        }
    }
}

impl fmt::Display for FallbackPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.detail)
    }
}
