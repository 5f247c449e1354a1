use crate::cpu::CpuBackend;
use crate::gpu::GpuContext;
use crate::{BackendType, ComputeContext, Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which backend a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    /// GPU for images of at least `gpu_min_pixels`, CPU otherwise or when no
    /// adapter exists.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl FromStr for BackendPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "gpu" | "wgpu" | "webgpu" => Ok(Self::Gpu),
            other => Err(Error::InvalidInput(format!(
                "unknown backend '{other}' (expected auto, cpu or gpu)"
            ))),
        }
    }
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu => write!(f, "gpu"),
        }
    }
}

/// Auto-select CPU or GPU based on problem size
pub fn should_use_gpu(preference: BackendPreference, pixel_count: usize, gpu_min_pixels: usize) -> bool {
    match preference {
        BackendPreference::Cpu => false,
        BackendPreference::Gpu => true,
        BackendPreference::Auto => pixel_count >= gpu_min_pixels,
    }
}

/// A concrete backend a pipeline can run on.
#[derive(Clone, Debug)]
pub enum ComputeDevice {
    Cpu(CpuBackend),
    Gpu(Arc<GpuContext>),
}

impl ComputeDevice {
    pub fn cpu() -> Self {
        ComputeDevice::Cpu(CpuBackend::new())
    }

    /// The shared GPU context, or `BackendNotAvailable`.
    pub fn gpu() -> Result<Self> {
        GpuContext::global()
            .map(ComputeDevice::Gpu)
            .ok_or_else(|| Error::backend_not_available("no wgpu adapter found"))
    }

    /// Resolve a preference for an image of `pixel_count` pixels.
    ///
    /// `Auto` falls back to `cpu` when the GPU is unavailable; an explicit
    /// `Gpu` preference does not.
    pub fn select(
        preference: BackendPreference,
        pixel_count: usize,
        gpu_min_pixels: usize,
        cpu: &CpuBackend,
    ) -> Result<Self> {
        if !should_use_gpu(preference, pixel_count, gpu_min_pixels) {
            return Ok(ComputeDevice::Cpu(cpu.clone()));
        }
        match (preference, GpuContext::global()) {
            (_, Some(gpu)) => Ok(ComputeDevice::Gpu(gpu)),
            (BackendPreference::Gpu, None) => Err(Error::backend_not_available("no wgpu adapter found")),
            (_, None) => {
                tracing::warn!("GPU unavailable, falling back to CPU");
                Ok(ComputeDevice::Cpu(cpu.clone()))
            }
        }
    }

    pub fn backend_type(&self) -> BackendType {
        match self {
            ComputeDevice::Cpu(cpu) => cpu.backend_type(),
            ComputeDevice::Gpu(gpu) => gpu.backend_type(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ComputeDevice::Cpu(cpu) => cpu.name(),
            ComputeDevice::Gpu(gpu) => gpu.name(),
        }
    }
}
