use crate::context::{ComputeContext, DeviceBuffer, StageArgs};
use crate::gpu_kernels::{buffer_utils, equalize};
use crate::{AccessMode, BackendType, Error, GpuBuffer, GpuProgram, Result};
use heq_core::SampleDepth;
use pollster::block_on;
use std::sync::{Arc, OnceLock};
use wgpu::{Backends, Device, Instance, PowerPreference, Queue, RequestAdapterOptions};

static GPU_CONTEXT: OnceLock<Option<Arc<GpuContext>>> = OnceLock::new();

/// Latched device-lost state, set from the wgpu callback.
#[derive(Debug, Clone, Default)]
pub struct DeviceHealth {
    lost: Arc<OnceLock<String>>,
}

impl DeviceHealth {
    /// Record the loss. Only the first reason is kept.
    pub fn mark_lost(&self, reason: impl Into<String>) {
        let _ = self.lost.set(reason.into());
    }

    pub fn is_lost(&self) -> bool {
        self.lost.get().is_some()
    }

    pub fn check(&self) -> Result<()> {
        match self.lost.get() {
            Some(reason) => Err(Error::DeviceError(format!("device lost: {reason}"))),
            None => Ok(()),
        }
    }
}

/// Shared GPU Context containing Device and Queue.
#[derive(Debug)]
pub struct GpuContext {
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub info: wgpu::AdapterInfo,
    pub limits: wgpu::Limits,
    pub health: DeviceHealth,
}

impl GpuContext {
    /// Initialize a new GPU context on the best available adapter (HighPerformance).
    pub fn new() -> Result<Self> {
        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let adapter = block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| Error::backend_not_available("no wgpu adapter found"))?;

        let info = adapter.get_info();
        let adapter_limits = adapter.limits();

        // 16-bit tables and large images need more than the downlevel binding size.
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::downlevel_defaults()
        };

        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("histeq-device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| Error::DeviceError(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|err| {
            tracing::error!("uncaptured wgpu error: {err}");
        }));

        let health = DeviceHealth::default();
        let lost = health.clone();
        device.set_device_lost_callback(move |reason, message| {
            tracing::error!(?reason, %message, "wgpu device lost");
            lost.mark_lost(format!("{reason:?}: {message}"));
        });

        tracing::debug!(adapter = %info.name, backend = ?info.backend, "gpu context created");

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
            limits,
            health,
        })
    }

    /// Process-wide context, created on first use. `None` when no adapter exists.
    pub fn global() -> Option<Arc<GpuContext>> {
        GPU_CONTEXT
            .get_or_init(|| match GpuContext::new() {
                Ok(ctx) => Some(Arc::new(ctx)),
                Err(e) => {
                    tracing::warn!("GPU unavailable: {e}");
                    None
                }
            })
            .clone()
    }

    pub fn is_available() -> bool {
        Self::global().is_some()
    }

    pub fn submit(&self, encoder: wgpu::CommandEncoder) -> wgpu::SubmissionIndex {
        self.queue.submit(std::iter::once(encoder.finish()))
    }

    pub fn wait(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Run `f` inside validation and out-of-memory error scopes and report
    /// the first captured error.
    pub(crate) fn scoped<R>(&self, f: impl FnOnce() -> R) -> (R, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let out = f();
        let oom = block_on(self.device.pop_error_scope());
        let validation = block_on(self.device.pop_error_scope());
        (out, oom.or(validation))
    }

    fn check_size(&self, label: &str, words: usize) -> Result<u64> {
        let bytes = (words as u64) * 4;
        let limit = self
            .limits
            .max_buffer_size
            .min(self.limits.max_storage_buffer_binding_size as u64);
        if bytes > limit {
            return Err(Error::out_of_memory(format!(
                "{label}: {bytes} bytes exceeds the device limit of {limit}"
            )));
        }
        Ok(bytes)
    }
}

impl ComputeContext for GpuContext {
    type Buffer = GpuBuffer;
    type Program = GpuProgram;

    fn backend_type(&self) -> BackendType {
        BackendType::WebGpu
    }

    fn name(&self) -> &str {
        &self.info.name
    }

    fn build_program(&self, depth: SampleDepth) -> Result<GpuProgram> {
        equalize::build_program(self, depth, crate::PROGRAM_SOURCE)
    }

    fn alloc_zeroed(&self, label: &str, words: usize, access: AccessMode) -> Result<GpuBuffer> {
        self.check_size(label, words)?;
        let (buffer, err) = self.scoped(|| {
            buffer_utils::create_storage_zeroed(&self.device, label, words)
        });
        if let Some(err) = err {
            return Err(Error::out_of_memory(format!("{label}: {err}")));
        }
        Ok(GpuBuffer::new(buffer, label, access, words))
    }

    fn upload(&self, label: &str, data: &[u32], access: AccessMode) -> Result<GpuBuffer> {
        self.check_size(label, data.len())?;
        let (buffer, err) = self.scoped(|| {
            buffer_utils::create_storage_init(&self.device, label, data)
        });
        if let Some(err) = err {
            return Err(Error::out_of_memory(format!("{label}: {err}")));
        }
        Ok(GpuBuffer::new(buffer, label, access, data.len()))
    }

    fn dispatch(&self, program: &GpuProgram, args: StageArgs<'_, GpuBuffer>) -> Result<()> {
        equalize::dispatch(self, program, args)
    }

    fn barrier(&self) -> Result<()> {
        self.wait();
        self.health.check()
    }

    fn read(&self, buffer: &GpuBuffer) -> Result<Vec<u32>> {
        let words = buffer_utils::read_buffer(self, &buffer.buffer, buffer.words())?;
        // A lost device maps buffers to zeros rather than failing.
        self.health.check()?;
        Ok(words)
    }
}
