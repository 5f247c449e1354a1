//! GPU Compute Kernels
//!
//! Host-side encoding for the WGSL equalization program, plus the buffer
//! helpers shared by every dispatch.

pub mod equalize;

/// Workgroup size configuration
pub const WORKGROUP_SIZE_1D: u32 = 256;

/// Workgroups needed for `count` invocations.
pub fn dispatch_size_1d(count: u32) -> u32 {
    count.div_ceil(WORKGROUP_SIZE_1D)
}

/// Spread `count` invocations over a 2D grid whose x extent stays within
/// `max_per_dim`; shaders flatten the grid back with `num_workgroups`.
pub fn dispatch_grid(count: u32, max_per_dim: u32) -> (u32, u32) {
    let groups = dispatch_size_1d(count).max(1);
    if groups <= max_per_dim {
        (groups, 1)
    } else {
        (max_per_dim, groups.div_ceil(max_per_dim))
    }
}

/// GPU Buffer utilities
pub mod buffer_utils {
    use crate::gpu::GpuContext;
    use wgpu::util::DeviceExt;
    use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device, MapMode};

    pub const STORAGE_USAGE: BufferUsages = BufferUsages::STORAGE
        .union(BufferUsages::COPY_SRC)
        .union(BufferUsages::COPY_DST);

    /// Storage buffer of `words` zeroed u32 values. wgpu zero-initializes
    /// buffers that are not mapped at creation.
    pub fn create_storage_zeroed(device: &Device, label: &str, words: usize) -> Buffer {
        device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: (words as u64) * 4,
            usage: STORAGE_USAGE,
            mapped_at_creation: false,
        })
    }

    pub fn create_storage_init(device: &Device, label: &str, data: &[u32]) -> Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage: STORAGE_USAGE,
        })
    }

    pub fn create_uniform<T: bytemuck::Pod>(device: &Device, label: &str, value: &T) -> Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: BufferUsages::UNIFORM,
        })
    }

    /// Download `words` u32 values, blocking until the copy has landed.
    pub fn read_buffer(ctx: &GpuContext, buffer: &Buffer, words: usize) -> crate::Result<Vec<u32>> {
        let size = (words as u64) * 4;
        let staging_buffer = ctx.device.create_buffer(&BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size);
        ctx.submit(encoder);

        let (tx, rx) = std::sync::mpsc::channel();
        let slice = staging_buffer.slice(..);
        slice.map_async(MapMode::Read, move |res| {
            tx.send(res).ok();
        });
        ctx.wait();

        rx.recv()
            .map_err(|_| crate::Error::DeviceError("Readback channel closed".to_string()))?
            .map_err(|e| crate::Error::DeviceError(format!("Buffer mapping failed: {}", e)))?;

        let data = slice.get_mapped_range();
        let words: Vec<u32> = data
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        drop(data);
        staging_buffer.unmap();

        Ok(words)
    }
}
