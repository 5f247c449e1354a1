use crate::context::{Bindings, StageArgs};
use crate::gpu::GpuContext;
use crate::gpu_kernels::buffer_utils;
use crate::gpu_kernels::dispatch_grid;
use crate::{EntryPoints, Error, GpuBuffer, Result, Stage};
use heq_core::SampleDepth;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct StageParams {
    pixel_count: u32,
    word_count: u32,
    mode: u32,
    offset: u32,
}

/// The four compiled stage pipelines for one depth.
pub struct GpuProgram {
    pub depth: SampleDepth,
    pub entries: EntryPoints,
    histogram: wgpu::ComputePipeline,
    cumulative: wgpu::ComputePipeline,
    normalize: wgpu::ComputePipeline,
    back_project: wgpu::ComputePipeline,
}

impl std::fmt::Debug for GpuProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuProgram")
            .field("depth", &self.depth)
            .field("entries", &self.entries)
            .finish()
    }
}

/// Compile `source` and resolve the entry points for `depth`.
///
/// Shader and pipeline validation errors are captured and reported as
/// [`Error::ProgramBuild`] instead of reaching the uncaptured error handler.
pub fn build_program(ctx: &GpuContext, depth: SampleDepth, source: &str) -> Result<GpuProgram> {
    let entries = EntryPoints::for_depth(depth);

    let (program, err) = ctx.scoped(|| {
        let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Equalize Program"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let make_pipeline = |entry: &str| {
            ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: None,
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        GpuProgram {
            depth,
            entries,
            histogram: make_pipeline(entries.histogram),
            cumulative: make_pipeline(entries.cumulative),
            normalize: make_pipeline(entries.normalize),
            back_project: make_pipeline(entries.back_project),
        }
    });

    match err {
        Some(e) => Err(Error::ProgramBuild(e.to_string())),
        None => Ok(program),
    }
}

fn bind_group(
    ctx: &GpuContext,
    pipeline: &wgpu::ComputePipeline,
    label: &str,
    entries: &[(u32, &wgpu::Buffer)],
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry> = entries
        .iter()
        .map(|&(binding, buffer)| wgpu::BindGroupEntry {
            binding,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &pipeline.get_bind_group_layout(0),
        entries: &entries,
    })
}

fn encode_pass(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    grid: (u32, u32),
    label: &str,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(grid.0, grid.1, 1);
}

/// Encode and submit one stage. Returns once the work is queued.
pub fn dispatch(ctx: &GpuContext, program: &GpuProgram, args: StageArgs<'_, GpuBuffer>) -> Result<()> {
    args.validate()?;
    let geometry = args.geometry;
    if geometry.depth != program.depth {
        return Err(Error::InvalidInput(format!(
            "program built for {} cannot run a {} image",
            program.depth, geometry.depth
        )));
    }

    let stage = args.stage();
    let entry = program.entries.get(stage);
    let word_count = geometry.image_words() as u32;
    let levels = geometry.levels() as u32;
    let max_dim = ctx.limits.max_compute_workgroups_per_dimension;
    let params = |offset: u32| StageParams {
        pixel_count: geometry.pixel_count,
        word_count,
        mode: geometry.mode.code(),
        offset,
    };

    tracing::debug!(entry, pixels = geometry.pixel_count, words = word_count, "gpu dispatch");

    let (res, err) = ctx.scoped(|| -> Result<()> {
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(entry),
        });

        match args.bindings {
            Bindings::Histogram { image, histogram } => {
                let uniform = buffer_utils::create_uniform(&ctx.device, "Histogram Params", &params(0));
                let bg = bind_group(
                    ctx,
                    &program.histogram,
                    "Histogram Bind Group",
                    &[(0, &uniform), (1, &image.buffer), (2, &histogram.buffer)],
                );
                encode_pass(&mut encoder, &program.histogram, &bg, dispatch_grid(word_count, max_dim), entry);
            }
            Bindings::Cumulative { histogram, cumulative } => {
                // Hillis-Steele: log2(L) passes ping-ponging between the output
                // and a scratch table, arranged so the last pass lands in the output.
                let passes = levels.trailing_zeros();
                let scratch = buffer_utils::create_storage_zeroed(&ctx.device, "Scan Scratch", levels as usize);
                let mut src: &wgpu::Buffer = &histogram.buffer;
                for k in 0..passes {
                    let dst: &wgpu::Buffer = if (passes - 1 - k) % 2 == 0 {
                        &cumulative.buffer
                    } else {
                        &scratch
                    };
                    let uniform = buffer_utils::create_uniform(&ctx.device, "Scan Params", &params(1 << k));
                    let bg = bind_group(
                        ctx,
                        &program.cumulative,
                        "Scan Bind Group",
                        &[(0, &uniform), (3, src), (4, dst)],
                    );
                    encode_pass(&mut encoder, &program.cumulative, &bg, dispatch_grid(levels, max_dim), entry);
                    src = dst;
                }
            }
            Bindings::Normalize { cumulative, lut } => {
                let uniform = buffer_utils::create_uniform(&ctx.device, "Normalize Params", &params(0));
                let bg = bind_group(
                    ctx,
                    &program.normalize,
                    "Normalize Bind Group",
                    &[(0, &uniform), (5, &cumulative.buffer), (6, &lut.buffer)],
                );
                encode_pass(&mut encoder, &program.normalize, &bg, dispatch_grid(levels, max_dim), entry);
            }
            Bindings::BackProject { image, lut, output } => {
                let uniform = buffer_utils::create_uniform(&ctx.device, "Back Projection Params", &params(0));
                let bg = bind_group(
                    ctx,
                    &program.back_project,
                    "Back Projection Bind Group",
                    &[(0, &uniform), (1, &image.buffer), (7, &lut.buffer), (8, &output.buffer)],
                );
                encode_pass(&mut encoder, &program.back_project, &bg, dispatch_grid(word_count, max_dim), entry);
            }
        }

        ctx.submit(encoder);
        Ok(())
    });

    res?;
    match err {
        Some(e) if matches!(e, wgpu::Error::OutOfMemory { .. }) => {
            Err(Error::out_of_memory(format!("{stage}: {e}")))
        }
        Some(e) => Err(Error::DeviceError(format!("{stage}: {e}"))),
        None => Ok(()),
    }
}
