use crate::context::{Bindings, ComputeContext, DeviceBuffer, StageArgs};
use crate::{AccessMode, BackendType, EntryPoints, Error, Result};
use heq_core::SampleDepth;
use rayon::ThreadPool;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub mod kernels;

/// Host memory region addressed as 32-bit words.
///
/// Words are atomics so that concurrent histogram increments are race free;
/// every other stage only needs relaxed loads and stores because rayon joins
/// all workers before a dispatch returns.
pub struct CpuBuffer {
    label: String,
    access: AccessMode,
    data: Box<[AtomicU32]>,
}

impl CpuBuffer {
    fn zeroed(label: &str, words: usize, access: AccessMode) -> Result<Self> {
        let mut data: Vec<AtomicU32> = Vec::new();
        data.try_reserve_exact(words)
            .map_err(|e| Error::out_of_memory(format!("{label}: {words} words: {e}")))?;
        data.extend((0..words).map(|_| AtomicU32::new(0)));
        Ok(Self {
            label: label.to_string(),
            access,
            data: data.into_boxed_slice(),
        })
    }

    pub fn as_atomic(&self) -> &[AtomicU32] {
        &self.data
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.data.iter().map(|w| w.load(Ordering::Relaxed)).collect()
    }
}

impl DeviceBuffer for CpuBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn access(&self) -> AccessMode {
        self.access
    }

    fn words(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for CpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuBuffer({}, {}, len={})", self.label, self.access, self.data.len())
    }
}

/// Kernels resolved for one depth. On the CPU this is only the variant tag.
#[derive(Debug, Clone, Copy)]
pub struct CpuProgram {
    pub depth: SampleDepth,
    pub entries: EntryPoints,
}

#[derive(Clone)]
pub struct CpuBackend {
    pool: Option<Arc<ThreadPool>>,
}

impl CpuBackend {
    /// Backend running on the global rayon pool.
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Backend running on a dedicated pool of `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("heq-cpu-{i}"))
            .build()
            .map_err(|e| Error::DeviceError(e.to_string()))?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuBackend")
            .field("num_threads", &self.num_threads())
            .finish()
    }
}

impl ComputeContext for CpuBackend {
    type Buffer = CpuBuffer;
    type Program = CpuProgram;

    fn backend_type(&self) -> BackendType {
        BackendType::Cpu
    }

    fn name(&self) -> &str {
        "CPU"
    }

    fn build_program(&self, depth: SampleDepth) -> Result<CpuProgram> {
        Ok(CpuProgram {
            depth,
            entries: EntryPoints::for_depth(depth),
        })
    }

    fn alloc_zeroed(&self, label: &str, words: usize, access: AccessMode) -> Result<CpuBuffer> {
        CpuBuffer::zeroed(label, words, access)
    }

    fn upload(&self, label: &str, data: &[u32], access: AccessMode) -> Result<CpuBuffer> {
        let buffer = CpuBuffer::zeroed(label, data.len(), access)?;
        for (dst, &src) in buffer.data.iter().zip(data) {
            dst.store(src, Ordering::Relaxed);
        }
        Ok(buffer)
    }

    fn dispatch(&self, program: &CpuProgram, args: StageArgs<'_, CpuBuffer>) -> Result<()> {
        args.validate()?;
        let geometry = args.geometry;
        if geometry.depth != program.depth {
            return Err(Error::InvalidInput(format!(
                "program built for {} cannot run a {} image",
                program.depth, geometry.depth
            )));
        }
        tracing::debug!(
            entry = program.entries.get(args.stage()),
            pixels = geometry.pixel_count,
            "cpu dispatch"
        );

        self.install(|| match args.bindings {
            Bindings::Histogram { image, histogram } => {
                kernels::histogram(image.as_atomic(), histogram.as_atomic(), &geometry)
            }
            Bindings::Cumulative { histogram, cumulative } => {
                kernels::cumulative(histogram.as_atomic(), cumulative.as_atomic())
            }
            Bindings::Normalize { cumulative, lut } => {
                kernels::normalize(cumulative.as_atomic(), lut.as_atomic(), &geometry)
            }
            Bindings::BackProject { image, lut, output } => {
                kernels::back_project(image.as_atomic(), lut.as_atomic(), output.as_atomic(), &geometry)
            }
        });
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        // Dispatches complete before returning.
        Ok(())
    }

    fn read(&self, buffer: &CpuBuffer) -> Result<Vec<u32>> {
        Ok(buffer.to_vec())
    }
}
