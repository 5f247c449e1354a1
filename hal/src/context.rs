use crate::{AccessMode, BackendType, Error, Result, Stage};
use heq_core::{NormalizeMode, SampleDepth};

/// A memory region owned by a backend.
pub trait DeviceBuffer {
    fn label(&self) -> &str;

    fn access(&self) -> AccessMode;

    /// Length in 32-bit words.
    fn words(&self) -> usize;
}

/// Shape of one pipeline run, fixed once the depth has been selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub depth: SampleDepth,
    pub pixel_count: u32,
    pub mode: NormalizeMode,
}

impl Geometry {
    pub fn levels(&self) -> usize {
        self.depth.levels()
    }

    /// Packed words holding the image.
    pub fn image_words(&self) -> usize {
        self.depth.words_for(self.pixel_count as usize)
    }
}

/// Buffers bound to one stage dispatch.
#[derive(Debug)]
pub enum Bindings<'a, B> {
    Histogram {
        image: &'a B,
        histogram: &'a B,
    },
    Cumulative {
        histogram: &'a B,
        cumulative: &'a B,
    },
    Normalize {
        cumulative: &'a B,
        lut: &'a B,
    },
    BackProject {
        image: &'a B,
        lut: &'a B,
        output: &'a B,
    },
}

#[derive(Debug)]
pub struct StageArgs<'a, B> {
    pub geometry: Geometry,
    pub bindings: Bindings<'a, B>,
}

impl<'a, B: DeviceBuffer> StageArgs<'a, B> {
    pub fn stage(&self) -> Stage {
        match self.bindings {
            Bindings::Histogram { .. } => Stage::Histogram,
            Bindings::Cumulative { .. } => Stage::Cumulative,
            Bindings::Normalize { .. } => Stage::Normalize,
            Bindings::BackProject { .. } => Stage::BackProject,
        }
    }

    /// Check access tags and sizes of every bound buffer.
    pub fn validate(&self) -> Result<()> {
        let stage = self.stage();
        let levels = self.geometry.levels();
        let image_words = self.geometry.image_words();

        let check = |buffer: &B, needed: AccessMode, words: usize| -> Result<()> {
            if !buffer.access().permits(needed) {
                return Err(Error::AccessViolation {
                    buffer: buffer.label().to_string(),
                    access: buffer.access(),
                    needed,
                    stage,
                });
            }
            if buffer.words() != words {
                return Err(Error::InvalidInput(format!(
                    "{stage}: buffer '{}' holds {} words, expected {words}",
                    buffer.label(),
                    buffer.words(),
                )));
            }
            Ok(())
        };

        match self.bindings {
            Bindings::Histogram { image, histogram } => {
                check(image, AccessMode::ReadOnly, image_words)?;
                check(histogram, AccessMode::ReadWrite, levels)
            }
            Bindings::Cumulative { histogram, cumulative } => {
                check(histogram, AccessMode::ReadOnly, levels)?;
                // Multi-pass scans read partial sums back out of the output.
                check(cumulative, AccessMode::ReadWrite, levels)
            }
            Bindings::Normalize { cumulative, lut } => {
                check(cumulative, AccessMode::ReadOnly, levels)?;
                check(lut, AccessMode::WriteOnly, levels)
            }
            Bindings::BackProject { image, lut, output } => {
                check(image, AccessMode::ReadOnly, image_words)?;
                check(lut, AccessMode::ReadOnly, levels)?;
                check(output, AccessMode::WriteOnly, image_words)
            }
        }
    }
}

/// The capability the orchestrator needs from a compute backend: build a
/// program, allocate tagged memory, submit indexed work and move data
/// between host and device synchronously.
pub trait ComputeContext {
    type Buffer: DeviceBuffer + std::fmt::Debug;
    type Program;

    fn backend_type(&self) -> BackendType;

    fn name(&self) -> &str;

    /// Prepare the four stage kernels for `depth`.
    fn build_program(&self, depth: SampleDepth) -> Result<Self::Program>;

    fn alloc_zeroed(&self, label: &str, words: usize, access: AccessMode) -> Result<Self::Buffer>;

    fn upload(&self, label: &str, data: &[u32], access: AccessMode) -> Result<Self::Buffer>;

    /// Launch one stage over its index range. Work may still be in flight
    /// when this returns; call [`ComputeContext::barrier`] before reading.
    fn dispatch(&self, program: &Self::Program, args: StageArgs<'_, Self::Buffer>) -> Result<()>;

    /// Block until every submitted dispatch has finished and its writes are visible.
    fn barrier(&self) -> Result<()>;

    fn read(&self, buffer: &Self::Buffer) -> Result<Vec<u32>>;
}
