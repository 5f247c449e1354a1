pub mod backend;
pub mod compute;
pub mod context;
pub mod cpu;
pub mod gpu;
pub mod gpu_kernels;
pub mod gpu_utils;
pub mod program;
pub mod storage;

pub use backend::{AccessMode, BackendType};
pub use compute::{BackendPreference, ComputeDevice};
pub use context::{Bindings, ComputeContext, DeviceBuffer, Geometry, StageArgs};
pub use cpu::{CpuBackend, CpuBuffer};
pub use gpu::{DeviceHealth, GpuContext};
pub use gpu_kernels::equalize::GpuProgram;
pub use gpu_utils::{estimate_run_bytes, fits_in_budget, parse_bytes_with_suffix, GPU_MAX_BYTES_ENV};
pub use program::{EntryPoints, Stage, PROGRAM_SOURCE};
pub use storage::GpuBuffer;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Program build failed: {0}")]
    ProgramBuild(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Access violation: buffer '{buffer}' is {access} but {stage} needs {needed}")]
    AccessViolation {
        buffer: String,
        access: AccessMode,
        needed: AccessMode,
        stage: Stage,
    },

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Core error: {0}")]
    CoreError(#[from] heq_core::Error),
}

impl Error {
    pub fn backend_not_available(backend: impl Into<String>) -> Self {
        Self::BackendNotAvailable(backend.into())
    }

    pub fn out_of_memory(what: impl Into<String>) -> Self {
        Self::OutOfMemory(what.into())
    }
}
