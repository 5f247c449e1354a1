use crate::context::DeviceBuffer;
use crate::AccessMode;
use std::fmt;

/// Device memory region holding `words` 32-bit values.
pub struct GpuBuffer {
    pub buffer: wgpu::Buffer,
    label: String,
    access: AccessMode,
    words: usize,
}

impl GpuBuffer {
    pub fn new(buffer: wgpu::Buffer, label: &str, access: AccessMode, words: usize) -> Self {
        Self {
            buffer,
            label: label.to_string(),
            access,
            words,
        }
    }
}

impl DeviceBuffer for GpuBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn access(&self) -> AccessMode {
        self.access
    }

    fn words(&self) -> usize {
        self.words
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuBuffer({}, {}, len={})", self.label, self.access, self.words)
    }
}
