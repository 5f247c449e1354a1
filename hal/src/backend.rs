use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    Cpu,
    WebGpu,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Cpu => write!(f, "CPU"),
            BackendType::WebGpu => write!(f, "WebGPU"),
        }
    }
}

/// How kernels may touch a memory region.
///
/// Host transfers (upload and read-back) are always allowed; the tag only
/// constrains stage bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn readable(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }

    /// True when every access `needed` implies is granted by `self`.
    pub fn permits(self, needed: AccessMode) -> bool {
        (!needed.readable() || self.readable()) && (!needed.writable() || self.writable())
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadOnly => write!(f, "read-only"),
            AccessMode::WriteOnly => write!(f, "write-only"),
            AccessMode::ReadWrite => write!(f, "read-write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_permits() {
        assert!(AccessMode::ReadWrite.permits(AccessMode::ReadOnly));
        assert!(AccessMode::ReadWrite.permits(AccessMode::WriteOnly));
        assert!(AccessMode::ReadOnly.permits(AccessMode::ReadOnly));
        assert!(!AccessMode::ReadOnly.permits(AccessMode::WriteOnly));
        assert!(!AccessMode::WriteOnly.permits(AccessMode::ReadWrite));
    }
}
