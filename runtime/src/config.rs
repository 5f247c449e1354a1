use crate::{Error, Result};
use heq_core::NormalizeMode;
use heq_hal::{parse_bytes_with_suffix, BackendPreference, GPU_MAX_BYTES_ENV};
use std::env;

pub const BACKEND_ENV: &str = "HISTEQ_BACKEND";
pub const CPU_THREADS_ENV: &str = "HISTEQ_CPU_THREADS";

/// Images smaller than this stay on the CPU under `BackendPreference::Auto`.
pub const DEFAULT_GPU_MIN_PIXELS: usize = 1 << 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualizeConfig {
    pub backend: BackendPreference,
    pub gpu_min_pixels: usize,
    pub normalize: NormalizeMode,
    /// Device memory budget for one run, in bytes.
    pub gpu_max_bytes: Option<usize>,
    /// Size of a dedicated CPU pool; the global rayon pool when `None`.
    pub cpu_threads: Option<usize>,
    /// Read the intermediate tables back into the report.
    pub capture_tables: bool,
}

impl Default for EqualizeConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            gpu_min_pixels: DEFAULT_GPU_MIN_PIXELS,
            normalize: NormalizeMode::default(),
            gpu_max_bytes: None,
            cpu_threads: None,
            capture_tables: false,
        }
    }
}

impl EqualizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `HISTEQ_BACKEND`, `HISTEQ_GPU_MAX_BYTES` and
    /// `HISTEQ_CPU_THREADS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`EqualizeConfig::from_env`] but reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(BACKEND_ENV) {
            config.backend = raw
                .parse()
                .map_err(|e| Error::Config(format!("{BACKEND_ENV}: {e}")))?;
        }

        if let Some(raw) = lookup(GPU_MAX_BYTES_ENV) {
            let bytes = parse_bytes_with_suffix(&raw)
                .map_err(|e| Error::Config(format!("{GPU_MAX_BYTES_ENV}: {e}")))?;
            if bytes == 0 {
                return Err(Error::Config(format!("{GPU_MAX_BYTES_ENV} must be >= 1")));
            }
            config.gpu_max_bytes = Some(bytes);
        }

        if let Some(raw) = lookup(CPU_THREADS_ENV) {
            let threads: usize = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"))
            })?;
            if threads == 0 {
                return Err(Error::Config(format!("{CPU_THREADS_ENV} must be >= 1")));
            }
            config.cpu_threads = Some(threads);
        }

        Ok(config)
    }

    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_gpu_min_pixels(mut self, pixels: usize) -> Self {
        self.gpu_min_pixels = pixels;
        self
    }

    pub fn with_normalize(mut self, mode: NormalizeMode) -> Self {
        self.normalize = mode;
        self
    }

    pub fn with_gpu_max_bytes(mut self, bytes: Option<usize>) -> Self {
        self.gpu_max_bytes = bytes;
        self
    }

    pub fn with_cpu_threads(mut self, threads: Option<usize>) -> Self {
        self.cpu_threads = threads;
        self
    }

    pub fn with_capture_tables(mut self, capture: bool) -> Self {
        self.capture_tables = capture;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = EqualizeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EqualizeConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = EqualizeConfig::from_lookup(lookup(&[
            (BACKEND_ENV, "cpu"),
            (GPU_MAX_BYTES_ENV, "64MB"),
            (CPU_THREADS_ENV, "3"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendPreference::Cpu);
        assert_eq!(config.gpu_max_bytes, Some(64 * 1024 * 1024));
        assert_eq!(config.cpu_threads, Some(3));
    }

    #[test]
    fn test_malformed_values_are_config_errors() {
        for vars in [
            [(BACKEND_ENV, "quantum")],
            [(GPU_MAX_BYTES_ENV, "a lot")],
            [(GPU_MAX_BYTES_ENV, "0")],
            [(CPU_THREADS_ENV, "0")],
            [(CPU_THREADS_ENV, "-2")],
        ] {
            let result = EqualizeConfig::from_lookup(lookup(&vars));
            assert!(matches!(result, Err(Error::Config(_))), "{vars:?}");
        }
    }

    #[test]
    fn test_builder() {
        let config = EqualizeConfig::new()
            .with_backend(BackendPreference::Gpu)
            .with_normalize(NormalizeMode::Proportional)
            .with_capture_tables(true);
        assert_eq!(config.backend, BackendPreference::Gpu);
        assert_eq!(config.normalize, NormalizeMode::Proportional);
        assert!(config.capture_tables);
    }
}
