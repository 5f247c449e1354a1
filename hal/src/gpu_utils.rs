//! GPU memory budgeting.
//!
//! A run's device footprint is known before anything is allocated, so the
//! orchestrator can refuse a run up front instead of failing half way.

use crate::Error;
use heq_core::SampleDepth;

/// Environment variable holding the device memory budget.
pub const GPU_MAX_BYTES_ENV: &str = "HISTEQ_GPU_MAX_BYTES";

/// Parse a byte size string with optional suffix (KB, MB, GB)
///
/// # Supported formats
/// - Plain: `1024`
/// - KB: `512KB`
/// - MB: `256MB`
/// - GB: `2GB`
/// - Underscores for readability: `1_000_000_000`
pub fn parse_bytes_with_suffix(raw: &str) -> crate::Result<usize> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(Error::InvalidInput("memory size cannot be empty".to_string()));
    }

    let upper = s.to_ascii_uppercase().replace('_', "");
    let (number_part, multiplier): (&str, usize) = if let Some(v) = upper.strip_suffix("KB") {
        (v, 1024)
    } else if let Some(v) = upper.strip_suffix("MB") {
        (v, 1024 * 1024)
    } else if let Some(v) = upper.strip_suffix("GB") {
        (v, 1024 * 1024 * 1024)
    } else if let Some(v) = upper.strip_suffix('B') {
        (v, 1)
    } else {
        (upper.as_str(), 1)
    };

    let base: usize = number_part.trim().parse().map_err(|_| {
        Error::InvalidInput(format!(
            "Memory size must be like '134217728', '512MB', or '2GB'; got '{raw}'"
        ))
    })?;

    base.checked_mul(multiplier)
        .ok_or_else(|| Error::InvalidInput(format!("Memory size value '{raw}' is too large")))
}

/// Device bytes one run needs: source and output images, histogram,
/// cumulative table, scan scratch and LUT.
pub fn estimate_run_bytes(depth: SampleDepth, pixel_count: usize) -> usize {
    let image_bytes = depth.words_for(pixel_count) * 4;
    let table_bytes = depth.levels() * 4;
    2 * image_bytes + 4 * table_bytes
}

/// Check if operation fits within GPU memory budget
///
/// Returns true if `required_bytes <= budget`, false otherwise
pub fn fits_in_budget(required_bytes: usize, budget: Option<usize>) -> bool {
    match budget {
        Some(b) => required_bytes <= b,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes_plain() {
        assert_eq!(parse_bytes_with_suffix("1024").unwrap(), 1024);
        assert_eq!(parse_bytes_with_suffix("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_bytes_with_suffix() {
        assert_eq!(parse_bytes_with_suffix("512KB").unwrap(), 512 * 1024);
        assert_eq!(parse_bytes_with_suffix("256MB").unwrap(), 256 * 1024 * 1024);
        assert_eq!(parse_bytes_with_suffix("2GB").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_bytes_with_suffix("64B").unwrap(), 64);
    }

    #[test]
    fn test_parse_bytes_case_insensitive() {
        assert_eq!(parse_bytes_with_suffix("1mb").unwrap(), parse_bytes_with_suffix("1MB").unwrap());
    }

    #[test]
    fn test_parse_bytes_with_underscores() {
        assert_eq!(parse_bytes_with_suffix("1_000_000_000").unwrap(), 1_000_000_000);
        assert_eq!(parse_bytes_with_suffix("1_024KB").unwrap(), 1024 * 1024);
        assert_eq!(parse_bytes_with_suffix("2_gb").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_bytes_rejects_garbage() {
        assert!(parse_bytes_with_suffix("").is_err());
        assert!(parse_bytes_with_suffix("lots").is_err());
    }

    #[test]
    fn test_estimate_run_bytes() {
        // 1920x1080 8-bit: 518400 words per image, four 256-entry tables.
        assert_eq!(estimate_run_bytes(SampleDepth::Eight, 1920 * 1080), 2 * 1920 * 1080 + 4 * 1024);
        assert_eq!(estimate_run_bytes(SampleDepth::Sixteen, 2), 8 + 4 * 65536 * 4);
    }

    #[test]
    fn test_fits_in_budget() {
        assert!(fits_in_budget(100, Some(200)));
        assert!(!fits_in_budget(200, Some(100)));
        assert!(fits_in_budget(1000, None));
    }
}
