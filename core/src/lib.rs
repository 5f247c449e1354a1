//! Core types shared by every stage of the equalization pipeline.
//!
//! Nothing in this crate touches a compute device: it defines the sample
//! depths the pipeline understands, the grayscale image containers handed in
//! and out of a run, the 32-bit word packing used for device transfers, and
//! the three intermediate tables together with the exact integer arithmetic
//! that turns a cumulative table into a lookup table.

pub mod depth;
pub mod image;
pub mod packing;
pub mod tables;

pub use self::depth::*;
pub use self::image::*;
pub use self::packing::*;
pub use self::tables::*;

pub type Result<T> = std::result::Result<T, Error>;

/// Largest pixel count a single run accepts.
///
/// Normalization divides by the pixel count with 32-bit remainders on the
/// device, so the count must fit in 31 bits.
pub const MAX_PIXELS: u64 = 1 << 31;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Unsupported sample depth tag {0} (expected 1 for 8-bit or 2 for 16-bit)")]
    UnsupportedDepth(u8),

    #[error("Unsupported sample width of {0} bits (expected 8 or 16)")]
    UnsupportedBits(u8),

    #[error("Unsupported color layout: {0} (only single-channel grayscale is accepted)")]
    UnsupportedColor(String),

    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Data length mismatch: expected {expected} samples, got {actual}")]
    DataLength { expected: usize, actual: usize },

    #[error("Image too large: {pixels} pixels exceeds the limit of {limit}")]
    ImageTooLarge { pixels: u64, limit: u64 },
}
