use crate::{Error, Result};
use std::fmt;

/// Bit depth of a single grayscale sample.
///
/// The depth is fixed for a whole pipeline run and decides the level count
/// `L`, which in turn sizes every intermediate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleDepth {
    Eight,
    Sixteen,
}

impl SampleDepth {
    /// Resolve a bytes-per-sample depth tag (1 or 2).
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(SampleDepth::Eight),
            2 => Ok(SampleDepth::Sixteen),
            other => Err(Error::UnsupportedDepth(other)),
        }
    }

    /// Resolve a bits-per-sample value (8 or 16).
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            8 => Ok(SampleDepth::Eight),
            16 => Ok(SampleDepth::Sixteen),
            other => Err(Error::UnsupportedBits(other)),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            SampleDepth::Eight => 1,
            SampleDepth::Sixteen => 2,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            SampleDepth::Eight => 8,
            SampleDepth::Sixteen => 16,
        }
    }

    /// Number of distinct intensity levels, `L`.
    pub fn levels(self) -> usize {
        1 << self.bits()
    }

    pub fn max_level(self) -> u32 {
        (self.levels() - 1) as u32
    }

    /// How many samples share one 32-bit device word.
    pub fn samples_per_word(self) -> usize {
        32 / self.bits() as usize
    }

    /// Number of 32-bit words needed to hold `pixels` packed samples.
    pub fn words_for(self, pixels: usize) -> usize {
        pixels.div_ceil(self.samples_per_word())
    }
}

impl fmt::Display for SampleDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// A grayscale sample type the pipeline can process.
pub trait Sample: Copy + Default + Send + Sync + fmt::Debug + PartialEq + 'static {
    const DEPTH: SampleDepth;

    fn level(self) -> u32;

    /// Build a sample from a level index; callers guarantee `level <= max_level`.
    fn from_level(level: u32) -> Self;
}

impl Sample for u8 {
    const DEPTH: SampleDepth = SampleDepth::Eight;

    fn level(self) -> u32 {
        self as u32
    }

    fn from_level(level: u32) -> Self {
        level as u8
    }
}

impl Sample for u16 {
    const DEPTH: SampleDepth = SampleDepth::Sixteen;

    fn level(self) -> u32 {
        self as u32
    }

    fn from_level(level: u32) -> Self {
        level as u16
    }
}
