//! Intermediate tables of one run and the normalization rule.
//!
//! The functions here are the sequential host-side definitions of each
//! stage. Parallel backends must reproduce them bit for bit.

use crate::SampleDepth;

/// How the cumulative table is rescaled into the lookup table.
///
/// Both modes round half up using exact integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NormalizeMode {
    /// Subtract the first non-zero cumulative value before scaling, so the
    /// darkest occupied level maps to 0 and the brightest to `L - 1`.
    #[default]
    MinShifted,
    /// Scale the raw cumulative value: `round(C[i] * (L - 1) / N)`.
    Proportional,
}

impl NormalizeMode {
    /// Numeric code shared with the device program.
    pub fn code(self) -> u32 {
        match self {
            NormalizeMode::MinShifted => 0,
            NormalizeMode::Proportional => 1,
        }
    }
}

/// Per-level occupancy counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram(Vec<u32>);

/// Inclusive running sum of a [`Histogram`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeTable(Vec<u32>);

/// Input level → output level mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lut(Vec<u32>);

macro_rules! table_common {
    ($name:ident) => {
        impl $name {
            pub fn from_vec(values: Vec<u32>) -> Self {
                Self(values)
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn get(&self, level: usize) -> Option<u32> {
                self.0.get(level).copied()
            }

            pub fn as_slice(&self) -> &[u32] {
                &self.0
            }

            pub fn into_vec(self) -> Vec<u32> {
                self.0
            }

            pub fn is_monotonic(&self) -> bool {
                self.0.windows(2).all(|w| w[0] <= w[1])
            }
        }
    };
}

table_common!(Histogram);
table_common!(CumulativeTable);
table_common!(Lut);

impl Histogram {
    pub fn from_levels(levels: impl IntoIterator<Item = u32>, depth: SampleDepth) -> Self {
        let mut bins = vec![0u32; depth.levels()];
        for level in levels {
            bins[level as usize] += 1;
        }
        Self(bins)
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|&c| c as u64).sum()
    }

    /// Levels with a non-zero count.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.0.iter().copied().enumerate().filter(|&(_, c)| c > 0)
    }
}

impl CumulativeTable {
    pub fn from_histogram(histogram: &Histogram) -> Self {
        let mut running = 0u32;
        Self(
            histogram
                .as_slice()
                .iter()
                .map(|&count| {
                    running += count;
                    running
                })
                .collect(),
        )
    }

    pub fn last(&self) -> u32 {
        self.0.last().copied().unwrap_or(0)
    }
}

impl Lut {
    pub fn from_cumulative(cumulative: &CumulativeTable, depth: SampleDepth, mode: NormalizeMode) -> Self {
        let params = LutParams::new(cumulative.as_slice(), depth, cumulative.last(), mode);
        Self(cumulative.as_slice().iter().map(|&c| params.map(c)).collect())
    }

    pub fn apply(&self, level: u32) -> u32 {
        self.0[level as usize]
    }
}

/// Everything needed to map a single cumulative value to an output level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutParams {
    pub mode: NormalizeMode,
    pub max_level: u32,
    pub pixel_count: u32,
    /// First non-zero cumulative value.
    pub cmin: u32,
    /// Level at which `cmin` occurs.
    pub first_level: u32,
}

impl LutParams {
    pub fn new(cumulative: &[u32], depth: SampleDepth, pixel_count: u32, mode: NormalizeMode) -> Self {
        let first = cumulative.partition_point(|&c| c == 0);
        let cmin = cumulative.get(first).copied().unwrap_or(pixel_count);
        Self {
            mode,
            max_level: depth.max_level(),
            pixel_count,
            cmin,
            first_level: first.min(depth.levels() - 1) as u32,
        }
    }

    pub fn map(&self, c: u32) -> u32 {
        match self.mode {
            NormalizeMode::Proportional => scale_round(c, self.max_level, self.pixel_count),
            NormalizeMode::MinShifted => {
                let span = self.pixel_count - self.cmin;
                if span == 0 {
                    // A single occupied level maps everything onto itself.
                    self.first_level
                } else {
                    scale_round(c.saturating_sub(self.cmin), self.max_level, span)
                }
            }
        }
    }
}

/// `floor((value * max + floor(denom / 2)) / denom)`, requires `value <= denom`.
pub fn scale_round(value: u32, max: u32, denom: u32) -> u32 {
    if denom == 0 {
        return 0;
    }
    ((value as u64 * max as u64 + (denom / 2) as u64) / denom as u64) as u32
}
