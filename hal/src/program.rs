//! The compute program shared by every backend.
//!
//! The WGSL source exposes one entry point per stage and depth. The CPU
//! backend implements the same contracts natively and uses the names only
//! for logging.

use heq_core::SampleDepth;
use std::fmt;

pub const PROGRAM_SOURCE: &str = include_str!("../shaders/equalize.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Histogram,
    Cumulative,
    Normalize,
    BackProject,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Histogram,
        Stage::Cumulative,
        Stage::Normalize,
        Stage::BackProject,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Histogram => write!(f, "histogram"),
            Stage::Cumulative => write!(f, "cumulative"),
            Stage::Normalize => write!(f, "normalize"),
            Stage::BackProject => write!(f, "back-projection"),
        }
    }
}

/// Entry point names for one depth variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoints {
    pub histogram: &'static str,
    pub cumulative: &'static str,
    pub normalize: &'static str,
    pub back_project: &'static str,
}

impl EntryPoints {
    pub const EIGHT_BIT: EntryPoints = EntryPoints {
        histogram: "histogram",
        cumulative: "cumulativeHistogram",
        normalize: "normalizeScaleHistogram",
        back_project: "backProjection",
    };

    pub const SIXTEEN_BIT: EntryPoints = EntryPoints {
        histogram: "histogram16",
        cumulative: "cumulativeHistogram16",
        normalize: "normalizeScaleHistogram16",
        back_project: "backProjection16",
    };

    pub fn for_depth(depth: SampleDepth) -> Self {
        match depth {
            SampleDepth::Eight => Self::EIGHT_BIT,
            SampleDepth::Sixteen => Self::SIXTEEN_BIT,
        }
    }

    pub fn get(&self, stage: Stage) -> &'static str {
        match stage {
            Stage::Histogram => self.histogram,
            Stage::Cumulative => self.cumulative,
            Stage::Normalize => self.normalize,
            Stage::BackProject => self.back_project,
        }
    }
}
