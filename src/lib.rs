//! Data-parallel histogram equalization for 8-bit and 16-bit grayscale images.
//!
//! ```no_run
//! use histeq::core::{DynGrayImage, GrayImage};
//!
//! let image: DynGrayImage = GrayImage::<u8>::from_fn(64, 64, |x, _| (x / 2) as u8)?.into();
//! let equalized = histeq::equalize(&image)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use heq_core as core;
pub use heq_hal as hal;
pub use heq_runtime as runtime;

pub use heq_core::{DynGrayImage, GrayImage, NormalizeMode, SampleDepth};
pub use heq_runtime::{
    equalize, BackendPreference, EqualizeConfig, EqualizeReport, Equalizer, Error, PipelineState,
};
