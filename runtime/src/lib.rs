//! Orchestration of the four equalization stages over a compute backend.

pub mod config;
pub mod orchestrator;
pub mod state;

pub use config::EqualizeConfig;
pub use heq_hal::BackendPreference;
pub use orchestrator::{env_equalizer, equalize, CapturedTables, EqualizeReport, Equalizer, Pipeline, StageTimings};
pub use state::PipelineState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported input: {0}")]
    UnsupportedInput(#[from] heq_core::Error),

    #[error("Program preparation failed: {0}")]
    ProgramPreparation(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Stage failed in state {state}: {source}")]
    Stage {
        state: PipelineState,
        #[source]
        source: heq_hal::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: PipelineState, to: PipelineState },
}

impl Error {
    /// Classify a backend error raised while the run was in `state`.
    pub fn from_hal(err: heq_hal::Error, state: PipelineState) -> Self {
        match err {
            heq_hal::Error::ProgramBuild(msg) => Error::ProgramPreparation(msg),
            heq_hal::Error::OutOfMemory(msg) => Error::ResourceExhausted(msg),
            heq_hal::Error::BackendNotAvailable(msg) => Error::BackendUnavailable(msg),
            heq_hal::Error::CoreError(e) => Error::UnsupportedInput(e),
            source => Error::Stage { state, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_error_classification() {
        let state = PipelineState::DepthSelected;
        assert!(matches!(
            Error::from_hal(heq_hal::Error::ProgramBuild("bad".into()), state),
            Error::ProgramPreparation(_)
        ));
        assert!(matches!(
            Error::from_hal(heq_hal::Error::out_of_memory("lut"), state),
            Error::ResourceExhausted(_)
        ));
        assert!(matches!(
            Error::from_hal(heq_core::Error::UnsupportedDepth(3).into(), state),
            Error::UnsupportedInput(heq_core::Error::UnsupportedDepth(3))
        ));
        assert!(matches!(
            Error::from_hal(heq_hal::Error::DeviceError("lost".into()), PipelineState::LutReady),
            Error::Stage { state: PipelineState::LutReady, .. }
        ));
    }
}
