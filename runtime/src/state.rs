use crate::{Error, Result};
use std::fmt;

/// Progress of one equalization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    DepthSelected,
    HistogramReady,
    CumulativeReady,
    LutReady,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed)
    }

    /// The state a successful step out of `self` leads to.
    pub fn successor(self) -> Option<PipelineState> {
        use PipelineState::*;
        match self {
            Idle => Some(DepthSelected),
            DepthSelected => Some(HistogramReady),
            HistogramReady => Some(CumulativeReady),
            CumulativeReady => Some(LutReady),
            LutReady => Some(Complete),
            Complete | Failed => None,
        }
    }

    pub fn can_advance(self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == PipelineState::Failed || self.successor() == Some(next)
    }

    /// Move to `next`, rejecting any edge the state machine does not have.
    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.can_advance(next) {
            return Err(Error::InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "Idle",
            PipelineState::DepthSelected => "DepthSelected",
            PipelineState::HistogramReady => "HistogramReady",
            PipelineState::CumulativeReady => "CumulativeReady",
            PipelineState::LutReady => "LUTReady",
            PipelineState::Complete => "Complete",
            PipelineState::Failed => "Failed",
        };
        f.write_str(name)
    }
}
