use crate::frames::FrameError;
use crate::invocation::InvocationError;
use crate::protocol::ProtocolError;
use crate::replot::ReplotError;
use crate::types::SourceId;
use thiserror::Error;

/// Errors surfaced through the viewer's navigation interface
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Producer command error: {0}")]
    Invocation(#[from] InvocationError),

    #[error("Replot failed: {0}")]
    Replot(#[from] ReplotError),

    #[error("No producer command line configured; replot needs --command")]
    NoProducerCommand,

    #[error("No record is current")]
    NoCurrentRecord,

    #[error("Zoom selection has no area")]
    DegenerateSelection,

    #[error("Unknown stream source {0}")]
    UnknownSource(SourceId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    /// Errors that end the session rather than a single action
    pub fn is_fatal(&self) -> bool {
        matches!(self, ViewerError::Protocol(_))
    }
}

pub type ViewerResult<T> = Result<T, ViewerError>;
