//! MPL Outboard Core Library
//!
//! Stream decoder, display list, coordinate frames, zoom and replot
//! orchestration for the outboard plot viewer.

pub mod types;
pub mod protocol;
pub mod record;
pub mod display_list;
pub mod frames;
pub mod viewport;
pub mod render;
pub mod invocation;
pub mod zoom;
pub mod replot;
pub mod playback;
pub mod viewer;
pub mod error;

// Re-export commonly used types
pub use display_list::{DisplayList, NavOutcome};
pub use error::{ViewerError, ViewerResult};
pub use frames::{CoordinateFrame, CoordinateFrameTrail, FrameSelection};
pub use invocation::ProducerInvocation;
pub use playback::{PlaybackController, PlaybackState, PlaybackTick};
pub use protocol::{Command, FrameDecoder, Opcode, OpcodeReader, ReadOutcome, WireOrder};
pub use record::PlotRecord;
pub use render::{RecordingRenderer, Renderer};
pub use replot::{ReplotJob, ReplotRunner, ReplotSettings};
pub use viewer::{IngestReport, ReplotOutcome, TrackReadout, Viewer, ViewerOptions, ViewerStatus, ZoomOutcome};
pub use viewport::{DeviceWindow, ViewportState};

/// Version information for the outboard core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
