//! The operator console: single-flight dispatch, export cache, view state.

pub mod dispatch;
pub mod exports;
pub mod guard;

pub use dispatch::{Action, Console, OpReport, SessionHandle};
pub use exports::{
    ArtifactFormat, ArtifactPreview, DownloadRecord, ExportCache, ExportKind, TranscriptMessage,
};
pub use guard::{FlightPermit, SingleFlight};
