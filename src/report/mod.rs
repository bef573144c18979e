//! Report rendering and document export for a finished diagnosis.

pub mod render;
pub mod export;

pub use render::*;
pub use export::*;

use thiserror::Error;

/// Export-stage failures. Export can be retried without re-running the diagnosis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Could not render report snapshot: {0}")]
    RenderSnapshot(String),

    #[error("Could not save exported document: {0}")]
    ExportIo(String),
}
