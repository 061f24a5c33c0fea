//! Error types for the export pipeline.

use thiserror::Error;

/// Per-activity export errors. None of these abort a batch.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("fetch error: {0}")]
    Fetch(#[from] peloton_client::PelotonError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("xml serialization error: {0}")]
    Xml(String),

    #[error("cancelled before start")]
    Cancelled,
}

impl ExportError {
    /// Short stable label used for metrics and JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::Fetch(_) => "fetch",
            ExportError::InvalidInput(_) => "invalid_input",
            ExportError::Write(_) => "write",
            ExportError::Xml(_) => "xml",
            ExportError::Cancelled => "cancelled",
        }
    }
}
