//! Error types for the rendering pipeline

use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage that produced a conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Raster,
    Pdf,
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionStage::Raster => "Raster",
            ConversionStage::Pdf => "PDF",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while rendering a canvas
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration or unsupported render options
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A conversion stage failed; fatal for the call
    #[error("{stage} conversion failed: {message}")]
    Conversion {
        stage: ConversionStage,
        message: String,
    },

    /// The document engine could not be launched
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// The document engine is not available. Never returned by `render`:
    /// the paginator turns it into the vector fallback.
    #[error("Document engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The render queue is full
    #[error("Render queue full: {queued} waiting (limit {limit})")]
    ResourceExhausted { queued: usize, limit: usize },

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap any displayable cause as a conversion failure of `stage`.
    pub fn conversion(stage: ConversionStage, cause: impl fmt::Display) -> Self {
        Error::Conversion {
            stage,
            message: cause.to_string(),
        }
    }
}
