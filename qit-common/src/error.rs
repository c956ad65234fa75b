//! Common error types for QIT

use thiserror::Error;

/// Common result type for QIT operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across QIT crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scanned or typed serial does not belong to the batch
    #[error("Serial {0} does not match any unit in this carton")]
    UnmatchedSerial(String),

    /// Operation needs an attached defect image
    #[error("No image attached for unit {0}")]
    MissingImage(String),

    /// Batch cannot be submitted until every unit has a manual serial
    #[error("Batch incomplete: {missing} unit(s) without a manual serial")]
    IncompleteBatch { missing: usize },

    /// Tabular source or remote collection could not be loaded
    #[error("Load error: {0}")]
    Load(String),
}
