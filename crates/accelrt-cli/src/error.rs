//! Error types for the accelrt CLI.

use thiserror::Error;

/// CLI result type alias.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type.
#[derive(Error, Debug)]
pub enum CliError {
    /// Runtime or device failure.
    #[error(transparent)]
    Runtime(#[from] accelrt::AccelError),

    /// The device could not satisfy an allocation.
    #[error("Out of device memory allocating {0} bytes")]
    OutOfMemory(u64),

    /// Invalid command-line argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Report serialization failed.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}
