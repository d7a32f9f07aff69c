//! Error types for the Linux GPIO backend

use busprobe_core::error::{BusFailure, Error};
use thiserror::Error;

/// Linux GPIO specific errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// Failed to request GPIO lines
    #[error("Failed to request GPIO lines: {0}")]
    LineRequestFailed(#[source] gpiocdev::Error),

    /// Invalid option value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// GPIO chip not specified
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,

    /// `dev` and `gpiochip` given together
    #[error("Only one of 'dev' or 'gpiochip' can be specified")]
    ConflictingDevice,
}

impl From<LinuxGpioError> for Error {
    fn from(e: LinuxGpioError) -> Self {
        log::error!("linux_gpio: {}", e);
        match e {
            LinuxGpioError::LineRequestFailed(_) => Error::Bus(BusFailure::Hardware),
            _ => Error::Settings,
        }
    }
}

/// Result type for Linux GPIO operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
