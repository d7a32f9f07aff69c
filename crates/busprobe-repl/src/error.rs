//! Error types for the line editor

use thiserror::Error;

/// Errors that can occur while reading input
#[derive(Error, Debug)]
pub enum ReplError {
    /// I/O error (reading/writing stdin/stdout)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Terminal error from the line editor
    #[error("terminal error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}
