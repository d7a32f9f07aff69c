//! Error types for the command line tool

use busprobe_core::settings::SettingsError;
use busprobe_repl::ReplError;
use thiserror::Error;

/// Errors that end a command
#[derive(Debug, Error)]
pub enum AppError {
    /// Bus, configuration or parse error from the core
    #[error("{0}")]
    Core(#[from] busprobe_core::Error),

    /// Settings file could not be loaded
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Terminal input failed
    #[error(transparent)]
    Repl(#[from] ReplError),

    /// Terminal output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ctrl-C handler could not be installed
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// `--device` named no known profile
    #[error("unknown device '{0}' (see `busprobe list-devices`)")]
    UnknownDevice(String),

    /// `--backend` named no compiled-in backend
    #[error("unknown backend '{0}' (see `busprobe list-backends`)")]
    UnknownBackend(String),

    /// A backend option was not understood
    #[error("invalid backend option: {0}")]
    BackendOption(String),

    /// Linux GPIO backend failure
    #[cfg(feature = "linux-gpio")]
    #[error(transparent)]
    LinuxGpio(#[from] busprobe_linux_gpio::LinuxGpioError),
}

impl AppError {
    /// Returns true if the shell can report this and keep reading input
    ///
    /// Only a broken terminal ends the session.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Repl(_) | Self::Signal(_))
    }
}
