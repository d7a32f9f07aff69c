//! Error types for busprobe-core
//!
//! This module provides a no_std compatible error type shared by the parser,
//! the executors, the arbiter and the capture engine. Every variant is
//! locally recoverable: the mode loop reports it and keeps accepting input.

use core::fmt;

/// What was wrong with a piece of instruction text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    /// The instruction contained nothing but whitespace
    Empty,
    /// A `[` was never closed
    UnmatchedOpen,
    /// A `]` appeared without a matching `[`
    UnmatchedClose,
    /// A `[` appeared inside an open bracket pair
    NestedOpen,
    /// A `0x` literal contained a non-hexadecimal digit
    InvalidHex,
    /// The count after `r:` was not a decimal number
    InvalidReadCount,
    /// The repeat suffix of a write literal was not a positive decimal number
    InvalidRepeat,
    /// A prefix (`0x`, `r:`, ...) had no operand after it
    EmptyOperand,
    /// A token was not recognised
    UnexpectedToken,
    /// A token appeared outside of any bracket pair
    OutsideBrackets,
}

/// Which numeric limit was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    /// A write literal does not fit in the protocol word width
    Value {
        /// The value as written
        value: u32,
        /// Width of the protocol word in bits
        bits: u8,
    },
    /// A read count exceeds the maximum transfer size
    ReadCount {
        /// Requested count
        count: u32,
        /// Largest accepted count
        max: u32,
    },
    /// A pin number is outside the device pin range
    Pin {
        /// Requested pin
        pin: u8,
        /// Highest pin of the device
        max: u8,
    },
    /// A bus parameter (frequency, baud rate, data bits, ...) is invalid
    Parameter,
}

/// Reason a bus transaction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFailure {
    /// The addressed target did not acknowledge
    Nack,
    /// The target did not answer in time
    Timeout,
    /// No device answered the bus reset
    NoDevice,
    /// The bus has not been configured for the requested role
    NotConfigured,
    /// A framed protocol received an unbalanced start/stop sequence
    Unframed,
    /// The underlying hardware reported an error
    Hardware,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Malformed instruction text
    Syntax {
        /// Byte offset of the offending token in the input
        offset: usize,
        /// What was wrong
        kind: SyntaxKind,
    },
    /// Numeric operand or pin out of range
    Range(RangeKind),
    /// Requested pin is reserved by the device
    PinConflict {
        /// The protected pin
        pin: u8,
    },
    /// Bus transaction failed
    Bus(BusFailure),
    /// Peripheral (e.g. SD card) failed to initialise
    Mount,
    /// Operation is not supported by this bus, backend or device
    Unsupported,
    /// Settings could not be applied
    Settings,
}

impl Error {
    /// Shorthand for a syntax error at `offset`
    pub const fn syntax(offset: usize, kind: SyntaxKind) -> Self {
        Self::Syntax { offset, kind }
    }

    /// Returns true if the mode loop may keep accepting input after reporting
    ///
    /// No error produced by this crate is fatal to the process.
    pub const fn is_recoverable(&self) -> bool {
        true
    }

    /// Returns true if a configuration prompt should ask again
    pub const fn should_reprompt(&self) -> bool {
        matches!(
            self,
            Self::PinConflict { .. } | Self::Range(RangeKind::Pin { .. } | RangeKind::Parameter)
        )
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty instruction"),
            Self::UnmatchedOpen => write!(f, "unmatched '['"),
            Self::UnmatchedClose => write!(f, "unmatched ']'"),
            Self::NestedOpen => write!(f, "nested '[' is not allowed"),
            Self::InvalidHex => write!(f, "invalid hexadecimal literal"),
            Self::InvalidReadCount => write!(f, "invalid read count"),
            Self::InvalidRepeat => write!(f, "invalid repeat count"),
            Self::EmptyOperand => write!(f, "missing operand"),
            Self::UnexpectedToken => write!(f, "unexpected token"),
            Self::OutsideBrackets => write!(f, "token outside of '[' ... ']'"),
        }
    }
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { value, bits } => {
                write!(f, "value 0x{:X} does not fit in {} bits", value, bits)
            }
            Self::ReadCount { count, max } => {
                write!(f, "read count {} exceeds maximum of {}", count, max)
            }
            Self::Pin { pin, max } => write!(f, "pin {} is out of range (0-{})", pin, max),
            Self::Parameter => write!(f, "bus parameter out of range"),
        }
    }
}

impl fmt::Display for BusFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => write!(f, "no acknowledgment"),
            Self::Timeout => write!(f, "timed out"),
            Self::NoDevice => write!(f, "no device present"),
            Self::NotConfigured => write!(f, "bus not configured"),
            Self::Unframed => write!(f, "unbalanced start/stop framing"),
            Self::Hardware => write!(f, "hardware error"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { offset, kind } => {
                write!(f, "syntax error at column {}: {}", offset + 1, kind)
            }
            Self::Range(kind) => write!(f, "range error: {}", kind),
            Self::PinConflict { pin } => {
                write!(f, "pin {} is reserved/protected and cannot be used", pin)
            }
            Self::Bus(failure) => write!(f, "bus error: {}", failure),
            Self::Mount => write!(f, "peripheral failed to initialise"),
            Self::Unsupported => write!(f, "operation not supported"),
            Self::Settings => write!(f, "invalid settings"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_syntax_display_is_one_based() {
        let err = Error::syntax(0, SyntaxKind::InvalidHex);
        assert_eq!(
            err.to_string(),
            "syntax error at column 1: invalid hexadecimal literal"
        );
    }

    #[test]
    fn test_reprompt_classification() {
        assert!(Error::PinConflict { pin: 3 }.should_reprompt());
        assert!(Error::Range(RangeKind::Pin { pin: 60, max: 48 }).should_reprompt());
        assert!(!Error::Bus(BusFailure::Nack).should_reprompt());
    }
}
