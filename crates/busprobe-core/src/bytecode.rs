//! Compiled bus operations
//!
//! A [`ByteCode`] is one abstract bus operation. An ordered slice of them
//! fully describes one transaction; the parser produces them and the
//! protocol executors consume them.

use alloc::string::String;
use core::fmt::{self, Write};

/// Kind of bus operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Begin a transaction (`[`): START on I2C, chip select on SPI, reset on 1-Wire
    StartCondition,
    /// End a transaction (`]`)
    StopCondition,
    /// Write `value`, `count` times
    WriteValue,
    /// Read `count` words
    ReadCount,
    /// Change the bus clock or baud rate to `value`
    SetClock,
    /// Address the 7-bit target `value`
    SetAddress,
}

/// One compiled bus operation
///
/// Immutable once built. `count` defaults to 1 and is the repeat count for
/// writes or the number of words for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteCode {
    kind: OpKind,
    value: u32,
    count: u32,
}

impl ByteCode {
    /// Start condition (`[`)
    pub const fn start() -> Self {
        Self {
            kind: OpKind::StartCondition,
            value: 0,
            count: 1,
        }
    }

    /// Stop condition (`]`)
    pub const fn stop() -> Self {
        Self {
            kind: OpKind::StopCondition,
            value: 0,
            count: 1,
        }
    }

    /// Write a single value
    pub const fn write(value: u32) -> Self {
        Self::write_repeated(value, 1)
    }

    /// Write the same value `count` times
    pub const fn write_repeated(value: u32, count: u32) -> Self {
        Self {
            kind: OpKind::WriteValue,
            value,
            count,
        }
    }

    /// Read `count` words
    pub const fn read(count: u32) -> Self {
        Self {
            kind: OpKind::ReadCount,
            value: 0,
            count,
        }
    }

    /// Set the bus clock (Hz) or baud rate
    pub const fn set_clock(hz: u32) -> Self {
        Self {
            kind: OpKind::SetClock,
            value: hz,
            count: 1,
        }
    }

    /// Address a 7-bit target
    pub const fn set_address(address: u32) -> Self {
        Self {
            kind: OpKind::SetAddress,
            value: address,
            count: 1,
        }
    }

    /// The operation kind
    pub const fn kind(&self) -> OpKind {
        self.kind
    }

    /// The numeric operand; meaning depends on [`kind`](Self::kind)
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Repeat count for writes, word count for reads
    pub const fn count(&self) -> u32 {
        self.count
    }
}

impl fmt::Display for ByteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OpKind::StartCondition => f.write_char('['),
            OpKind::StopCondition => f.write_char(']'),
            OpKind::WriteValue if self.count == 1 => write!(f, "0x{:02X}", self.value),
            OpKind::WriteValue => write!(f, "0x{:02X}:{}", self.value, self.count),
            OpKind::ReadCount => write!(f, "r:{}", self.count),
            OpKind::SetClock => write!(f, "f:{}", self.value),
            OpKind::SetAddress => write!(f, "a:0x{:02X}", self.value),
        }
    }
}

/// Render a sequence back to canonical instruction text
///
/// Hex digits are uppercase, tokens are separated by a single space, and no
/// space follows `[` or precedes `]`. Parsing the result yields the same
/// sequence.
pub fn to_canonical(codes: &[ByteCode]) -> String {
    let mut out = String::new();
    let mut prev: Option<OpKind> = None;
    for code in codes {
        let tight = matches!(prev, None | Some(OpKind::StartCondition))
            || code.kind == OpKind::StopCondition;
        if !tight {
            out.push(' ');
        }
        // Writing into a String cannot fail
        let _ = write!(out, "{}", code);
        prev = Some(code.kind);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_text() {
        let codes = [
            ByteCode::start(),
            ByteCode::write(0x9F),
            ByteCode::read(3),
            ByteCode::stop(),
        ];
        assert_eq!(to_canonical(&codes), "[0x9F r:3]");
    }

    #[test]
    fn test_canonical_empty_frame_and_groups() {
        assert_eq!(to_canonical(&[ByteCode::start(), ByteCode::stop()]), "[]");
        let codes = [
            ByteCode::start(),
            ByteCode::write(0x1),
            ByteCode::stop(),
            ByteCode::start(),
            ByteCode::write_repeated(0xab, 4),
            ByteCode::stop(),
        ];
        assert_eq!(to_canonical(&codes), "[0x01] [0xAB:4]");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ByteCode::write(0x10).count(), 1);
        assert_eq!(ByteCode::start().count(), 1);
        assert_eq!(ByteCode::read(0).count(), 0);
        assert_eq!(ByteCode::set_address(0x50).kind(), OpKind::SetAddress);
    }
}
