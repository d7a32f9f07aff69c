//! Protocol executors
//!
//! Every physical bus implements [`Executor`]: it turns a [`ByteCode`]
//! sequence into real transactions and returns the bytes read. The
//! per-protocol submodules define the small driver contract each bus must
//! satisfy (how a byte is clocked out is the driver's business) and a
//! generic `execute` helper that implements the ByteCode semantics on top
//! of it, in the same way the bitbang helpers sit on top of
//! [`bitbang::BitbangSpi`].
//!
//! Failures never leave a transaction half-open: framed protocols release
//! chip select or issue STOP before the error is returned.

pub mod bitbang;
pub mod i2c;
pub mod onewire;
pub mod spi;
pub mod uart;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::bytecode::{ByteCode, OpKind};
use crate::error::{Error, RangeKind, Result};
use crate::pins::PinRole;

/// Bus protocols a probe can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// 4-wire SPI
    Spi,
    /// I2C / TWI
    I2c,
    /// Full-duplex UART
    Uart,
    /// Half-duplex UART on a single shared line
    HdUart,
    /// Dallas/Maxim 1-Wire
    OneWire,
}

impl Protocol {
    /// All protocols, in menu order
    pub const ALL: &'static [Protocol] = &[
        Protocol::Spi,
        Protocol::I2c,
        Protocol::Uart,
        Protocol::HdUart,
        Protocol::OneWire,
    ];

    /// Short lowercase name used on the command line and in prompts
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Spi => "spi",
            Self::I2c => "i2c",
            Self::Uart => "uart",
            Self::HdUart => "hduart",
            Self::OneWire => "onewire",
        }
    }

    /// Look up a protocol by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Pins a controller configuration of this protocol binds, in prompt order
    pub const fn pin_roles(&self) -> &'static [PinRole] {
        match self {
            Self::Spi => &[PinRole::Mosi, PinRole::Miso, PinRole::Sclk, PinRole::Cs],
            Self::I2c => &[PinRole::Sda, PinRole::Scl],
            Self::Uart => &[PinRole::Tx, PinRole::Rx],
            Self::HdUart | Self::OneWire => &[PinRole::Data],
        }
    }

    /// Width of one protocol word in bits
    pub const fn word_bits(&self) -> u8 {
        8
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spi => "SPI",
            Self::I2c => "I2C",
            Self::Uart => "UART",
            Self::HdUart => "HDUART",
            Self::OneWire => "1WIRE",
        })
    }
}

/// Runs ByteCode sequences against a physical bus
///
/// Returns the bytes read in transaction order, or an empty vector for a
/// write-only sequence. A read either yields exactly `count` bytes or the
/// whole call fails; partial reads are never returned.
pub trait Executor {
    /// Execute one transaction sequence
    fn execute(&mut self, codes: &[ByteCode]) -> Result<Vec<u8>>;
}

impl<T: Executor + ?Sized> Executor for &mut T {
    fn execute(&mut self, codes: &[ByteCode]) -> Result<Vec<u8>> {
        (**self).execute(codes)
    }
}

impl<T: Executor + ?Sized> Executor for Box<T> {
    fn execute(&mut self, codes: &[ByteCode]) -> Result<Vec<u8>> {
        (**self).execute(codes)
    }
}

/// Narrow a write operand to one protocol word
pub(crate) fn word(code: &ByteCode) -> Result<u8> {
    u8::try_from(code.value()).map_err(|_| {
        Error::Range(RangeKind::Value {
            value: code.value(),
            bits: 8,
        })
    })
}

/// Returns true if the operation after index `i` is a read
pub(crate) fn next_is_read(codes: &[ByteCode], i: usize) -> bool {
    codes
        .get(i + 1)
        .is_some_and(|c| c.kind() == OpKind::ReadCount && c.count() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names() {
        for p in Protocol::ALL {
            assert_eq!(Protocol::from_name(p.name()), Some(*p));
        }
        assert_eq!(Protocol::from_name("I2C"), Some(Protocol::I2c));
        assert_eq!(Protocol::from_name("can"), None);
    }

    #[test]
    fn test_word_narrowing() {
        assert_eq!(word(&ByteCode::write(0xFF)), Ok(0xFF));
        assert_eq!(
            word(&ByteCode::write(0x100)),
            Err(Error::Range(RangeKind::Value {
                value: 0x100,
                bits: 8
            }))
        );
    }

    #[test]
    fn test_next_is_read_skips_empty_reads() {
        let codes = [ByteCode::write(1), ByteCode::read(0), ByteCode::read(2)];
        assert!(!next_is_read(&codes, 0));
        assert!(next_is_read(&codes, 1));
        assert!(!next_is_read(&codes, 2));
    }
}
