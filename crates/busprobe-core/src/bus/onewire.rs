//! 1-Wire executor
//!
//! `[` issues a reset pulse and requires a presence pulse in reply; `]` is
//! a no-op since the bus has no stop condition. Bit order within a byte is
//! the driver's concern.

use alloc::vec::Vec;

use super::word;
use crate::bytecode::{ByteCode, OpKind};
use crate::error::{BusFailure, Error, Result};

/// Minimal 1-Wire driver
pub trait OneWireBus {
    /// Issue a reset pulse, returning true if a device answered with presence
    fn reset(&mut self) -> Result<bool>;

    /// Write one byte
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Read one byte
    fn read_byte(&mut self) -> Result<u8>;
}

impl<T: OneWireBus + ?Sized> OneWireBus for &mut T {
    fn reset(&mut self) -> Result<bool> {
        (**self).reset()
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (**self).write_byte(byte)
    }

    fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte()
    }
}

/// Execute a ByteCode sequence on a 1-Wire bus
pub fn execute<B: OneWireBus + ?Sized>(bus: &mut B, codes: &[ByteCode]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for code in codes {
        match code.kind() {
            OpKind::StartCondition => {
                if !bus.reset()? {
                    return Err(Error::Bus(BusFailure::NoDevice));
                }
            }
            OpKind::StopCondition => {}
            OpKind::WriteValue => {
                let byte = word(code)?;
                for _ in 0..code.count() {
                    bus.write_byte(byte)?;
                }
            }
            OpKind::ReadCount => {
                out.reserve(code.count() as usize);
                for _ in 0..code.count() {
                    out.push(bus.read_byte()?);
                }
            }
            // Fixed timing, no addressing phase
            OpKind::SetClock | OpKind::SetAddress => return Err(Error::Unsupported),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::parse;

    struct Probe {
        present: bool,
        resets: usize,
        written: Vec<u8>,
    }

    impl OneWireBus for Probe {
        fn reset(&mut self) -> Result<bool> {
            self.resets += 1;
            Ok(self.present)
        }

        fn write_byte(&mut self, byte: u8) -> Result<()> {
            self.written.push(byte);
            Ok(())
        }

        fn read_byte(&mut self) -> Result<u8> {
            Ok(0x28)
        }
    }

    #[test]
    fn test_read_rom() {
        let mut bus = Probe {
            present: true,
            resets: 0,
            written: Vec::new(),
        };
        let data = execute(&mut bus, &parse("[0x33 r:8]").unwrap()).unwrap();
        assert_eq!(bus.resets, 1);
        assert_eq!(bus.written, [0x33]);
        assert_eq!(data.len(), 8);
    }

    #[test]
    fn test_no_presence() {
        let mut bus = Probe {
            present: false,
            resets: 0,
            written: Vec::new(),
        };
        assert_eq!(
            execute(&mut bus, &parse("[0xCC 0x44]").unwrap()),
            Err(Error::Bus(BusFailure::NoDevice))
        );
        assert!(bus.written.is_empty());
    }
}
