//! UART and half-duplex UART executor
//!
//! UART has no framing: `[` and `]` are accepted and ignored. Each read
//! byte waits up to the line's byte timeout; a short read fails with
//! [`BusFailure::Timeout`]. On a half-duplex line every transmitted byte
//! comes straight back on the shared wire and is discarded before the next
//! operation.

use alloc::vec::Vec;

use super::word;
use crate::bytecode::{ByteCode, OpKind};
use crate::error::{BusFailure, Error, Result};

/// Minimal UART driver
pub trait UartBus {
    /// Queue one byte for transmission
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Wait up to `timeout_ms` for a received byte
    ///
    /// A zero timeout polls without waiting.
    fn read_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>>;

    /// Per-byte read timeout configured for this line
    fn timeout_ms(&self) -> u32;

    /// Returns true if TX and RX share one wire
    fn is_half_duplex(&self) -> bool {
        false
    }

    /// Change the baud rate
    fn set_baud(&mut self, baud: u32) -> Result<()> {
        let _ = baud;
        Err(Error::Unsupported)
    }
}

impl<T: UartBus + ?Sized> UartBus for &mut T {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (**self).write_byte(byte)
    }

    fn read_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>> {
        (**self).read_byte(timeout_ms)
    }

    fn timeout_ms(&self) -> u32 {
        (**self).timeout_ms()
    }

    fn is_half_duplex(&self) -> bool {
        (**self).is_half_duplex()
    }

    fn set_baud(&mut self, baud: u32) -> Result<()> {
        (**self).set_baud(baud)
    }
}

/// Execute a ByteCode sequence on a UART
pub fn execute<B: UartBus + ?Sized>(bus: &mut B, codes: &[ByteCode]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let timeout = bus.timeout_ms();
    for code in codes {
        match code.kind() {
            OpKind::StartCondition | OpKind::StopCondition => {}
            OpKind::WriteValue => {
                let byte = word(code)?;
                for _ in 0..code.count() {
                    bus.write_byte(byte)?;
                    if bus.is_half_duplex() {
                        discard_echo(bus, byte, timeout)?;
                    }
                }
            }
            OpKind::ReadCount => {
                out.reserve(code.count() as usize);
                for _ in 0..code.count() {
                    let byte = bus
                        .read_byte(timeout)?
                        .ok_or(Error::Bus(BusFailure::Timeout))?;
                    out.push(byte);
                }
            }
            OpKind::SetClock => bus.set_baud(code.value())?,
            OpKind::SetAddress => return Err(Error::Unsupported),
        }
    }
    Ok(out)
}

/// Consume the echo of `sent`; a different byte means another driver was
/// talking at the same time
fn discard_echo<B: UartBus + ?Sized>(bus: &mut B, sent: u8, timeout: u32) -> Result<()> {
    match bus.read_byte(timeout)? {
        Some(echo) if echo == sent => Ok(()),
        Some(other) => {
            log::warn!(
                "HDUART: line contention, sent 0x{:02X} but read back 0x{:02X}",
                sent,
                other
            );
            Err(Error::Bus(BusFailure::Hardware))
        }
        None => Err(Error::Bus(BusFailure::Timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::parse;
    use alloc::collections::VecDeque;

    struct Line {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        half_duplex: bool,
    }

    impl Line {
        fn new(rx: &[u8], half_duplex: bool) -> Self {
            Self {
                rx: rx.iter().copied().collect(),
                tx: Vec::new(),
                half_duplex,
            }
        }
    }

    impl UartBus for Line {
        fn write_byte(&mut self, byte: u8) -> Result<()> {
            self.tx.push(byte);
            if self.half_duplex {
                self.rx.push_front(byte);
            }
            Ok(())
        }

        fn read_byte(&mut self, _timeout_ms: u32) -> Result<Option<u8>> {
            Ok(self.rx.pop_front())
        }

        fn timeout_ms(&self) -> u32 {
            10
        }

        fn is_half_duplex(&self) -> bool {
            self.half_duplex
        }
    }

    #[test]
    fn test_write_then_read() {
        let mut line = Line::new(&[0x4F, 0x4B], false);
        let data = execute(&mut line, &parse("[0x41 0x54 r:2]").unwrap()).unwrap();
        assert_eq!(line.tx, [0x41, 0x54]);
        assert_eq!(data, [0x4F, 0x4B]);
    }

    #[test]
    fn test_short_read_times_out() {
        let mut line = Line::new(&[0x01], false);
        assert_eq!(
            execute(&mut line, &parse("[r:2]").unwrap()),
            Err(Error::Bus(BusFailure::Timeout))
        );
    }

    #[test]
    fn test_half_duplex_discards_echo() {
        let mut line = Line::new(&[0x99], true);
        let data = execute(&mut line, &parse("[0x10:2 r:1]").unwrap()).unwrap();
        assert_eq!(line.tx, [0x10, 0x10]);
        assert_eq!(data, [0x99]);
    }

    #[test]
    fn test_baud_change_unsupported_by_default() {
        let mut line = Line::new(&[], false);
        assert_eq!(
            execute(&mut line, &parse("[f:9600]").unwrap()),
            Err(Error::Unsupported)
        );
    }
}
