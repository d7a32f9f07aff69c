//! I2C controller executor
//!
//! `[` is START, `]` is STOP. The first write after START is the address
//! byte. A write that is not acknowledged aborts the transaction with a
//! STOP and fails with [`BusFailure::Nack`]. Reads acknowledge every byte
//! except the last one of a run, which is NACKed so the target releases
//! SDA.

use alloc::vec::Vec;

use super::{next_is_read, word};
use crate::bytecode::{ByteCode, OpKind};
use crate::error::{BusFailure, Error, RangeKind, Result};
use crate::instruction::MAX_ADDRESS;

/// Minimal I2C controller driver
pub trait I2cBus {
    /// Issue a START (or repeated START)
    fn start(&mut self) -> Result<()>;

    /// Issue a STOP
    fn stop(&mut self) -> Result<()>;

    /// Write one byte, returning true if the target acknowledged it
    fn write(&mut self, byte: u8) -> Result<bool>;

    /// Read one byte, sending ACK if `ack` is true and NACK otherwise
    fn read(&mut self, ack: bool) -> Result<u8>;

    /// Change the SCL frequency in Hz
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        let _ = hz;
        Err(Error::Unsupported)
    }
}

impl<T: I2cBus + ?Sized> I2cBus for &mut T {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn write(&mut self, byte: u8) -> Result<bool> {
        (**self).write(byte)
    }

    fn read(&mut self, ack: bool) -> Result<u8> {
        (**self).read(ack)
    }

    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        (**self).set_frequency(hz)
    }
}

/// Check that every transfer sits inside a START/STOP pair
///
/// A START inside an open frame is a repeated START and is accepted.
pub fn check_framing(codes: &[ByteCode]) -> Result<()> {
    let mut open = false;
    for code in codes {
        match code.kind() {
            OpKind::StartCondition => open = true,
            OpKind::StopCondition if !open => return Err(Error::Bus(BusFailure::Unframed)),
            OpKind::StopCondition => open = false,
            OpKind::WriteValue | OpKind::ReadCount | OpKind::SetAddress if !open => {
                return Err(Error::Bus(BusFailure::Unframed))
            }
            _ => {}
        }
    }
    if open {
        return Err(Error::Bus(BusFailure::Unframed));
    }
    Ok(())
}

/// Execute a ByteCode sequence on an I2C bus
///
/// Framing is checked before the bus is touched.
pub fn execute<B: I2cBus + ?Sized>(bus: &mut B, codes: &[ByteCode]) -> Result<Vec<u8>> {
    check_framing(codes)?;
    let mut out = Vec::new();
    let mut open = false;
    let result = run(bus, codes, &mut out, &mut open);
    if result.is_err() && open {
        if let Err(e) = bus.stop() {
            log::warn!("I2C: STOP after failed transfer also failed: {}", e);
        }
    }
    result.map(|()| out)
}

fn run<B: I2cBus + ?Sized>(
    bus: &mut B,
    codes: &[ByteCode],
    out: &mut Vec<u8>,
    open: &mut bool,
) -> Result<()> {
    for (i, code) in codes.iter().enumerate() {
        match code.kind() {
            OpKind::StartCondition => {
                bus.start()?;
                *open = true;
            }
            OpKind::StopCondition => {
                bus.stop()?;
                *open = false;
            }
            OpKind::WriteValue => {
                let byte = word(code)?;
                for _ in 0..code.count() {
                    write_acked(bus, byte)?;
                }
            }
            OpKind::SetAddress => {
                if code.value() > MAX_ADDRESS {
                    return Err(Error::Range(RangeKind::Value {
                        value: code.value(),
                        bits: 7,
                    }));
                }
                let rw = u8::from(next_is_read(codes, i));
                write_acked(bus, (code.value() as u8) << 1 | rw)?;
            }
            OpKind::ReadCount => {
                let count = code.count();
                let continues = next_is_read(codes, i);
                out.reserve(count as usize);
                for n in 0..count {
                    let last = n + 1 == count && !continues;
                    out.push(bus.read(!last)?);
                }
            }
            OpKind::SetClock => bus.set_frequency(code.value())?,
        }
    }
    Ok(())
}

fn write_acked<B: I2cBus + ?Sized>(bus: &mut B, byte: u8) -> Result<()> {
    if bus.write(byte)? {
        Ok(())
    } else {
        log::debug!("I2C: no ACK for 0x{:02X}", byte);
        Err(Error::Bus(BusFailure::Nack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::parse;

    #[derive(Debug, PartialEq)]
    enum Event {
        Start,
        Stop,
        Write(u8),
        Read { ack: bool },
    }

    /// Target at 0x50 that ACKs everything addressed to it
    struct Target {
        events: Vec<Event>,
        next: u8,
    }

    impl Target {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                next: 0x10,
            }
        }
    }

    impl I2cBus for Target {
        fn start(&mut self) -> Result<()> {
            self.events.push(Event::Start);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.events.push(Event::Stop);
            Ok(())
        }

        fn write(&mut self, byte: u8) -> Result<bool> {
            self.events.push(Event::Write(byte));
            let addressed = matches!(self.events.iter().rev().nth(1), Some(Event::Start));
            Ok(!addressed || byte >> 1 == 0x50)
        }

        fn read(&mut self, ack: bool) -> Result<u8> {
            self.events.push(Event::Read { ack });
            self.next += 1;
            Ok(self.next)
        }
    }

    #[test]
    fn test_read_nacks_last_byte() {
        let mut bus = Target::new();
        let data = execute(&mut bus, &parse("[0xA1 r:2]").unwrap()).unwrap();
        assert_eq!(data, [0x11, 0x12]);
        assert_eq!(
            bus.events,
            [
                Event::Start,
                Event::Write(0xA1),
                Event::Read { ack: true },
                Event::Read { ack: false },
                Event::Stop,
            ]
        );
    }

    #[test]
    fn test_nack_aborts_with_stop() {
        let mut bus = Target::new();
        let err = execute(&mut bus, &parse("[0x42 0x00]").unwrap()).unwrap_err();
        assert_eq!(err, Error::Bus(BusFailure::Nack));
        assert_eq!(bus.events, [Event::Start, Event::Write(0x42), Event::Stop]);
    }

    #[test]
    fn test_probe_only_transaction() {
        let mut bus = Target::new();
        let data = execute(&mut bus, &parse("[]").unwrap()).unwrap();
        assert!(data.is_empty());
        assert_eq!(bus.events, [Event::Start, Event::Stop]);
    }

    #[test]
    fn test_set_address_direction_from_lookahead() {
        let mut bus = Target::new();
        execute(&mut bus, &parse("[a:0x50 r:1]").unwrap()).unwrap();
        assert_eq!(bus.events[1], Event::Write(0xA1));

        let mut bus = Target::new();
        execute(&mut bus, &parse("[a:0x50 0x00]").unwrap()).unwrap();
        assert_eq!(bus.events[1], Event::Write(0xA0));
    }

    #[test]
    fn test_unframed_rejected_before_bus_access() {
        let mut bus = Target::new();
        let codes = [ByteCode::start(), ByteCode::write(0xA0)];
        assert_eq!(
            execute(&mut bus, &codes),
            Err(Error::Bus(BusFailure::Unframed))
        );
        let codes = [ByteCode::write(0xA0), ByteCode::stop()];
        assert_eq!(check_framing(&codes), Err(Error::Bus(BusFailure::Unframed)));
        assert!(bus.events.is_empty());
    }

    #[test]
    fn test_repeated_start_is_framed() {
        let codes = [
            ByteCode::start(),
            ByteCode::write(0xA0),
            ByteCode::start(),
            ByteCode::write(0xA1),
            ByteCode::read(1),
            ByteCode::stop(),
        ];
        assert_eq!(check_framing(&codes), Ok(()));
    }

    #[test]
    fn test_zero_read_does_not_touch_bus() {
        let mut bus = Target::new();
        execute(&mut bus, &parse("[0xA1 r:0]").unwrap()).unwrap();
        assert!(!bus.events.iter().any(|e| matches!(e, Event::Read { .. })));
    }
}
