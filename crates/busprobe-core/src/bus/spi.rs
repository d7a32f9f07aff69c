//! SPI controller executor
//!
//! `[` asserts chip select and `]` releases it. Writes clock the word out
//! and discard what comes back; reads clock out `0xFF` and keep the
//! received bytes. Chip select is always released before returning, even
//! when the sequence leaves it asserted or a transfer fails.

use alloc::vec::Vec;

use super::word;
use crate::bytecode::{ByteCode, OpKind};
use crate::error::{Error, Result};

/// Filler byte clocked out while reading
pub const READ_FILLER: u8 = 0xFF;

/// Minimal SPI controller driver
pub trait SpiBus {
    /// Drive chip select (`active = true` pulls CS low)
    fn set_cs(&mut self, active: bool) -> Result<()>;

    /// Exchange one byte full-duplex
    fn transfer(&mut self, byte: u8) -> Result<u8>;

    /// Change the clock frequency in Hz
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        let _ = hz;
        Err(Error::Unsupported)
    }
}

impl<T: SpiBus + ?Sized> SpiBus for &mut T {
    fn set_cs(&mut self, active: bool) -> Result<()> {
        (**self).set_cs(active)
    }

    fn transfer(&mut self, byte: u8) -> Result<u8> {
        (**self).transfer(byte)
    }

    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        (**self).set_frequency(hz)
    }
}

/// Execute a ByteCode sequence on an SPI bus
pub fn execute<B: SpiBus + ?Sized>(bus: &mut B, codes: &[ByteCode]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut selected = false;
    let result = run(bus, codes, &mut out, &mut selected);
    if selected {
        let released = bus.set_cs(false);
        if result.is_ok() {
            released?;
        }
    }
    result.map(|()| out)
}

fn run<B: SpiBus + ?Sized>(
    bus: &mut B,
    codes: &[ByteCode],
    out: &mut Vec<u8>,
    selected: &mut bool,
) -> Result<()> {
    for code in codes {
        match code.kind() {
            OpKind::StartCondition => {
                bus.set_cs(true)?;
                *selected = true;
            }
            OpKind::StopCondition => {
                bus.set_cs(false)?;
                *selected = false;
            }
            OpKind::WriteValue => {
                let byte = word(code)?;
                for _ in 0..code.count() {
                    bus.transfer(byte)?;
                }
            }
            OpKind::ReadCount => {
                out.reserve(code.count() as usize);
                for _ in 0..code.count() {
                    out.push(bus.transfer(READ_FILLER)?);
                }
            }
            OpKind::SetClock => bus.set_frequency(code.value())?,
            // No addressing phase on SPI
            OpKind::SetAddress => return Err(Error::Unsupported),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BusFailure, RangeKind};
    use crate::instruction::parse;
    use alloc::vec;

    #[derive(Debug, PartialEq)]
    enum Event {
        Cs(bool),
        Tx(u8),
        Clock(u32),
    }

    /// Answers every transfer with the next byte of `reply`
    struct Recorder {
        events: Vec<Event>,
        reply: Vec<u8>,
        fail_after: Option<usize>,
    }

    impl Recorder {
        fn new(reply: &[u8]) -> Self {
            Self {
                events: Vec::new(),
                reply: reply.to_vec(),
                fail_after: None,
            }
        }

        fn transfers(&self) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, Event::Tx(_)))
                .count()
        }
    }

    impl SpiBus for Recorder {
        fn set_cs(&mut self, active: bool) -> Result<()> {
            self.events.push(Event::Cs(active));
            Ok(())
        }

        fn transfer(&mut self, byte: u8) -> Result<u8> {
            if self.fail_after == Some(self.transfers()) {
                return Err(Error::Bus(BusFailure::Hardware));
            }
            self.events.push(Event::Tx(byte));
            Ok(if self.reply.is_empty() {
                0
            } else {
                self.reply.remove(0)
            })
        }

        fn set_frequency(&mut self, hz: u32) -> Result<()> {
            self.events.push(Event::Clock(hz));
            Ok(())
        }
    }

    #[test]
    fn test_jedec_id_sequence() {
        let mut bus = Recorder::new(&[0x00, 0xEF, 0x40, 0x18]);
        let codes = parse("[0x9F r:3]").unwrap();
        let data = execute(&mut bus, &codes).unwrap();
        assert_eq!(data, [0xEF, 0x40, 0x18]);
        assert_eq!(
            bus.events,
            [
                Event::Cs(true),
                Event::Tx(0x9F),
                Event::Tx(0xFF),
                Event::Tx(0xFF),
                Event::Tx(0xFF),
                Event::Cs(false),
            ]
        );
    }

    #[test]
    fn test_empty_frame_only_toggles_cs() {
        let mut bus = Recorder::new(&[]);
        let data = execute(&mut bus, &parse("[]").unwrap()).unwrap();
        assert!(data.is_empty());
        assert_eq!(bus.events, [Event::Cs(true), Event::Cs(false)]);
    }

    #[test]
    fn test_zero_length_read_never_clocks() {
        let mut bus = Recorder::new(&[]);
        let data = execute(&mut bus, &parse("[r:0]").unwrap()).unwrap();
        assert!(data.is_empty());
        assert_eq!(bus.transfers(), 0);
    }

    #[test]
    fn test_repeat_and_clock() {
        let mut bus = Recorder::new(&[]);
        execute(&mut bus, &parse("[f:1000000 0x00:3]").unwrap()).unwrap();
        assert_eq!(bus.events[1], Event::Clock(1_000_000));
        assert_eq!(bus.transfers(), 3);
    }

    #[test]
    fn test_failure_releases_cs() {
        let mut bus = Recorder::new(&[]);
        bus.fail_after = Some(1);
        let err = execute(&mut bus, &parse("[0x03 r:4]").unwrap()).unwrap_err();
        assert_eq!(err, Error::Bus(BusFailure::Hardware));
        assert_eq!(bus.events.last(), Some(&Event::Cs(false)));
    }

    #[test]
    fn test_unterminated_sequence_releases_cs() {
        let mut bus = Recorder::new(&[]);
        let codes = vec![ByteCode::start(), ByteCode::write(0x06)];
        execute(&mut bus, &codes).unwrap();
        assert_eq!(bus.events.last(), Some(&Event::Cs(false)));
    }

    #[test]
    fn test_wide_value_rejected() {
        let mut bus = Recorder::new(&[]);
        let codes = vec![ByteCode::start(), ByteCode::write(0x1FF), ByteCode::stop()];
        assert_eq!(
            execute(&mut bus, &codes),
            Err(Error::Range(RangeKind::Value {
                value: 0x1FF,
                bits: 8
            }))
        );
    }
}
