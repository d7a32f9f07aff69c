//! Simulated 1-Wire bus with a single DS18B20-style sensor

use std::collections::VecDeque;

use busprobe_core::arbiter::{Peripheral, Role};
use busprobe_core::bridge::Relay;
use busprobe_core::bus::onewire::{self, OneWireBus};
use busprobe_core::bus::Executor;
use busprobe_core::bytecode::ByteCode;
use busprobe_core::capture::Follower;
use busprobe_core::config::{BusConfiguration, BusParams};
use busprobe_core::error::{BusFailure, Error, RangeKind, Result};

/// Read ROM
pub const READ_ROM: u8 = 0x33;
/// Skip ROM
pub const SKIP_ROM: u8 = 0xCC;
/// Read scratchpad
pub const READ_SCRATCHPAD: u8 = 0xBE;

/// Dallas/Maxim CRC-8 (polynomial 0x31, reflected)
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |mut crc, &byte| {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 1;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
        crc
    })
}

/// 1-Wire bus with at most one device
pub struct SimOneWire {
    present: bool,
    rom: [u8; 8],
    scratchpad: [u8; 9],
    output: VecDeque<u8>,
    bound: bool,
}

impl Default for SimOneWire {
    fn default() -> Self {
        // Family 0x28, 25.0625 C
        Self::new([0x28, 0xFF, 0x4C, 0x1A, 0x60, 0x17, 0x03], [0x91, 0x01])
    }
}

impl SimOneWire {
    /// A sensor with the given family+serial and temperature register;
    /// CRC bytes are computed
    pub fn new(id: [u8; 7], temperature: [u8; 2]) -> Self {
        let mut rom = [0u8; 8];
        rom[..7].copy_from_slice(&id);
        rom[7] = crc8(&id);
        let mut scratchpad = [0u8; 9];
        scratchpad[..2].copy_from_slice(&temperature);
        scratchpad[2..8].copy_from_slice(&[0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10]);
        scratchpad[8] = crc8(&scratchpad[..8]);
        Self {
            present: true,
            rom,
            scratchpad,
            output: VecDeque::new(),
            bound: false,
        }
    }

    /// Empty bus
    pub fn empty() -> Self {
        let mut bus = Self::default();
        bus.present = false;
        bus
    }

    /// ROM code including CRC
    pub fn rom(&self) -> [u8; 8] {
        self.rom
    }
}

impl Peripheral for SimOneWire {
    fn bind(&mut self, role: Role, config: &BusConfiguration) -> Result<()> {
        if role != Role::Controller || config.params != BusParams::OneWire {
            return Err(Error::Unsupported);
        }
        if !config.is_complete() {
            return Err(Error::Range(RangeKind::Parameter));
        }
        self.bound = true;
        Ok(())
    }

    fn release(&mut self) {
        self.bound = false;
        self.output.clear();
    }
}

impl OneWireBus for SimOneWire {
    fn reset(&mut self) -> Result<bool> {
        self.output.clear();
        Ok(self.present)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        if !self.present {
            return Ok(());
        }
        match byte {
            READ_ROM => self.output.extend(self.rom),
            READ_SCRATCHPAD => self.output.extend(self.scratchpad),
            SKIP_ROM => {}
            other => log::trace!("SimOneWire: ignoring command 0x{:02X}", other),
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        // Idle bus reads as ones
        Ok(self.output.pop_front().unwrap_or(0xFF))
    }
}

impl Executor for SimOneWire {
    fn execute(&mut self, codes: &[ByteCode]) -> Result<Vec<u8>> {
        if !self.bound {
            return Err(Error::Bus(BusFailure::NotConfigured));
        }
        onewire::execute(self, codes)
    }
}

impl Follower for SimOneWire {}

impl Relay for SimOneWire {}
