//! Simulated I2C bus with 24xx EEPROM targets

use busprobe_core::arbiter::{Peripheral, Role};
use busprobe_core::bridge::Relay;
use busprobe_core::bus::i2c::{self, I2cBus};
use busprobe_core::bus::Executor;
use busprobe_core::bytecode::ByteCode;
use busprobe_core::capture::Follower;
use busprobe_core::config::{BusConfiguration, BusParams, MAX_I2C_FREQUENCY};
use busprobe_core::error::{BusFailure, Error, RangeKind, Result};

/// Target side of an I2C bus
pub trait I2cTarget: Send {
    /// 7-bit address the target answers to
    fn address(&self) -> u8;

    /// Addressed after a START; `read` is the R/W bit
    fn start(&mut self, read: bool);

    /// Byte written by the controller; returns ACK
    fn write(&mut self, byte: u8) -> bool;

    /// Byte read by the controller
    fn read(&mut self) -> u8;

    /// STOP seen
    fn stop(&mut self) {}
}

/// 24xx EEPROM with a two-byte word address
pub struct I2cEeprom {
    address: u8,
    data: Vec<u8>,
    pointer: usize,
    address_bytes_seen: u8,
}

impl I2cEeprom {
    /// A blank (0xFF) part of `size` bytes at `address`
    pub fn new(address: u8, size: usize) -> Self {
        Self {
            address,
            data: vec![0xFF; size],
            pointer: 0,
            address_bytes_seen: 0,
        }
    }

    /// 24C256 at the default address 0x50
    pub fn at24c256() -> Self {
        Self::new(0x50, 32 * 1024)
    }

    /// Contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl I2cTarget for I2cEeprom {
    fn address(&self) -> u8 {
        self.address
    }

    fn start(&mut self, read: bool) {
        if !read {
            self.address_bytes_seen = 0;
        }
    }

    fn write(&mut self, byte: u8) -> bool {
        if self.address_bytes_seen < 2 {
            // Word address, high byte first
            self.pointer = (self.pointer << 8 | usize::from(byte)) & 0xFFFF;
            self.address_bytes_seen += 1;
        } else {
            let i = self.pointer % self.data.len();
            self.data[i] = byte;
            self.pointer += 1;
        }
        true
    }

    fn read(&mut self) -> u8 {
        let byte = self.data[self.pointer % self.data.len()];
        self.pointer += 1;
        byte
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Idle,
    Address,
    Selected { index: usize, read: bool },
    Unanswered,
}

/// Simulated I2C controller with targets on the bus
pub struct SimI2c {
    targets: Vec<Box<dyn I2cTarget>>,
    role: Option<Role>,
    frequency: u32,
    state: BusState,
}

impl Default for SimI2c {
    fn default() -> Self {
        Self::with_eeprom()
    }
}

impl SimI2c {
    /// Bus with the given targets
    pub fn new(targets: Vec<Box<dyn I2cTarget>>) -> Self {
        Self {
            targets,
            role: None,
            frequency: 0,
            state: BusState::Idle,
        }
    }

    /// Bus with a 24C256 at 0x50
    pub fn with_eeprom() -> Self {
        Self::new(vec![Box::new(I2cEeprom::at24c256())])
    }

    /// Current clock
    pub fn frequency(&self) -> u32 {
        self.frequency
    }
}

impl Peripheral for SimI2c {
    fn bind(&mut self, role: Role, config: &BusConfiguration) -> Result<()> {
        let BusParams::I2c { frequency } = config.params else {
            return Err(Error::Unsupported);
        };
        if role != Role::Controller {
            return Err(Error::Unsupported);
        }
        if !config.is_complete() {
            return Err(Error::Range(RangeKind::Parameter));
        }
        self.frequency = frequency;
        self.role = Some(role);
        self.state = BusState::Idle;
        Ok(())
    }

    fn release(&mut self) {
        self.role = None;
        self.state = BusState::Idle;
    }
}

impl I2cBus for SimI2c {
    fn start(&mut self) -> Result<()> {
        self.state = BusState::Address;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let BusState::Selected { index, .. } = self.state {
            self.targets[index].stop();
        }
        self.state = BusState::Idle;
        Ok(())
    }

    fn write(&mut self, byte: u8) -> Result<bool> {
        match self.state {
            BusState::Address => {
                let address = byte >> 1;
                let read = byte & 1 != 0;
                match self.targets.iter().position(|t| t.address() == address) {
                    Some(index) => {
                        self.targets[index].start(read);
                        self.state = BusState::Selected { index, read };
                        Ok(true)
                    }
                    None => {
                        self.state = BusState::Unanswered;
                        Ok(false)
                    }
                }
            }
            BusState::Selected { index, read: false } => Ok(self.targets[index].write(byte)),
            _ => Ok(false),
        }
    }

    fn read(&mut self, _ack: bool) -> Result<u8> {
        match self.state {
            BusState::Selected { index, read: true } => Ok(self.targets[index].read()),
            // SDA floats high
            _ => Ok(0xFF),
        }
    }

    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if !(1_000..=MAX_I2C_FREQUENCY).contains(&hz) {
            return Err(Error::Range(RangeKind::Parameter));
        }
        self.frequency = hz;
        Ok(())
    }
}

impl Executor for SimI2c {
    fn execute(&mut self, codes: &[ByteCode]) -> Result<Vec<u8>> {
        if self.role != Some(Role::Controller) {
            return Err(Error::Bus(BusFailure::NotConfigured));
        }
        i2c::execute(self, codes)
    }
}

impl Follower for SimI2c {}

impl Relay for SimI2c {}
