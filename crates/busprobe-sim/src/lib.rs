//! busprobe-sim - Simulated buses for testing without hardware
//!
//! Each simulator implements the same peripheral, executor, follower and
//! relay seams a hardware backend does, with an emulated target on the
//! other end of the wire:
//!
//! - SPI: NOR flash or 25xx EEPROM behind chip select, scripted traffic
//!   for capture, and an optional SD card
//! - I2C: 24xx EEPROM at 0x50
//! - UART/HDUART: a line modem answering `OK`, or a loopback plug
//! - 1-Wire: a temperature sensor with a valid ROM code

pub mod i2c;
pub mod memory;
pub mod onewire;
pub mod spi;
pub mod uart;

pub use i2c::{I2cEeprom, I2cTarget, SimI2c};
pub use memory::{MemoryConfig, MemoryKind, SpiMemory};
pub use onewire::SimOneWire;
pub use spi::{SdCardInfo, SimSpi, SpiTarget, Transaction};
pub use uart::{LineModem, Loopback, SimUart, UartPeer};
