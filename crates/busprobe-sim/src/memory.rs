//! In-memory SPI NOR flash and 25xx EEPROM
//!
//! Emulates the chip side of the bus one byte at a time, so any ByteCode
//! sequence the executor produces is interpreted the way a real part would.

use crate::spi::SpiTarget;

/// SPI memory opcodes understood by the emulator
pub mod opcodes {
    /// Write status register
    pub const WRSR: u8 = 0x01;
    /// Page program
    pub const PP: u8 = 0x02;
    /// Read data
    pub const READ: u8 = 0x03;
    /// Write disable
    pub const WRDI: u8 = 0x04;
    /// Read status register
    pub const RDSR: u8 = 0x05;
    /// Write enable
    pub const WREN: u8 = 0x06;
    /// Fast read (one dummy byte)
    pub const FAST_READ: u8 = 0x0B;
    /// 4 KiB sector erase
    pub const SE: u8 = 0x20;
    /// Chip erase
    pub const CE_60: u8 = 0x60;
    /// Chip erase (alternate)
    pub const CE_C7: u8 = 0xC7;
    /// Read JEDEC ID
    pub const RDID: u8 = 0x9F;
}

/// Status register write-enable latch
pub const STATUS_WEL: u8 = 1 << 1;

/// Kind of memory behind chip select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// NOR flash: programming only clears bits, erase sets them
    NorFlash,
    /// EEPROM: bytes are overwritten directly, no erase or JEDEC ID
    Eeprom,
}

/// Geometry and identity of the emulated part
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Flash or EEPROM
    pub kind: MemoryKind,
    /// JEDEC manufacturer ID
    pub manufacturer_id: u8,
    /// JEDEC device ID
    pub device_id: u16,
    /// Size in bytes
    pub size: usize,
    /// Page size for programming
    pub page_size: usize,
    /// Sector size for the smallest erase
    pub sector_size: usize,
    /// Address bytes after READ/PP/SE
    pub addr_bytes: u8,
}

impl MemoryConfig {
    /// Winbond W25Q128FV
    pub fn w25q128() -> Self {
        Self {
            kind: MemoryKind::NorFlash,
            manufacturer_id: 0xEF,
            device_id: 0x4018,
            size: 16 * 1024 * 1024,
            page_size: 256,
            sector_size: 4096,
            addr_bytes: 3,
        }
    }

    /// Microchip 25LC256
    pub fn eeprom_25lc256() -> Self {
        Self {
            kind: MemoryKind::Eeprom,
            manufacturer_id: 0xFF,
            device_id: 0xFFFF,
            size: 32 * 1024,
            page_size: 64,
            sector_size: 64,
            addr_bytes: 2,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::w25q128()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opcode,
    Id(usize),
    Status,
    WriteStatus,
    Address { op: u8, addr: u32, remaining: u8 },
    Dummy { addr: u32 },
    Read { addr: u32 },
    Program { addr: u32 },
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    SectorErase(u32),
    ChipErase,
    Written,
}

/// Emulated SPI memory chip
#[derive(Debug, Clone)]
pub struct SpiMemory {
    config: MemoryConfig,
    data: Vec<u8>,
    status: u8,
    phase: Phase,
    pending: Pending,
}

impl SpiMemory {
    /// Create an erased part
    pub fn new(config: MemoryConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            status: 0,
            phase: Phase::Ignore,
            pending: Pending::None,
        }
    }

    /// Create a part with pre-filled contents starting at address 0
    pub fn with_data(config: MemoryConfig, initial_data: &[u8]) -> Self {
        let mut memory = Self::new(config);
        let len = core::cmp::min(initial_data.len(), memory.data.len());
        memory.data[..len].copy_from_slice(&initial_data[..len]);
        memory
    }

    /// Contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Part configuration
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn write_enabled(&self) -> bool {
        self.status & STATUS_WEL != 0
    }

    fn wrap(&self, addr: u32) -> usize {
        addr as usize % self.data.len()
    }

    fn start_opcode(&mut self, op: u8) -> Phase {
        let flash = self.config.kind == MemoryKind::NorFlash;
        match op {
            opcodes::RDID if flash => Phase::Id(0),
            opcodes::RDSR => Phase::Status,
            opcodes::WRSR => Phase::WriteStatus,
            opcodes::WREN => {
                self.status |= STATUS_WEL;
                Phase::Ignore
            }
            opcodes::WRDI => {
                self.status &= !STATUS_WEL;
                Phase::Ignore
            }
            opcodes::READ | opcodes::PP => Phase::Address {
                op,
                addr: 0,
                remaining: self.config.addr_bytes,
            },
            opcodes::FAST_READ | opcodes::SE if flash => Phase::Address {
                op,
                addr: 0,
                remaining: self.config.addr_bytes,
            },
            opcodes::CE_60 | opcodes::CE_C7 if flash => {
                if self.write_enabled() {
                    self.pending = Pending::ChipErase;
                }
                Phase::Ignore
            }
            _ => {
                log::trace!("SpiMemory: ignoring opcode 0x{:02X}", op);
                Phase::Ignore
            }
        }
    }

    fn address_complete(&mut self, op: u8, addr: u32) -> Phase {
        match op {
            opcodes::READ => Phase::Read { addr },
            opcodes::FAST_READ => Phase::Dummy { addr },
            opcodes::PP => Phase::Program { addr },
            opcodes::SE => {
                if self.write_enabled() {
                    self.pending = Pending::SectorErase(addr);
                }
                Phase::Ignore
            }
            _ => Phase::Ignore,
        }
    }

    fn program(&mut self, addr: u32, byte: u8) -> u32 {
        if !self.write_enabled() {
            return addr;
        }
        let i = self.wrap(addr);
        match self.config.kind {
            // Flash programming: can only change 1 -> 0
            MemoryKind::NorFlash => self.data[i] &= byte,
            MemoryKind::Eeprom => self.data[i] = byte,
        }
        self.pending = Pending::Written;
        // Programming wraps within the page
        let page = self.config.page_size as u32;
        let base = addr - addr % page;
        base + (addr + 1 - base) % page
    }

    fn commit(&mut self) {
        match self.pending {
            Pending::SectorErase(addr) => {
                let size = self.config.sector_size;
                let start = self.wrap(addr) & !(size - 1);
                let end = core::cmp::min(start + size, self.data.len());
                self.data[start..end].fill(0xFF);
            }
            Pending::ChipErase => self.data.fill(0xFF),
            Pending::Written | Pending::None => {}
        }
        if self.pending != Pending::None {
            self.status &= !STATUS_WEL;
        }
        self.pending = Pending::None;
    }
}

impl SpiTarget for SpiMemory {
    fn select(&mut self) {
        self.phase = Phase::Opcode;
    }

    fn exchange(&mut self, mosi: u8) -> u8 {
        let (next, miso) = match self.phase {
            Phase::Opcode => (self.start_opcode(mosi), 0xFF),
            Phase::Id(i) => {
                let id = [
                    self.config.manufacturer_id,
                    (self.config.device_id >> 8) as u8,
                    self.config.device_id as u8,
                ];
                (Phase::Id(i + 1), id.get(i).copied().unwrap_or(0xFF))
            }
            Phase::Status => (Phase::Status, self.status),
            Phase::WriteStatus => {
                if self.write_enabled() {
                    self.status = mosi & !STATUS_WEL;
                }
                (Phase::Ignore, 0xFF)
            }
            Phase::Address {
                op,
                addr,
                remaining,
            } => {
                let addr = addr << 8 | u32::from(mosi);
                let next = if remaining <= 1 {
                    self.address_complete(op, addr)
                } else {
                    Phase::Address {
                        op,
                        addr,
                        remaining: remaining - 1,
                    }
                };
                (next, 0xFF)
            }
            Phase::Dummy { addr } => (Phase::Read { addr }, 0xFF),
            Phase::Read { addr } => {
                let byte = self.data[self.wrap(addr)];
                (Phase::Read { addr: addr + 1 }, byte)
            }
            Phase::Program { addr } => (
                Phase::Program {
                    addr: self.program(addr, mosi),
                },
                0xFF,
            ),
            Phase::Ignore => (Phase::Ignore, 0xFF),
        };
        self.phase = next;
        miso
    }

    fn deselect(&mut self) {
        self.commit();
        self.phase = Phase::Ignore;
    }
}
