//! Line shells for SPI memories and the SD card
//!
//! A [`ModeShell`] owns its own prompt and command set. It runs on a bus
//! the arbiter has already bound, and the controller configuration is
//! restored when it returns.

use std::io::Write;

use busprobe_core::arbiter::Role;
use busprobe_core::bus::Executor;
use busprobe_core::bytecode::ByteCode;
use busprobe_core::format;
use busprobe_repl::{Input, LineSource};

use super::shell::{Bus, Shell};
use crate::backends::CardInfo;
use crate::console::Console;
use crate::error::AppError;

/// Largest read issued in one chip select frame
const READ_CHUNK: u32 = 256;

/// Whether a shell keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlow {
    /// Read the next line
    Continue,
    /// Return to the mode loop
    Exit,
}

/// A nested shell entered from the mode loop
pub trait ModeShell {
    /// Prompt name
    fn name(&self) -> &'static str;

    /// Handle one trimmed, non-empty line
    fn handle(
        &mut self,
        line: &str,
        bus: &mut dyn Executor,
        out: &mut dyn Write,
    ) -> Result<ShellFlow, AppError>;
}

/// Run `shell` until it exits or input ends
///
/// Recoverable errors are reported and the shell continues.
pub(super) fn run<L: LineSource, W: Write>(
    shell: &mut dyn ModeShell,
    bus: &mut Bus,
    role: Role,
    input: &mut L,
    out: &mut W,
) -> Result<(), AppError> {
    log::info!("Entering {} shell", shell.name());
    writeln!(out, "{} shell. Type 'help' for commands, 'exit' to leave.", shell.name())?;
    let prompt = format!("{}> ", shell.name());
    loop {
        let line = match input.read_line(&prompt)? {
            Input::Line(line) => line,
            Input::Interrupted | Input::Eof => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let peripheral = bus.bound(role)?;
        match shell.handle(line, peripheral, out) {
            Ok(ShellFlow::Continue) => {}
            Ok(ShellFlow::Exit) => break,
            Err(e) if e.is_recoverable() => writeln!(out, "Error: {}", e)?,
            Err(e) => return Err(e),
        }
    }
    log::info!("Leaving {} shell", shell.name());
    Ok(())
}

impl<L: LineSource, W: Write, C: Console> Shell<L, W, C> {
    pub(super) fn flash(&mut self) -> Result<(), AppError> {
        self.memory_shell(&mut MemoryShell::flash())
    }

    pub(super) fn eeprom(&mut self) -> Result<(), AppError> {
        self.memory_shell(&mut MemoryShell::eeprom())
    }

    fn memory_shell(&mut self, shell: &mut MemoryShell) -> Result<(), AppError> {
        let index = self.controller()?;
        let Self {
            buses, input, out, ..
        } = self;
        let bus = &mut buses[index];
        let result = run(shell, bus, Role::Controller, input, out);
        // The shell may have left the chip in any state
        let restored = bus.restore_controller();
        result?;
        restored?;
        Ok(())
    }
}

/// Parse a decimal or `0x` hexadecimal number
fn parse_number(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// SPI NOR flash or 25xx EEPROM on the controller bus
pub struct MemoryShell {
    name: &'static str,
    address_bytes: usize,
    has_id: bool,
}

impl MemoryShell {
    /// NOR flash: JEDEC ID, 3-byte addresses
    pub fn flash() -> Self {
        Self {
            name: "flash",
            address_bytes: 3,
            has_id: true,
        }
    }

    /// 25xx EEPROM: 2-byte addresses
    pub fn eeprom() -> Self {
        Self {
            name: "eeprom",
            address_bytes: 2,
            has_id: false,
        }
    }

    fn frame(bus: &mut dyn Executor, command: u8, address: &[u8], count: u32) -> Result<Vec<u8>, AppError> {
        let mut codes = vec![ByteCode::start(), ByteCode::write(u32::from(command))];
        codes.extend(address.iter().map(|&b| ByteCode::write(u32::from(b))));
        codes.push(ByteCode::read(count));
        codes.push(ByteCode::stop());
        Ok(bus.execute(&codes)?)
    }

    fn read(&self, bus: &mut dyn Executor, address: u32, len: u32) -> Result<Vec<u8>, AppError> {
        let mut data = Vec::with_capacity(len as usize);
        let mut offset = 0;
        while offset < len {
            let count = READ_CHUNK.min(len - offset);
            let at = (address + offset).to_be_bytes();
            let chunk = Self::frame(bus, 0x03, &at[4 - self.address_bytes..], count)?;
            data.extend_from_slice(&chunk);
            offset += count;
        }
        Ok(data)
    }

    fn help(&self, out: &mut dyn Write) -> std::io::Result<()> {
        if self.has_id {
            writeln!(out, "  id                  Read the JEDEC ID")?;
        }
        writeln!(out, "  read <addr> <len>   Hex dump of <len> bytes from <addr>")?;
        writeln!(out, "  status              Read the status register")?;
        writeln!(out, "  exit                Return to the main shell")
    }
}

impl ModeShell for MemoryShell {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(
        &mut self,
        line: &str,
        bus: &mut dyn Executor,
        out: &mut dyn Write,
    ) -> Result<ShellFlow, AppError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["exit"] => return Ok(ShellFlow::Exit),
            ["help"] => self.help(out)?,
            ["id"] if self.has_id => {
                let id = Self::frame(bus, 0x9F, &[], 3)?;
                writeln!(out, "JEDEC ID: {}", format::hex_bytes(&id))?;
            }
            ["status"] => {
                let status = Self::frame(bus, 0x05, &[], 1)?;
                writeln!(out, "Status:   {}", format::hex_bytes(&status))?;
            }
            ["read", address, len] => {
                let limit = 1u64 << (8 * self.address_bytes);
                match (parse_number(address), parse_number(len)) {
                    (Some(address), Some(len))
                        if u64::from(address) + u64::from(len) <= limit =>
                    {
                        let data = self.read(bus, address, len)?;
                        writeln!(out, "{}", format::hex_dump(address, &data))?;
                    }
                    (Some(_), Some(_)) => {
                        writeln!(out, "Range exceeds the {}-byte address space", self.address_bytes)?;
                    }
                    _ => writeln!(out, "Usage: read <addr> <len>")?,
                }
            }
            [word, ..] => writeln!(out, "Unknown command '{}'", word)?,
            [] => {}
        }
        Ok(ShellFlow::Continue)
    }
}

/// Minimal shell on a mounted SD card
pub struct SdShell {
    card: Option<CardInfo>,
}

impl SdShell {
    pub fn new(card: Option<CardInfo>) -> Self {
        Self { card }
    }
}

impl ModeShell for SdShell {
    fn name(&self) -> &'static str {
        "sd"
    }

    fn handle(
        &mut self,
        line: &str,
        _bus: &mut dyn Executor,
        out: &mut dyn Write,
    ) -> Result<ShellFlow, AppError> {
        match line {
            "exit" => return Ok(ShellFlow::Exit),
            "info" => match &self.card {
                Some(card) => {
                    writeln!(out, "Label:    {}", card.label)?;
                    writeln!(out, "Capacity: {} MiB", card.capacity >> 20)?;
                }
                None => writeln!(out, "No card information available")?,
            },
            "help" => {
                writeln!(out, "  info   Show the card label and capacity")?;
                writeln!(out, "  exit   Unmount and return to the main shell")?;
            }
            other => writeln!(out, "Unknown command '{}'", other)?,
        }
        Ok(ShellFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busprobe_core::bytecode::OpKind;
    use busprobe_core::error::{BusFailure, Error, Result};

    /// Answers every frame with an incrementing counter
    #[derive(Default)]
    struct Counter {
        frames: Vec<Vec<ByteCode>>,
        next: u8,
    }

    impl Executor for Counter {
        fn execute(&mut self, codes: &[ByteCode]) -> Result<Vec<u8>> {
            self.frames.push(codes.to_vec());
            let reads: u32 = codes
                .iter()
                .filter(|c| c.kind() == OpKind::ReadCount)
                .map(|c| c.count())
                .sum();
            Ok((0..reads)
                .map(|_| {
                    self.next = self.next.wrapping_add(1);
                    self.next
                })
                .collect())
        }
    }

    fn handle(shell: &mut dyn ModeShell, bus: &mut Counter, line: &str) -> String {
        let mut out = Vec::new();
        shell.handle(line, bus, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_read_is_chunked_with_big_endian_address() {
        let mut shell = MemoryShell::flash();
        let mut bus = Counter::default();
        let out = handle(&mut shell, &mut bus, "read 0x1000 300");
        assert_eq!(bus.frames.len(), 2);
        assert_eq!(
            &bus.frames[1][..5],
            [
                ByteCode::start(),
                ByteCode::write(0x03),
                ByteCode::write(0x00),
                ByteCode::write(0x11),
                ByteCode::write(0x00),
            ]
        );
        assert_eq!(bus.frames[1][5], ByteCode::read(44));
        assert!(out.starts_with("00001000: 01 02 03"));
        assert_eq!(out.lines().count(), 19);
    }

    #[test]
    fn test_eeprom_uses_two_address_bytes() {
        let mut shell = MemoryShell::eeprom();
        let mut bus = Counter::default();
        handle(&mut shell, &mut bus, "read 0x7FF0 16");
        assert_eq!(bus.frames[0][2..4], [ByteCode::write(0x7F), ByteCode::write(0xF0)]);
        assert_eq!(bus.frames[0][4], ByteCode::read(16));

        let out = handle(&mut shell, &mut bus, "read 0xFFFF 2");
        assert!(out.contains("2-byte address space"));
        let out = handle(&mut shell, &mut bus, "id");
        assert_eq!(out, "Unknown command 'id'\n");
    }

    #[test]
    fn test_bad_arguments() {
        let mut shell = MemoryShell::flash();
        let mut bus = Counter::default();
        assert_eq!(handle(&mut shell, &mut bus, "read zero 4"), "Usage: read <addr> <len>\n");
        assert_eq!(handle(&mut shell, &mut bus, "read 0"), "Unknown command 'read'\n");
        assert!(bus.frames.is_empty());
    }

    #[test]
    fn test_bus_error_propagates() {
        struct Dead;
        impl Executor for Dead {
            fn execute(&mut self, _codes: &[ByteCode]) -> Result<Vec<u8>> {
                Err(Error::Bus(BusFailure::Timeout))
            }
        }
        let mut out = Vec::new();
        let err = MemoryShell::flash()
            .handle("status", &mut Dead, &mut out)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_sd_shell() {
        let mut shell = SdShell::new(None);
        let mut bus = Counter::default();
        assert_eq!(handle(&mut shell, &mut bus, "info"), "No card information available\n");
        let mut out = Vec::new();
        assert_eq!(
            shell.handle("exit", &mut bus, &mut out).unwrap(),
            ShellFlow::Exit
        );
    }
}
