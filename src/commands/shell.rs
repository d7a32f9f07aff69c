//! The mode loop
//!
//! Reads one line at a time, routes it to the instruction parser or a verb
//! handler, and reports every recoverable error without leaving the loop.
//! Each protocol gets its own [`Arbiter`]; they stay alive across `mode`
//! switches so a configured bus does not prompt again.

use std::io::Write;

use busprobe_core::arbiter::Arbiter;
use busprobe_core::bus::Protocol;
use busprobe_core::command::{Command, Verb};
use busprobe_core::config::Defaults;
use busprobe_core::device::DeviceProfile;
use busprobe_core::format;
use busprobe_core::instruction::Parser;
use busprobe_repl::{Input, LineSource};

use super::prompts::Prompter;
use crate::backends::{Backend, BackendFactory};
use crate::console::Console;
use crate::error::AppError;

/// Arbiter over one backend peripheral
pub type Bus = Arbiter<Box<dyn Backend>>;

/// Whether the loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line
    Continue,
    /// Leave the loop
    Exit,
}

/// Interactive mode router
pub struct Shell<L, W, C> {
    pub(super) profile: &'static DeviceProfile,
    pub(super) defaults: Defaults,
    factory: Box<dyn BackendFactory>,
    pub(super) buses: Vec<Bus>,
    pub(super) protocol: Protocol,
    pub(super) input: L,
    pub(super) out: W,
    pub(super) console: C,
    pub(super) prompts: bool,
}

impl<L: LineSource, W: Write, C: Console> Shell<L, W, C> {
    /// Create a shell starting in `protocol`
    pub fn new(
        profile: &'static DeviceProfile,
        defaults: Defaults,
        factory: Box<dyn BackendFactory>,
        protocol: Protocol,
        input: L,
        out: W,
        console: C,
    ) -> Self {
        Self {
            profile,
            defaults,
            factory,
            buses: Vec::new(),
            protocol,
            input,
            out,
            console,
            prompts: true,
        }
    }

    /// Prompt for pins and parameters, or take them from the defaults
    pub fn with_prompts(mut self, prompts: bool) -> Self {
        self.prompts = prompts;
        self
    }

    /// Everything written so far
    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Run until `exit` or end of input
    pub fn run(&mut self) -> Result<(), AppError> {
        log::info!(
            "Shell started on {} ({} backend)",
            self.profile.name,
            self.factory.name()
        );
        self.input.set_protocol(self.protocol);

        loop {
            let prompt = format!("{}> ", self.protocol);
            let line = match self.input.read_line(&prompt)? {
                Input::Line(line) => line,
                Input::Interrupted => continue,
                Input::Eof => break,
            };

            match self.dispatch(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) if e.is_recoverable() => self.report(&e)?,
                Err(e) => return Err(e),
            }
        }

        for bus in &mut self.buses {
            bus.end();
        }
        Ok(())
    }

    /// Handle one input line
    pub fn dispatch(&mut self, line: &str) -> Result<Flow, AppError> {
        match Command::parse(line) {
            Command::Empty => {}
            Command::Instruction(text) => self.run_instruction(text)?,
            Command::Unknown(word) => {
                writeln!(
                    self.out,
                    "Unknown command '{}'. Type 'help' for commands.",
                    word
                )?;
            }
            Command::Verb { verb, args } => {
                if let Some(reason) = verb.unavailable_reason(self.protocol, self.profile) {
                    writeln!(self.out, "{}: {}", verb, reason)?;
                    return Ok(Flow::Continue);
                }
                match verb {
                    Verb::Exit => return Ok(Flow::Exit),
                    Verb::Help => super::help::print(&mut self.out, self.protocol, self.profile)?,
                    Verb::Mode => self.switch_mode(args)?,
                    Verb::Config => self.reconfigure()?,
                    Verb::Sniff => self.sniff()?,
                    Verb::Slave => self.slave()?,
                    Verb::SdCard => self.sdcard()?,
                    Verb::Flash => self.flash()?,
                    Verb::Eeprom => self.eeprom()?,
                    Verb::Bridge => self.bridge()?,
                }
            }
        }
        Ok(Flow::Continue)
    }

    pub(super) fn report(&mut self, error: &AppError) -> Result<(), AppError> {
        log::debug!("reported: {:?}", error);
        writeln!(self.out, "Error: {}", error)?;
        Ok(())
    }

    fn run_instruction(&mut self, text: &str) -> Result<(), AppError> {
        // Syntax errors never reach the bus
        let codes = Parser::new()
            .with_word_bits(self.protocol.word_bits())
            .parse(text)?;
        let index = self.controller()?;
        let bytes = self.buses[index].executor()?.execute(&codes)?;
        if !bytes.is_empty() {
            writeln!(self.out, "{}", format::hex_bytes(&bytes))?;
        }
        Ok(())
    }

    /// Index of the arbiter for the active protocol, opening it on first use
    pub(super) fn bus_index(&mut self) -> Result<usize, AppError> {
        if let Some(index) = self
            .buses
            .iter()
            .position(|b| b.protocol() == self.protocol)
        {
            return Ok(index);
        }
        let peripheral = self.factory.open(self.protocol)?;
        self.buses.push(Arbiter::new(
            self.protocol,
            self.profile.pin_policy(),
            peripheral,
        ));
        Ok(self.buses.len() - 1)
    }

    /// Index of the arbiter for the active protocol, bound as controller
    ///
    /// A bus that was never configured is configured from the prompts or
    /// the defaults first.
    pub(super) fn controller(&mut self) -> Result<usize, AppError> {
        let index = self.bus_index()?;
        let Self {
            buses,
            input,
            out,
            defaults,
            prompts,
            ..
        } = self;
        let bus = &mut buses[index];
        if *prompts {
            bus.ensure_configured(&mut Prompter::new(input, out, defaults))?;
        } else {
            bus.ensure_configured(defaults)?;
        }
        Ok(index)
    }

    fn reconfigure(&mut self) -> Result<(), AppError> {
        let index = self.bus_index()?;
        let Self {
            buses,
            input,
            out,
            defaults,
            prompts,
            ..
        } = self;
        let bus = &mut buses[index];
        if *prompts {
            bus.reconfigure(&mut Prompter::new(input, out, defaults))?;
        } else {
            bus.reconfigure(defaults)?;
        }
        if let Some(active) = bus.active() {
            writeln!(out, "Configured {}", active)?;
        }
        Ok(())
    }

    fn switch_mode(&mut self, args: &str) -> Result<(), AppError> {
        let Some(protocol) = Protocol::from_name(args) else {
            let names: Vec<&str> = Protocol::ALL.iter().map(|p| p.name()).collect();
            writeln!(self.out, "Usage: mode {}", names.join("|"))?;
            return Ok(());
        };
        if !self.profile.supports(protocol) {
            writeln!(
                self.out,
                "{} is not supported on {}",
                protocol, self.profile.description
            )?;
            return Ok(());
        }
        if protocol == self.protocol {
            return Ok(());
        }

        // Free the pins for the new bus
        if let Some(bus) = self.buses.iter_mut().find(|b| b.protocol() == self.protocol) {
            bus.end();
        }
        log::info!("Switching {} -> {}", self.protocol, protocol);
        self.protocol = protocol;
        self.input.set_protocol(protocol);
        writeln!(self.out, "Switched to {}", protocol)?;
        Ok(())
    }

    #[cfg(test)]
    pub(super) fn bus(&self, protocol: Protocol) -> Option<&Bus> {
        self.buses.iter().find(|b| b.protocol() == protocol)
    }
}
