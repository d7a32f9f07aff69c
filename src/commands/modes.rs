//! Capture, SD card and bridge modes
//!
//! Each mode borrows the active bus from its arbiter and always hands the
//! controller configuration back before returning, whether it ended
//! normally or not.

use std::io::Write;

use busprobe_core::arbiter::Role;
use busprobe_core::bridge::{Bridge, BridgeState};
use busprobe_core::capture::{CaptureLine, CaptureMode, CaptureSession, CapturedPacket};
use busprobe_core::config::BusConfiguration;
use busprobe_core::device::StopSource;
use busprobe_core::error::{BusFailure, Error};
use busprobe_core::format;
use busprobe_repl::{Input, LineSource};

use super::shell::Shell;
use super::shells::SdShell;
use crate::console::Console;
use crate::error::AppError;

impl<L: LineSource, W: Write, C: Console> Shell<L, W, C> {
    pub(super) fn sniff(&mut self) -> Result<(), AppError> {
        let line = match self.input.read_line("Sniff which line? (MOSI/MISO) [MOSI]: ")? {
            Input::Line(answer) => match answer.trim().to_ascii_lowercase().as_str() {
                "" | "mosi" => CaptureLine::Mosi,
                "miso" => CaptureLine::Miso,
                other => {
                    writeln!(self.out, "Unknown line '{}', expected MOSI or MISO", other)?;
                    return Ok(());
                }
            },
            Input::Interrupted | Input::Eof => return Ok(()),
        };
        self.capture(CaptureMode::Sniff(line))
    }

    pub(super) fn slave(&mut self) -> Result<(), AppError> {
        self.capture(CaptureMode::Slave)
    }

    fn capture(&mut self, mode: CaptureMode) -> Result<(), AppError> {
        let index = self.controller()?;
        let stop_source = self.profile.stop_source;
        let Self {
            buses, out, console, ..
        } = self;
        let bus = &mut buses[index];

        let session = CaptureSession::begin(bus, mode)?;
        let what = match mode {
            CaptureMode::Sniff(line) => format!("Sniffing {}", line),
            CaptureMode::Slave => "Listening as SPI slave".to_owned(),
        };
        writeln!(out, "{}. {} to stop.", what, stop_hint(stop_source))?;

        let mut stop = console.stop_signal(stop_source);
        let mut write_error = None;
        let result = session.run(
            bus,
            &mut *stop,
            |line: CaptureLine, packet: &CapturedPacket| {
                if let Err(e) = writeln!(out, "{}", format::tagged(line, packet.bytes())) {
                    write_error.get_or_insert(e);
                }
            },
            || console.idle(),
        );
        console.release();
        result?;
        if let Some(e) = write_error {
            return Err(e.into());
        }
        writeln!(out, "Capture stopped.")?;
        Ok(())
    }

    pub(super) fn sdcard(&mut self) -> Result<(), AppError> {
        let index = self.controller()?;
        let use_slot = match self.profile.sd_slot {
            Some(_) if self.prompts => match self.confirm("Use internal SD card slot?", true)? {
                Some(answer) => answer,
                None => return Ok(()),
            },
            Some(_) => true,
            None => false,
        };
        let slot = self.profile.sd_slot.filter(|_| use_slot);
        let Self {
            buses, input, out, ..
        } = self;
        let bus = &mut buses[index];

        let controller = bus
            .controller()
            .cloned()
            .ok_or(Error::Bus(BusFailure::NotConfigured))?;
        // Without the slot the card sits on the controller pins
        let pins = slot.map_or_else(|| controller.pins.clone(), |s| s.pin_map());
        writeln!(out, "Mounting SD card on {}", pins)?;
        let card = BusConfiguration::new(pins, controller.params);

        if let Err(e) = bus.configure(Role::SdCard, card) {
            writeln!(out, "SD card mount failed: {}", e)?;
            bus.restore_controller()?;
            return Ok(());
        }
        log::info!("SD card mounted");

        let mut shell = SdShell::new(bus.peripheral().card());
        let result = super::shells::run(&mut shell, bus, Role::SdCard, input, out);
        let restored = bus.restore_controller();
        result?;
        restored?;
        Ok(())
    }

    /// Yes/no question; `None` when input ends
    fn confirm(&mut self, question: &str, default: bool) -> Result<Option<bool>, AppError> {
        let prompt = format!("{} [{}]: ", question, if default { "Y/n" } else { "y/N" });
        loop {
            match self.input.read_line(&prompt)? {
                Input::Line(answer) => match answer.trim().to_ascii_lowercase().as_str() {
                    "" => return Ok(Some(default)),
                    "y" | "yes" => return Ok(Some(true)),
                    "n" | "no" => return Ok(Some(false)),
                    _ => writeln!(self.out, "Please answer y or n")?,
                },
                Input::Interrupted | Input::Eof => return Ok(None),
            }
        }
    }

    pub(super) fn bridge(&mut self) -> Result<(), AppError> {
        let index = self.controller()?;
        let Self {
            buses, out, console, ..
        } = self;
        let relay = buses[index].executor()?;

        writeln!(out, "UART bridge active. {} to stop.", stop_hint(StopSource::Button))?;
        out.flush()?;

        let mut keys = console.keystrokes();
        let mut stop = console.stop_signal(StopSource::Button);
        let mut bridge = Bridge::new();
        let mut received = Vec::new();
        let result = loop {
            match bridge.poll(relay, &mut *keys, &mut *stop, |byte| received.push(byte)) {
                Ok(state) => {
                    if !received.is_empty() {
                        if let Err(e) = out.write_all(&received).and_then(|()| out.flush()) {
                            break Err(AppError::from(e));
                        }
                        received.clear();
                    }
                    if state == BridgeState::Stopped {
                        break Ok(());
                    }
                    console.idle();
                }
                Err(e) => break Err(e.into()),
            }
        };
        drop(keys);
        console.release();
        writeln!(out, "\nBridge stopped.")?;
        result
    }
}

fn stop_hint(source: StopSource) -> &'static str {
    match source {
        StopSource::Enter => "Press Enter",
        // The device button is Ctrl-C on the host
        StopSource::Button => "Press Ctrl-C",
    }
}
