//! busprobe - A multi-protocol bus probe
//!
//! Drives SPI, I2C, UART, half-duplex UART and 1-Wire buses from a small
//! bracketed instruction language, and switches the SPI peripheral between
//! controller, passive capture and SD card duty.
//!
//! # Architecture
//!
//! Each bus is owned by a `busprobe_core::arbiter::Arbiter`, the only code
//! that binds or releases pins. The shell routes every input line either
//! to the instruction parser (`[0x9F r:3]`) or to a verb handler (`sniff`,
//! `sdcard`, `flash`, ...). Peripherals come from a backend:
//! - **sim** - in-memory flash, EEPROM, modem and 1-Wire sensor
//! - **linux-gpio** - bit-banged SPI on a GPIO character device

mod backends;
mod cli;
mod commands;
mod console;
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use error::AppError;

use busprobe_core::bus::Protocol;
use busprobe_core::device::{self, DeviceProfile};
use busprobe_core::settings::Settings;
use busprobe_repl::{LineEditor, ScriptedInput};
use commands::Shell;
use console::{ScriptedConsole, StdConsole};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    let device_name = cli.device.as_deref().or(settings.device.as_deref());
    let profile = select_profile(device_name)?;
    log::info!("Device profile: {} ({})", profile.name, profile.description);

    let command = cli.command.unwrap_or(Commands::Shell {
        protocol: Protocol::Spi,
        non_interactive: false,
        script: None,
        ticks: 100,
    });

    match command {
        Commands::ListDevices => commands::list_devices(),
        Commands::ListBackends => commands::list_backends(),
        Commands::Parse { instruction } => commands::cmd_parse(&instruction)?,
        Commands::Shell {
            protocol,
            non_interactive,
            script,
            ticks,
        } => {
            if !profile.supports(protocol) {
                return Err(Box::new(AppError::Core(busprobe_core::Error::Unsupported)));
            }
            let factory = backends::open_backend(&cli.backend)?;
            let defaults = settings.defaults(profile);

            if let Some(path) = script {
                let text = std::fs::read_to_string(&path)?;
                let input = ScriptedInput::new(text.lines()).with_echo(true);
                Shell::new(
                    profile,
                    defaults,
                    factory,
                    protocol,
                    input,
                    std::io::stdout(),
                    ScriptedConsole::new(ticks),
                )
                .with_prompts(false)
                .run()?;
            } else {
                println!("{}", busprobe_repl::banner());
                Shell::new(
                    profile,
                    defaults,
                    factory,
                    protocol,
                    LineEditor::new(protocol)?,
                    std::io::stdout(),
                    StdConsole::new()?,
                )
                .with_prompts(!non_interactive)
                .run()?;
            }
        }
    }

    Ok(())
}

/// Profile named on the command line or in the settings, else the default
fn select_profile(name: Option<&str>) -> Result<&'static DeviceProfile, AppError> {
    match name {
        Some(name) => device::find(name).ok_or_else(|| AppError::UnknownDevice(name.to_owned())),
        None => Ok(&device::PROFILES[0]),
    }
}
