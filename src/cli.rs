//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a protocol name for `--protocol`
fn parse_protocol(s: &str) -> Result<busprobe_core::bus::Protocol, String> {
    busprobe_core::bus::Protocol::from_name(s).ok_or_else(|| {
        let names: Vec<&str> = busprobe_core::bus::Protocol::ALL
            .iter()
            .map(|p| p.name())
            .collect();
        format!("unknown protocol '{}' [available: {}]", s, names.join(", "))
    })
}

#[derive(Parser)]
#[command(name = "busprobe")]
#[command(author, version, about = "Multi-protocol bus probe", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Device profile (see `busprobe list-devices`)
    #[arg(short, long, global = true)]
    pub device: Option<String>,

    /// Settings file (TOML) with default pins and bus parameters
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend and options, e.g. `sim` or `linux-gpio:gpiochip=0`
    #[arg(short, long, default_value = "sim", global = true)]
    pub backend: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive shell (the default)
    Shell {
        /// Protocol to start in
        #[arg(short, long, default_value = "spi", value_parser = parse_protocol)]
        protocol: busprobe_core::bus::Protocol,

        /// Take pins and parameters from the settings instead of prompting
        #[arg(long)]
        non_interactive: bool,

        /// Read commands from a file instead of the terminal
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Poll ticks a sniff, slave or bridge session runs for in a script
        #[arg(long, default_value = "100")]
        ticks: usize,
    },

    /// Parse an instruction and print its canonical form
    Parse {
        /// Instruction text, e.g. "[0x9F r:3]"
        instruction: String,
    },

    /// List device profiles
    ListDevices,

    /// List compiled-in backends
    ListBackends,
}
