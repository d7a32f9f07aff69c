//! CLI command implementations
//!
//! The interactive [`Shell`] is the main entry point: it routes each line
//! to the instruction parser or to a verb handler. Verb handlers live in
//! their own modules as extra `impl` blocks on the shell:
//!
//! - `modes`: sniff, slave, SD card and UART bridge
//! - `shells`: the nested flash / EEPROM / SD shells
//! - `prompts`: interactive pin and parameter entry
//!
//! `list` and `parse` are one-shot subcommands that never touch a bus.

mod help;
mod list;
mod modes;
mod parse;
mod prompts;
mod shell;
mod shells;

pub use list::{list_backends, list_devices};
pub use parse::cmd_parse;
pub use shell::Shell;
