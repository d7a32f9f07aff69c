//! busprobe-core - Core library for multi-protocol bus probing
//!
//! This crate turns the bracket-delimited instruction language into
//! protocol-agnostic [`ByteCode`](bytecode::ByteCode) sequences, runs them
//! against whichever bus is active, and arbitrates ownership of shared
//! physical peripherals when the user switches between modes. It is
//! `no_std` compatible (it needs a global allocator).
//!
//! # Features
//!
//! - `std` - Enable standard library support and the TOML settings loader
//!
//! # Example
//!
//! ```ignore
//! use busprobe_core::{arbiter::Arbiter, bus::Executor, format, instruction};
//!
//! fn run<P: Peripheral + Executor>(arbiter: &mut Arbiter<P>, line: &str) -> Result<()> {
//!     let codes = instruction::parse(line)?;
//!     let bytes = arbiter.executor()?.execute(&codes)?;
//!     println!("{}", format::hex_bytes(&bytes));
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

pub mod arbiter;
pub mod bridge;
pub mod bus;
pub mod bytecode;
pub mod capture;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod instruction;
pub mod pins;
#[cfg(feature = "std")]
pub mod settings;

pub use error::{Error, Result};
