//! busprobe-linux-gpio - Linux GPIO bitbang SPI backend
//!
//! Drives an SPI controller through the Linux GPIO character device
//! interface (gpiocdev), so a Raspberry Pi or similar board can stand in
//! for the probe hardware. Bus pin numbers are GPIO line offsets on the
//! selected chip.
//!
//! # Usage
//!
//! ```bash
//! busprobe --backend linux-gpio:gpiochip=0 shell
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)
//!
//! Only the SPI controller role is available. Follower capture and the SD
//! card need the probe's own hardware.

pub mod device;
pub mod error;

pub use device::{parse_options, LinuxGpioConfig, LinuxGpioSpi};
pub use error::{LinuxGpioError, Result};

