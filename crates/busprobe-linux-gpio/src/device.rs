//! Linux GPIO SPI bitbanging
//!
//! Bus pin numbers are used directly as line offsets on the configured
//! GPIO chip. Lines are requested when the controller binds and released
//! when the arbiter ends the role, so a reconfiguration with different
//! pins takes effect on the next bind.

use std::cell::Cell;

use crate::error::{LinuxGpioError, Result};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use busprobe_core::arbiter::{Peripheral, Role};
use busprobe_core::bridge::Relay;
use busprobe_core::bus::bitbang::{self, BitbangSpi};
use busprobe_core::bus::spi::{self, SpiBus};
use busprobe_core::bus::Executor;
use busprobe_core::bytecode::ByteCode;
use busprobe_core::capture::Follower;
use busprobe_core::config::{BusConfiguration, BusParams};
use busprobe_core::error::{BusFailure, Error, RangeKind, Result as CoreResult};
use busprobe_core::pins::PinRole;

/// GPIO line indices
#[derive(Debug, Clone, Copy)]
enum Line {
    Cs = 0,
    Sck = 1,
    Mosi = 2,
    Miso = 3,
}

const LINES: usize = 4;

/// Configuration for a Linux GPIO chip
#[derive(Debug, Clone, Default)]
pub struct LinuxGpioConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
}

impl LinuxGpioConfig {
    /// Configuration for the given chip path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

/// Bitbanged SPI controller on Linux GPIO lines
pub struct LinuxGpioSpi {
    device: String,
    request: Option<Request>,
    offsets: [Offset; LINES],
    half_period_ns: u64,
    /// Set by the first failed line access, cleared when reported
    fault: Cell<bool>,
}

impl LinuxGpioSpi {
    /// Prepare a controller on the configured chip; no lines are taken yet
    pub fn open(config: &LinuxGpioConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }
        log::debug!("linux_gpio: using {}", config.device);
        Ok(Self {
            device: config.device.clone(),
            request: None,
            offsets: [0; LINES],
            half_period_ns: 0,
            fault: Cell::new(false),
        })
    }

    /// Chip path
    pub fn device(&self) -> &str {
        &self.device
    }

    fn request_lines(&mut self, config: &BusConfiguration, frequency: u32) -> CoreResult<()> {
        let pin = |role| {
            config
                .pin(role)
                .map(Offset::from)
                .ok_or(Error::Range(RangeKind::Parameter))
        };
        let mut offsets = [0; LINES];
        offsets[Line::Cs as usize] = pin(PinRole::Cs)?;
        offsets[Line::Sck as usize] = pin(PinRole::Sclk)?;
        offsets[Line::Mosi as usize] = pin(PinRole::Mosi)?;
        offsets[Line::Miso as usize] = pin(PinRole::Miso)?;

        // CS high (inactive), SCK and MOSI low
        let mut req_config = Config::default();
        req_config
            .with_line(offsets[Line::Cs as usize])
            .as_output(Value::Active);
        req_config
            .with_line(offsets[Line::Sck as usize])
            .as_output(Value::Inactive);
        req_config
            .with_line(offsets[Line::Mosi as usize])
            .as_output(Value::Inactive);
        req_config.with_line(offsets[Line::Miso as usize]).as_input();

        let request = Request::from_config(req_config)
            .on_chip(&self.device)
            .with_consumer("busprobe")
            .request()
            .map_err(LinuxGpioError::LineRequestFailed)?;

        log::info!(
            "linux_gpio: {} cs={} sck={} mosi={} miso={} at {} Hz",
            self.device,
            offsets[Line::Cs as usize],
            offsets[Line::Sck as usize],
            offsets[Line::Mosi as usize],
            offsets[Line::Miso as usize],
            frequency
        );
        self.offsets = offsets;
        self.request = Some(request);
        self.set_frequency(frequency)
    }

    fn set_line(&self, line: Line, high: bool) {
        let Some(request) = &self.request else {
            return;
        };
        let value = if high { Value::Active } else { Value::Inactive };
        if let Err(e) = request.set_value(self.offsets[line as usize], value) {
            log::error!("Failed to set {:?}: {}", line, e);
            self.fault.set(true);
        }
    }

    /// Report and clear a line failure since the last check
    fn check_fault(&self) -> CoreResult<()> {
        if self.fault.replace(false) {
            Err(Error::Bus(BusFailure::Hardware))
        } else {
            Ok(())
        }
    }
}

impl BitbangSpi for LinuxGpioSpi {
    fn set_cs(&mut self, active: bool) {
        // CS is active low
        self.set_line(Line::Cs, !active);
    }

    fn set_sck(&mut self, high: bool) {
        self.set_line(Line::Sck, high);
    }

    fn set_mosi(&mut self, high: bool) {
        self.set_line(Line::Mosi, high);
    }

    fn get_miso(&self) -> bool {
        let Some(request) = &self.request else {
            return true;
        };
        match request.value(self.offsets[Line::Miso as usize]) {
            Ok(Value::Active) => true,
            Ok(Value::Inactive) => false,
            Err(e) => {
                log::error!("Failed to get MISO: {}", e);
                self.fault.set(true);
                false
            }
        }
    }

    fn half_period_delay(&self) {
        if self.half_period_ns > 0 {
            std::thread::sleep(std::time::Duration::from_nanos(self.half_period_ns));
        }
    }
}

impl SpiBus for LinuxGpioSpi {
    fn set_cs(&mut self, active: bool) -> CoreResult<()> {
        if !active {
            BitbangSpi::set_sck(self, false);
            self.half_period_delay();
        }
        BitbangSpi::set_cs(self, active);
        self.half_period_delay();
        self.check_fault()
    }

    fn transfer(&mut self, byte: u8) -> CoreResult<u8> {
        let received = bitbang::transfer_byte(self, byte);
        self.check_fault()?;
        Ok(received)
    }

    fn set_frequency(&mut self, hz: u32) -> CoreResult<()> {
        self.half_period_ns = bitbang::half_period_ns(hz).ok_or(Error::Range(RangeKind::Parameter))?;
        Ok(())
    }
}

impl Peripheral for LinuxGpioSpi {
    fn bind(&mut self, role: Role, config: &BusConfiguration) -> CoreResult<()> {
        let BusParams::Spi { frequency } = config.params else {
            return Err(Error::Unsupported);
        };
        if role != Role::Controller {
            // No follower engine or SD card on a bare GPIO chip
            return Err(Error::Unsupported);
        }
        self.request_lines(config, frequency)
    }

    fn release(&mut self) {
        self.fault.set(false);
        if self.request.take().is_some() {
            log::debug!("linux_gpio: released lines on {}", self.device);
        }
    }
}

impl Executor for LinuxGpioSpi {
    fn execute(&mut self, codes: &[ByteCode]) -> CoreResult<Vec<u8>> {
        if self.request.is_none() {
            return Err(Error::Bus(BusFailure::NotConfigured));
        }
        spi::execute(self, codes)
    }
}

impl Follower for LinuxGpioSpi {}

impl Relay for LinuxGpioSpi {}

/// Parse backend options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` - GPIO chip device path
/// - `gpiochip=N` - GPIO chip number (alternative to dev)
pub fn parse_options(options: &[(&str, &str)]) -> Result<LinuxGpioConfig> {
    let mut config = LinuxGpioConfig::default();
    let mut gpiochip: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => config.device = value.to_string(),
            "gpiochip" => {
                gpiochip = Some(value.parse().map_err(|_| {
                    LinuxGpioError::InvalidParameter(format!("gpiochip={}", value))
                })?);
            }
            _ => log::warn!("linux_gpio: Unknown option: {}={}", key, value),
        }
    }

    match (config.device.is_empty(), gpiochip) {
        (true, Some(n)) => config.device = format!("/dev/gpiochip{}", n),
        (true, None) => return Err(LinuxGpioError::NoDevice),
        (false, Some(_)) => return Err(LinuxGpioError::ConflictingDevice),
        (false, None) => {}
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        assert_eq!(
            parse_options(&[("gpiochip", "2")]).unwrap().device,
            "/dev/gpiochip2"
        );
        assert_eq!(
            parse_options(&[("dev", "/dev/gpiochip1")]).unwrap().device,
            "/dev/gpiochip1"
        );
        assert!(matches!(parse_options(&[]), Err(LinuxGpioError::NoDevice)));
        assert!(matches!(
            parse_options(&[("dev", "/dev/gpiochip0"), ("gpiochip", "0")]),
            Err(LinuxGpioError::ConflictingDevice)
        ));
        assert!(matches!(
            parse_options(&[("gpiochip", "x")]),
            Err(LinuxGpioError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_unbound_rejects_execute() {
        let mut spi = LinuxGpioSpi::open(&LinuxGpioConfig::new("/dev/gpiochip0")).unwrap();
        assert_eq!(
            spi.execute(&[ByteCode::start()]),
            Err(Error::Bus(BusFailure::NotConfigured))
        );
    }

    #[test]
    fn test_line_failure_fails_the_transfer() {
        let mut spi = LinuxGpioSpi::open(&LinuxGpioConfig::new("/dev/gpiochip0")).unwrap();
        spi.fault.set(true);
        assert_eq!(
            SpiBus::transfer(&mut spi, 0x9F),
            Err(Error::Bus(BusFailure::Hardware))
        );
        // Reported once
        assert_eq!(SpiBus::transfer(&mut spi, 0x9F), Ok(0xFF));

        spi.fault.set(true);
        assert_eq!(
            SpiBus::set_cs(&mut spi, true),
            Err(Error::Bus(BusFailure::Hardware))
        );
    }

    #[test]
    fn test_open_requires_device() {
        assert!(matches!(
            LinuxGpioSpi::open(&LinuxGpioConfig::default()),
            Err(LinuxGpioError::NoDevice)
        ));
    }
}
