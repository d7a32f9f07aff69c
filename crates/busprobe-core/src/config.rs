//! Bus configuration values
//!
//! A [`BusConfiguration`] is the logical configuration of one bus: the pins
//! it binds and its clock or line parameters. Only the
//! [`Arbiter`](crate::arbiter::Arbiter) applies it to hardware; everything
//! else reads it.

use alloc::vec::Vec;
use core::fmt;

use crate::bus::Protocol;
use crate::error::{Error, RangeKind, Result};
use crate::pins::{PinMap, PinPolicy, PinRole};

/// Default SPI clock
pub const DEFAULT_SPI_FREQUENCY: u32 = 8_000_000;
/// Highest SPI clock the probe can generate
pub const MAX_SPI_FREQUENCY: u32 = 80_000_000;
/// Default I2C clock
pub const DEFAULT_I2C_FREQUENCY: u32 = 100_000;
/// Highest I2C clock (Fast-mode Plus)
pub const MAX_I2C_FREQUENCY: u32 = 1_000_000;
/// Default UART baud rate
pub const DEFAULT_BAUD: u32 = 115_200;
/// Default per-byte UART read timeout
pub const DEFAULT_UART_TIMEOUT_MS: u32 = 100;

/// UART parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

impl Parity {
    /// Parse the single-letter form (`N`, `E`, `O`, case-insensitive)
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Self::None),
            'E' => Some(Self::Even),
            'O' => Some(Self::Odd),
            _ => None,
        }
    }

    /// Single-letter form
    pub const fn letter(&self) -> char {
        match self {
            Self::None => 'N',
            Self::Even => 'E',
            Self::Odd => 'O',
        }
    }
}

/// Line parameters shared by UART and half-duplex UART
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartParams {
    /// Baud rate
    pub baud: u32,
    /// Data bits per frame (5-8)
    pub data_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Inverted line levels
    pub inverted: bool,
    /// Per-byte read timeout in milliseconds
    pub timeout_ms: u32,
}

impl Default for UartParams {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            inverted: false,
            timeout_ms: DEFAULT_UART_TIMEOUT_MS,
        }
    }
}

impl UartParams {
    /// Check baud rate and frame format against the UART limits
    pub fn validate(&self) -> Result<()> {
        let ok = (300..=5_000_000).contains(&self.baud)
            && (5..=8).contains(&self.data_bits)
            && (1..=2).contains(&self.stop_bits);
        if ok {
            Ok(())
        } else {
            Err(Error::Range(RangeKind::Parameter))
        }
    }
}

impl fmt::Display for UartParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )?;
        if self.inverted {
            f.write_str(" inverted")?;
        }
        Ok(())
    }
}

/// Protocol-specific parameters of a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusParams {
    /// SPI clock in Hz
    Spi {
        /// Clock frequency
        frequency: u32,
    },
    /// I2C clock in Hz
    I2c {
        /// Clock frequency
        frequency: u32,
    },
    /// Full-duplex UART
    Uart(UartParams),
    /// Half-duplex UART
    HdUart(UartParams),
    /// 1-Wire has fixed timing
    OneWire,
}

impl BusParams {
    /// Default parameters for `protocol`
    pub fn default_for(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Spi => Self::Spi {
                frequency: DEFAULT_SPI_FREQUENCY,
            },
            Protocol::I2c => Self::I2c {
                frequency: DEFAULT_I2C_FREQUENCY,
            },
            Protocol::Uart => Self::Uart(UartParams::default()),
            Protocol::HdUart => Self::HdUart(UartParams::default()),
            Protocol::OneWire => Self::OneWire,
        }
    }

    /// The protocol these parameters belong to
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::Spi { .. } => Protocol::Spi,
            Self::I2c { .. } => Protocol::I2c,
            Self::Uart(_) => Protocol::Uart,
            Self::HdUart(_) => Protocol::HdUart,
            Self::OneWire => Protocol::OneWire,
        }
    }

    /// Check every parameter against the protocol limits
    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            Self::Spi { frequency } => (1..=MAX_SPI_FREQUENCY).contains(frequency),
            Self::I2c { frequency } => (1_000..=MAX_I2C_FREQUENCY).contains(frequency),
            Self::Uart(p) | Self::HdUart(p) => return p.validate(),
            Self::OneWire => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Range(RangeKind::Parameter))
        }
    }

    /// UART line parameters, if this is a UART
    pub const fn uart(&self) -> Option<&UartParams> {
        match self {
            Self::Uart(p) | Self::HdUart(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for BusParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi { frequency } | Self::I2c { frequency } => write!(f, "{} Hz", frequency),
            Self::Uart(p) | Self::HdUart(p) => write!(f, "{}", p),
            Self::OneWire => f.write_str("standard speed"),
        }
    }
}

/// Logical configuration of one bus: bound pins plus parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfiguration {
    /// Pins bound by this configuration
    pub pins: PinMap,
    /// Clock / line parameters
    pub params: BusParams,
}

impl BusConfiguration {
    /// Create a configuration
    pub fn new(pins: PinMap, params: BusParams) -> Self {
        Self { pins, params }
    }

    /// The protocol this configuration drives
    pub const fn protocol(&self) -> Protocol {
        self.params.protocol()
    }

    /// Validate every pin against `policy` and every parameter against the
    /// protocol limits
    ///
    /// Pins are checked in binding order so the first offending pin is the
    /// one reported. A pin bound to two roles is a parameter error.
    pub fn validate(&self, policy: &PinPolicy) -> Result<()> {
        let mut seen: Vec<u8> = Vec::with_capacity(self.pins.len());
        for (_, pin) in self.pins.iter() {
            policy.validate(pin)?;
            if seen.contains(&pin) {
                return Err(Error::Range(RangeKind::Parameter));
            }
            seen.push(pin);
        }
        self.params.validate()
    }

    /// Returns true if every pin the protocol needs as a controller is bound
    pub fn is_complete(&self) -> bool {
        self.protocol()
            .pin_roles()
            .iter()
            .all(|&role| self.pins.get(role).is_some())
    }

    /// Pin bound to `role`, if any
    pub fn pin(&self, role: PinRole) -> Option<u8> {
        self.pins.get(role)
    }
}

impl fmt::Display for BusConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.protocol(), self.pins, self.params)
    }
}

/// Where [`Arbiter::ensure_configured`](crate::arbiter::Arbiter::ensure_configured)
/// gets pins and parameters for a bus that has never been configured
///
/// The CLI prompts the user; tests and non-interactive runs use
/// [`Defaults`].
pub trait ConfigSource {
    /// Produce a configuration for `protocol`
    ///
    /// `current` is the last logical configuration, offered as the default
    /// answer. Returned values are validated again by the arbiter.
    fn configure(
        &mut self,
        protocol: Protocol,
        current: Option<&BusConfiguration>,
        policy: &PinPolicy,
    ) -> Result<BusConfiguration>;
}

impl<T: ConfigSource + ?Sized> ConfigSource for &mut T {
    fn configure(
        &mut self,
        protocol: Protocol,
        current: Option<&BusConfiguration>,
        policy: &PinPolicy,
    ) -> Result<BusConfiguration> {
        (**self).configure(protocol, current, policy)
    }
}

/// Fixed per-protocol configurations, taken from the device profile and
/// optionally overridden by a settings file
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    entries: Vec<BusConfiguration>,
}

impl Defaults {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the configuration for its protocol
    pub fn set(&mut self, config: BusConfiguration) {
        let protocol = config.protocol();
        match self.entries.iter_mut().find(|c| c.protocol() == protocol) {
            Some(slot) => *slot = config,
            None => self.entries.push(config),
        }
    }

    /// Configuration for `protocol`, if any
    pub fn get(&self, protocol: Protocol) -> Option<&BusConfiguration> {
        self.entries.iter().find(|c| c.protocol() == protocol)
    }
}

impl ConfigSource for Defaults {
    fn configure(
        &mut self,
        protocol: Protocol,
        current: Option<&BusConfiguration>,
        policy: &PinPolicy,
    ) -> Result<BusConfiguration> {
        let config = match current {
            Some(c) => c.clone(),
            None => self.get(protocol).cloned().ok_or(Error::Settings)?,
        };
        config.validate(policy)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::ProtectedPins;

    fn spi(mosi: u8) -> BusConfiguration {
        BusConfiguration::new(
            PinMap::from_pairs(&[
                (PinRole::Mosi, mosi),
                (PinRole::Miso, 13),
                (PinRole::Sclk, 12),
                (PinRole::Cs, 10),
            ]),
            BusParams::default_for(Protocol::Spi),
        )
    }

    #[test]
    fn test_validate_reports_first_bad_pin() {
        let policy = PinPolicy::new(48, ProtectedPins::from_slice(&[26]));
        assert_eq!(spi(11).validate(&policy), Ok(()));
        assert_eq!(
            spi(26).validate(&policy),
            Err(Error::PinConflict { pin: 26 })
        );
        assert_eq!(
            spi(13).validate(&policy),
            Err(Error::Range(RangeKind::Parameter))
        );
    }

    #[test]
    fn test_param_limits() {
        assert!(BusParams::Spi { frequency: 0 }.validate().is_err());
        assert!(BusParams::I2c { frequency: 400_000 }.validate().is_ok());
        let mut uart = UartParams::default();
        uart.data_bits = 9;
        assert!(BusParams::Uart(uart).validate().is_err());
    }

    #[test]
    fn test_defaults_source() {
        let policy = PinPolicy::new(48, ProtectedPins::none());
        let mut defaults = Defaults::new();
        assert_eq!(
            defaults.configure(Protocol::Spi, None, &policy),
            Err(Error::Settings)
        );
        defaults.set(spi(11));
        defaults.set(spi(9));
        assert_eq!(defaults.configure(Protocol::Spi, None, &policy), Ok(spi(9)));
        assert_eq!(
            defaults.configure(Protocol::Spi, Some(&spi(14)), &policy),
            Ok(spi(14))
        );
    }

    #[test]
    fn test_completeness() {
        assert!(spi(11).is_complete());
        let partial = BusConfiguration::new(
            PinMap::from_pairs(&[(PinRole::Sda, 8)]),
            BusParams::default_for(Protocol::I2c),
        );
        assert!(!partial.is_complete());
    }
}
