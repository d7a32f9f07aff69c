//! TOML settings file
//!
//! Optional file selecting the device profile and overriding the default
//! pins and parameters per protocol:
//!
//! ```toml
//! device = "cardputer"
//!
//! [spi]
//! mosi = 2
//! miso = 1
//! sclk = 41
//! cs = 42
//! frequency = "4 MHz"
//!
//! [i2c]
//! sda = 2
//! scl = 1
//!
//! [uart]
//! baud = 9600
//! parity = "E"
//!
//! [onewire]
//! data = 1
//! ```
//!
//! Missing fields keep the profile default. Pins are not validated here;
//! the arbiter rejects a protected or out-of-range pin when it is used.

use std::fs;
use std::path::{Path, PathBuf};
use std::string::String;

use serde::Deserialize;

use crate::bus::Protocol;
use crate::config::{BusConfiguration, BusParams, Defaults, Parity, UartParams};
use crate::device::DeviceProfile;
use crate::pins::{Pin, PinMap, PinRole};

/// Errors loading a settings file
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// The file is not valid TOML or has wrongly typed fields
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Parsed settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Device profile name
    pub device: Option<String>,
    /// SPI overrides
    pub spi: SpiSection,
    /// I2C overrides
    pub i2c: I2cSection,
    /// UART overrides
    pub uart: UartSection,
    /// Half-duplex UART overrides
    pub hduart: UartSection,
    /// 1-Wire overrides
    pub onewire: OneWireSection,
}

/// `[spi]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpiSection {
    /// MOSI pin
    pub mosi: Option<Pin>,
    /// MISO pin
    pub miso: Option<Pin>,
    /// Clock pin
    pub sclk: Option<Pin>,
    /// Chip select pin
    pub cs: Option<Pin>,
    /// Clock in Hz, or a string like `"4 MHz"`
    #[serde(deserialize_with = "deserialize_frequency")]
    pub frequency: Option<u32>,
}

/// `[i2c]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct I2cSection {
    /// Data pin
    pub sda: Option<Pin>,
    /// Clock pin
    pub scl: Option<Pin>,
    /// Clock in Hz, or a string like `"400 kHz"`
    #[serde(deserialize_with = "deserialize_frequency")]
    pub frequency: Option<u32>,
}

/// `[uart]` and `[hduart]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UartSection {
    /// Transmit pin (UART)
    pub tx: Option<Pin>,
    /// Receive pin (UART)
    pub rx: Option<Pin>,
    /// Shared pin (HDUART)
    pub data: Option<Pin>,
    /// Baud rate
    pub baud: Option<u32>,
    /// Data bits
    pub data_bits: Option<u8>,
    /// `"N"`, `"E"` or `"O"`
    pub parity: Option<String>,
    /// Stop bits
    pub stop_bits: Option<u8>,
    /// Inverted levels
    pub inverted: Option<bool>,
    /// Per-byte read timeout
    pub timeout_ms: Option<u32>,
}

/// `[onewire]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OneWireSection {
    /// Data pin
    pub data: Option<Pin>,
}

/// Accept a plain number or a string with an Hz/kHz/MHz suffix
fn deserialize_frequency<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Int(u32),
        Str(String),
    }

    match Option::<NumOrStr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrStr::Int(n)) => Ok(Some(n)),
        Some(NumOrStr::Str(s)) => parse_frequency(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid frequency: {}", s))),
    }
}

/// Parse `"400000"`, `"400 kHz"`, `"8MHz"`
pub fn parse_frequency(s: &str) -> Option<u32> {
    let lower = s.trim().to_ascii_lowercase();
    let (num, multiplier) = if let Some(n) = lower.strip_suffix("mhz") {
        (n, 1_000_000)
    } else if let Some(n) = lower.strip_suffix("khz") {
        (n, 1_000)
    } else if let Some(n) = lower.strip_suffix("hz") {
        (n, 1)
    } else {
        (lower.as_str(), 1)
    };
    num.trim().parse::<u32>().ok()?.checked_mul(multiplier)
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a settings file
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Profile defaults with this file's overrides applied
    pub fn defaults(&self, profile: &DeviceProfile) -> Defaults {
        let mut defaults = profile.defaults();
        for &protocol in Protocol::ALL {
            if let Some(base) = defaults.get(protocol) {
                let config = self.overlay(base.clone());
                defaults.set(config);
            }
        }
        defaults
    }

    fn overlay(&self, mut config: BusConfiguration) -> BusConfiguration {
        let set = |pins: &mut PinMap, role: PinRole, pin: Option<Pin>| {
            if let Some(pin) = pin {
                pins.set(role, pin);
            }
        };
        match &mut config.params {
            BusParams::Spi { frequency } => {
                let s = &self.spi;
                *frequency = s.frequency.unwrap_or(*frequency);
                set(&mut config.pins, PinRole::Mosi, s.mosi);
                set(&mut config.pins, PinRole::Miso, s.miso);
                set(&mut config.pins, PinRole::Sclk, s.sclk);
                set(&mut config.pins, PinRole::Cs, s.cs);
            }
            BusParams::I2c { frequency } => {
                let s = &self.i2c;
                *frequency = s.frequency.unwrap_or(*frequency);
                set(&mut config.pins, PinRole::Sda, s.sda);
                set(&mut config.pins, PinRole::Scl, s.scl);
            }
            BusParams::Uart(params) => {
                self.uart.apply(params);
                set(&mut config.pins, PinRole::Tx, self.uart.tx);
                set(&mut config.pins, PinRole::Rx, self.uart.rx);
            }
            BusParams::HdUart(params) => {
                self.hduart.apply(params);
                set(&mut config.pins, PinRole::Data, self.hduart.data);
            }
            BusParams::OneWire => set(&mut config.pins, PinRole::Data, self.onewire.data),
        }
        config
    }
}

impl UartSection {
    fn apply(&self, params: &mut UartParams) {
        params.baud = self.baud.unwrap_or(params.baud);
        params.data_bits = self.data_bits.unwrap_or(params.data_bits);
        params.stop_bits = self.stop_bits.unwrap_or(params.stop_bits);
        params.inverted = self.inverted.unwrap_or(params.inverted);
        params.timeout_ms = self.timeout_ms.unwrap_or(params.timeout_ms);
        if let Some(letter) = &self.parity {
            match letter.chars().next().and_then(Parity::from_letter) {
                Some(parity) => params.parity = parity,
                None => log::warn!("Ignoring unknown parity {:?}", letter),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CARDPUTER, S3_DEVKIT};

    #[test]
    fn test_parse_and_overlay() {
        let settings = Settings::from_toml_str(
            r#"
device = "cardputer"

[spi]
cs = 5
frequency = "4 MHz"

[uart]
baud = 9600
parity = "e"
"#,
        )
        .unwrap();
        assert_eq!(settings.device.as_deref(), Some("cardputer"));

        let defaults = settings.defaults(&CARDPUTER);
        let spi = defaults.get(Protocol::Spi).unwrap();
        assert_eq!(spi.pin(PinRole::Cs), Some(5));
        assert_eq!(spi.pin(PinRole::Mosi), Some(2));
        assert_eq!(spi.params, BusParams::Spi { frequency: 4_000_000 });

        let uart = defaults.get(Protocol::Uart).unwrap();
        let params = uart.params.uart().unwrap();
        assert_eq!(params.baud, 9600);
        assert_eq!(params.parity, Parity::Even);
    }

    #[test]
    fn test_empty_file_keeps_profile_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        let defaults = settings.defaults(&S3_DEVKIT);
        assert_eq!(
            defaults.get(Protocol::I2c),
            S3_DEVKIT.defaults().get(Protocol::I2c)
        );
    }

    #[test]
    fn test_rejects_unknown_and_mistyped_fields() {
        assert!(Settings::from_toml_str("[spi]\nclock = 1").is_err());
        assert!(Settings::from_toml_str("[i2c]\nsda = \"eight\"").is_err());
        assert!(Settings::from_toml_str("[spi]\nfrequency = \"fast\"").is_err());
    }

    #[test]
    fn test_parse_frequency() {
        assert_eq!(parse_frequency("400 kHz"), Some(400_000));
        assert_eq!(parse_frequency("8MHz"), Some(8_000_000));
        assert_eq!(parse_frequency("100000"), Some(100_000));
        assert_eq!(parse_frequency("5000 MHz"), None);
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::from_file(Path::new("/nonexistent/busprobe.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }
}
