//! Mode router
//!
//! Classifies one input line as raw instruction syntax, a named verb, or an
//! unknown command. Verbs are looked up in a static table and matched
//! exhaustively by the caller.

use core::fmt;

use crate::bus::Protocol;
use crate::device::{DeviceProfile, Peripherals};

/// Named commands understood by the mode loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Passive SPI capture
    Sniff,
    /// Mount an SD card over SPI
    SdCard,
    /// SPI follower capture
    Slave,
    /// SPI NOR flash shell
    Flash,
    /// SPI EEPROM shell
    Eeprom,
    /// Re-enter pins and parameters
    Config,
    /// Usage for the active protocol
    Help,
    /// Transparent UART bridge
    Bridge,
    /// Switch the active protocol
    Mode,
    /// Leave the program
    Exit,
}

/// Verb table: name, verb, one-line summary
pub const VERBS: &[(&str, Verb, &str)] = &[
    ("sniff", Verb::Sniff, "Passively log SPI traffic on MOSI or MISO"),
    ("sdcard", Verb::SdCard, "Mount an SD card and open its shell"),
    ("slave", Verb::Slave, "Act as SPI slave and log what the master sends"),
    ("flash", Verb::Flash, "SPI flash shell (id, read, status)"),
    ("eeprom", Verb::Eeprom, "SPI EEPROM shell (read)"),
    ("config", Verb::Config, "Set pins and bus parameters"),
    ("help", Verb::Help, "Show this help"),
    ("bridge", Verb::Bridge, "Interactive UART bridge"),
    ("mode", Verb::Mode, "Switch protocol: mode spi|i2c|uart|hduart|onewire"),
    ("exit", Verb::Exit, "Quit"),
];

impl Verb {
    /// Look up a verb by name (case-sensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        VERBS
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|&(_, verb, _)| verb)
    }

    /// Name as typed
    pub fn name(&self) -> &'static str {
        self.entry().0
    }

    /// One-line summary for help output
    pub fn summary(&self) -> &'static str {
        self.entry().2
    }

    fn entry(&self) -> (&'static str, Verb, &'static str) {
        VERBS
            .iter()
            .copied()
            .find(|(_, v, _)| v == self)
            .unwrap_or(("?", *self, ""))
    }

    /// Why this verb cannot run with `protocol` on `profile`, if it cannot
    pub fn unavailable_reason(
        &self,
        protocol: Protocol,
        profile: &DeviceProfile,
    ) -> Option<&'static str> {
        match self {
            Self::Sniff | Self::Slave => {
                if protocol != Protocol::Spi {
                    Some("only available in SPI mode")
                } else if !profile.supports_follower() {
                    Some("not supported on this device due to shared SPI bus")
                } else {
                    None
                }
            }
            Self::SdCard => {
                if protocol != Protocol::Spi {
                    Some("only available in SPI mode")
                } else if !profile.peripherals.contains(Peripherals::SD_CARD) {
                    Some("this device has no SD card support")
                } else {
                    None
                }
            }
            Self::Flash | Self::Eeprom if protocol != Protocol::Spi => {
                Some("only available in SPI mode")
            }
            Self::Bridge if !matches!(protocol, Protocol::Uart | Protocol::HdUart) => {
                Some("only available in UART and HDUART modes")
            }
            _ => None,
        }
    }

    /// Verbs usable with `protocol`, in table order
    pub fn for_protocol(protocol: Protocol) -> impl Iterator<Item = Verb> {
        VERBS.iter().map(|&(_, verb, _)| verb).filter(move |verb| match verb {
            Self::Sniff | Self::Slave | Self::SdCard | Self::Flash | Self::Eeprom => {
                protocol == Protocol::Spi
            }
            Self::Bridge => matches!(protocol, Protocol::Uart | Protocol::HdUart),
            _ => true,
        })
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One classified input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Blank line
    Empty,
    /// Raw instruction syntax, passed to the parser as-is
    Instruction(&'a str),
    /// A known verb and the rest of the line
    Verb {
        /// The verb
        verb: Verb,
        /// Remaining arguments, trimmed
        args: &'a str,
    },
    /// First word was not a verb
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Classify `line`
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if line.starts_with('[') {
            return Self::Instruction(line);
        }
        let (word, args) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        match Verb::from_name(word) {
            Some(verb) => Self::Verb { verb, args },
            None => Self::Unknown(word),
        }
    }
}

/// Example instruction shown in help for `protocol`
pub const fn example(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Spi => "[0x9F r:3]",
        Protocol::I2c => "[0xA0 0x00] [0xA1 r:8]",
        Protocol::Uart | Protocol::HdUart => "[0x1 r:255]",
        Protocol::OneWire => "[0x33 r:8]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{M5STICK, S3_DEVKIT, STAMP_S3};
    use alloc::vec::Vec;

    #[test]
    fn test_classification() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(
            Command::parse("  [0x9F r:3]"),
            Command::Instruction("[0x9F r:3]")
        );
        assert_eq!(
            Command::parse("mode  i2c "),
            Command::Verb {
                verb: Verb::Mode,
                args: "i2c"
            }
        );
        assert_eq!(Command::parse("Sniff"), Command::Unknown("Sniff"));
        assert_eq!(Command::parse("scan 1 2"), Command::Unknown("scan"));
    }

    #[test]
    fn test_table_roundtrip() {
        for &(name, verb, _) in VERBS {
            assert_eq!(Verb::from_name(name), Some(verb));
            assert_eq!(verb.name(), name);
        }
    }

    #[test]
    fn test_availability() {
        assert!(Verb::Sniff
            .unavailable_reason(Protocol::Spi, &S3_DEVKIT)
            .is_none());
        assert!(Verb::Sniff
            .unavailable_reason(Protocol::Spi, &M5STICK)
            .is_some());
        assert!(Verb::SdCard
            .unavailable_reason(Protocol::Spi, &STAMP_S3)
            .is_some());
        assert!(Verb::Bridge
            .unavailable_reason(Protocol::I2c, &S3_DEVKIT)
            .is_some());
        assert!(Verb::Config
            .unavailable_reason(Protocol::OneWire, &M5STICK)
            .is_none());
    }

    #[test]
    fn test_verbs_for_protocol() {
        let uart: Vec<Verb> = Verb::for_protocol(Protocol::Uart).collect();
        assert!(uart.contains(&Verb::Bridge));
        assert!(!uart.contains(&Verb::Sniff));
        let spi: Vec<Verb> = Verb::for_protocol(Protocol::Spi).collect();
        assert_eq!(spi[0], Verb::Sniff);
        assert!(!spi.contains(&Verb::Bridge));
    }
}
