//! Backend registration and dispatch
//!
//! A backend hands out one peripheral per protocol. Backends are feature
//! gated; the help text and `list-backends` only show what was compiled in.

use crate::error::AppError;
use busprobe_core::arbiter::Peripheral;
use busprobe_core::bridge::Relay;
use busprobe_core::bus::{Executor, Protocol};
use busprobe_core::capture::Follower;

/// Card mounted in the SD slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    /// Volume label
    pub label: String,
    /// Capacity in bytes
    pub capacity: u64,
}

/// Everything the shell needs from one bus peripheral
pub trait Backend: Peripheral + Executor + Follower + Relay + Send {
    /// Card currently mounted in the SD slot
    fn card(&self) -> Option<CardInfo> {
        None
    }
}

/// Opens peripherals for a backend
pub trait BackendFactory {
    /// Backend name as given to `--backend`
    fn name(&self) -> &'static str;

    /// Open the peripheral for `protocol`
    fn open(&mut self, protocol: Protocol) -> Result<Box<dyn Backend>, AppError>;
}

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "sim")]
    backends.push(BackendInfo {
        name: "sim",
        aliases: &["dummy"],
        description: "Simulated buses (memory=flash|eeprom, sdcard=yes|no)",
    });

    #[cfg(feature = "linux-gpio")]
    backends.push(BackendInfo {
        name: "linux-gpio",
        aliases: &["linux_gpio"],
        description: "Linux GPIO bitbang SPI (dev=/dev/gpiochipN or gpiochip=N)",
    });

    backends
}

/// Generate a short list of backend names for error messages
pub fn backend_names_short() -> String {
    let names: Vec<&str> = available_backends().iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Parse a backend string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_backend_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// Open the backend named by a `--backend` string
#[allow(unused_variables)]
pub fn open_backend(spec: &str) -> Result<Box<dyn BackendFactory>, AppError> {
    let (name, options) = parse_backend_string(spec);
    let canonical = available_backends()
        .into_iter()
        .find(|b| b.name == name || b.aliases.contains(&name))
        .map(|b| b.name);

    match canonical {
        #[cfg(feature = "sim")]
        Some("sim") => Ok(Box::new(sim::SimBackends::from_options(&options)?)),

        #[cfg(feature = "linux-gpio")]
        Some("linux-gpio") => {
            log::info!("Opening Linux GPIO backend...");
            let config = busprobe_linux_gpio::parse_options(&options)?;
            Ok(Box::new(gpio::GpioBackends { config }))
        }

        _ => Err(AppError::UnknownBackend(format!(
            "{} [available: {}]",
            name,
            backend_names_short()
        ))),
    }
}

#[cfg(feature = "sim")]
pub mod sim {
    //! Simulated buses

    use super::{Backend, BackendFactory, CardInfo};
    use crate::error::AppError;
    use busprobe_core::bus::Protocol;
    use busprobe_sim::{SdCardInfo, SimI2c, SimOneWire, SimSpi, SimUart};

    impl Backend for SimSpi {
        fn card(&self) -> Option<CardInfo> {
            self.mounted_card().map(|c| CardInfo {
                label: c.label.clone(),
                capacity: c.capacity,
            })
        }
    }

    impl Backend for SimI2c {}
    impl Backend for SimUart {}
    impl Backend for SimOneWire {}

    /// Which memory sits behind SPI chip select
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Memory {
        /// W25Q128 NOR flash
        Flash,
        /// 25LC256 EEPROM
        Eeprom,
    }

    /// Factory for the simulated buses
    #[derive(Debug, Clone)]
    pub struct SimBackends {
        memory: Memory,
        sd_card: bool,
    }

    impl Default for SimBackends {
        fn default() -> Self {
            Self {
                memory: Memory::Flash,
                sd_card: true,
            }
        }
    }

    impl SimBackends {
        /// Parse `memory=` and `sdcard=` options
        pub fn from_options(options: &[(&str, &str)]) -> Result<Self, AppError> {
            let mut backends = Self::default();
            for &(key, value) in options {
                match (key, value) {
                    ("memory", "flash") => backends.memory = Memory::Flash,
                    ("memory", "eeprom") => backends.memory = Memory::Eeprom,
                    ("sdcard", "yes") => backends.sd_card = true,
                    ("sdcard", "no") => backends.sd_card = false,
                    _ => return Err(AppError::BackendOption(format!("{}={}", key, value))),
                }
            }
            Ok(backends)
        }
    }

    /// What an external controller does on the bus while we listen: read
    /// the JEDEC ID, then the first bytes of the flash
    fn demo_traffic() -> Vec<busprobe_sim::Transaction> {
        vec![
            (vec![0x9F, 0xFF, 0xFF, 0xFF], vec![0xFF, 0xEF, 0x40, 0x18]),
            (
                vec![0x03, 0x00, 0x00, 0x00, 0xFF, 0xFF],
                vec![0xFF, 0xFF, 0xFF, 0xFF, 0x55, 0xAA],
            ),
        ]
    }

    impl BackendFactory for SimBackends {
        fn name(&self) -> &'static str {
            "sim"
        }

        fn open(&mut self, protocol: Protocol) -> Result<Box<dyn Backend>, AppError> {
            log::debug!("sim: opening {}", protocol);
            Ok(match protocol {
                Protocol::Spi => {
                    let mut spi = match self.memory {
                        Memory::Flash => SimSpi::with_flash(),
                        Memory::Eeprom => SimSpi::with_eeprom(),
                    };
                    spi.set_script(demo_traffic());
                    if self.sd_card {
                        spi.set_sd_card(Some(SdCardInfo {
                            label: "BUSPROBE".into(),
                            capacity: 8 << 30,
                        }));
                    }
                    Box::new(spi)
                }
                Protocol::I2c => Box::new(SimI2c::with_eeprom()),
                Protocol::Uart | Protocol::HdUart => Box::new(SimUart::default()),
                Protocol::OneWire => Box::new(SimOneWire::default()),
            })
        }
    }
}

#[cfg(feature = "linux-gpio")]
pub mod gpio {
    //! Linux GPIO lines

    use super::{Backend, BackendFactory};
    use crate::error::AppError;
    use busprobe_core::bus::Protocol;
    use busprobe_linux_gpio::{LinuxGpioConfig, LinuxGpioSpi};

    impl Backend for LinuxGpioSpi {}

    /// Factory for the GPIO backend; only SPI is available
    pub struct GpioBackends {
        pub(super) config: LinuxGpioConfig,
    }

    impl BackendFactory for GpioBackends {
        fn name(&self) -> &'static str {
            "linux-gpio"
        }

        fn open(&mut self, protocol: Protocol) -> Result<Box<dyn Backend>, AppError> {
            match protocol {
                Protocol::Spi => Ok(Box::new(LinuxGpioSpi::open(&self.config)?)),
                _ => Err(busprobe_core::Error::Unsupported.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_string() {
        assert_eq!(parse_backend_string("sim"), ("sim", vec![]));
        assert_eq!(
            parse_backend_string("linux-gpio:gpiochip=0,bogus"),
            ("linux-gpio", vec![("gpiochip", "0")])
        );
    }

    #[test]
    fn test_unknown_backend() {
        assert!(matches!(
            open_backend("ch341a"),
            Err(AppError::UnknownBackend(_))
        ));
    }

    #[cfg(feature = "sim")]
    #[test]
    fn test_sim_options() {
        assert!(open_backend("sim:memory=eeprom,sdcard=no").is_ok());
        assert!(matches!(
            open_backend("dummy:memory=tape"),
            Err(AppError::BackendOption(_))
        ));
    }
}
