//! Device capability descriptors
//!
//! A [`DeviceProfile`] describes the probing hardware: which peripherals it
//! has, its pin range, reserved pins, internal SD slot and how the user
//! stops a running capture. One profile is selected at startup and passed
//! down to everything that needs it.

use bitflags::bitflags;

use crate::bus::Protocol;
use crate::config::{BusConfiguration, BusParams, Defaults};
use crate::pins::{Pin, PinMap, PinPolicy, PinRole, ProtectedPins};

bitflags! {
    /// Peripherals available on a device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Peripherals: u32 {
        /// SPI controller
        const SPI          = 1 << 0;
        /// SPI follower (needed by sniff and slave modes)
        const SPI_FOLLOWER = 1 << 1;
        /// I2C controller
        const I2C          = 1 << 2;
        /// Full-duplex UART
        const UART         = 1 << 3;
        /// Half-duplex UART
        const HDUART       = 1 << 4;
        /// 1-Wire
        const ONEWIRE      = 1 << 5;
        /// SD card over SPI
        const SD_CARD      = 1 << 6;

        /// Everything
        const ALL = Self::SPI.bits()
            | Self::SPI_FOLLOWER.bits()
            | Self::I2C.bits()
            | Self::UART.bits()
            | Self::HDUART.bits()
            | Self::ONEWIRE.bits()
            | Self::SD_CARD.bits();
    }
}

impl Default for Peripherals {
    fn default() -> Self {
        Peripherals::ALL
    }
}

impl Peripherals {
    /// Peripheral flag needed to drive `protocol` as a controller
    pub const fn for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Spi => Self::SPI,
            Protocol::I2c => Self::I2C,
            Protocol::Uart => Self::UART,
            Protocol::HdUart => Self::HDUART,
            Protocol::OneWire => Self::ONEWIRE,
        }
    }
}

/// How the user ends a capture or bridge session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSource {
    /// A line terminator on the interactive input
    Enter,
    /// A hardware button on the device
    Button,
}

/// SPI pins wired to an on-board SD card slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdSlotPins {
    /// Clock
    pub sclk: Pin,
    /// Card data out
    pub miso: Pin,
    /// Card data in
    pub mosi: Pin,
    /// Chip select
    pub cs: Pin,
}

impl SdSlotPins {
    /// The slot as an SPI pin map
    pub fn pin_map(&self) -> PinMap {
        PinMap::from_pairs(&[
            (PinRole::Mosi, self.mosi),
            (PinRole::Miso, self.miso),
            (PinRole::Sclk, self.sclk),
            (PinRole::Cs, self.cs),
        ])
    }
}

/// Capability descriptor of one probe model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Model name used on the command line
    pub name: &'static str,
    /// Human readable description
    pub description: &'static str,
    /// Supported peripherals
    pub peripherals: Peripherals,
    /// Highest user-assignable GPIO
    pub max_pin: Pin,
    /// Reserved GPIOs
    pub protected: &'static [Pin],
    /// On-board SD slot, if any
    pub sd_slot: Option<SdSlotPins>,
    /// Whether the device drives its own display
    pub has_display: bool,
    /// How sessions are stopped
    pub stop_source: StopSource,
    /// Default SPI pins: MOSI, MISO, SCLK, CS
    pub spi_pins: [Pin; 4],
    /// Default I2C pins: SDA, SCL
    pub i2c_pins: [Pin; 2],
    /// Default UART pins: TX, RX
    pub uart_pins: [Pin; 2],
    /// Default shared line for half-duplex UART and 1-Wire
    pub data_pin: Pin,
}

impl DeviceProfile {
    /// Pin policy for this device
    pub const fn pin_policy(&self) -> PinPolicy {
        PinPolicy::new(self.max_pin, ProtectedPins::from_slice(self.protected))
    }

    /// Returns true if the device can drive `protocol` as a controller
    pub fn supports(&self, protocol: Protocol) -> bool {
        self.peripherals.contains(Peripherals::for_protocol(protocol))
    }

    /// Returns true if sniff and slave modes are available
    pub fn supports_follower(&self) -> bool {
        self.peripherals.contains(Peripherals::SPI_FOLLOWER)
    }

    /// Default pin map for `protocol`
    pub fn default_pins(&self, protocol: Protocol) -> PinMap {
        match protocol {
            Protocol::Spi => {
                let [mosi, miso, sclk, cs] = self.spi_pins;
                PinMap::from_pairs(&[
                    (PinRole::Mosi, mosi),
                    (PinRole::Miso, miso),
                    (PinRole::Sclk, sclk),
                    (PinRole::Cs, cs),
                ])
            }
            Protocol::I2c => {
                let [sda, scl] = self.i2c_pins;
                PinMap::from_pairs(&[(PinRole::Sda, sda), (PinRole::Scl, scl)])
            }
            Protocol::Uart => {
                let [tx, rx] = self.uart_pins;
                PinMap::from_pairs(&[(PinRole::Tx, tx), (PinRole::Rx, rx)])
            }
            Protocol::HdUart | Protocol::OneWire => {
                PinMap::from_pairs(&[(PinRole::Data, self.data_pin)])
            }
        }
    }

    /// Default configuration table for every supported protocol
    pub fn defaults(&self) -> Defaults {
        let mut defaults = Defaults::new();
        for &protocol in Protocol::ALL {
            if self.supports(protocol) {
                defaults.set(BusConfiguration::new(
                    self.default_pins(protocol),
                    BusParams::default_for(protocol),
                ));
            }
        }
        defaults
    }
}

/// ESP32-S3 DevKit: flash/PSRAM and USB pins reserved
pub const S3_DEVKIT: DeviceProfile = DeviceProfile {
    name: "s3-devkit",
    description: "Generic ESP32-S3 DevKit",
    peripherals: Peripherals::ALL,
    max_pin: 48,
    protected: &[0, 19, 20, 26, 27, 28, 29, 30, 31, 32],
    sd_slot: None,
    has_display: false,
    stop_source: StopSource::Enter,
    spi_pins: [11, 13, 12, 10],
    i2c_pins: [8, 9],
    uart_pins: [17, 18],
    data_pin: 4,
};

/// M5StickC Plus2: SPI shared with the display, no follower mode
pub const M5STICK: DeviceProfile = DeviceProfile {
    name: "m5stick",
    description: "M5StickC Plus2",
    peripherals: Peripherals::SPI
        .union(Peripherals::I2C)
        .union(Peripherals::UART)
        .union(Peripherals::HDUART)
        .union(Peripherals::ONEWIRE),
    max_pin: 39,
    protected: &[4, 12, 13, 14, 15, 35, 37, 39],
    sd_slot: None,
    has_display: true,
    stop_source: StopSource::Button,
    spi_pins: [26, 36, 0, 25],
    i2c_pins: [32, 33],
    uart_pins: [26, 36],
    data_pin: 26,
};

/// M5Stack Cardputer: keyboard matrix pins reserved, internal SD slot
pub const CARDPUTER: DeviceProfile = DeviceProfile {
    name: "cardputer",
    description: "M5Stack Cardputer",
    peripherals: Peripherals::ALL,
    max_pin: 48,
    protected: &[0, 3, 4, 5, 6, 7, 8, 9, 11, 13, 15, 19, 20],
    sd_slot: Some(SdSlotPins {
        sclk: 40,
        miso: 39,
        mosi: 14,
        cs: 12,
    }),
    has_display: true,
    stop_source: StopSource::Button,
    spi_pins: [2, 1, 41, 42],
    i2c_pins: [2, 1],
    uart_pins: [2, 1],
    data_pin: 1,
};

/// M5Stack Stamp S3
pub const STAMP_S3: DeviceProfile = DeviceProfile {
    name: "stamp-s3",
    description: "M5Stack Stamp S3",
    peripherals: Peripherals::ALL.difference(Peripherals::SD_CARD),
    max_pin: 48,
    protected: &[0, 19, 20],
    sd_slot: None,
    has_display: false,
    stop_source: StopSource::Enter,
    spi_pins: [7, 5, 6, 4],
    i2c_pins: [13, 15],
    uart_pins: [1, 3],
    data_pin: 2,
};

/// LilyGO T-Embed: encoder and display pins reserved, internal SD slot
pub const T_EMBED: DeviceProfile = DeviceProfile {
    name: "t-embed",
    description: "LilyGO T-Embed",
    peripherals: Peripherals::ALL,
    max_pin: 48,
    protected: &[0, 1, 2, 11, 12, 13, 19, 20, 46],
    sd_slot: Some(SdSlotPins {
        sclk: 36,
        miso: 37,
        mosi: 35,
        cs: 39,
    }),
    has_display: true,
    stop_source: StopSource::Button,
    spi_pins: [41, 42, 40, 3],
    i2c_pins: [18, 8],
    uart_pins: [43, 44],
    data_pin: 16,
};

/// All built-in profiles; the first is the default
pub const PROFILES: &[DeviceProfile] = &[S3_DEVKIT, M5STICK, CARDPUTER, STAMP_S3, T_EMBED];

/// Look up a profile by name (case-insensitive)
pub fn find(name: &str) -> Option<&'static DeviceProfile> {
    PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}
