//! Simulated SPI peripheral
//!
//! One controller/follower engine plus the chip wired behind chip select.
//! The same peripheral also backs the SD card reader, so binding one role
//! always tears the other down first, exactly as on the real device.

use std::collections::VecDeque;

use busprobe_core::arbiter::{Peripheral, Role};
use busprobe_core::bridge::Relay;
use busprobe_core::bus::spi::{self, SpiBus};
use busprobe_core::bus::Executor;
use busprobe_core::bytecode::ByteCode;
use busprobe_core::capture::{CapturedPacket, Follower};
use busprobe_core::config::{BusConfiguration, BusParams, MAX_SPI_FREQUENCY};
use busprobe_core::error::{BusFailure, Error, RangeKind, Result};
use busprobe_core::pins::{PinMap, PinRole};

use crate::memory::{MemoryConfig, SpiMemory};

/// Chip side of an SPI bus
pub trait SpiTarget: Send {
    /// Chip select asserted
    fn select(&mut self);

    /// One byte clocked in each direction
    fn exchange(&mut self, mosi: u8) -> u8;

    /// Chip select released
    fn deselect(&mut self);
}

/// One transaction by an external controller: bytes on MOSI and MISO
pub type Transaction = (Vec<u8>, Vec<u8>);

/// Card in the simulated SD slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdCardInfo {
    /// Volume label
    pub label: String,
    /// Capacity in bytes
    pub capacity: u64,
}

/// Simulated SPI peripheral
pub struct SimSpi {
    target: Box<dyn SpiTarget>,
    role: Option<Role>,
    frequency: u32,
    selected: bool,
    wiring: Option<PinMap>,
    listen_pins: Option<PinMap>,
    capture_enabled: bool,
    script: Vec<Transaction>,
    traffic: VecDeque<Transaction>,
    sd_card: Option<SdCardInfo>,
    history: Vec<Role>,
}

impl SimSpi {
    /// Peripheral with `target` behind chip select
    pub fn new(target: Box<dyn SpiTarget>) -> Self {
        Self {
            target,
            role: None,
            frequency: 0,
            selected: false,
            wiring: None,
            listen_pins: None,
            capture_enabled: false,
            script: Vec::new(),
            traffic: VecDeque::new(),
            sd_card: None,
            history: Vec::new(),
        }
    }

    /// Peripheral with an erased W25Q128 behind chip select
    pub fn with_flash() -> Self {
        Self::new(Box::new(SpiMemory::new(MemoryConfig::w25q128())))
    }

    /// Peripheral with a 25LC256 behind chip select
    pub fn with_eeprom() -> Self {
        Self::new(Box::new(SpiMemory::new(MemoryConfig::eeprom_25lc256())))
    }

    /// Put a card in the SD slot (or remove it with `None`)
    pub fn set_sd_card(&mut self, card: Option<SdCardInfo>) {
        self.sd_card = card;
    }

    /// Traffic an external controller produces each time a capture starts
    pub fn set_script(&mut self, script: Vec<Transaction>) {
        self.script = script;
    }

    /// Inject one external transaction while listening
    ///
    /// Dropped unless a capture is running.
    pub fn inject(&mut self, mosi: &[u8], miso: &[u8]) {
        if self.role == Some(Role::Follower) && self.capture_enabled {
            self.traffic.push_back((mosi.to_vec(), miso.to_vec()));
        } else {
            log::trace!("SimSpi: not listening, dropping injected transaction");
        }
    }

    /// Role currently bound
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Every role bound so far, oldest first
    pub fn history(&self) -> &[Role] {
        &self.history
    }

    /// Current clock
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Card in the slot, if mounted
    pub fn mounted_card(&self) -> Option<&SdCardInfo> {
        match self.role {
            Some(Role::SdCard) => self.sd_card.as_ref(),
            _ => None,
        }
    }

    /// Pick the wire the follower's data-in is connected to
    fn captured_side(&self, (mosi, miso): Transaction) -> Vec<u8> {
        let data_in = self.listen_pins.as_ref().and_then(|p| p.get(PinRole::Mosi));
        let miso_wire = self.wiring.as_ref().and_then(|p| p.get(PinRole::Miso));
        if data_in.is_some() && data_in == miso_wire {
            miso
        } else {
            mosi
        }
    }
}

impl Peripheral for SimSpi {
    fn bind(&mut self, role: Role, config: &BusConfiguration) -> Result<()> {
        let BusParams::Spi { frequency } = config.params else {
            return Err(Error::Unsupported);
        };
        match role {
            Role::Controller => {
                if !config.is_complete() {
                    return Err(Error::Range(RangeKind::Parameter));
                }
                self.wiring = Some(config.pins.clone());
            }
            Role::Follower => {
                self.listen_pins = Some(config.pins.clone());
                self.capture_enabled = true;
                self.traffic = self.script.iter().cloned().collect();
            }
            Role::SdCard => {
                if self.sd_card.is_none() {
                    log::debug!("SimSpi: no card in slot");
                    return Err(Error::Mount);
                }
            }
        }
        self.frequency = frequency;
        self.role = Some(role);
        self.history.push(role);
        Ok(())
    }

    fn release(&mut self) {
        if self.selected {
            self.target.deselect();
            self.selected = false;
        }
        self.role = None;
        self.listen_pins = None;
        self.capture_enabled = false;
        self.traffic.clear();
    }
}

impl SpiBus for SimSpi {
    fn set_cs(&mut self, active: bool) -> Result<()> {
        match (active, self.selected) {
            (true, false) => self.target.select(),
            (false, true) => self.target.deselect(),
            _ => {}
        }
        self.selected = active;
        Ok(())
    }

    fn transfer(&mut self, byte: u8) -> Result<u8> {
        if self.selected {
            Ok(self.target.exchange(byte))
        } else {
            // Nobody drives MISO
            Ok(0xFF)
        }
    }

    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if hz == 0 || hz > MAX_SPI_FREQUENCY {
            return Err(Error::Range(RangeKind::Parameter));
        }
        self.frequency = hz;
        Ok(())
    }
}

impl Executor for SimSpi {
    fn execute(&mut self, codes: &[ByteCode]) -> Result<Vec<u8>> {
        if self.role != Some(Role::Controller) {
            return Err(Error::Bus(BusFailure::NotConfigured));
        }
        spi::execute(self, codes)
    }
}

impl Follower for SimSpi {
    fn drain_packets(&mut self, out: &mut Vec<CapturedPacket>) -> Result<()> {
        if self.role != Some(Role::Follower) {
            return Err(Error::Bus(BusFailure::NotConfigured));
        }
        while let Some(transaction) = self.traffic.pop_front() {
            out.push(CapturedPacket::new(self.captured_side(transaction)));
        }
        Ok(())
    }

    fn disable_capture(&mut self) -> Result<()> {
        self.capture_enabled = false;
        Ok(())
    }
}

impl Relay for SimSpi {}

#[cfg(test)]
mod tests {
    use super::*;
    use busprobe_core::arbiter::Arbiter;
    use busprobe_core::bus::Protocol;
    use busprobe_core::capture::{CaptureLine, CaptureMode, CaptureSession};
    use busprobe_core::config::Defaults;
    use busprobe_core::device::S3_DEVKIT;
    use busprobe_core::instruction::parse;

    fn arbiter() -> (Arbiter<SimSpi>, Defaults) {
        let arbiter = Arbiter::new(Protocol::Spi, S3_DEVKIT.pin_policy(), SimSpi::with_flash());
        (arbiter, S3_DEVKIT.defaults())
    }

    #[test]
    fn test_jedec_id_through_arbiter() {
        let (mut arbiter, mut defaults) = arbiter();
        assert_eq!(
            arbiter.executor().err(),
            Some(Error::Bus(BusFailure::NotConfigured))
        );
        arbiter.ensure_configured(&mut defaults).unwrap();
        let data = arbiter
            .executor()
            .unwrap()
            .execute(&parse("[0x9F r:3]").unwrap())
            .unwrap();
        assert_eq!(data, [0xEF, 0x40, 0x18]);
    }

    #[test]
    fn test_write_then_read_back() {
        let (mut arbiter, mut defaults) = arbiter();
        arbiter.ensure_configured(&mut defaults).unwrap();
        let bus = arbiter.executor().unwrap();
        bus.execute(&parse("[0x06] [0x02 0x00 0x00 0x00 0xCA 0xFE]").unwrap())
            .unwrap();
        let data = bus
            .execute(&parse("[0x03 0x00 0x00 0x00 r:2]").unwrap())
            .unwrap();
        assert_eq!(data, [0xCA, 0xFE]);
    }

    #[test]
    fn test_sniff_miso_captures_miso_wire() {
        let (mut arbiter, mut defaults) = arbiter();
        arbiter.ensure_configured(&mut defaults).unwrap();
        let before = arbiter.controller().cloned();

        let mut session =
            CaptureSession::begin(&mut arbiter, CaptureMode::Sniff(CaptureLine::Miso)).unwrap();
        arbiter
            .bound(Role::Follower)
            .unwrap()
            .inject(&[0x9F, 0xFF, 0xFF, 0xFF], &[0xFF, 0xEF, 0x40, 0x18]);

        let mut seen = Vec::new();
        let mut polls = 0;
        let mut stop = || {
            polls += 1;
            polls > 1
        };
        session
            .run(
                &mut arbiter,
                &mut stop,
                |line, p| seen.push((line, p.bytes().to_vec())),
                || {},
            )
            .unwrap();

        assert_eq!(seen, [(CaptureLine::Miso, vec![0xFF, 0xEF, 0x40, 0x18])]);
        assert_eq!(arbiter.controller().cloned(), before);
        assert_eq!(arbiter.active().cloned(), before);
        assert_eq!(arbiter.peripheral().role(), Some(Role::Controller));
        assert_eq!(
            arbiter.peripheral().history(),
            [Role::Controller, Role::Follower, Role::Controller]
        );
    }

    #[test]
    fn test_traffic_buffered_before_stop_is_emitted() {
        let (mut arbiter, mut defaults) = arbiter();
        arbiter.ensure_configured(&mut defaults).unwrap();

        let mut session = CaptureSession::begin(&mut arbiter, CaptureMode::Slave).unwrap();
        arbiter
            .bound(Role::Follower)
            .unwrap()
            .inject(&[0x9F, 0x00], &[0xFF, 0xEF]);

        let mut seen = Vec::new();
        let mut stop = || true;
        session
            .run(
                &mut arbiter,
                &mut stop,
                |line, p| seen.push((line, p.bytes().to_vec())),
                || {},
            )
            .unwrap();

        assert_eq!(seen, [(CaptureLine::Mosi, vec![0x9F, 0x00])]);
        assert_eq!(arbiter.peripheral().role(), Some(Role::Controller));
    }

    #[test]
    fn test_disabled_capture_ignores_new_traffic() {
        let (mut arbiter, mut defaults) = arbiter();
        arbiter.ensure_configured(&mut defaults).unwrap();
        let _session = CaptureSession::begin(&mut arbiter, CaptureMode::Slave).unwrap();

        let follower = arbiter.bound(Role::Follower).unwrap();
        follower.inject(&[0x01], &[0xFF]);
        follower.disable_capture().unwrap();
        follower.inject(&[0x02], &[0xFF]);

        let mut packets = Vec::new();
        follower.drain_packets(&mut packets).unwrap();
        assert_eq!(packets, [CapturedPacket::new(vec![0x01])]);
    }

    #[test]
    fn test_slave_replays_script() {
        let mut defaults = S3_DEVKIT.defaults();
        let mut sim = SimSpi::with_flash();
        sim.set_script(vec![(vec![0x03, 0x00], vec![0xFF, 0xFF]), (vec![], vec![])]);
        let mut arbiter = Arbiter::new(Protocol::Spi, S3_DEVKIT.pin_policy(), sim);
        arbiter.ensure_configured(&mut defaults).unwrap();

        let mut session = CaptureSession::begin(&mut arbiter, CaptureMode::Slave).unwrap();
        let mut seen = Vec::new();
        let mut never = || false;
        session
            .poll(&mut arbiter, &mut never, |line, p| {
                seen.push((line, p.bytes().to_vec()))
            })
            .unwrap();
        assert_eq!(seen, [(CaptureLine::Mosi, vec![0x03, 0x00])]);
        session.abort(&mut arbiter).unwrap();
        assert_eq!(arbiter.peripheral().role(), Some(Role::Controller));
    }

    #[test]
    fn test_sd_mount_failure_restores_controller() {
        let (mut arbiter, mut defaults) = arbiter();
        arbiter.ensure_configured(&mut defaults).unwrap();
        let card = arbiter.controller().cloned().unwrap();
        assert_eq!(arbiter.configure(Role::SdCard, card), Err(Error::Mount));
        arbiter.restore_controller().unwrap();
        assert!(arbiter
            .executor()
            .unwrap()
            .execute(&parse("[0x9F r:3]").unwrap())
            .is_ok());
    }

    #[test]
    fn test_sd_mount_success() {
        let mut sim = SimSpi::with_flash();
        sim.set_sd_card(Some(SdCardInfo {
            label: "PROBE".into(),
            capacity: 8 << 30,
        }));
        let mut arbiter = Arbiter::new(Protocol::Spi, S3_DEVKIT.pin_policy(), sim);
        let mut defaults = S3_DEVKIT.defaults();
        arbiter.ensure_configured(&mut defaults).unwrap();
        let pins = arbiter.controller().cloned().unwrap();
        arbiter.configure(Role::SdCard, pins).unwrap();
        assert_eq!(
            arbiter.peripheral().mounted_card().map(|c| c.label.as_str()),
            Some("PROBE")
        );
        arbiter.restore_controller().unwrap();
        assert!(arbiter.peripheral().mounted_card().is_none());
    }
}
