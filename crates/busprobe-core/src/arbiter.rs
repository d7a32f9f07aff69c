//! Bus resource arbiter
//!
//! The [`Arbiter`] owns a physical peripheral and its configuration state.
//! It is the only code that binds or releases the peripheral, so every mode
//! switch (controller, SD card, passive capture) goes through it.
//!
//! ```text
//! Unconfigured --configure()--> Configured(role) --end()--> Unconfigured
//!                                      |
//!                                      +--configure()--> (teardown) --> Configured(role')
//! ```
//!
//! The last controller configuration survives [`Arbiter::end`], so the
//! controller can be restored after a specialized mode without prompting.

use core::fmt;

use crate::bus::Protocol;
use crate::config::{BusConfiguration, ConfigSource};
use crate::error::{BusFailure, Error, Result};
use crate::pins::PinPolicy;

/// What the peripheral is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Bus controller running instructions
    Controller,
    /// Non-owning listener (sniff) or responder (slave)
    Follower,
    /// SD card reader sharing the SPI peripheral
    SdCard,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Controller => "controller",
            Self::Follower => "follower",
            Self::SdCard => "sd card",
        })
    }
}

/// A physical peripheral that can be bound to pins in one role at a time
pub trait Peripheral {
    /// Bind pins and parameters for `role`
    ///
    /// Called only after any previous binding has been released.
    fn bind(&mut self, role: Role, config: &BusConfiguration) -> Result<()>;

    /// Release the pins and stop the peripheral
    fn release(&mut self);
}

impl<T: Peripheral + ?Sized> Peripheral for &mut T {
    fn bind(&mut self, role: Role, config: &BusConfiguration) -> Result<()> {
        (**self).bind(role, config)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

impl<T: Peripheral + ?Sized> Peripheral for alloc::boxed::Box<T> {
    fn bind(&mut self, role: Role, config: &BusConfiguration) -> Result<()> {
        (**self).bind(role, config)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Arbiter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    /// Nothing bound
    Unconfigured,
    /// Bound in the given role
    Configured(Role),
}

/// Sole owner of one physical bus peripheral
pub struct Arbiter<P> {
    protocol: Protocol,
    policy: PinPolicy,
    peripheral: P,
    state: ArbiterState,
    active: Option<BusConfiguration>,
    controller: Option<BusConfiguration>,
}

impl<P: Peripheral> Arbiter<P> {
    /// Take ownership of `peripheral` for `protocol`
    pub fn new(protocol: Protocol, policy: PinPolicy, peripheral: P) -> Self {
        Self {
            protocol,
            policy,
            peripheral,
            state: ArbiterState::Unconfigured,
            active: None,
            controller: None,
        }
    }

    /// Protocol this arbiter drives
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Pin policy every configuration is checked against
    pub fn policy(&self) -> &PinPolicy {
        &self.policy
    }

    /// Current state
    pub fn state(&self) -> ArbiterState {
        self.state
    }

    /// Configuration currently bound, if any
    pub fn active(&self) -> Option<&BusConfiguration> {
        self.active.as_ref()
    }

    /// Last controller configuration, kept across [`end`](Self::end)
    pub fn controller(&self) -> Option<&BusConfiguration> {
        self.controller.as_ref()
    }

    /// Read-only access to the peripheral
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// Check `config` without touching the peripheral
    pub fn validate(&self, config: &BusConfiguration) -> Result<()> {
        if config.protocol() != self.protocol {
            return Err(Error::Unsupported);
        }
        config.validate(&self.policy)
    }

    /// Bind the peripheral in `role`
    ///
    /// Every pin and parameter is validated first; on failure nothing
    /// changes. Otherwise any existing binding is torn down before the new
    /// one is applied, even if it is identical. If the bind itself fails
    /// the arbiter is left unconfigured.
    pub fn configure(&mut self, role: Role, config: BusConfiguration) -> Result<()> {
        self.validate(&config)?;
        self.teardown();
        log::debug!("{}: binding {} ({})", self.protocol, role, config);
        self.peripheral.bind(role, &config)?;
        self.state = ArbiterState::Configured(role);
        if role == Role::Controller {
            self.controller = Some(config.clone());
        }
        self.active = Some(config);
        Ok(())
    }

    /// Release the peripheral, keeping the last controller configuration
    pub fn end(&mut self) {
        self.teardown();
    }

    /// Make sure the controller is bound
    ///
    /// Already bound as controller: only re-validates. Otherwise the last
    /// controller configuration is reapplied, or `source` is asked for one
    /// if this bus was never configured.
    pub fn ensure_configured(&mut self, source: &mut dyn ConfigSource) -> Result<()> {
        if self.state == ArbiterState::Configured(Role::Controller) {
            if let Some(active) = &self.active {
                self.validate(active)?;
            }
            return Ok(());
        }
        let config = match &self.controller {
            Some(config) => config.clone(),
            None => source.configure(self.protocol, None, &self.policy)?,
        };
        self.configure(Role::Controller, config)
    }

    /// Ask `source` for a new controller configuration and apply it
    ///
    /// The current configuration is offered as the default answer.
    pub fn reconfigure(&mut self, source: &mut dyn ConfigSource) -> Result<()> {
        let config = source.configure(self.protocol, self.controller.as_ref(), &self.policy)?;
        self.configure(Role::Controller, config)
    }

    /// Rebind the last controller configuration
    ///
    /// Called whenever control returns from a specialized mode, since that
    /// mode may have repurposed the pins or left the peripheral in another
    /// state.
    pub fn restore_controller(&mut self) -> Result<()> {
        let config = self
            .controller
            .clone()
            .ok_or(Error::Bus(BusFailure::NotConfigured))?;
        log::debug!("{}: restoring controller configuration", self.protocol);
        self.configure(Role::Controller, config)
    }

    /// The peripheral, if it is bound as controller
    pub fn executor(&mut self) -> Result<&mut P> {
        self.bound(Role::Controller)
    }

    /// The peripheral, if it is bound in `role`
    pub fn bound(&mut self, role: Role) -> Result<&mut P> {
        if self.state == ArbiterState::Configured(role) {
            Ok(&mut self.peripheral)
        } else {
            Err(Error::Bus(BusFailure::NotConfigured))
        }
    }

    fn teardown(&mut self) {
        if let ArbiterState::Configured(role) = self.state {
            log::debug!("{}: releasing {}", self.protocol, role);
            self.peripheral.release();
            self.state = ArbiterState::Unconfigured;
            self.active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BusParams, Defaults};
    use crate::pins::{PinMap, PinRole, ProtectedPins};
    use alloc::vec::Vec;

    #[derive(Default)]
    struct Mock {
        log: Vec<(&'static str, Option<Role>)>,
        fail_sd: bool,
    }

    impl Mock {
        fn binds(&self) -> usize {
            self.log.iter().filter(|(op, _)| *op == "bind").count()
        }
    }

    impl Peripheral for Mock {
        fn bind(&mut self, role: Role, _config: &BusConfiguration) -> Result<()> {
            if role == Role::SdCard && self.fail_sd {
                return Err(Error::Mount);
            }
            self.log.push(("bind", Some(role)));
            Ok(())
        }

        fn release(&mut self) {
            self.log.push(("release", None));
        }
    }

    fn policy() -> PinPolicy {
        PinPolicy::new(48, ProtectedPins::from_slice(&[0, 19, 20, 26]))
    }

    fn spi(cs: u8) -> BusConfiguration {
        BusConfiguration::new(
            PinMap::from_pairs(&[
                (PinRole::Mosi, 11),
                (PinRole::Miso, 13),
                (PinRole::Sclk, 12),
                (PinRole::Cs, cs),
            ]),
            BusParams::Spi {
                frequency: 1_000_000,
            },
        )
    }

    fn defaults() -> Defaults {
        let mut d = Defaults::new();
        d.set(spi(10));
        d
    }

    #[test]
    fn test_ensure_configured_is_idempotent() {
        let mut arbiter = Arbiter::new(Protocol::Spi, policy(), Mock::default());
        let mut source = defaults();
        arbiter.ensure_configured(&mut source).unwrap();
        arbiter.ensure_configured(&mut source).unwrap();
        assert_eq!(arbiter.peripheral().binds(), 1);
        assert_eq!(
            arbiter.state(),
            ArbiterState::Configured(Role::Controller)
        );
    }

    #[test]
    fn test_protected_pin_leaves_config_unchanged() {
        let mut arbiter = Arbiter::new(Protocol::Spi, policy(), Mock::default());
        arbiter.configure(Role::Controller, spi(10)).unwrap();
        for pin in policy().protected().iter() {
            let err = arbiter.configure(Role::Controller, spi(pin)).unwrap_err();
            assert_eq!(err, Error::PinConflict { pin });
            assert_eq!(arbiter.active(), Some(&spi(10)));
            assert_eq!(arbiter.controller(), Some(&spi(10)));
        }
        assert_eq!(arbiter.peripheral().binds(), 1);
        assert!(arbiter.executor().is_ok());
    }

    #[test]
    fn test_end_keeps_logical_configuration() {
        let mut arbiter = Arbiter::new(Protocol::Spi, policy(), Mock::default());
        arbiter.configure(Role::Controller, spi(10)).unwrap();
        arbiter.end();
        assert_eq!(arbiter.state(), ArbiterState::Unconfigured);
        assert!(arbiter.executor().is_err());

        // Never consults the source again
        let mut empty = Defaults::new();
        arbiter.ensure_configured(&mut empty).unwrap();
        assert_eq!(arbiter.active(), Some(&spi(10)));
    }

    #[test]
    fn test_restore_rebinds_even_when_unchanged() {
        let mut arbiter = Arbiter::new(Protocol::Spi, policy(), Mock::default());
        arbiter.configure(Role::Controller, spi(10)).unwrap();
        arbiter.restore_controller().unwrap();
        assert_eq!(
            arbiter.peripheral().log,
            [
                ("bind", Some(Role::Controller)),
                ("release", None),
                ("bind", Some(Role::Controller)),
            ]
        );
    }

    #[test]
    fn test_mount_failure_then_restore() {
        let mut arbiter = Arbiter::new(
            Protocol::Spi,
            policy(),
            Mock {
                fail_sd: true,
                ..Mock::default()
            },
        );
        arbiter.configure(Role::Controller, spi(10)).unwrap();
        assert_eq!(
            arbiter.configure(Role::SdCard, spi(9)),
            Err(Error::Mount)
        );
        assert_eq!(arbiter.state(), ArbiterState::Unconfigured);
        arbiter.restore_controller().unwrap();
        assert_eq!(arbiter.active(), Some(&spi(10)));
    }

    #[test]
    fn test_restore_without_history() {
        let mut arbiter = Arbiter::new(Protocol::Spi, policy(), Mock::default());
        assert_eq!(
            arbiter.restore_controller(),
            Err(Error::Bus(BusFailure::NotConfigured))
        );
    }

    #[test]
    fn test_wrong_protocol_rejected() {
        let mut arbiter = Arbiter::new(Protocol::I2c, policy(), Mock::default());
        assert_eq!(
            arbiter.configure(Role::Controller, spi(10)),
            Err(Error::Unsupported)
        );
        assert!(arbiter.controller().is_none());
    }
}
