//! Passive capture state machine (sniff and slave modes)
//!
//! A [`CaptureSession`] rebinds the SPI peripheral as a follower, then is
//! driven one [`poll`](CaptureSession::poll) at a time by the caller's loop:
//!
//! ```text
//! Idle --begin()--> Listening --stop signal--> Draining --restore--> Idle
//! ```
//!
//! While listening, each poll first samples the stop signal and then
//! drains whatever packets the follower buffered since the last poll.
//! Draining disables capture, ends the follower binding and rebinds the
//! controller configuration that was active before the session started.

use alloc::vec::Vec;
use core::fmt;

use crate::arbiter::{Arbiter, Peripheral, Role};
use crate::config::BusConfiguration;
use crate::error::{BusFailure, Error, Result};
use crate::pins::{PinMap, PinRole};

/// Line a packet was captured on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureLine {
    /// Controller to target
    Mosi,
    /// Target to controller
    Miso,
}

impl CaptureLine {
    /// Prefix printed before each packet
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Mosi => "[MOSI] ",
            Self::Miso => "[MISO] ",
        }
    }
}

impl fmt::Display for CaptureLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mosi => "MOSI",
            Self::Miso => "MISO",
        })
    }
}

/// Bytes observed during one chip-select assertion
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedPacket {
    bytes: Vec<u8>,
}

impl CapturedPacket {
    /// Wrap captured bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The bytes in transaction order
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns true if nothing was clocked during the assertion
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&[u8]> for CapturedPacket {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

/// A peripheral that can listen on a bus it does not own
pub trait Follower {
    /// Move every packet buffered since the last call into `out`
    fn drain_packets(&mut self, out: &mut Vec<CapturedPacket>) -> Result<()> {
        let _ = out;
        Err(Error::Unsupported)
    }

    /// Stop capturing at the peripheral level
    ///
    /// Only new traffic is refused. Packets buffered before the call stay
    /// queued and are returned by the next [`Follower::drain_packets`].
    fn disable_capture(&mut self) -> Result<()> {
        Err(Error::Unsupported)
    }
}

impl<T: Follower + ?Sized> Follower for &mut T {
    fn drain_packets(&mut self, out: &mut Vec<CapturedPacket>) -> Result<()> {
        (**self).drain_packets(out)
    }

    fn disable_capture(&mut self) -> Result<()> {
        (**self).disable_capture()
    }
}

impl<T: Follower + ?Sized> Follower for alloc::boxed::Box<T> {
    fn drain_packets(&mut self, out: &mut Vec<CapturedPacket>) -> Result<()> {
        (**self).drain_packets(out)
    }

    fn disable_capture(&mut self) -> Result<()> {
        (**self).disable_capture()
    }
}

/// Source of the user's request to stop a session
pub trait StopSignal {
    /// Returns true once the user asked to stop; must not block
    fn stop_requested(&mut self) -> bool;
}

impl<F: FnMut() -> bool> StopSignal for F {
    fn stop_requested(&mut self) -> bool {
        self()
    }
}

/// Which capture mode to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Listen on one line; the follower's data-in is wired to it
    Sniff(CaptureLine),
    /// Answer an external controller; everything it sends is logged
    Slave,
}

impl CaptureMode {
    /// Line the captured packets are tagged with
    pub const fn line(&self) -> CaptureLine {
        match self {
            Self::Sniff(line) => *line,
            Self::Slave => CaptureLine::Mosi,
        }
    }

    /// Follower binding derived from the controller pins
    ///
    /// Sniffing MISO maps the MISO wire onto the follower's data-in and
    /// leaves its data-out unbound so the probe never drives the bus.
    pub fn follower_config(&self, controller: &BusConfiguration) -> Result<BusConfiguration> {
        let pin = |role| {
            controller
                .pin(role)
                .ok_or(Error::Bus(BusFailure::NotConfigured))
        };
        let sclk = pin(PinRole::Sclk)?;
        let cs = pin(PinRole::Cs)?;
        let mosi = pin(PinRole::Mosi)?;
        let miso = pin(PinRole::Miso)?;
        let pins = match self {
            Self::Sniff(CaptureLine::Mosi) | Self::Slave => PinMap::from_pairs(&[
                (PinRole::Sclk, sclk),
                (PinRole::Cs, cs),
                (PinRole::Mosi, mosi),
                (PinRole::Miso, miso),
            ]),
            Self::Sniff(CaptureLine::Miso) => PinMap::from_pairs(&[
                (PinRole::Sclk, sclk),
                (PinRole::Cs, cs),
                (PinRole::Mosi, miso),
            ]),
        };
        Ok(BusConfiguration::new(pins, controller.params))
    }
}

/// Capture session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Controller configuration restored, session over
    Idle,
    /// Follower bound, packets flowing
    Listening,
    /// Stop observed, restoring the controller on the next poll
    Draining,
}

/// One sniff or slave session
pub struct CaptureSession {
    mode: CaptureMode,
    state: CaptureState,
    saved: BusConfiguration,
    pending: Vec<CapturedPacket>,
}

impl CaptureSession {
    /// Save the controller configuration and rebind as a follower
    ///
    /// If the follower cannot be bound the controller is restored before
    /// the error is returned.
    pub fn begin<P: Peripheral + Follower>(
        arbiter: &mut Arbiter<P>,
        mode: CaptureMode,
    ) -> Result<Self> {
        let saved = arbiter
            .controller()
            .cloned()
            .ok_or(Error::Bus(BusFailure::NotConfigured))?;
        let listen = mode.follower_config(&saved)?;
        arbiter.end();
        if let Err(e) = arbiter.configure(Role::Follower, listen) {
            arbiter.configure(Role::Controller, saved)?;
            return Err(e);
        }
        log::info!("Capture: listening ({:?})", mode);
        Ok(Self {
            mode,
            state: CaptureState::Listening,
            saved,
            pending: Vec::new(),
        })
    }

    /// Current state
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// The mode this session runs
    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Controller configuration that will be restored
    pub fn saved(&self) -> &BusConfiguration {
        &self.saved
    }

    /// Advance the session by one tick
    ///
    /// `emit` receives every non-empty packet with its line tag.
    pub fn poll<P, S, F>(
        &mut self,
        arbiter: &mut Arbiter<P>,
        stop: &mut S,
        mut emit: F,
    ) -> Result<CaptureState>
    where
        P: Peripheral + Follower,
        S: StopSignal + ?Sized,
        F: FnMut(CaptureLine, &CapturedPacket),
    {
        match self.state {
            CaptureState::Listening => {
                if stop.stop_requested() {
                    self.state = CaptureState::Draining;
                } else {
                    arbiter
                        .bound(Role::Follower)?
                        .drain_packets(&mut self.pending)?;
                    self.emit_pending(&mut emit);
                }
            }
            CaptureState::Draining => self.finish(arbiter, &mut emit)?,
            CaptureState::Idle => {}
        }
        Ok(self.state)
    }

    /// Poll until the session is idle, calling `idle` between ticks
    ///
    /// On a capture error the controller is still restored before the
    /// error is returned.
    pub fn run<P, S, F, W>(
        mut self,
        arbiter: &mut Arbiter<P>,
        stop: &mut S,
        mut emit: F,
        mut idle: W,
    ) -> Result<()>
    where
        P: Peripheral + Follower,
        S: StopSignal + ?Sized,
        F: FnMut(CaptureLine, &CapturedPacket),
        W: FnMut(),
    {
        loop {
            match self.poll(arbiter, stop, &mut emit) {
                Ok(CaptureState::Idle) => return Ok(()),
                Ok(_) => idle(),
                Err(e) => {
                    log::warn!("Capture: {}", e);
                    self.abort(arbiter)?;
                    return Err(e);
                }
            }
        }
    }

    /// Stop immediately and restore the controller, discarding buffered
    /// packets
    pub fn abort<P: Peripheral + Follower>(&mut self, arbiter: &mut Arbiter<P>) -> Result<()> {
        if self.state == CaptureState::Idle {
            return Ok(());
        }
        self.pending.clear();
        let mut discard = |_: CaptureLine, _: &CapturedPacket| {};
        self.finish(arbiter, &mut discard)
    }

    fn finish<P, F>(&mut self, arbiter: &mut Arbiter<P>, emit: &mut F) -> Result<()>
    where
        P: Peripheral + Follower,
        F: FnMut(CaptureLine, &CapturedPacket),
    {
        if let Ok(follower) = arbiter.bound(Role::Follower) {
            if let Err(e) = follower.disable_capture() {
                log::warn!("Capture: disabling capture failed: {}", e);
            }
            if follower.drain_packets(&mut self.pending).is_ok() {
                self.emit_pending(emit);
            }
        }
        self.pending.clear();
        arbiter.end();
        arbiter.configure(Role::Controller, self.saved.clone())?;
        self.state = CaptureState::Idle;
        log::info!("Capture: stopped, controller restored");
        Ok(())
    }

    fn emit_pending<F: FnMut(CaptureLine, &CapturedPacket)>(&mut self, emit: &mut F) {
        let line = self.mode.line();
        for packet in self.pending.drain(..) {
            if !packet.is_empty() {
                emit(line, &packet);
            }
        }
    }
}
