//! Transparent UART bridge
//!
//! Relays bytes typed by the user onto the bus and bytes received from the
//! bus back to the user until the stop signal fires. On half-duplex lines
//! the bridge remembers what it sent and drops those bytes when they come
//! back as echo.

use alloc::collections::VecDeque;

use crate::capture::StopSignal;
use crate::error::{Error, Result};

/// Byte-level access to a bound serial line
pub trait Relay {
    /// Send one byte
    fn transmit(&mut self, byte: u8) -> Result<()> {
        let _ = byte;
        Err(Error::Unsupported)
    }

    /// Take one received byte without waiting
    fn receive(&mut self) -> Result<Option<u8>> {
        Err(Error::Unsupported)
    }

    /// Returns true if transmitted bytes are received back
    fn echoes_transmit(&self) -> bool {
        false
    }
}

impl<T: Relay + ?Sized> Relay for &mut T {
    fn transmit(&mut self, byte: u8) -> Result<()> {
        (**self).transmit(byte)
    }

    fn receive(&mut self) -> Result<Option<u8>> {
        (**self).receive()
    }

    fn echoes_transmit(&self) -> bool {
        (**self).echoes_transmit()
    }
}

impl<T: Relay + ?Sized> Relay for alloc::boxed::Box<T> {
    fn transmit(&mut self, byte: u8) -> Result<()> {
        (**self).transmit(byte)
    }

    fn receive(&mut self) -> Result<Option<u8>> {
        (**self).receive()
    }

    fn echoes_transmit(&self) -> bool {
        (**self).echoes_transmit()
    }
}

/// Non-blocking source of user keystrokes
pub trait ByteSource {
    /// Next pending byte, if any
    fn next_byte(&mut self) -> Option<u8>;
}

impl<F: FnMut() -> Option<u8>> ByteSource for F {
    fn next_byte(&mut self) -> Option<u8> {
        self()
    }
}

/// Bridge state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Forwarding traffic
    Relaying,
    /// Stop signal observed
    Stopped,
}

/// Poll-driven bridge between the user and a serial line
#[derive(Debug)]
pub struct Bridge {
    echo: VecDeque<u8>,
    state: BridgeState,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    /// A bridge ready to relay
    pub fn new() -> Self {
        Self {
            echo: VecDeque::new(),
            state: BridgeState::Relaying,
        }
    }

    /// Current state
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// One tick: forward received bytes, send one pending input byte, then
    /// sample the stop signal
    pub fn poll<R, I, S, O>(
        &mut self,
        relay: &mut R,
        input: &mut I,
        stop: &mut S,
        mut output: O,
    ) -> Result<BridgeState>
    where
        R: Relay + ?Sized,
        I: ByteSource + ?Sized,
        S: StopSignal + ?Sized,
        O: FnMut(u8),
    {
        if self.state == BridgeState::Stopped {
            return Ok(self.state);
        }

        while let Some(byte) = relay.receive()? {
            match self.echo.front() {
                Some(&sent) if sent == byte => {
                    self.echo.pop_front();
                }
                Some(_) => {
                    // Echo lost or garbled; later bytes cannot be matched
                    log::debug!("Bridge: echo mismatch, dropping {} pending", self.echo.len());
                    self.echo.clear();
                    output(byte);
                }
                None => output(byte),
            }
        }

        if let Some(byte) = input.next_byte() {
            relay.transmit(byte)?;
            if relay.echoes_transmit() {
                self.echo.push_back(byte);
            }
        }

        if stop.stop_requested() {
            log::info!("Bridge: stopped by user");
            self.state = BridgeState::Stopped;
        }
        Ok(self.state)
    }
}
