//! Simulated UART line with a scripted peer on the far end

use std::collections::VecDeque;

use busprobe_core::arbiter::{Peripheral, Role};
use busprobe_core::bridge::Relay;
use busprobe_core::bus::uart::{self, UartBus};
use busprobe_core::bus::Executor;
use busprobe_core::bytecode::ByteCode;
use busprobe_core::capture::Follower;
use busprobe_core::config::{BusConfiguration, BusParams, UartParams};
use busprobe_core::error::{BusFailure, Error, RangeKind, Result};

/// Device on the other end of the line
pub trait UartPeer: Send {
    /// A byte arrived from us; queue any reply in `reply`
    fn on_byte(&mut self, byte: u8, reply: &mut VecDeque<u8>);
}

/// Sends every byte straight back
#[derive(Debug, Default)]
pub struct Loopback;

impl UartPeer for Loopback {
    fn on_byte(&mut self, byte: u8, reply: &mut VecDeque<u8>) {
        reply.push_back(byte);
    }
}

/// Line-oriented modem: answers each CR or LF terminated line with `OK`
#[derive(Debug, Default)]
pub struct LineModem {
    line: Vec<u8>,
}

impl UartPeer for LineModem {
    fn on_byte(&mut self, byte: u8, reply: &mut VecDeque<u8>) {
        match byte {
            b'\r' | b'\n' => {
                if !self.line.is_empty() {
                    self.line.clear();
                    reply.extend(b"\r\nOK\r\n");
                }
            }
            _ => self.line.push(byte),
        }
    }
}

/// Simulated UART or half-duplex UART
pub struct SimUart {
    peer: Box<dyn UartPeer>,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    params: Option<UartParams>,
    half_duplex: bool,
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new(Box::new(LineModem::default()))
    }
}

impl SimUart {
    /// Line connected to `peer`
    pub fn new(peer: Box<dyn UartPeer>) -> Self {
        Self {
            peer,
            rx: VecDeque::new(),
            tx: Vec::new(),
            params: None,
            half_duplex: false,
        }
    }

    /// Line with a loopback plug
    pub fn loopback() -> Self {
        Self::new(Box::new(Loopback))
    }

    /// Queue bytes as if the peer sent them unprompted
    pub fn inject_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Everything transmitted so far
    pub fn transmitted(&self) -> &[u8] {
        &self.tx
    }

    /// Active line parameters
    pub fn params(&self) -> Option<&UartParams> {
        self.params.as_ref()
    }

    fn check_bound(&self) -> Result<()> {
        match self.params {
            Some(_) => Ok(()),
            None => Err(Error::Bus(BusFailure::NotConfigured)),
        }
    }
}

impl Peripheral for SimUart {
    fn bind(&mut self, role: Role, config: &BusConfiguration) -> Result<()> {
        if role != Role::Controller {
            return Err(Error::Unsupported);
        }
        let (params, half_duplex) = match config.params {
            BusParams::Uart(params) => (params, false),
            BusParams::HdUart(params) => (params, true),
            _ => return Err(Error::Unsupported),
        };
        if !config.is_complete() {
            return Err(Error::Range(RangeKind::Parameter));
        }
        log::debug!(
            "SimUart: {} baud, {}{}{}{}",
            params.baud,
            params.data_bits,
            params.parity.letter(),
            params.stop_bits,
            if half_duplex { " half-duplex" } else { "" }
        );
        self.params = Some(params);
        self.half_duplex = half_duplex;
        self.rx.clear();
        Ok(())
    }

    fn release(&mut self) {
        self.params = None;
    }
}

impl UartBus for SimUart {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.check_bound()?;
        self.tx.push(byte);
        if self.half_duplex {
            // Our own byte shows up on the shared wire first
            self.rx.push_back(byte);
        }
        self.peer.on_byte(byte, &mut self.rx);
        Ok(())
    }

    fn read_byte(&mut self, _timeout_ms: u32) -> Result<Option<u8>> {
        self.check_bound()?;
        Ok(self.rx.pop_front())
    }

    fn timeout_ms(&self) -> u32 {
        self.params.map_or(0, |p| p.timeout_ms)
    }

    fn is_half_duplex(&self) -> bool {
        self.half_duplex
    }

    fn set_baud(&mut self, baud: u32) -> Result<()> {
        let params = self
            .params
            .as_mut()
            .ok_or(Error::Bus(BusFailure::NotConfigured))?;
        let mut updated = *params;
        updated.baud = baud;
        updated.validate()?;
        *params = updated;
        Ok(())
    }
}

impl Executor for SimUart {
    fn execute(&mut self, codes: &[ByteCode]) -> Result<Vec<u8>> {
        uart::execute(self, codes)
    }
}

impl Relay for SimUart {
    fn transmit(&mut self, byte: u8) -> Result<()> {
        self.write_byte(byte)
    }

    fn receive(&mut self) -> Result<Option<u8>> {
        self.read_byte(0)
    }

    fn echoes_transmit(&self) -> bool {
        self.half_duplex
    }
}

impl Follower for SimUart {}
