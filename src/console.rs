//! Host-side stop signals and keystrokes for capture and bridge sessions
//!
//! On the probe a session ends on Enter or on the device button. On the
//! host, Enter is a line on stdin and the button is Ctrl-C.

use crate::error::AppError;
use busprobe_core::bridge::ByteSource;
use busprobe_core::capture::StopSignal;
use busprobe_core::device::StopSource;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Interval between polls of a running session
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// What a running session polls besides the bus
pub trait Console {
    /// A stop signal for a session stopped by `source`
    fn stop_signal(&mut self, source: StopSource) -> Box<dyn StopSignal>;

    /// Bytes typed by the user, for the bridge
    fn keystrokes(&mut self) -> Box<dyn ByteSource>;

    /// Called between polls
    fn idle(&mut self) {}

    /// Called once a session has ended
    fn release(&mut self) {}
}

/// The terminal
pub struct StdConsole {
    interrupted: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl StdConsole {
    /// Install the Ctrl-C handler
    ///
    /// Can only be done once per process.
    pub fn new() -> Result<Self, AppError> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;
        Ok(Self {
            interrupted,
            readers: Vec::new(),
        })
    }
}

impl Console for StdConsole {
    fn stop_signal(&mut self, source: StopSource) -> Box<dyn StopSignal> {
        self.interrupted.store(false, Ordering::SeqCst);
        let interrupted = self.interrupted.clone();
        match source {
            StopSource::Button => Box::new(move || interrupted.swap(false, Ordering::SeqCst)),
            StopSource::Enter => {
                let pressed = Arc::new(AtomicBool::new(false));
                let flag = pressed.clone();
                self.readers.push(thread::spawn(move || {
                    let mut line = String::new();
                    let _ = io::stdin().read_line(&mut line);
                    flag.store(true, Ordering::SeqCst);
                }));
                Box::new(move || {
                    pressed.load(Ordering::SeqCst) || interrupted.swap(false, Ordering::SeqCst)
                })
            }
        }
    }

    fn keystrokes(&mut self) -> Box<dyn ByteSource> {
        let (tx, rx) = mpsc::channel();
        self.readers.push(thread::spawn(move || {
            for byte in io::stdin().lock().bytes() {
                match byte {
                    Ok(b) if tx.send(b).is_ok() => {}
                    _ => break,
                }
            }
        }));
        Box::new(move || rx.try_recv().ok())
    }

    fn idle(&mut self) {
        thread::sleep(POLL_INTERVAL);
    }

    fn release(&mut self) {
        // A reader still blocked on stdin would swallow the next shell line
        if self.readers.iter().any(|r| !r.is_finished()) {
            println!("Press Enter to return to the shell.");
        }
        for reader in self.readers.drain(..) {
            if reader.join().is_err() {
                log::warn!("stdin reader panicked");
            }
        }
    }
}

/// A console for scripts and tests
///
/// Every session runs for a fixed number of polls and the bridge reads
/// pre-recorded keystrokes.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    ticks: usize,
    keys: VecDeque<u8>,
}

impl ScriptedConsole {
    /// Stop each session after `ticks` polls
    pub fn new(ticks: usize) -> Self {
        Self {
            ticks,
            keys: VecDeque::new(),
        }
    }

    /// Keystrokes the next bridge session reads
    #[cfg(test)]
    pub fn with_keys(mut self, keys: &[u8]) -> Self {
        self.keys.extend(keys);
        self
    }
}

impl Console for ScriptedConsole {
    fn stop_signal(&mut self, _source: StopSource) -> Box<dyn StopSignal> {
        let mut remaining = self.ticks;
        Box::new(move || {
            if remaining == 0 {
                return true;
            }
            remaining -= 1;
            false
        })
    }

    fn keystrokes(&mut self) -> Box<dyn ByteSource> {
        let mut keys = std::mem::take(&mut self.keys);
        Box::new(move || keys.pop_front())
    }
}
