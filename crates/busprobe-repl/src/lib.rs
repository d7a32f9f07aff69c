//! Interactive line input for the busprobe shell
//!
//! Wraps rustyline with instruction-aware highlighting, bracket matching,
//! verb completion and persistent history. Anything that reads lines for
//! the shell goes through [`LineSource`], so scripted input can stand in
//! for a terminal.
//!
//! # Example Session
//!
//! ```text
//! SPI> [0x9F r:3]
//! EF 40 18
//! SPI> mode i2c
//! I2C> [0xA0 0x00] [0xA1 r:4]
//! FF FF FF FF
//! ```

mod error;
pub mod highlight;

pub use error::ReplError;

use crate::highlight::ReplHelper;
use busprobe_core::bus::Protocol;
use colored::Colorize;
use directories::ProjectDirs;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::Editor;
use std::collections::VecDeque;
use std::path::PathBuf;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One read from a line source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A complete line
    Line(String),
    /// Ctrl-C at the prompt
    Interrupted,
    /// End of input
    Eof,
}

/// Source of shell input lines
pub trait LineSource {
    /// Show `prompt` and read one line
    fn read_line(&mut self, prompt: &str) -> Result<Input, ReplError>;

    /// Update completion for the active protocol
    fn set_protocol(&mut self, protocol: Protocol) {
        let _ = protocol;
    }
}

impl<T: LineSource + ?Sized> LineSource for &mut T {
    fn read_line(&mut self, prompt: &str) -> Result<Input, ReplError> {
        (**self).read_line(prompt)
    }

    fn set_protocol(&mut self, protocol: Protocol) {
        (**self).set_protocol(protocol)
    }
}

/// Get the ASCII art banner
pub fn banner() -> String {
    format!(
        r#"
   _
  | |__ _  _ ___ _ __ _ _ ___ | |__  ___
  | '_ \ || (_-<| '_ \ '_/ _ \| '_ \/ -_)   Version {}
  |_.__/\_,_/__/| .__/_| \___/|_.__/\___|   type help for commands
                |_|
"#,
        VERSION
    )
    .bright_yellow()
    .bold()
    .to_string()
}

/// Get the history file path
fn history_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "busprobe") {
        let mut path = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&path).ok();
        path.push("shell_history");
        path
    } else {
        PathBuf::from(".busprobe_history")
    }
}

/// Terminal line editor with history
pub struct LineEditor {
    rl: Editor<ReplHelper, FileHistory>,
    history_path: PathBuf,
}

impl LineEditor {
    /// Create an editor and load saved history
    pub fn new(protocol: Protocol) -> Result<Self, ReplError> {
        let mut rl = Editor::<ReplHelper, FileHistory>::new()?;
        rl.set_helper(Some(ReplHelper::new(protocol)));
        rl.set_check_cursor_position(true);

        let history_path = history_path();
        if rl.load_history(&history_path).is_err() {
            log::debug!("No history at {}", history_path.display());
        }
        Ok(Self { rl, history_path })
    }
}

impl LineSource for LineEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Input, ReplError> {
        match self.rl.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.rl.add_history_entry(line.as_str());
                }
                Ok(Input::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn set_protocol(&mut self, protocol: Protocol) {
        if let Some(helper) = self.rl.helper_mut() {
            helper.set_protocol(protocol);
        }
    }
}

impl Drop for LineEditor {
    fn drop(&mut self) {
        if let Err(e) = self.rl.save_history(&self.history_path) {
            eprintln!(
                "{}: Failed to save history: {}",
                "Warning".bright_yellow(),
                e
            );
        }
    }
}

/// Pre-recorded input, for scripts and tests
#[derive(Debug, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
    echo: bool,
}

impl ScriptedInput {
    /// Input that yields `lines` in order, then end of input
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            echo: false,
        }
    }

    /// Print each prompt and line as it is consumed
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Lines not yet read
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl LineSource for ScriptedInput {
    fn read_line(&mut self, prompt: &str) -> Result<Input, ReplError> {
        match self.lines.pop_front() {
            Some(line) => {
                if self.echo {
                    println!("{}{}", prompt, line);
                }
                Ok(Input::Line(line))
            }
            None => Ok(Input::Eof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_input() {
        let mut input = ScriptedInput::new(["[0x9F r:3]", "exit"]);
        assert_eq!(
            input.read_line("> ").unwrap(),
            Input::Line("[0x9F r:3]".into())
        );
        assert_eq!(input.remaining(), 1);
        assert_eq!(input.read_line("> ").unwrap(), Input::Line("exit".into()));
        assert_eq!(input.read_line("> ").unwrap(), Input::Eof);
    }

    #[test]
    fn test_line_source_through_reference() {
        fn first(mut source: impl LineSource) -> Input {
            source.read_line("").unwrap()
        }
        let mut input = ScriptedInput::new(["help"]);
        assert_eq!(first(&mut input), Input::Line("help".into()));
        assert_eq!(input.remaining(), 0);
    }
}
