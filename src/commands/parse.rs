//! Parse command implementation

use crate::error::AppError;
use busprobe_core::bytecode::to_canonical;
use busprobe_core::error::Error;
use busprobe_core::instruction;

/// Parse `text` and print its canonical form and ByteCode sequence
pub fn cmd_parse(text: &str) -> Result<(), AppError> {
    match instruction::parse(text) {
        Ok(codes) => {
            println!("{}", to_canonical(&codes));
            for code in &codes {
                println!("  {:?}", code);
            }
            Ok(())
        }
        Err(e) => {
            if let Error::Syntax { offset, .. } = e {
                eprintln!("{}", text);
                eprintln!("{}^", " ".repeat(offset));
            }
            Err(e.into())
        }
    }
}
