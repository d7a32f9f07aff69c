//! Syntax highlighting for the shell
//!
//! Provides instruction syntax highlighting, bracket matching, verb
//! completion, and input validation.

use busprobe_core::bus::Protocol;
use busprobe_core::command::Verb;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Context, Helper};
use std::borrow::Cow;
use std::ops::Range;

/// Lexical class of one token on the input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `[`
    Open,
    /// `]`
    Close,
    /// `0x..` literal, with or without a `:N` repeat
    Hex,
    /// `r:`, `f:` or `a:` operand
    Operand,
    /// Known verb
    Verb,
    /// Anything else
    Word,
}

/// Split `line` into tokens with their byte ranges
pub fn tokenize(line: &str) -> Vec<(Range<usize>, TokenKind)> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => tokens.push((i..i + 1, TokenKind::Open)),
            b']' => tokens.push((i..i + 1, TokenKind::Close)),
            b if b.is_ascii_whitespace() => {}
            _ => {
                let start = i;
                while i < bytes.len() && !matches!(bytes[i], b'[' | b']') && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                tokens.push((start..i, classify(&line[start..i])));
                continue;
            }
        }
        i += 1;
    }
    tokens
}

fn classify(word: &str) -> TokenKind {
    let lower = word.to_ascii_lowercase();
    if lower.starts_with("0x") {
        TokenKind::Hex
    } else if ["r:", "f:", "a:"].iter().any(|p| lower.starts_with(p)) {
        TokenKind::Operand
    } else if Verb::from_name(word).is_some() {
        TokenKind::Verb
    } else {
        TokenKind::Word
    }
}

/// Position of the bracket matching the one under or just before the cursor
pub fn matching_bracket(line: &str, pos: usize) -> Option<usize> {
    let bytes = line.as_bytes();
    let at = [Some(pos), pos.checked_sub(1)]
        .into_iter()
        .flatten()
        .find(|&p| matches!(bytes.get(p), Some(b'[') | Some(b']')))?;

    if bytes[at] == b'[' {
        let mut depth = 0usize;
        for (i, &b) in bytes.iter().enumerate().skip(at) {
            match b {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
    } else {
        let mut depth = 0usize;
        for i in (0..=at).rev() {
            match bytes[i] {
                b']' => depth += 1,
                b'[' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Helper struct for rustyline that provides syntax highlighting,
/// bracket matching, completion, and input validation.
#[derive(Helper)]
pub struct ReplHelper {
    /// Active protocol, for verb completion
    protocol: Protocol,
}

impl ReplHelper {
    /// Create a helper completing verbs for `protocol`
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    /// Switch the protocol used for completion
    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
    }

    /// Candidates for the word ending at `pos`, and where that word starts
    pub fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let head = &line[..pos];
        let start = head
            .rfind(|c: char| c.is_whitespace())
            .map_or(0, |i| i + 1);
        let prefix = &head[start..];
        let before: Vec<&str> = head[..start].split_whitespace().collect();

        let names: Vec<String> = match before.as_slice() {
            [] => Verb::for_protocol(self.protocol)
                .map(|v| v.name().to_owned())
                .collect(),
            ["mode"] => Protocol::ALL.iter().map(|p| p.name().to_owned()).collect(),
            _ => Vec::new(),
        };
        let matches = names
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .collect();
        (start, matches)
    }
}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let (start, names) = self.candidates(line, pos);
        let completions = names
            .into_iter()
            .map(|name| Pair {
                display: format!("{}", name.white()),
                replacement: name,
            })
            .collect();
        Ok((start, completions))
    }
}

impl Validator for ReplHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let balance = tokenize(ctx.input())
            .iter()
            .fold(0i32, |balance, (_, kind)| match kind {
                TokenKind::Open => balance + 1,
                TokenKind::Close => balance - 1,
                _ => balance,
            });

        // An open bracket continues on the next line
        if balance > 0 {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _context: &Context) -> Option<String> {
        None
    }
}

impl Highlighter for ReplHelper {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let partner = matching_bracket(line, pos);
        let mut highlighted = String::with_capacity(line.len() * 2);
        let mut last = 0;

        for (range, kind) in tokenize(line) {
            highlighted.push_str(&line[last..range.start]);
            let text = &line[range.clone()];
            let colored = match kind {
                TokenKind::Open | TokenKind::Close if partner == Some(range.start) => {
                    text.bright_blue().bold()
                }
                TokenKind::Open | TokenKind::Close => text.bold(),
                TokenKind::Hex => text.bright_yellow(),
                TokenKind::Operand => text.bright_cyan(),
                TokenKind::Verb => text.bright_purple(),
                TokenKind::Word => text.normal(),
            };
            highlighted.push_str(&colored.to_string());
            last = range.end;
        }
        highlighted.push_str(&line[last..]);
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, line: &str, _pos: usize, _forced: bool) -> bool {
        !line.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let kinds: Vec<TokenKind> = tokenize("[0x9F r:3]sniff x")
            .into_iter()
            .map(|(_, k)| k)
            .collect();
        assert_eq!(
            kinds,
            [
                TokenKind::Open,
                TokenKind::Hex,
                TokenKind::Operand,
                TokenKind::Close,
                TokenKind::Verb,
                TokenKind::Word
            ]
        );
        assert_eq!(tokenize("  [0xAB:4 ")[1].0, 3..9);
    }

    #[test]
    fn test_matching_bracket() {
        let line = "[0x01] [0x02]";
        assert_eq!(matching_bracket(line, 0), Some(5));
        assert_eq!(matching_bracket(line, 6), Some(0));
        assert_eq!(matching_bracket(line, 3), None);
        assert_eq!(matching_bracket("[0x01", 0), None);
    }

    #[test]
    fn test_verb_completion_follows_protocol() {
        let mut helper = ReplHelper::new(Protocol::Spi);
        assert_eq!(helper.candidates("sn", 2), (0, vec!["sniff".to_owned()]));
        assert!(helper.candidates("b", 1).1.is_empty());

        helper.set_protocol(Protocol::Uart);
        assert_eq!(helper.candidates("b", 1), (0, vec!["bridge".to_owned()]));
    }

    #[test]
    fn test_protocol_completion() {
        let helper = ReplHelper::new(Protocol::Spi);
        assert_eq!(
            helper.candidates("mode hd", 7),
            (5, vec!["hduart".to_owned()])
        );
        assert!(helper.candidates("sniff x", 7).1.is_empty());
    }
}
