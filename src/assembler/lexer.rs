//! Line-level lexing shared by every stage: token extraction with the comma
//! placement rules, name validation and the source line limits.

use std::sync::LazyLock;

use regex::Regex;

use crate::assembler::Error;
use crate::assembler::instructions;
use crate::assembler::preprocessor::MacroTable;

/// A source line longer than this is reported and truncated.
pub const MAX_LINE_LEN: usize = 80;

/// Symbol and macro names are capped at this many characters.
pub const MAX_NAME_LEN: usize = 31;

static SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z][A-Za-z0-9]*$").unwrap());
static MACRO_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static STRING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*"([^"]*)"(.*)$"#).unwrap());

/// Cursor over one source line.
///
/// Tokens are maximal runs of characters containing no whitespace, comma or
/// colon. A comma must appear exactly once between the two operands of an
/// instruction, exactly once between two `.data` values, and nowhere else;
/// [`LineCursor::token_checked`] enforces those counts while advancing.
pub struct LineCursor<'a> {
    line: &'a str,
    pos: usize,
    line_number: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(line: &'a str, line_number: usize) -> Self {
        LineCursor { line, pos: 0, line_number }
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn peek(&self) -> Option<u8> {
        self.line.as_bytes().get(self.pos).copied()
    }

    /// True once every character of the line has been consumed
    pub fn at_line_end(&self) -> bool {
        self.pos >= self.line.len()
    }

    /// Consume whitespace and commas, requiring exactly `expected` commas.
    /// Reaching the end of the line is fine with zero commas; a comma with
    /// nothing after it is always an error.
    fn skip_separators(&mut self, expected: usize) -> Result<(), Error> {
        let mut commas = 0;
        while let Some(byte) = self.peek() {
            if byte == b',' {
                commas += 1;
            } else if !byte.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        if self.at_line_end() {
            return if commas == 0 {
                Ok(())
            } else {
                Err(Error::TrailingComma { line: self.line_number })
            };
        }
        match commas.cmp(&expected) {
            std::cmp::Ordering::Less => Err(Error::MissingComma { line: self.line_number }),
            std::cmp::Ordering::Greater => Err(Error::ExtraComma { line: self.line_number }),
            std::cmp::Ordering::Equal => Ok(()),
        }
    }

    fn read_token(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() || byte == b',' || byte == b':' {
                break;
            }
            self.pos += 1;
        }
        &self.line[start..self.pos]
    }

    /// Read a token with comma counting on both sides. `before` is the comma
    /// count expected in front of the token, `after` the count expected
    /// behind it (unless the line ends first).
    pub fn token_checked(&mut self, before: usize, after: usize) -> Result<&'a str, Error> {
        self.skip_separators(before)?;
        let token = self.read_token();
        self.skip_separators(after)?;
        Ok(token)
    }

    /// Read a token with no comma validation, silently stepping over a
    /// single trailing comma. The second pass walks lines this way: comma
    /// placement was already enforced in the first pass.
    pub fn token(&mut self) -> &'a str {
        while matches!(self.peek(), Some(byte) if byte.is_ascii_whitespace()) {
            self.pos += 1;
        }
        let token = self.read_token();
        if self.peek() == Some(b',') {
            self.pos += 1;
        }
        token
    }

    /// If the cursor sits on a label-terminating `:` followed by whitespace,
    /// consume the colon and return true.
    pub fn label_colon(&mut self) -> bool {
        if self.peek() == Some(b':')
            && matches!(self.line.as_bytes().get(self.pos + 1), Some(byte) if byte.is_ascii_whitespace())
        {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Everything from the cursor to the end of the line
    pub fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }

    /// Error unless nothing but whitespace remains. `after` names the
    /// construct just finished, for the diagnostic text.
    pub fn expect_end(&mut self, after: &'static str) -> Result<(), Error> {
        let token = self.token();
        if token.is_empty() {
            Ok(())
        } else {
            Err(Error::ExtraText {
                line: self.line_number,
                text: token.to_string(),
                after,
            })
        }
    }
}

/// Split a `.string` operand into its quoted content and whatever trails the
/// closing quote. `None` when there is no properly quoted content at all.
pub fn string_literal(rest: &str) -> Option<(&str, &str)> {
    let caps = STRING_RE.captures(rest)?;
    let content = caps.get(1)?.as_str();
    let trailing = caps.get(2)?.as_str();
    Some((content, trailing))
}

/// Validate a symbol name: non-empty, at most [`MAX_NAME_LEN`] characters,
/// a letter followed by letters and digits, not reserved and not shadowing
/// a macro.
pub fn check_symbol_name(name: &str, line: usize, macros: &MacroTable) -> Result<(), Error> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::SymbolTooLong { line, name: name.to_string() });
    }
    if name.is_empty() {
        return Err(Error::MissingLabelName { line });
    }
    if instructions::is_reserved(name) {
        return Err(Error::SymbolReserved { line, name: name.to_string() });
    }
    if macros.contains(name) {
        return Err(Error::SymbolIsMacro { line, name: name.to_string() });
    }
    if !SYMBOL_RE.is_match(name) {
        return if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            Err(Error::SymbolBadStart { line, name: name.to_string() })
        } else {
            Err(Error::SymbolBadChar { line, name: name.to_string() })
        };
    }
    Ok(())
}

/// Validate a macro name: at most [`MAX_NAME_LEN`] characters, a letter or
/// underscore followed by letters, digits and underscores, not reserved.
pub fn check_macro_name(name: &str, line: usize) -> Result<(), Error> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::MacroNameTooLong { line, name: name.to_string() });
    }
    if instructions::is_reserved(name) {
        return Err(Error::MacroNameReserved { line, name: name.to_string() });
    }
    if !MACRO_NAME_RE.is_match(name) {
        return Err(Error::BadMacroName { line, name: name.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_stop_at_whitespace_comma_and_colon() {
        let mut cur = LineCursor::new("LOOP: mov r1, r2", 1);
        assert_eq!(cur.token(), "LOOP");
        assert!(cur.label_colon());
        assert_eq!(cur.token(), "mov");
        assert_eq!(cur.token(), "r1");
        assert_eq!(cur.token(), "r2");
        assert_eq!(cur.token(), "");
    }

    #[test]
    fn checked_token_requires_the_comma_between_operands() {
        let mut cur = LineCursor::new("mov r1 r2", 1);
        assert_eq!(cur.token_checked(0, 0).unwrap(), "mov");
        assert_eq!(
            cur.token_checked(0, 1),
            Err(Error::MissingComma { line: 1 })
        );
    }

    #[test]
    fn checked_token_rejects_doubled_commas() {
        let mut cur = LineCursor::new("mov r1,, r2", 1);
        assert_eq!(cur.token_checked(0, 0).unwrap(), "mov");
        assert_eq!(cur.token_checked(0, 1), Err(Error::ExtraComma { line: 1 }));
    }

    #[test]
    fn checked_token_rejects_comma_after_first_word() {
        let mut cur = LineCursor::new("mov, r1, r2", 3);
        assert_eq!(cur.token_checked(0, 0), Err(Error::ExtraComma { line: 3 }));
    }

    #[test]
    fn checked_token_rejects_trailing_comma() {
        let mut cur = LineCursor::new("mov r1, r2,", 2);
        assert_eq!(cur.token_checked(0, 0).unwrap(), "mov");
        assert_eq!(cur.token_checked(0, 1).unwrap(), "r1");
        assert_eq!(
            cur.token_checked(0, 0),
            Err(Error::TrailingComma { line: 2 })
        );
    }

    #[test]
    fn missing_second_operand_reads_as_empty_token() {
        let mut cur = LineCursor::new("mov r1", 1);
        assert_eq!(cur.token_checked(0, 0).unwrap(), "mov");
        assert_eq!(cur.token_checked(0, 1).unwrap(), "r1");
        assert_eq!(cur.token_checked(0, 0).unwrap(), "");
    }

    #[test]
    fn label_colon_needs_trailing_whitespace() {
        let mut cur = LineCursor::new("X:.data 1", 1);
        assert_eq!(cur.token(), "X");
        assert!(!cur.label_colon());
    }

    #[test]
    fn expect_end_flags_leftover_text() {
        let mut cur = LineCursor::new("rts now", 4);
        assert_eq!(cur.token(), "rts");
        assert_eq!(
            cur.expect_end("finishing a command"),
            Err(Error::ExtraText {
                line: 4,
                text: "now".to_string(),
                after: "finishing a command"
            })
        );
    }

    #[test]
    fn string_literal_splits_content_and_trailing_text() {
        assert_eq!(string_literal(r#" "abc" "#), Some(("abc", " ")));
        assert_eq!(string_literal(r#""a b""#), Some(("a b", "")));
        assert_eq!(string_literal(r#""" "#), Some(("", " ")));
        assert_eq!(string_literal(r#""abc" junk"#), Some(("abc", " junk")));
        assert_eq!(string_literal(r#""abc"#), None);
        assert_eq!(string_literal("abc"), None);
    }

    #[test]
    fn symbol_names() {
        let macros = MacroTable::default();
        assert!(check_symbol_name("LOOP", 1, &macros).is_ok());
        assert!(check_symbol_name("a1b2", 1, &macros).is_ok());
        assert_eq!(
            check_symbol_name("1abc", 1, &macros),
            Err(Error::SymbolBadStart { line: 1, name: "1abc".to_string() })
        );
        assert_eq!(
            check_symbol_name("a_b", 1, &macros),
            Err(Error::SymbolBadChar { line: 1, name: "a_b".to_string() })
        );
        assert_eq!(
            check_symbol_name("mov", 1, &macros),
            Err(Error::SymbolReserved { line: 1, name: "mov".to_string() })
        );
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            check_symbol_name(&long, 1, &macros),
            Err(Error::SymbolTooLong { line: 1, name: long.clone() })
        );
    }

    #[test]
    fn macro_names_allow_underscores() {
        assert!(check_macro_name("_loop_1", 1).is_ok());
        assert!(check_macro_name("setup", 1).is_ok());
        assert_eq!(
            check_macro_name("2fast", 1),
            Err(Error::BadMacroName { line: 1, name: "2fast".to_string() })
        );
        assert_eq!(
            check_macro_name("stop", 1),
            Err(Error::MacroNameReserved { line: 1, name: "stop".to_string() })
        );
    }
}
