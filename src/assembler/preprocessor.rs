//! The macro expansion stage.
//!
//! Reads the raw source line by line and produces the expanded text both
//! passes consume. A block
//!
//! ```ignore
//! mcro NAME
//!     <body lines>
//! mcroend
//! ```
//!
//! records `<body lines>` under `NAME`; afterwards any line consisting of
//! `NAME` alone is replaced by the recorded body. `mcro` and `mcroend` must
//! start at the beginning of their lines, and nothing may follow the macro
//! name on the `mcro` line or the `mcroend` keyword. Blank lines and
//! `;` comments are dropped, both from the output and from macro bodies.

use crate::assembler::Error;
use crate::assembler::lexer::{self, MAX_LINE_LEN};

/// A recorded macro: its name and the body lines, stored verbatim
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub body: String,
}

/// All macros defined by one translation unit
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: Vec<Macro>,
}

impl MacroTable {
    pub fn contains(&self, name: &str) -> bool {
        self.macros.iter().any(|m| m.name == name)
    }

    pub fn body(&self, name: &str) -> Option<&str> {
        self.macros.iter().find(|m| m.name == name).map(|m| m.body.as_str())
    }

    fn open(&mut self, name: &str) {
        self.macros.push(Macro { name: name.to_string(), body: String::new() });
    }

    fn push_body_line(&mut self, line: &str) {
        if let Some(open) = self.macros.last_mut() {
            open.body.push_str(line);
            open.body.push('\n');
        }
    }
}

/// What the pre-assembler hands to the rest of the pipeline
#[derive(Debug)]
pub struct Expansion {
    pub text: String,
    pub macros: MacroTable,
    pub errors: Vec<Error>,
}

#[derive(Clone, Copy)]
enum State {
    Normal,
    /// Between `mcro NAME` and `mcroend`, collecting body lines
    InMacro,
    /// Between an invalid `mcro` line and `mcroend`; body lines are dropped
    InBadMacro,
}

/// Run the pre-assembler over the raw source text
pub fn expand(source: &str) -> Expansion {
    let mut macros = MacroTable::default();
    let mut text = String::new();
    let mut errors = Vec::new();
    let mut state = State::Normal;
    let mut open_line = 0;

    for (index, raw) in source.lines().enumerate() {
        let line_number = index + 1;
        let line = clip(raw, line_number, &mut errors);

        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }

        match state {
            State::InMacro | State::InBadMacro => {
                if trimmed.split_whitespace().next() == Some("mcroend") {
                    if !line.starts_with("mcroend") {
                        errors.push(Error::MacroEndNotAtLineStart { line: line_number });
                    } else if !line["mcroend".len()..].trim().is_empty() {
                        errors.push(Error::MacroEndTrailingText { line: line_number });
                    } else {
                        state = State::Normal;
                    }
                } else if matches!(state, State::InMacro) {
                    macros.push_body_line(line);
                }
            }
            State::Normal => {
                let mut words = line.split_whitespace();
                let first = words.next().unwrap_or("");

                if first == "mcro" {
                    open_line = line_number;
                    if !line.starts_with("mcro") {
                        errors.push(Error::MacroNotAtLineStart { line: line_number });
                        continue;
                    }
                    state = match definition(words, line_number, &mut macros) {
                        Ok(()) => State::InMacro,
                        Err(error) => {
                            errors.push(error);
                            State::InBadMacro
                        }
                    };
                } else if macros.contains(first) {
                    if let Some(extra) = words.next() {
                        errors.push(Error::ExtraText {
                            line: line_number,
                            text: extra.to_string(),
                            after: "a macro call",
                        });
                    } else if let Some(body) = macros.body(first) {
                        text.push_str(body);
                    }
                } else {
                    text.push_str(line);
                    text.push('\n');
                }
            }
        }
    }

    if !matches!(state, State::Normal) {
        errors.push(Error::UnterminatedMacro { line: open_line });
    }

    Expansion { text, macros, errors }
}

/// Handle the remainder of a `mcro` line: the name and nothing else
fn definition<'a>(
    mut words: impl Iterator<Item = &'a str>,
    line_number: usize,
    macros: &mut MacroTable,
) -> Result<(), Error> {
    let Some(name) = words.next() else {
        return Err(Error::MissingMacroName { line: line_number });
    };
    if words.next().is_some() {
        return Err(Error::MacroTrailingText { line: line_number });
    }
    lexer::check_macro_name(name, line_number)?;
    if macros.contains(name) {
        return Err(Error::DuplicateMacro { line: line_number, name: name.to_string() });
    }
    macros.open(name);
    Ok(())
}

/// Enforce the line length limit, reporting and truncating over-long lines
fn clip<'a>(raw: &'a str, line_number: usize, errors: &mut Vec<Error>) -> &'a str {
    if raw.len() <= MAX_LINE_LEN {
        return raw;
    }
    errors.push(Error::LineTooLong { line: line_number });
    let mut cut = MAX_LINE_LEN;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    &raw[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_plain_lines_and_drops_blanks_and_comments() {
        let expansion = expand("mov r1, r2\n\n; a comment\n  stop\n");
        assert!(expansion.errors.is_empty());
        assert_eq!(expansion.text, "mov r1, r2\n  stop\n");
    }

    #[test]
    fn expands_a_macro_call_to_its_body() {
        let source = "mcro K\n  mov r1, r2\nmcroend\nK\n";
        let expansion = expand(source);
        assert!(expansion.errors.is_empty());
        assert_eq!(expansion.text, "  mov r1, r2\n");
        assert_eq!(expansion.macros.body("K"), Some("  mov r1, r2\n"));
    }

    #[test]
    fn a_macro_can_hold_several_lines_and_expand_twice() {
        let source = "mcro pair\nclr r1\nclr r2\nmcroend\npair\nstop\npair\n";
        let expansion = expand(source);
        assert!(expansion.errors.is_empty());
        assert_eq!(expansion.text, "clr r1\nclr r2\nstop\nclr r1\nclr r2\n");
    }

    #[test]
    fn reserved_macro_name_is_reported() {
        let expansion = expand("mcro mov\nclr r1\nmcroend\n");
        assert_eq!(
            expansion.errors,
            vec![Error::MacroNameReserved { line: 1, name: "mov".to_string() }]
        );
        assert!(!expansion.macros.contains("mov"));
    }

    #[test]
    fn bad_macro_body_is_not_emitted() {
        let expansion = expand("mcro 9bad\nclr r1\nmcroend\nstop\n");
        assert_eq!(
            expansion.errors,
            vec![Error::BadMacroName { line: 1, name: "9bad".to_string() }]
        );
        assert_eq!(expansion.text, "stop\n");
    }

    #[test]
    fn duplicate_macro_definition_is_an_error() {
        let source = "mcro K\nclr r1\nmcroend\nmcro K\nclr r2\nmcroend\n";
        let expansion = expand(source);
        assert_eq!(
            expansion.errors,
            vec![Error::DuplicateMacro { line: 4, name: "K".to_string() }]
        );
        assert_eq!(expansion.macros.body("K"), Some("clr r1\n"));
    }

    #[test]
    fn text_after_the_macro_name_is_an_error() {
        let expansion = expand("mcro K extra\nclr r1\nmcroend\n");
        assert_eq!(expansion.errors, vec![Error::MacroTrailingText { line: 1 }]);
    }

    #[test]
    fn text_after_mcroend_is_an_error() {
        let expansion = expand("mcro K\nclr r1\nmcroend extra\nmcroend\n");
        assert_eq!(expansion.errors, vec![Error::MacroEndTrailingText { line: 3 }]);
        assert_eq!(expansion.macros.body("K"), Some("clr r1\n"));
    }

    #[test]
    fn indented_mcroend_is_an_error() {
        let expansion = expand("mcro K\nclr r1\n  mcroend\nmcroend\n");
        assert_eq!(
            expansion.errors,
            vec![Error::MacroEndNotAtLineStart { line: 3 }]
        );
    }

    #[test]
    fn indented_mcro_is_an_error() {
        let expansion = expand("  mcro K\nclr r1\nmcroend\n");
        assert_eq!(expansion.errors[0], Error::MacroNotAtLineStart { line: 1 });
    }

    #[test]
    fn unterminated_macro_is_an_error() {
        let expansion = expand("mcro K\nclr r1\n");
        assert_eq!(expansion.errors, vec![Error::UnterminatedMacro { line: 1 }]);
    }

    #[test]
    fn macro_call_with_trailing_text_is_an_error() {
        let source = "mcro K\nclr r1\nmcroend\nK r2\n";
        let expansion = expand(source);
        assert_eq!(
            expansion.errors,
            vec![Error::ExtraText { line: 4, text: "r2".to_string(), after: "a macro call" }]
        );
    }

    #[test]
    fn long_lines_are_reported_and_truncated() {
        let long = "a".repeat(MAX_LINE_LEN + 10);
        let expansion = expand(&long);
        assert_eq!(expansion.errors, vec![Error::LineTooLong { line: 1 }]);
        assert_eq!(expansion.text.trim_end().len(), MAX_LINE_LEN);
    }

    #[test]
    fn comments_inside_macro_bodies_are_dropped() {
        let source = "mcro K\n; nothing\nclr r1\nmcroend\nK\n";
        let expansion = expand(source);
        assert!(expansion.errors.is_empty());
        assert_eq!(expansion.text, "clr r1\n");
    }
}
