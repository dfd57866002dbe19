//! Translates assembly source for a 24-bit word machine into object code,
//! in three stages per translation unit
//!
//! 1. The pre-assembler ([`preprocessor`]) expands `mcro`/`mcroend` blocks
//!    and writes the expanded source.
//! 2. The first pass ([`first_pass`]) classifies every line, collects the
//!    symbol table and emits every word whose encoding does not depend on a
//!    label, reserving placeholder words for the rest.
//! 3. The second pass ([`second_pass`]) retraces the instruction image,
//!    fills the placeholders with resolved addresses and logs every use of
//!    an external symbol.
//!
//! Comments start with a semicolon (`;`) as the first non-blank character
//! and run to the end of the line. A line holds at most one statement,
//! optionally prefixed by a label:
//!
//! ```ignore
//! ; count down from three
//! MAIN:   mov #3, r1
//! LOOP:   dec r1
//!         bne &LOOP
//!         stop
//! V:      .data 7, -1
//! MSG:    .string "done"
//! ```
//!
//! The sixteen instruction mnemonics take zero, one or two operands, each in
//! one of four addressing modes: immediate (`#7`), direct (`V`), relative
//! (`&LOOP`, jumps only) and register (`r1`..`r7`). The directives are
//! `.data` (signed words), `.string` (ASCII plus a zero terminator),
//! `.entry` (export a symbol) and `.extern` (import one).
//!
//! Errors never stop a stage: every line is checked so one run reports as
//! much as possible. A unit with errors produces no output files, but other
//! units on the command line are still processed.

pub mod first_pass;
pub mod instructions;
pub mod lexer;
pub mod output;
pub mod preprocessor;
pub mod second_pass;
pub mod symbols;

use std::fmt;
use std::fs;

use crate::logging;
use self::instructions::{AddressingMode, Slot};

/// Absolute address the code image is loaded at; the data image follows it.
pub const LOAD_ADDRESS: u32 = 100;

/// The rendered output files of one successfully assembled unit
#[derive(Debug)]
pub struct UnitOutput {
    /// The macro-expanded source (the `.am` file)
    pub expanded: String,
    /// The object file text (`.ob`)
    pub object: String,
    /// The entry symbols file (`.ent`), when the unit exports anything
    pub entries: Option<String>,
    /// The external use-sites file (`.ext`), when the unit references
    /// external symbols
    pub externals: Option<String>,
}

/// Assemble one unit from source text.
///
/// Stages run in order and a stage with errors stops the pipeline, returning
/// everything that stage reported.
pub fn assemble(source: &str) -> Result<UnitOutput, Vec<Error>> {
    let expansion = preprocessor::expand(source);
    if !expansion.errors.is_empty() {
        return Err(expansion.errors);
    }

    let (mut image, errors) = first_pass::run(&expansion.text, &expansion.macros);
    if !errors.is_empty() {
        return Err(errors);
    }

    let (exports, errors) = second_pass::run(&expansion.text, &mut image);
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(UnitOutput {
        object: output::object_file(&image),
        entries: exports.entries.then(|| output::entries_file(&image.symbols)),
        externals: exports.externals.then(|| output::externals_file(&image.symbols)),
        expanded: expansion.text,
    })
}

/// Assemble the unit named by `base`: read `base.as`, write `base.am`, and
/// on success write `base.ob` plus `base.ent` / `base.ext` as needed.
///
/// Returns whether the unit assembled cleanly; `Err` only for I/O failures.
/// Assembly errors are reported to the console as they are found.
pub fn assemble_base(base: &str) -> Result<bool, Error> {
    let source_path = format!("{base}.as");
    let source =
        fs::read_to_string(&source_path).map_err(|_| Error::ReadError { path: source_path })?;

    let expansion = preprocessor::expand(&source);
    let expanded_path = format!("{base}.am");
    fs::write(&expanded_path, &expansion.text)
        .map_err(|_| Error::WriteError { path: expanded_path })?;
    if !expansion.errors.is_empty() {
        report(&expansion.errors);
        return Ok(false);
    }

    let (mut image, errors) = first_pass::run(&expansion.text, &expansion.macros);
    if !errors.is_empty() {
        report(&errors);
        return Ok(false);
    }

    let (exports, errors) = second_pass::run(&expansion.text, &mut image);
    if !errors.is_empty() {
        report(&errors);
        return Ok(false);
    }

    let object_path = format!("{base}.ob");
    fs::write(&object_path, output::object_file(&image))
        .map_err(|_| Error::WriteError { path: object_path })?;
    if exports.entries {
        let path = format!("{base}.ent");
        fs::write(&path, output::entries_file(&image.symbols))
            .map_err(|_| Error::WriteError { path })?;
    }
    if exports.externals {
        let path = format!("{base}.ext");
        fs::write(&path, output::externals_file(&image.symbols))
            .map_err(|_| Error::WriteError { path })?;
    }
    Ok(true)
}

fn report(errors: &[Error]) {
    for error in errors {
        logging::error(error.to_string());
    }
}

/// An error that can occur during assembly
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A source line exceeds the 80 character limit
    LineTooLong { line: usize },
    /// `mcro` appeared with text in front of it
    MacroNotAtLineStart { line: usize },
    /// A `mcro` line with no name after the keyword
    MissingMacroName { line: usize },
    MacroNameTooLong { line: usize, name: String },
    MacroNameReserved { line: usize, name: String },
    /// A macro name breaking the letter/underscore-then-alphanumeric rule
    BadMacroName { line: usize, name: String },
    DuplicateMacro { line: usize, name: String },
    /// Text after the name on a `mcro` line
    MacroTrailingText { line: usize },
    /// `mcroend` appeared with text in front of it
    MacroEndNotAtLineStart { line: usize },
    MacroEndTrailingText { line: usize },
    /// The source ended inside a macro definition
    UnterminatedMacro { line: usize },
    SymbolTooLong { line: usize, name: String },
    MissingLabelName { line: usize },
    SymbolReserved { line: usize, name: String },
    /// A symbol sharing its name with a macro
    SymbolIsMacro { line: usize, name: String },
    SymbolBadStart { line: usize, name: String },
    SymbolBadChar { line: usize, name: String },
    SymbolRedefined { line: usize, name: String },
    /// A symbol declared both `.entry` and `.extern`
    EntryExternConflict { line: usize, name: String },
    /// An `.entry` symbol with no definition anywhere in the unit
    EntryUndefined { name: String },
    /// A line opening with something that is no statement or label
    InvalidFirstToken { line: usize, token: String },
    /// A label followed by something that is no statement
    LabelNeedsStatement { line: usize },
    MissingComma { line: usize },
    ExtraComma { line: usize },
    TrailingComma { line: usize },
    /// Leftover text after a complete statement
    ExtraText { line: usize, text: String, after: &'static str },
    MissingOperand { line: usize },
    /// An operand that fits no addressing mode
    InvalidOperand { line: usize, token: String },
    /// An addressing mode the mnemonic does not accept in that slot
    UnsupportedAddressing { line: usize, mode: AddressingMode, slot: Slot },
    BadRegister { line: usize, token: String },
    /// A `#` with no number behind it
    MissingImmediate { line: usize },
    ImmediateOutOfRange { line: usize, token: String },
    NotAnInteger { line: usize, token: String },
    /// A `.data` directive without values
    EmptyData { line: usize },
    DataOutOfRange { line: usize, token: String },
    MissingQuote { line: usize },
    UndefinedLabel { line: usize, name: String },
    RelativeToExternal { line: usize, name: String },
    RelativeToData { line: usize, name: String },
    /// Code and data together overflow the 24-bit address space
    ProgramTooLarge,
    ReadError { path: String },
    WriteError { path: String },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LineTooLong { line } => {
                write!(f, "line {line}: line is too long")
            }
            Error::MacroNotAtLineStart { line } => {
                write!(f, "line {line}: a macro definition must start at the beginning of the line")
            }
            Error::MissingMacroName { line } => {
                write!(f, "line {line}: missing a macro name after 'mcro'")
            }
            Error::MacroNameTooLong { line, name } => {
                write!(f, "line {line}: the macro name ({name}) is too long")
            }
            Error::MacroNameReserved { line, name } => {
                write!(f, "line {line}: the macro name ({name}) is a reserved word")
            }
            Error::BadMacroName { line, name } => {
                write!(f, "line {line}: the macro name ({name}) is not valid")
            }
            Error::DuplicateMacro { line, name } => {
                write!(f, "line {line}: the macro ({name}) is already defined")
            }
            Error::MacroTrailingText { line } => {
                write!(f, "line {line}: additional characters after the macro name")
            }
            Error::MacroEndNotAtLineStart { line } => {
                write!(f, "line {line}: 'mcroend' must start at the beginning of the line")
            }
            Error::MacroEndTrailingText { line } => {
                write!(f, "line {line}: additional characters after 'mcroend'")
            }
            Error::UnterminatedMacro { line } => {
                write!(f, "line {line}: macro definition has no matching 'mcroend'")
            }
            Error::SymbolTooLong { line, name } => {
                write!(f, "line {line}: the symbol ({name}) is too long")
            }
            Error::MissingLabelName { line } => {
                write!(f, "line {line}: missing a label name")
            }
            Error::SymbolReserved { line, name } => {
                write!(f, "line {line}: the symbol ({name}) is a reserved word")
            }
            Error::SymbolIsMacro { line, name } => {
                write!(f, "line {line}: the symbol ({name}) is a macro")
            }
            Error::SymbolBadStart { line, name } => {
                write!(f, "line {line}: the symbol ({name}) must start with a letter")
            }
            Error::SymbolBadChar { line, name } => {
                write!(f, "line {line}: the symbol ({name}) must contain only letters and digits")
            }
            Error::SymbolRedefined { line, name } => {
                write!(f, "line {line}: the symbol ({name}) is already defined")
            }
            Error::EntryExternConflict { line, name } => {
                write!(f, "line {line}: the symbol ({name}) has been declared both as entry and external")
            }
            Error::EntryUndefined { name } => {
                write!(f, "the entry symbol ({name}) is never defined")
            }
            Error::InvalidFirstToken { line, token } => {
                write!(
                    f,
                    "line {line}: the first word ({token}) is not a valid command, directive or label definition"
                )
            }
            Error::LabelNeedsStatement { line } => {
                write!(f, "line {line}: a label must be followed by a valid command or data declaration")
            }
            Error::MissingComma { line } => {
                write!(f, "line {line}: missing a comma")
            }
            Error::ExtraComma { line } => {
                write!(f, "line {line}: invalid extra comma")
            }
            Error::TrailingComma { line } => {
                write!(f, "line {line}: invalid extra comma at the end of the line")
            }
            Error::ExtraText { line, text, after } => {
                write!(f, "line {line}: illegal extra characters ({text}) after {after}")
            }
            Error::MissingOperand { line } => {
                write!(f, "line {line}: missing operand")
            }
            Error::InvalidOperand { line, token } => {
                write!(f, "line {line}: the operand ({token}) fits no addressing mode")
            }
            Error::UnsupportedAddressing { line, mode, slot } => {
                write!(f, "line {line}: the command does not support {mode} for the {slot} operand")
            }
            Error::BadRegister { line, token } => {
                write!(f, "line {line}: ({token}) is not a valid register, expected r1..r7")
            }
            Error::MissingImmediate { line } => {
                write!(f, "line {line}: missing a number after '#'")
            }
            Error::ImmediateOutOfRange { line, token } => {
                write!(f, "line {line}: the immediate value ({token}) is out of range")
            }
            Error::NotAnInteger { line, token } => {
                write!(f, "line {line}: ({token}) is not an integer")
            }
            Error::EmptyData { line } => {
                write!(f, "line {line}: no numbers in .data declaration")
            }
            Error::DataOutOfRange { line, token } => {
                write!(f, "line {line}: invalid number ({token}) in .data declaration, out of range")
            }
            Error::MissingQuote { line } => {
                write!(f, "line {line}: missing a quotation mark")
            }
            Error::UndefinedLabel { line, name } => {
                write!(f, "line {line}: the operand ({name}) is an undefined label")
            }
            Error::RelativeToExternal { line, name } => {
                write!(
                    f,
                    "line {line}: the symbol ({name}) is external and cannot be used with relative addressing"
                )
            }
            Error::RelativeToData { line, name } => {
                write!(
                    f,
                    "line {line}: the symbol ({name}) is a data symbol and cannot be used with relative addressing"
                )
            }
            Error::ProgramTooLarge => {
                write!(f, "the program does not fit in the 24-bit address space")
            }
            Error::ReadError { path } => {
                write!(f, "failed to read file {path}")
            }
            Error::WriteError { path } => {
                write!(f, "failed to write file {path}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_macro_call_expands_to_one_instruction() {
        let out = assemble("mcro K\n  mov r1, r2\nmcroend\nK\n").unwrap();
        assert_eq!(out.expanded, "  mov r1, r2\n");
        let lines: Vec<&str> = out.object.lines().collect();
        assert_eq!(lines[0], "     1 0");
        assert_eq!(lines[1], "0000100 033A04");
        assert!(out.entries.is_none());
        assert!(out.externals.is_none());
    }

    #[test]
    fn immediate_and_external_operands() {
        let out = assemble(".extern X\nadd #5, X\n").unwrap();
        let lines: Vec<&str> = out.object.lines().collect();
        assert_eq!(lines[0], "     3 0");
        assert_eq!(lines[1], "0000100 08080C");
        assert_eq!(lines[2], "0000101 00002C");
        assert_eq!(lines[3], "0000102 000001");
        assert_eq!(out.externals.as_deref(), Some("X 0000102\n"));
        assert!(out.entries.is_none());
    }

    #[test]
    fn a_backward_relative_branch() {
        let out = assemble("LOOP: mov r1, r2\ncmp #1, #2\njmp &LOOP\n").unwrap();
        let lines: Vec<&str> = out.object.lines().collect();
        assert_eq!(lines[0], "     6 0");
        assert_eq!(lines[5], "0000104 24100C");
        assert_eq!(lines[6], "0000105 FFFFE4");
    }

    #[test]
    fn data_follows_the_code_image() {
        let source = "\
MAIN: mov r1, r2
add #5, r2
sub r1, r2
stop
V: .data 7, -1
";
        let out = assemble(source).unwrap();
        let lines: Vec<&str> = out.object.lines().collect();
        assert_eq!(lines[0], "     5 2");
        assert_eq!(lines[6], "0000105 000007");
        assert_eq!(lines[7], "0000106 FFFFFF");
    }

    #[test]
    fn entries_file_lists_exported_symbols() {
        let out = assemble(".entry MAIN\nstop\nMAIN: stop\n").unwrap();
        assert_eq!(out.entries.as_deref(), Some("MAIN 0000101\n"));
    }

    #[test]
    fn a_duplicate_label_fails_the_unit() {
        let errors = assemble("X: .data 1\nX: mov r1, r2\n").unwrap_err();
        assert_eq!(
            errors,
            vec![Error::SymbolRedefined { line: 2, name: "X".to_string() }]
        );
    }

    #[test]
    fn preprocessor_errors_stop_the_pipeline() {
        let errors = assemble("mcro mov\nclr r1\nmcroend\n").unwrap_err();
        assert_eq!(
            errors,
            vec![Error::MacroNameReserved { line: 1, name: "mov".to_string() }]
        );
    }

    #[test]
    fn second_pass_errors_fail_the_unit() {
        let errors = assemble("jmp NOWHERE\n").unwrap_err();
        assert_eq!(
            errors,
            vec![Error::UndefinedLabel { line: 1, name: "NOWHERE".to_string() }]
        );
    }

    #[test]
    fn assembling_the_expanded_source_is_a_fixed_point() {
        let source = "\
mcro twice
add #1, r1
add #1, r1
mcroend
MAIN: clr r1
twice
jsr &MAIN
V: .data 3
.entry MAIN
";
        let first = assemble(source).unwrap();
        let second = assemble(&first.expanded).unwrap();
        assert_eq!(first.object, second.object);
        assert_eq!(first.entries, second.entries);
        assert_eq!(first.externals, second.externals);
        assert_eq!(second.expanded, first.expanded);
    }

    #[test]
    fn diagnostics_are_identical_across_runs() {
        let source = "X: .data 99999999\nmov r9, r1\njmp &Y\n";
        let first = assemble(source).unwrap_err();
        let second = assemble(source).unwrap_err();
        assert_eq!(first, second);
        let rendered: Vec<String> = first.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "line 1: invalid number (99999999) in .data declaration, out of range".to_string(),
                "line 2: (r9) is not a valid register, expected r1..r7".to_string(),
            ]
        );
    }

    #[test]
    fn every_error_renders_with_its_line_number() {
        let error = Error::SymbolRedefined { line: 12, name: "X".to_string() };
        assert_eq!(error.to_string(), "line 12: the symbol (X) is already defined");
        let error = Error::UnsupportedAddressing {
            line: 3,
            mode: AddressingMode::Immediate,
            slot: Slot::Source,
        };
        assert_eq!(
            error.to_string(),
            "line 3: the command does not support immediate addressing for the source operand"
        );
    }
}
