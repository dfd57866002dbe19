//! The first pass over the expanded source.
//!
//! Classifies every line, collects symbols, and builds the instruction and
//! data images. Operands whose encoding does not depend on a label
//! (immediates and registers) are encoded here; each label operand reserves
//! a zero placeholder word that the second pass fills in. After the scan the
//! symbol addresses are rebased: code starts at the load address, data
//! follows the code image.

use std::num::IntErrorKind;

use crate::assembler::instructions::{
    self, ARE_ABSOLUTE, ARE_BITS, AddressingMode, DATA_MAX, DATA_MIN, FUNCT_SHIFT, IMMEDIATE_MAX,
    IMMEDIATE_MIN, ModeSet, OPCODE_SHIFT, OpSpec, Slot, Word,
};
use crate::assembler::lexer::{self, LineCursor};
use crate::assembler::preprocessor::MacroTable;
use crate::assembler::symbols::{Kind, SymbolTable};
use crate::assembler::{Error, LOAD_ADDRESS};
use crate::logging;

/// The highest address the 24-bit machine can load a program to.
const ADDRESS_SPACE: u32 = 1 << 23;

/// Everything the first pass accumulates for one translation unit
#[derive(Debug)]
pub struct UnitImage {
    pub cmd_code: Vec<Word>,
    pub data_code: Vec<Word>,
    pub symbols: SymbolTable,
    pub icf: u32,
    pub dcf: u32,
}

/// Scan the expanded source, producing the unit image and every error found
pub fn run(expanded: &str, macros: &MacroTable) -> (UnitImage, Vec<Error>) {
    let mut pass = FirstPass {
        macros,
        symbols: SymbolTable::default(),
        cmd_code: Vec::new(),
        data_code: Vec::new(),
        errors: Vec::new(),
    };
    for (index, line) in expanded.lines().enumerate() {
        if let Err(error) = pass.line(line, index + 1) {
            pass.errors.push(error);
        }
    }
    pass.finish()
}

struct FirstPass<'a> {
    macros: &'a MacroTable,
    symbols: SymbolTable,
    cmd_code: Vec<Word>,
    data_code: Vec<Word>,
    errors: Vec<Error>,
}

impl FirstPass<'_> {
    fn ic(&self) -> u32 {
        self.cmd_code.len() as u32
    }

    fn dc(&self) -> u32 {
        self.data_code.len() as u32
    }

    fn line(&mut self, line: &str, line_number: usize) -> Result<(), Error> {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            return Ok(());
        }

        let mut cur = LineCursor::new(line, line_number);
        let first = cur.token_checked(0, 0)?;
        match first {
            ".entry" => {
                let name = cur.token();
                lexer::check_symbol_name(name, line_number, self.macros)?;
                self.symbols.add_kind(name, Kind::Entry, line_number)?;
                cur.expect_end("finishing an entry line")
            }
            ".extern" => {
                let name = cur.token();
                lexer::check_symbol_name(name, line_number, self.macros)?;
                self.symbols.define(name, Kind::External, None, line_number)?;
                cur.expect_end("finishing an extern line")
            }
            ".data" | ".string" => self.data_directive(&mut cur, first, line_number),
            _ => {
                if let Some(spec) = instructions::lookup(first) {
                    return self.instruction(&mut cur, spec, line_number);
                }
                if cur.label_colon() {
                    return self.labelled(&mut cur, first, line_number);
                }
                Err(Error::InvalidFirstToken { line: line_number, token: first.to_string() })
            }
        }
    }

    /// A line of the form `LABEL: <statement>`
    fn labelled(
        &mut self,
        cur: &mut LineCursor<'_>,
        label: &str,
        line_number: usize,
    ) -> Result<(), Error> {
        let statement = cur.token();
        match statement {
            ".data" | ".string" => {
                lexer::check_symbol_name(label, line_number, self.macros)?;
                self.symbols.define(label, Kind::Data, Some(self.dc()), line_number)?;
                self.data_directive(cur, statement, line_number)
            }
            ".entry" | ".extern" => {
                logging::warning(
                    format!("label ({label}) before {statement} is meaningless and is ignored"),
                    line_number,
                );
                let name = cur.token();
                lexer::check_symbol_name(name, line_number, self.macros)?;
                if statement == ".entry" {
                    self.symbols.add_kind(name, Kind::Entry, line_number)?;
                    cur.expect_end("finishing an entry line")
                } else {
                    self.symbols.define(name, Kind::External, None, line_number)?;
                    cur.expect_end("finishing an extern line")
                }
            }
            _ => {
                if let Some(spec) = instructions::lookup(statement) {
                    lexer::check_symbol_name(label, line_number, self.macros)?;
                    self.symbols.define(label, Kind::Code, Some(self.ic()), line_number)?;
                    return self.instruction(cur, spec, line_number);
                }
                Err(Error::LabelNeedsStatement { line: line_number })
            }
        }
    }

    /// `.data` and `.string` bodies go into the data image at `DC`
    fn data_directive(
        &mut self,
        cur: &mut LineCursor<'_>,
        which: &str,
        line_number: usize,
    ) -> Result<(), Error> {
        if which == ".data" {
            loop {
                let token = cur.token_checked(0, 1)?;
                if token.is_empty() {
                    return Err(Error::EmptyData { line: line_number });
                }
                let value = match token.parse::<i64>() {
                    Ok(value) => value,
                    Err(error)
                        if matches!(
                            error.kind(),
                            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
                        ) =>
                    {
                        return Err(Error::DataOutOfRange {
                            line: line_number,
                            token: token.to_string(),
                        });
                    }
                    Err(_) => {
                        return Err(Error::NotAnInteger {
                            line: line_number,
                            token: token.to_string(),
                        });
                    }
                };
                if !(DATA_MIN..=DATA_MAX).contains(&value) {
                    return Err(Error::DataOutOfRange {
                        line: line_number,
                        token: token.to_string(),
                    });
                }
                self.data_code.push(value as Word);
                if cur.at_line_end() {
                    return Ok(());
                }
            }
        }

        match lexer::string_literal(cur.rest()) {
            None => Err(Error::MissingQuote { line: line_number }),
            Some((text, trailing)) => {
                if !trailing.trim().is_empty() {
                    return Err(Error::ExtraText {
                        line: line_number,
                        text: trailing.trim().to_string(),
                        after: "finishing a string line",
                    });
                }
                for ch in text.chars() {
                    self.data_code.push(ch as Word);
                }
                self.data_code.push(0);
                Ok(())
            }
        }
    }

    /// Encode an instruction line into one, two or three words
    fn instruction(
        &mut self,
        cur: &mut LineCursor<'_>,
        spec: &OpSpec,
        line_number: usize,
    ) -> Result<(), Error> {
        let mut word1 = ((spec.opcode as Word) << OPCODE_SHIFT)
            | ((spec.funct as Word) << FUNCT_SHIFT)
            | ARE_ABSOLUTE;
        let mut word2: Word = 0;
        let mut word3: Word = 0;
        let mut source_is_label = false;
        let mut dest_is_label = false;

        if let Some(allowed) = spec.source {
            let commas = usize::from(spec.dest.is_some());
            let token = cur.token_checked(0, commas)?;
            operand(
                token,
                allowed,
                Slot::Source,
                &mut word1,
                &mut word2,
                &mut source_is_label,
                line_number,
            )?;
        }
        if let Some(allowed) = spec.dest {
            let token = cur.token_checked(0, 0)?;
            // Two immediates need two extra words; the second goes past the first
            let extra = if word2 != 0 { &mut word3 } else { &mut word2 };
            operand(
                token,
                allowed,
                Slot::Destination,
                &mut word1,
                extra,
                &mut dest_is_label,
                line_number,
            )?;
        }
        cur.expect_end("finishing a command")?;

        // Extra words follow the first word in operand order; a label
        // operand reserves a zero slot for the second pass to fill.
        self.cmd_code.push(word1);
        if source_is_label {
            self.cmd_code.push(0);
        }
        if word2 != 0 {
            self.cmd_code.push(word2);
        }
        if dest_is_label {
            self.cmd_code.push(0);
        }
        if word3 != 0 {
            self.cmd_code.push(word3);
        }
        Ok(())
    }

    fn finish(mut self) -> (UnitImage, Vec<Error>) {
        let icf = self.ic();
        let dcf = self.dc();
        if icf + dcf + LOAD_ADDRESS > ADDRESS_SPACE {
            self.errors.push(Error::ProgramTooLarge);
        }
        self.symbols.rebase(icf, &mut self.errors);
        let image = UnitImage {
            cmd_code: self.cmd_code,
            data_code: self.data_code,
            symbols: self.symbols,
            icf,
            dcf,
        };
        (image, self.errors)
    }
}

/// Classify one operand token and fold it into the instruction words.
///
/// Immediates and registers are fully encoded here. Label operands (direct
/// and relative) only set their addressing mode bits and raise `is_label`
/// so the caller reserves a placeholder word.
fn operand(
    token: &str,
    allowed: ModeSet,
    slot: Slot,
    word1: &mut Word,
    extra: &mut Word,
    is_label: &mut bool,
    line_number: usize,
) -> Result<(), Error> {
    if token.is_empty() {
        return Err(Error::MissingOperand { line: line_number });
    }

    if let Some(digits) = token.strip_prefix('#') {
        require_mode(allowed, AddressingMode::Immediate, slot, line_number)?;
        if digits.is_empty() {
            return Err(Error::MissingImmediate { line: line_number });
        }
        let value = match digits.parse::<i64>() {
            Ok(value) => value,
            Err(error)
                if matches!(
                    error.kind(),
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
                ) =>
            {
                return Err(Error::ImmediateOutOfRange {
                    line: line_number,
                    token: token.to_string(),
                });
            }
            Err(_) => {
                return Err(Error::NotAnInteger { line: line_number, token: token.to_string() });
            }
        };
        if !(IMMEDIATE_MIN..=IMMEDIATE_MAX).contains(&value) {
            return Err(Error::ImmediateOutOfRange {
                line: line_number,
                token: token.to_string(),
            });
        }
        *extra = ((value as Word) << ARE_BITS) | ARE_ABSOLUTE;
        return Ok(());
    }

    if let Some(register) = token.strip_prefix('r') {
        require_mode(allowed, AddressingMode::Register, slot, line_number)?;
        let number = match register.as_bytes() {
            &[digit] if (b'1'..=b'7').contains(&digit) => (digit - b'0') as Word,
            _ => {
                return Err(Error::BadRegister { line: line_number, token: token.to_string() });
            }
        };
        *word1 |= (AddressingMode::Register as Word) << slot.mode_shift();
        *word1 |= number << slot.register_shift();
        return Ok(());
    }

    if token.starts_with('&') {
        require_mode(allowed, AddressingMode::Relative, slot, line_number)?;
        *word1 |= (AddressingMode::Relative as Word) << slot.mode_shift();
        *is_label = true;
        return Ok(());
    }

    if token.starts_with(|c: char| c.is_ascii_alphabetic()) {
        require_mode(allowed, AddressingMode::Direct, slot, line_number)?;
        *word1 |= (AddressingMode::Direct as Word) << slot.mode_shift();
        *is_label = true;
        return Ok(());
    }

    Err(Error::InvalidOperand { line: line_number, token: token.to_string() })
}

fn require_mode(
    allowed: ModeSet,
    mode: AddressingMode,
    slot: Slot,
    line_number: usize,
) -> Result<(), Error> {
    if allowed.contains(mode) {
        Ok(())
    } else {
        Err(Error::UnsupportedAddressing { line: line_number, mode, slot })
    }
}
