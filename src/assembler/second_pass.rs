//! The second pass over the expanded source.
//!
//! Re-walks every instruction line with the same word counting as the first
//! pass, so the placeholder slots line up, then resolves each label operand
//! to its final word: relocatable addresses for internal symbols, a distance
//! for `&label` operands, and the E flag plus a use-site log entry for
//! externals.

use crate::assembler::first_pass::UnitImage;
use crate::assembler::instructions::{
    self, ARE_ABSOLUTE, ARE_BITS, ARE_EXTERNAL, ARE_RELOCATABLE, Word,
};
use crate::assembler::lexer::LineCursor;
use crate::assembler::symbols::Kind;
use crate::assembler::{Error, LOAD_ADDRESS};

/// Which of the optional output files the unit calls for
#[derive(Debug, Default, Clone, Copy)]
pub struct Exports {
    /// An `.entry` directive was seen
    pub entries: bool,
    /// At least one external symbol is referenced by an instruction
    pub externals: bool,
}

/// Resolve every label operand in place. Returns which optional outputs the
/// unit needs plus every error found.
pub fn run(expanded: &str, image: &mut UnitImage) -> (Exports, Vec<Error>) {
    let mut exports = Exports::default();
    let mut errors = Vec::new();
    let mut ic: u32 = 0;

    for (index, line) in expanded.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }

        let mut cur = LineCursor::new(line, line_number);
        let mut first = cur.token();
        if cur.label_colon() {
            let statement = cur.token();
            if matches!(statement, ".data" | ".string" | ".extern") {
                continue;
            }
            first = statement;
        }

        if first == ".entry" {
            exports.entries = true;
            let name = cur.token();
            if let Err(error) = image.symbols.add_kind(name, Kind::Entry, line_number) {
                errors.push(error);
            }
            continue;
        }

        if instructions::lookup(first).is_some() {
            if let Err(error) = resolve_line(&mut cur, image, &mut ic, &mut exports) {
                errors.push(error);
            }
        }
    }

    (exports, errors)
}

/// Walk one instruction line, incrementing `ic` exactly as the first pass
/// did and writing the reserved words for label operands.
fn resolve_line(
    cur: &mut LineCursor<'_>,
    image: &mut UnitImage,
    ic: &mut u32,
    exports: &mut Exports,
) -> Result<(), Error> {
    let line_number = cur.line_number();
    *ic += 1; // the first instruction word

    loop {
        let token = cur.token();
        if token.is_empty() {
            return Ok(());
        }
        if token.starts_with('#') {
            *ic += 1; // immediate extra word, already encoded
            continue;
        }
        if token.starts_with('r') {
            continue; // registers live in the first word
        }

        let (name, relative) = match token.strip_prefix('&') {
            Some(stripped) => (stripped, true),
            None => (token, false),
        };
        let Some(index) = image.symbols.find(name) else {
            return Err(Error::UndefinedLabel { line: line_number, name: name.to_string() });
        };
        let (kinds, address) = {
            let symbol = image.symbols.get(index);
            (symbol.kinds, symbol.address)
        };
        let slot = *ic as usize;

        if kinds.contains(Kind::External) {
            if relative {
                return Err(Error::RelativeToExternal {
                    line: line_number,
                    name: name.to_string(),
                });
            }
            image.cmd_code[slot] = ARE_EXTERNAL;
            image.symbols.add_extern_use(index, *ic + LOAD_ADDRESS);
            exports.externals = true;
        } else {
            let Some(address) = address else {
                return Err(Error::UndefinedLabel { line: line_number, name: name.to_string() });
            };
            image.cmd_code[slot] = if relative {
                if kinds.contains(Kind::Data) {
                    return Err(Error::RelativeToData {
                        line: line_number,
                        name: name.to_string(),
                    });
                }
                // The distance is measured from this extra word's own address
                let distance = address as Word - (*ic + LOAD_ADDRESS) as Word + 1;
                (distance << ARE_BITS) | ARE_ABSOLUTE
            } else {
                ((address as Word) << ARE_BITS) | ARE_RELOCATABLE
            };
        }
        *ic += 1;
    }
}
