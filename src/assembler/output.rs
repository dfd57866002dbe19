//! Rendering the finished unit into the three output file formats.
//!
//! Every word is masked to 24 bits and printed as six hex digits; addresses
//! are seven decimal digits. The object file starts with a header carrying
//! the instruction and data word counts.

use crate::assembler::LOAD_ADDRESS;
use crate::assembler::first_pass::UnitImage;
use crate::assembler::instructions::WORD_MASK;
use crate::assembler::symbols::{Kind, SymbolTable};

/// The `.ob` text: header, code image at the load address, data image
/// immediately after the code
pub fn object_file(image: &UnitImage) -> String {
    let mut text = String::new();
    text.push_str(&format!("     {} {}\n", image.icf, image.dcf));
    for (offset, word) in image.cmd_code.iter().enumerate() {
        let address = offset as u32 + LOAD_ADDRESS;
        text.push_str(&format!("{:07} {:06X}\n", address, word & WORD_MASK));
    }
    for (offset, word) in image.data_code.iter().enumerate() {
        let address = offset as u32 + image.icf + LOAD_ADDRESS;
        text.push_str(&format!("{:07} {:06X}\n", address, word & WORD_MASK));
    }
    text
}

/// The `.ent` text: one line per exported symbol, in definition order
pub fn entries_file(symbols: &SymbolTable) -> String {
    let mut text = String::new();
    for symbol in symbols.iter() {
        if symbol.kinds.contains(Kind::Entry) {
            if let Some(address) = symbol.address {
                text.push_str(&format!("{} {:07}\n", symbol.name, address));
            }
        }
    }
    text
}

/// The `.ext` text: one line per use-site of every external symbol
pub fn externals_file(symbols: &SymbolTable) -> String {
    let mut text = String::new();
    for symbol in symbols.iter() {
        if symbol.kinds.contains(Kind::External) {
            for address in &symbol.extern_uses {
                text.push_str(&format!("{} {:07}\n", symbol.name, address));
            }
        }
    }
    text
}
