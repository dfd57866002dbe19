//! The symbol table built during the first pass and consulted by the second.

use crate::assembler::{Error, LOAD_ADDRESS};

/// Classification of a symbol. A single symbol can carry several kinds at
/// once, e.g. a label that is also exported is both `Code` and `Entry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Code,
    Data,
    Entry,
    External,
}

impl Kind {
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of [`Kind`]s, one bit per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindSet(u8);

impl KindSet {
    pub fn of(kind: Kind) -> KindSet {
        KindSet(kind.bit())
    }

    pub fn contains(self, kind: Kind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: Kind) {
        self.0 |= kind.bit();
    }
}

/// One table entry. `address` stays `None` for externals and for symbols
/// only declared so far (a forward `.entry`).
#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub address: Option<u32>,
    pub kinds: KindSet,
    /// Addresses of the words that reference this external symbol,
    /// collected by the second pass in source order
    pub extern_uses: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }

    pub fn get(&self, index: usize) -> &Symbol {
        &self.symbols[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Introduce `name` with a concrete role: a defined label (`Code` or
    /// `Data` with its counter value) or an `External` declaration.
    ///
    /// Completing a symbol that was only declared so far (a forward
    /// `.entry`) is allowed; defining a name twice, defining a declared
    /// external locally, or mixing entry and external is an error.
    pub fn define(
        &mut self,
        name: &str,
        kind: Kind,
        address: Option<u32>,
        line: usize,
    ) -> Result<(), Error> {
        let Some(index) = self.find(name) else {
            self.symbols.push(Symbol {
                name: name.to_string(),
                address,
                kinds: KindSet::of(kind),
                extern_uses: Vec::new(),
            });
            return Ok(());
        };

        let symbol = &mut self.symbols[index];
        if conflicts(symbol.kinds, kind) {
            return Err(Error::EntryExternConflict { line, name: name.to_string() });
        }
        if symbol.address.is_some() {
            return Err(Error::SymbolRedefined { line, name: name.to_string() });
        }
        match kind {
            // Re-declaring an external is harmless; anything else colliding
            // with an external re-defines it.
            Kind::External if symbol.kinds.contains(Kind::External) => {}
            Kind::External => symbol.kinds.insert(kind),
            _ if symbol.kinds.contains(Kind::External) => {
                return Err(Error::SymbolRedefined { line, name: name.to_string() });
            }
            _ => {
                symbol.address = address;
                symbol.kinds.insert(kind);
            }
        }
        Ok(())
    }

    /// Attach an additional kind to `name`, creating an address-less entry
    /// when the name is not in the table yet (`.entry` ahead of the
    /// definition).
    pub fn add_kind(&mut self, name: &str, kind: Kind, line: usize) -> Result<(), Error> {
        match self.find(name) {
            Some(index) => {
                let symbol = &mut self.symbols[index];
                if conflicts(symbol.kinds, kind) {
                    return Err(Error::EntryExternConflict { line, name: name.to_string() });
                }
                symbol.kinds.insert(kind);
                Ok(())
            }
            None => {
                self.symbols.push(Symbol {
                    name: name.to_string(),
                    address: None,
                    kinds: KindSet::of(kind),
                    extern_uses: Vec::new(),
                });
                Ok(())
            }
        }
    }

    pub fn add_extern_use(&mut self, index: usize, address: u32) {
        self.symbols[index].extern_uses.push(address);
    }

    /// Shift every symbol to its final address once the instruction image is
    /// complete: code starts at [`LOAD_ADDRESS`], data follows the code.
    /// Entry symbols that never got a definition are reported.
    pub fn rebase(&mut self, icf: u32, errors: &mut Vec<Error>) {
        for symbol in &mut self.symbols {
            if symbol.kinds.contains(Kind::Data) {
                if let Some(address) = &mut symbol.address {
                    *address += icf + LOAD_ADDRESS;
                }
            } else if symbol.kinds.contains(Kind::Code) {
                if let Some(address) = &mut symbol.address {
                    *address += LOAD_ADDRESS;
                }
            } else if symbol.kinds.contains(Kind::Entry) && symbol.address.is_none() {
                errors.push(Error::EntryUndefined { name: symbol.name.clone() });
            }
        }
    }
}

fn conflicts(kinds: KindSet, adding: Kind) -> bool {
    (adding == Kind::Entry && kinds.contains(Kind::External))
        || (adding == Kind::External && kinds.contains(Kind::Entry))
}
