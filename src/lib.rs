//! An assembler for a 24-bit word machine, featuring:
//! - macro pre-processor
//! - two-pass translation
//! - object, entry and external output files

pub mod assembler;
pub mod logging;
