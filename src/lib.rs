//! Shared core of a toolchain for a family of 8-bit microcontrollers whose
//! instruction set is organized around small fixed-width code words (12,
//! 14, or 16 bits) and a banked/paged data and program memory model.
//!
//! This crate is the subsystem an assembler, a linker, and a
//! disassembler/stripper all share: the object-file model, the relocation
//! and bank/page bookkeeping used by the linker, the peephole optimizer
//! that removes redundant bank/page-selection instructions, the two-pass
//! assembly driver, and the instruction encoder/decoder. The source
//! language's lexer/parser, command-line handling, and listing cosmetics
//! are left to an embedding program; see `SPEC_FULL.md` §6 for the
//! contracts those collaborators must meet.
//!
//! # Example
//! ```no_run
//! fn main() -> picobj::error::Result<()> {
//!     let data = std::fs::read("input.o")?;
//!     let object = picobj::object::wire::read(&data)?;
//!     println!("{} sections", object.sections.len());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod asm;
pub mod codec;
pub mod disasm;
pub mod error;
pub mod hex;
pub mod link;
pub mod memmap;
pub mod object;
pub mod optimize;
pub mod pod;
pub mod processor;
pub mod symtab;

pub use error::{Error, ErrorKind, Result};
