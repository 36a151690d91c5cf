//! The linker: script interpretation, section allocation, symbol
//! resolution, archive pull-in, and relocation patching (`spec.md` §4.4,
//! §4.5).

pub mod alloc;
pub mod patch;
pub mod resolve;
pub mod script;

pub use resolve::{Linker, StrictLevel, SymbolRef};
pub use script::LinkerScript;
