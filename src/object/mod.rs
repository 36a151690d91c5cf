//! The in-memory object model (`spec.md` §3, §4.3) and its bit-exact
//! on-disk wire format.

mod reloc;
mod section;
mod symbol;
pub mod wire;

pub use reloc::{RelocType, Relocation, RELOC_SIZ};
pub use section::{LineNumber, Section, SectionFlags, LINENO_SIZ};
pub use symbol::{AuxRecord, StorageClass, Symbol, AUX_SIZE_V1, AUX_SIZE_V2, N_ABS, N_DEBUG, N_UNDEF};

use crate::error::{codes, Error, Result};
use crate::processor::InstructionClass;

/// Object-level flags (`spec.md` §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectFlags(pub u16);

impl ObjectFlags {
    pub const ABSOLUTE: ObjectFlags = ObjectFlags(1 << 0);
    pub const EXTENDED18: ObjectFlags = ObjectFlags(1 << 1);
    pub const EXEC: ObjectFlags = ObjectFlags(1 << 2);

    pub fn contains(self, other: ObjectFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: ObjectFlags) -> ObjectFlags {
        ObjectFlags(self.0 | other.0)
    }
}

/// A linkable object: the in-memory model of one `.o` file (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct Object {
    pub class: InstructionClass,
    pub processor_name: String,
    pub name: String,
    pub flags: ObjectFlags,
    pub time_stamp: u32,
    /// Selects the v2 (`isnew`) or v1 wire format.
    pub is_new: bool,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    /// Sections removed (by the optimizer or stripper) but still
    /// referenced by a debug writer; kept alive instead of using reference
    /// counting (`spec.md` §9).
    pub reserved_sections: Vec<Section>,
    pub reserved_symbols: Vec<Symbol>,
}

impl Object {
    pub fn new(name: impl Into<String>, class: InstructionClass, processor_name: impl Into<String>) -> Self {
        Object {
            class,
            processor_name: processor_name.into(),
            name: name.into(),
            flags: ObjectFlags::default(),
            time_stamp: 0,
            is_new: true,
            sections: Vec::new(),
            symbols: Vec::new(),
            reserved_sections: Vec::new(),
            reserved_symbols: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: Section) -> u32 {
        self.sections.push(section);
        (self.sections.len() - 1) as u32
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> u32 {
        self.symbols.push(symbol);
        (self.symbols.len() - 1) as u32
    }

    pub fn find_symbol(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .position(|s| s.name == name)
            .map(|i| i as u32)
    }

    /// Add a relocation to `section_index`, bumping the target symbol's
    /// `reloc_count` (`spec.md` §3: "Each symbol records how many
    /// relocations reference it.").
    pub fn add_relocation(&mut self, section_index: u32, reloc: Relocation) -> Result<()> {
        let symbol_idx = reloc.symbol as usize;
        if symbol_idx >= self.symbols.len() {
            return Err(Error::internal(format!(
                "relocation references out-of-range symbol {symbol_idx}"
            )));
        }
        self.symbols[symbol_idx].reloc_count += 1;
        self.sections[section_index as usize].relocations.push(reloc);
        Ok(())
    }

    /// Validate the cross-reference invariants from `spec.md` §8: every
    /// relocation's symbol belongs to this object, and every `FILE` symbol
    /// owns the symbols up to its matching `EOF`.
    pub fn check_invariants(&self) -> Result<()> {
        for (si, section) in self.sections.iter().enumerate() {
            for reloc in &section.relocations {
                if reloc.symbol as usize >= self.symbols.len() {
                    return Err(Error::source_error(
                        codes::ERR_BAD_OBJECT,
                        format!(
                            "section {} relocation at {:#x} references missing symbol {}",
                            si, reloc.address, reloc.symbol
                        ),
                    ));
                }
            }
            for lineno in &section.line_numbers {
                if lineno.file_symbol as usize >= self.symbols.len() {
                    return Err(Error::source_error(
                        codes::ERR_BAD_OBJECT,
                        "line number references missing FILE symbol",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Move a section (by name) from the active list to the reserved list.
    /// Used when the optimizer or stripper removes a section that a debug
    /// writer might still reference (`spec.md` §9).
    pub fn reserve_section(&mut self, name: &str) {
        if let Some(pos) = self.sections.iter().position(|s| s.name == name) {
            let section = self.sections.remove(pos);
            self.reserved_sections.push(section);
        }
    }

    pub fn reserve_symbol_named(&mut self, name: &str) {
        if let Some(pos) = self.symbols.iter().position(|s| s.name == name) {
            let symbol = self.symbols.remove(pos);
            self.reserved_symbols.push(symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocation_bumps_symbol_reloc_count() {
        let mut obj = Object::new("a.o", InstructionClass::Pic14, "pic14");
        let sym = obj.add_symbol(Symbol::new("foo", 0, StorageClass::Ext));
        obj.add_section(Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA)));
        obj.add_relocation(
            0,
            Relocation {
                address: 0,
                symbol: sym,
                offset: 0,
                kind: RelocType::Call,
            },
        )
        .unwrap();
        assert_eq!(obj.symbols[sym as usize].reloc_count, 1);
    }

    #[test]
    fn invariants_catch_dangling_relocation_symbol() {
        let mut obj = Object::new("a.o", InstructionClass::Pic14, "pic14");
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.relocations.push(Relocation {
            address: 0,
            symbol: 99,
            offset: 0,
            kind: RelocType::Call,
        });
        obj.add_section(section);
        assert!(obj.check_invariants().is_err());
    }
}
