//! The peephole optimizer (`spec.md` §4.6): removes redundant bank/page
//! selection instructions and unused call stubs while preserving
//! semantics.
//!
//! Two complementary passes coexist, exactly as `gputils/libgputils/
//! gpcoffopt.c` ships both a shipped 4-slot pipeline pass and an
//! experimental fixed-point pass behind a flag:
//!
//! - [`classical`]: the shipped 4-slot reloc-pipeline pass.
//! - [`fixedpoint`]: the experimental whole-section dataflow pass.
//!
//! Both end by calling [`remove_instruction`], the shared bookkeeping that
//! keeps a section's bytes, relocations, line numbers, and every symbol's
//! value consistent after a removal (`spec.md` §5 "Ordering guarantees").

pub mod classical;
pub mod fixedpoint;
pub mod stub;

use crate::object::Object;

/// Physically remove the instruction at byte offset `offset` (length
/// `len`) from section `section_index` of `object`, then shift every
/// later address in the object down by `len`: the removed section's own
/// relocations/line numbers past `offset`, every symbol value at or past
/// the removed instruction's absolute address (`spec.md` §8 invariant:
/// "for every removed instruction ... addresses, line numbers, and symbol
/// values satisfy the in-memory invariants"), and every other section
/// located after it in the address space.
pub fn remove_instruction(object: &mut Object, section_index: usize, offset: u32, len: u32) {
    let abs_removed = object.sections[section_index].address + offset;
    {
        let section = &mut object.sections[section_index];
        section.data.delete_area(offset, len);
        section.size = section.size.saturating_sub(len);
        section.relocations.retain_mut(|r| {
            if r.address == offset {
                return false;
            }
            if r.address > offset {
                r.address -= len;
            }
            true
        });
        for line in section.line_numbers.iter_mut() {
            if line.address > offset {
                line.address -= len;
            }
        }
    }
    for (i, section) in object.sections.iter_mut().enumerate() {
        if i != section_index && section.address > abs_removed {
            section.address -= len;
        }
    }
    for symbol in object.symbols.iter_mut() {
        if symbol.value > abs_removed {
            symbol.value -= len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{RelocType, Relocation, Section, SectionFlags, StorageClass, Symbol};
    use crate::processor::InstructionClass;

    #[test]
    fn removal_shifts_relocations_symbols_and_later_sections() {
        let mut obj = Object::new("a.o", InstructionClass::Pic14, "pic14");
        let call_sym = obj.add_symbol(Symbol::new("callee", 0x20, StorageClass::Ext));
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.size = 6;
        section.relocations.push(Relocation {
            address: 0,
            symbol: call_sym,
            offset: 0,
            kind: RelocType::Pagsel,
        });
        section.relocations.push(Relocation {
            address: 2,
            symbol: call_sym,
            offset: 0,
            kind: RelocType::Call,
        });
        section.line_numbers.push(crate::object::LineNumber {
            address: 4,
            line: 10,
            file_symbol: 0,
        });
        obj.add_section(section);
        let mut after = Section::new(".data", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        after.address = 0x10;
        obj.add_section(after);
        let label = obj.add_symbol(Symbol::new("label", 4, StorageClass::Label));

        remove_instruction(&mut obj, 0, 0, 2);

        assert_eq!(obj.sections[0].size, 4);
        assert_eq!(obj.sections[0].relocations.len(), 1);
        assert_eq!(obj.sections[0].relocations[0].address, 0);
        assert_eq!(obj.sections[0].line_numbers[0].address, 2);
        assert_eq!(obj.sections[1].address, 0x0E);
        assert_eq!(obj.symbols[label as usize].value, 2);
    }
}
