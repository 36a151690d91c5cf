//! PCALLW stub removal (`spec.md` §4.6, third optimizer routine), grounded
//! on `gputils/libgputils/gpcoffopt.c`'s `gp_coffopt_remove_unnecessary_
//! pcallw_experimental`: a compiler-emitted computed-call thunk is two
//! instructions — a `MOVF`-class read of the jump-table entry at a
//! relocation targeting the literal symbol name `PCALLW`, immediately
//! followed by the instruction the table entry would have jumped to. If
//! nothing still references that following instruction as a label, the
//! thunk is dead and both instructions can go.

use crate::codec::{decode, Icode, InstructionEntry};
use crate::object::{Object, StorageClass};
use crate::processor::InstructionClass;

const PCALLW_SYMBOL: &str = "PCALLW";

/// Remove every `PCALLW` stub in `section_index` whose following
/// instruction has no live label reference. `table` is the instruction
/// catalog to decode with (`spec.md` §4.1).
pub fn remove_pcallw_stubs(object: &mut Object, section_index: usize, class: InstructionClass, table: &[InstructionEntry]) -> usize {
    let section_addr = object.sections[section_index].address;
    let relocs = object.sections[section_index].relocations.clone();

    let mut candidates: Vec<(u32, u32)> = Vec::new();
    for r in &relocs {
        if object.symbols[r.symbol as usize].name != PCALLW_SYMBOL {
            continue;
        }
        let Some(decoded) = decode(table, &object.sections[section_index].data, class, r.address) else {
            continue;
        };
        if decoded.icode != Icode::Movf {
            continue;
        }
        let next_abs = section_addr + r.address + decoded.byte_len;
        let live = object
            .symbols
            .iter()
            .any(|s| s.value == next_abs && s.class == StorageClass::Label && s.reloc_count > 0);
        if !live {
            candidates.push((r.address, decoded.byte_len));
        }
    }

    // Highest offset first: removing the later half of a pair first keeps
    // the earlier offset valid for its own removal.
    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    for (offset, len) in &candidates {
        super::remove_instruction(object, section_index, *offset, *len);
    }
    candidates.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{builtin_table, encode, Operands};
    use crate::object::{Relocation, Section, SectionFlags, Symbol};

    fn movf_instruction(table: &[InstructionEntry], f: i64) -> u16 {
        let entry = table.iter().find(|e| e.mnemonic == "movf").unwrap();
        encode(entry, &Operands { values: vec![f, 0] }).unwrap().words[0]
    }

    #[test]
    fn dead_stub_removed_when_no_live_label_follows() {
        let table = builtin_table();
        let mut obj = Object::new("a.o", InstructionClass::Pic14, "pic14");
        let pcallw = obj.add_symbol(Symbol::new(PCALLW_SYMBOL, 0x20, StorageClass::Ext));
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.data.put_le16(0, movf_instruction(&table, 0x10), None, None);
        section.data.put_le16(2, 0x0008, None, None); // return, unreferenced
        section.relocations.push(Relocation { address: 0, symbol: pcallw, offset: 0, kind: crate::object::RelocType::F });
        section.size = 4;
        let si = obj.add_section(section) as usize;

        let removed = remove_pcallw_stubs(&mut obj, si, InstructionClass::Pic14, &table);
        assert_eq!(removed, 1);
        assert_eq!(obj.sections[si].size, 2);
    }

    #[test]
    fn stub_kept_when_following_instruction_has_live_label() {
        let table = builtin_table();
        let mut obj = Object::new("a.o", InstructionClass::Pic14, "pic14");
        let pcallw = obj.add_symbol(Symbol::new(PCALLW_SYMBOL, 0x20, StorageClass::Ext));
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.data.put_le16(0, movf_instruction(&table, 0x10), None, None);
        section.data.put_le16(2, 0x0008, None, None);
        section.relocations.push(Relocation { address: 0, symbol: pcallw, offset: 0, kind: crate::object::RelocType::F });
        section.size = 4;
        let si = obj.add_section(section) as usize;

        let mut label = Symbol::new("real_target", 2, StorageClass::Label);
        label.reloc_count = 1;
        obj.add_symbol(label);

        let removed = remove_pcallw_stubs(&mut obj, si, InstructionClass::Pic14, &table);
        assert_eq!(removed, 0);
        assert_eq!(obj.sections[si].size, 4);
    }

    #[test]
    fn non_movf_instruction_is_not_treated_as_stub() {
        let table = builtin_table();
        let mut obj = Object::new("a.o", InstructionClass::Pic14, "pic14");
        let pcallw = obj.add_symbol(Symbol::new(PCALLW_SYMBOL, 0x20, StorageClass::Ext));
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.data.put_le16(0, 0x3000, None, None); // movlw, not movf
        section.relocations.push(Relocation { address: 0, symbol: pcallw, offset: 0, kind: crate::object::RelocType::F });
        section.size = 2;
        let si = obj.add_section(section) as usize;

        let removed = remove_pcallw_stubs(&mut obj, si, InstructionClass::Pic14, &table);
        assert_eq!(removed, 0);
    }
}
