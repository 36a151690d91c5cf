//! The relocation patcher and cinit-table builder (`spec.md` §4.5).
//!
//! Runs after allocation: walks every relocation and writes the resolved
//! address (or the derived bank/page-selection sequence) into the target
//! bytes of its owning section, grounded on
//! `gputils/libgputils/gpcofflink.c`'s `coff_process_reloc`.

use crate::object::{LineNumber, Object, RelocType, Section, SectionFlags};
use crate::processor::InstructionClass;

fn symbol_target(object: &Object, symbol: u32, offset: i16) -> u32 {
    (object.symbols[symbol as usize].value as i64 + offset as i64) as u32
}

fn patch_low_bits(section: &mut Section, byte_addr: u32, mask: u16, value: u16) {
    let (word, _) = section.data.get_le16(byte_addr);
    let patched = (word & !mask) | (value & mask);
    section.data.put_le16(byte_addr, patched, Some(&section.name.clone()), None);
}

fn write_sequence(section: &mut Section, byte_addr: u32, words: &[u16]) {
    for (i, &w) in words.iter().enumerate() {
        section
            .data
            .put_le16(byte_addr + (i as u32) * 2, w, Some(&section.name.clone()), None);
    }
}

/// Patch every relocation in every section of `object` in place.
/// `current_page_of` resolves the program-memory page the relocation's
/// *instruction* lives in, needed to decide `BRA`'s sign and the
/// bank/page-selection target (`spec.md` §4.5).
pub fn patch_object(object: &mut Object, class: InstructionClass) {
    let shift = class.org_to_byte_shift();
    for si in 0..object.sections.len() {
        let section_addr = object.sections[si].address;
        let section_is_rom = object.sections[si].is_rom();
        let relocs = object.sections[si].relocations.clone();
        for reloc in relocs {
            let target = symbol_target(object, reloc.symbol, reloc.offset);
            let section = &mut object.sections[si];
            match reloc.kind {
                RelocType::Call | RelocType::Goto | RelocType::Rcall => {
                    let insn_addr = target >> shift;
                    let low = class.reloc_call_goto(insn_addr) as u16;
                    patch_low_bits(section, reloc.address, 0x07FF, low);
                }
                RelocType::Goto2 => {
                    let insn_addr = target >> shift;
                    let low = (insn_addr & 0xFF) as u16;
                    let high = ((insn_addr >> 8) & 0x0FFF) as u16;
                    patch_low_bits(section, reloc.address, 0x00FF, low);
                    patch_low_bits(section, reloc.address + 2, 0x0FFF, high | 0xF000);
                }
                RelocType::Bra | RelocType::CondBra => {
                    let pc_after_insn = section_addr + reloc.address + 2;
                    let disp_insns = (target as i64 - pc_after_insn as i64) / 2;
                    patch_low_bits(section, reloc.address, 0x01FF, disp_insns as u16);
                }
                RelocType::Banksel | RelocType::Movlb | RelocType::Ibanksel => {
                    let bank = class.bank_from_addr(target);
                    let seq = class.set_bank(bank);
                    write_sequence(section, reloc.address, &seq.words);
                }
                RelocType::PagselWreg | RelocType::PagselBits | RelocType::PagselMovlp | RelocType::Pagsel => {
                    let page = class.page_from_insn_addr(target >> shift);
                    let seq = class.set_page(page);
                    write_sequence(section, reloc.address, &seq.words);
                }
                RelocType::Low => {
                    patch_low_bits(section, reloc.address, 0x00FF, (target & 0xFF) as u16);
                }
                RelocType::High => {
                    let v = if section_is_rom { target >> shift } else { target };
                    patch_low_bits(section, reloc.address, 0x00FF, ((v >> 8) & 0xFF) as u16);
                }
                RelocType::Upper => {
                    patch_low_bits(section, reloc.address, 0x00FF, ((target >> 16) & 0xFF) as u16);
                }
                RelocType::F | RelocType::Tris | RelocType::Access | RelocType::P => {
                    patch_low_bits(section, reloc.address, 0x007F, (target & 0x7F) as u16);
                }
                RelocType::Tris3Bit => {
                    patch_low_bits(section, reloc.address, 0x0007, (target & 0x7) as u16);
                }
                RelocType::Movlr | RelocType::Ff1 | RelocType::Ff2 | RelocType::Lfsr1 | RelocType::Lfsr2 => {
                    patch_low_bits(section, reloc.address, 0x0FFF, (target & 0xFFF) as u16);
                }
                RelocType::ScnszLow | RelocType::ScnendLow => {
                    let v = section_size_or_end(object, &reloc, section_addr);
                    patch_low_bits(&mut object.sections[si], reloc.address, 0x00FF, (v & 0xFF) as u16);
                    continue;
                }
                RelocType::ScnszHigh | RelocType::ScnendHigh => {
                    let v = section_size_or_end(object, &reloc, section_addr);
                    patch_low_bits(&mut object.sections[si], reloc.address, 0x00FF, ((v >> 8) & 0xFF) as u16);
                    continue;
                }
                RelocType::ScnszUpper | RelocType::ScnendUpper => {
                    let v = section_size_or_end(object, &reloc, section_addr);
                    patch_low_bits(&mut object.sections[si], reloc.address, 0x00FF, ((v >> 16) & 0xFF) as u16);
                    continue;
                }
            }
        }
    }
}

fn section_size_or_end(object: &Object, reloc: &crate::object::Relocation, _section_addr: u32) -> u32 {
    let sym = &object.symbols[reloc.symbol as usize];
    match sym.section {
        Some(si) => {
            let target_section = &object.sections[si as usize];
            match reloc.kind {
                RelocType::ScnszLow | RelocType::ScnszHigh | RelocType::ScnszUpper => target_section.size,
                _ => target_section.address + target_section.size,
            }
        }
        None => 0,
    }
}

/// One cinit entry (`spec.md` §4.5, §6 "cinit"): an initialized-data copy
/// the runtime startup code must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CinitEntry {
    pub rom_addr: u32,
    pub ram_addr: u32,
    pub length: u32,
}

/// Build the cinit table for every `DATA` section in `sections`
/// (`spec.md` §4.5): one entry per section, with the ROM-resident
/// initializer image at `shadow_address` and the RAM destination at
/// `address`.
pub fn build_cinit(sections: &[Section]) -> Vec<CinitEntry> {
    sections
        .iter()
        .filter(|s| s.flags.contains(SectionFlags::DATA))
        .map(|s| CinitEntry {
            rom_addr: s.shadow_address,
            ram_addr: s.address,
            length: s.size,
        })
        .collect()
}

/// Encode the cinit table as literal words in a synthetic `.cinit` section
/// (`spec.md` §4.5): three little-endian 32-bit words per entry.
pub fn cinit_section(entries: &[CinitEntry]) -> Section {
    let mut section = Section::new(".cinit", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
    let mut offset = 0u32;
    for entry in entries {
        for word in [entry.rom_addr, entry.ram_addr, entry.length] {
            for byte in word.to_le_bytes() {
                section.data.put(offset, byte, Some(".cinit"), None);
                offset += 1;
            }
        }
    }
    section.size = offset;
    section
}

/// Shift line-number addresses for a section by `delta` starting from
/// `from` (used by the peephole optimizer after it removes bytes;
/// exposed here since the patcher and optimizer share this bookkeeping
/// shape, `spec.md` §4.6).
pub fn shift_line_numbers(lines: &mut [LineNumber], from: u32, delta: i64) {
    for line in lines.iter_mut() {
        if line.address >= from {
            line.address = (line.address as i64 + delta) as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Relocation, Section, StorageClass, Symbol};

    fn obj_with_call(target_addr: u32) -> (Object, usize) {
        let mut obj = Object::new("x.o", InstructionClass::Pic14, "pic14");
        let mut target = Symbol::new("foo", target_addr, StorageClass::Ext);
        target.section = Some(0);
        let sym = obj.add_symbol(target);
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.data.put_le16(0, 0x2000, None, None); // CALL 0
        section.relocations.push(Relocation {
            address: 0,
            symbol: sym,
            offset: 0,
            kind: RelocType::Call,
        });
        let si = obj.add_section(section);
        (obj, si as usize)
    }

    #[test]
    fn call_patches_low_bits() {
        let (mut obj, si) = obj_with_call(0x20);
        patch_object(&mut obj, InstructionClass::Pic14);
        let (word, _) = obj.sections[si].data.get_le16(0);
        assert_eq!(word & 0x7FF, 0x10); // byte 0x20 >> org_to_byte_shift(1) = insn 0x10
    }

    #[test]
    fn goto2_splits_across_two_words() {
        let mut obj = Object::new("x.o", InstructionClass::Pic16E, "pic16e");
        let mut target = Symbol::new("foo", 0xABCDE << 1, StorageClass::Ext);
        target.section = Some(0);
        let sym = obj.add_symbol(target);
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.data.put_le16(0, 0xEF00, None, None);
        section.data.put_le16(2, 0xF000, None, None);
        section.relocations.push(Relocation {
            address: 0,
            symbol: sym,
            offset: 0,
            kind: RelocType::Goto2,
        });
        obj.add_section(section);
        patch_object(&mut obj, InstructionClass::Pic16E);
        let (w0, _) = obj.sections[0].data.get_le16(0);
        let (w1, _) = obj.sections[0].data.get_le16(2);
        assert_eq!(w0 & 0xFF, 0xDE);
        assert_eq!(w1 & 0xF000, 0xF000);
        assert_eq!(w1 & 0x0FFF, 0xABC);
    }

    #[test]
    fn banksel_writes_canonical_sequence() {
        let mut obj = Object::new("x.o", InstructionClass::Pic14E, "pic14e");
        let mut target = Symbol::new("v", 0x300, StorageClass::Ext);
        target.section = Some(0);
        let sym = obj.add_symbol(target);
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.data.put_le16(0, 0, None, None);
        section.relocations.push(Relocation {
            address: 0,
            symbol: sym,
            offset: 0,
            kind: RelocType::Banksel,
        });
        obj.add_section(section);
        patch_object(&mut obj, InstructionClass::Pic14E);
        let (word, _) = obj.sections[0].data.get_le16(0);
        assert_eq!(word, 0x0020 | (InstructionClass::Pic14E.bank_from_addr(0x300) & 0x3F));
    }

    #[test]
    fn cinit_table_has_one_entry_per_data_section() {
        let mut data_section = Section::new(".data", SectionFlags::DATA.union(SectionFlags::RAM_AREA));
        data_section.address = 0x20;
        data_section.shadow_address = 0x100;
        data_section.size = 4;
        let entries = build_cinit(&[data_section]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], CinitEntry { rom_addr: 0x100, ram_addr: 0x20, length: 4 });
    }
}
