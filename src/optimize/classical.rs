//! The classical (shipped) peephole pass: a 4-slot shift register of
//! recent relocations (`spec.md` §4.6), grounded line-for-line on
//! `gputils/libgputils/gpcoffopt.c`'s `COPT_*` state constants and its
//! `coff_opt_reloc` pattern matching.

use std::collections::HashSet;

use crate::object::{Object, RelocType};
use crate::processor::InstructionClass;

/// Reachability state of one relocation slot, mirroring `gpcoffopt.c`'s
/// `COPT_*` bitflags exactly: whether it's a branch/call/pagesel landing
/// on the current section's page or another one, or a plain `BANKSEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReachState(u16);

impl ReachState {
    pub const NULL: ReachState = ReachState(0);
    pub const BRA_CURR_PAGE: ReachState = ReachState(1 << 0);
    pub const BRA_OTHER_PAGE: ReachState = ReachState(1 << 1);
    pub const GOTO_CURR_PAGE: ReachState = ReachState(1 << 2);
    pub const GOTO_OTHER_PAGE: ReachState = ReachState(1 << 3);
    pub const CALL_CURR_PAGE: ReachState = ReachState(1 << 4);
    pub const CALL_OTHER_PAGE: ReachState = ReachState(1 << 5);
    pub const PAGESEL_CURR_PAGE: ReachState = ReachState(1 << 6);
    pub const PAGESEL_OTHER_PAGE: ReachState = ReachState(1 << 7);
    pub const BANKSEL: ReachState = ReachState(1 << 8);

    pub fn is(self, other: ReachState) -> bool {
        self == other
    }
}

/// One slot in the 4-entry reloc pipeline.
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u32,
    len: u32,
    state: ReachState,
    bank_or_page: u32,
    /// The symbol this relocation targets, so a duplicate-bank check can
    /// tell `CALL X` from `CALL Y`.
    target_symbol: u32,
    protected: bool,
}

fn classify(
    kind: RelocType,
    target_page: u32,
    target_bank: u32,
    current_page: u32,
) -> ReachState {
    use RelocType::*;
    match kind {
        Bra | CondBra => {
            if target_page == current_page {
                ReachState::BRA_CURR_PAGE
            } else {
                ReachState::BRA_OTHER_PAGE
            }
        }
        Goto | Goto2 => {
            if target_page == current_page {
                ReachState::GOTO_CURR_PAGE
            } else {
                ReachState::GOTO_OTHER_PAGE
            }
        }
        Call | Rcall => {
            if target_page == current_page {
                ReachState::CALL_CURR_PAGE
            } else {
                ReachState::CALL_OTHER_PAGE
            }
        }
        Pagsel | PagselWreg | PagselBits | PagselMovlp => {
            if target_page == current_page {
                ReachState::PAGESEL_CURR_PAGE
            } else {
                ReachState::PAGESEL_OTHER_PAGE
            }
        }
        Banksel | Movlb | Ibanksel => {
            let _ = target_bank;
            ReachState::BANKSEL
        }
        _ => ReachState::NULL,
    }
}

pub(crate) fn reloc_len(kind: RelocType, class: InstructionClass) -> u32 {
    use RelocType::*;
    match kind {
        Goto2 => 4,
        Banksel | Movlb | Ibanksel => class.set_bank(0).words.len() as u32 * 2,
        Pagsel | PagselWreg | PagselBits | PagselMovlp => class.set_page(0).words.len().max(1) as u32 * 2,
        _ => 2,
    }
}

/// One optimization pass over `section_index` of `object`: scans the
/// relocation stream once, removing the first redundant bank/page
/// selection it finds, per the four patterns of `spec.md` §4.6. Returns
/// `true` if something was removed (the caller should call again until it
/// returns `false`, since removing one instruction can expose another).
///
/// `protected_offsets` carries the byte offsets of every relocation that
/// must not be removed: the target of a branch landing between it and its
/// effect (`spec.md` §4.6 "protected relocation"). The first bank
/// selection of a section is always protected per `spec.md` §4.6, so
/// callers should seed `protected_offsets` with the first `BANKSEL`'s
/// offset before calling.
pub fn optimize_once(
    object: &mut Object,
    section_index: usize,
    class: InstructionClass,
    current_page: u32,
    protected_offsets: &HashSet<u32>,
) -> bool {
    let slots = build_slots(object, section_index, class, current_page);
    if let Some((offset, len)) = find_redundant(&slots, protected_offsets) {
        super::remove_instruction(object, section_index, offset, len);
        true
    } else {
        false
    }
}

/// Run [`optimize_once`] to a fixed point, returning how many instructions
/// were removed.
pub fn optimize_to_fixed_point(
    object: &mut Object,
    section_index: usize,
    class: InstructionClass,
    current_page: u32,
    protected_offsets: &HashSet<u32>,
) -> usize {
    let mut removed = 0;
    while optimize_once(object, section_index, class, current_page, protected_offsets) {
        removed += 1;
    }
    removed
}

fn build_slots(object: &Object, section_index: usize, class: InstructionClass, current_page: u32) -> Vec<Slot> {
    let shift = class.org_to_byte_shift();
    let mut relocs = object.sections[section_index].relocations.clone();
    relocs.sort_by_key(|r| r.address);
    relocs
        .into_iter()
        .map(|r| {
            let sym = &object.symbols[r.symbol as usize];
            let target = (sym.value as i64 + r.offset as i64) as u32;
            let page = class.page_from_insn_addr(target >> shift);
            let bank = class.bank_from_addr(target);
            Slot {
                offset: r.address,
                len: reloc_len(r.kind, class),
                state: classify(r.kind, page, bank, current_page),
                bank_or_page: if r.kind.is_banksel() { bank } else { page },
                target_symbol: r.symbol,
                protected: false,
            }
        })
        .collect()
}

fn find_redundant(slots: &[Slot], protected_offsets: &HashSet<u32>) -> Option<(u32, u32)> {
    let is_protected = |s: &Slot| protected_offsets.contains(&s.offset) || s.protected;

    for i in 0..slots.len() {
        let cur = &slots[i];
        if is_protected(cur) {
            continue;
        }

        // Rule: "PAGESEL P; CALL/GOTO @P" with the same page as the
        // current section -> PAGESEL is redundant.
        if (cur.state == ReachState::PAGESEL_CURR_PAGE) && i + 1 < slots.len() {
            let next = &slots[i + 1];
            let next_is_branch_to_same_symbol = matches!(
                next.state,
                ReachState::CALL_CURR_PAGE | ReachState::GOTO_CURR_PAGE
            ) && next.target_symbol == cur.target_symbol;
            if next_is_branch_to_same_symbol {
                return Some((cur.offset, cur.len));
            }
        }

        // Rule: "CALL X; PAGESEL P; CALL Y" with P == page(X) and Y on P
        // -> middle PAGESEL is redundant.
        if cur.state == ReachState::PAGESEL_CURR_PAGE && i >= 1 && i + 1 < slots.len() {
            let prev = &slots[i - 1];
            let next = &slots[i + 1];
            if matches!(prev.state, ReachState::CALL_CURR_PAGE | ReachState::CALL_OTHER_PAGE)
                && matches!(next.state, ReachState::CALL_CURR_PAGE | ReachState::CALL_OTHER_PAGE)
                && prev.bank_or_page == cur.bank_or_page
                && next.bank_or_page == cur.bank_or_page
            {
                return Some((cur.offset, cur.len));
            }
        }

        // Rule: trailing "PAGESEL P; RETURN" -> PAGESEL is redundant. A
        // pagesel with no following relocation in this section is taken
        // to precede the section's final (non-branching) instruction,
        // i.e. a RETURN/RETFIE epilogue.
        if matches!(cur.state, ReachState::PAGESEL_CURR_PAGE | ReachState::PAGESEL_OTHER_PAGE) && i + 1 == slots.len()
        {
            return Some((cur.offset, cur.len));
        }

        // Rule: duplicate "BANKSEL B; ...; BANKSEL B" with the same bank
        // and no control-flow join between them -> the second is
        // redundant.
        if cur.state == ReachState::BANKSEL {
            for next in &slots[i + 1..] {
                if next.state == ReachState::BANKSEL {
                    if next.bank_or_page == cur.bank_or_page && !is_protected(next) {
                        return Some((next.offset, next.len));
                    }
                    break;
                }
                if matches!(
                    next.state,
                    ReachState::GOTO_CURR_PAGE
                        | ReachState::GOTO_OTHER_PAGE
                        | ReachState::CALL_CURR_PAGE
                        | ReachState::CALL_OTHER_PAGE
                ) {
                    // A call/goto between two BANKSELs is a potential
                    // control-flow join at the destination; stop scanning
                    // forward from here to stay conservative.
                    break;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Relocation, Section, SectionFlags, StorageClass, Symbol};

    fn section_with(object: &mut Object, relocs: Vec<(u32, RelocType, u32)>) -> usize {
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        for (offset, kind, target_value) in relocs {
            let sym = object.add_symbol(Symbol::new(format!("sym{offset}"), target_value, StorageClass::Ext));
            section.relocations.push(Relocation {
                address: offset,
                symbol: sym,
                offset: 0,
                kind,
            });
        }
        section.size = 64;
        object.add_section(section) as usize
    }

    #[test]
    fn pagesel_before_call_same_page_removed() {
        let mut obj = Object::new("a.o", InstructionClass::Pic14E, "pic14e");
        // Both pagesel and call target the same symbol/page (page 0, current page 0).
        let target_addr = 0x10u32 << InstructionClass::Pic14E.org_to_byte_shift();
        let si = section_with(
            &mut obj,
            vec![(0, RelocType::Pagsel, target_addr), (2, RelocType::Call, target_addr)],
        );
        // Force the two relocations to share the same target symbol.
        let shared_sym = obj.sections[si].relocations[0].symbol;
        obj.sections[si].relocations[1].symbol = shared_sym;

        let removed = optimize_to_fixed_point(&mut obj, si, InstructionClass::Pic14E, 0, &HashSet::new());
        assert_eq!(removed, 1);
        assert_eq!(obj.sections[si].relocations.len(), 1);
        assert_eq!(obj.sections[si].relocations[0].kind, RelocType::Call);
        assert_eq!(obj.sections[si].relocations[0].address, 0);
    }

    #[test]
    fn duplicate_banksel_second_removed() {
        let mut obj = Object::new("a.o", InstructionClass::Pic14E, "pic14e");
        let si = section_with(
            &mut obj,
            vec![(0, RelocType::Banksel, 0x300), (4, RelocType::Banksel, 0x300)],
        );
        let removed = optimize_to_fixed_point(&mut obj, si, InstructionClass::Pic14E, 0, &HashSet::new());
        assert_eq!(removed, 1);
        assert_eq!(obj.sections[si].relocations.len(), 1);
        assert_eq!(obj.sections[si].relocations[0].address, 0);
    }

    #[test]
    fn first_banksel_of_section_is_protected() {
        let mut obj = Object::new("a.o", InstructionClass::Pic14E, "pic14e");
        let si = section_with(&mut obj, vec![(0, RelocType::Banksel, 0x300)]);
        let first_offset = obj.sections[si].relocations[0].address;
        let mut protected = HashSet::new();
        protected.insert(first_offset);
        let removed = optimize_to_fixed_point(&mut obj, si, InstructionClass::Pic14E, 0, &protected);
        assert_eq!(removed, 0);
        assert_eq!(obj.sections[si].relocations.len(), 1);
    }

    #[test]
    fn trailing_pagesel_before_return_removed() {
        let mut obj = Object::new("a.o", InstructionClass::Pic14E, "pic14e");
        let si = section_with(&mut obj, vec![(0, RelocType::Pagsel, 0)]);
        let removed = optimize_to_fixed_point(&mut obj, si, InstructionClass::Pic14E, 0, &HashSet::new());
        assert_eq!(removed, 1);
        assert!(obj.sections[si].relocations.is_empty());
    }
}
