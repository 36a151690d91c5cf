//! The disassembler (`spec.md` §4.1 "Decoding contract"/"Labelling pass",
//! §4.8).
//!
//! Grounded on `gputils/libgputils/gpdis.c`'s `gp_disassemble_mark_false_
//! addresses` (pass 1: second-word bytes, `gp_disassemble`'s branch-source/
//! destination bookkeeping (pass 2), and `gp_disassemble`/`gp_disassemble_
//! show_data`'s printing (pass 3, including the `db`/`dw`/`dt` fallbacks
//! for config/id ranges and strict-mode `RETLW` rewriting).

use std::collections::HashMap;

use crate::codec::{decode, Decoded, Icode, InstructionEntry, RegisterState};
use crate::memmap::{AddrType, MemoryMap};
use crate::processor::{AddrRange, InstructionClass, ProcessorDescriptor};

/// One named special-function register, optionally qualified by the bank
/// it lives in (`None` means the same address names this register in
/// every bank, e.g. `STATUS`/`PCLATH` on the classic PIC14 common RAM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SfrName {
    pub bank: Option<u32>,
    pub addr: u16,
    pub name: &'static str,
}

/// One decoded-and-labelled source line, keyed by the byte address of its
/// first word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintedLine {
    pub address: u32,
    pub text: String,
}

/// Drives the three-pass disassembly described in `spec.md` §4.8: mark
/// second-word bytes, mark branch sources/destinations, print.
#[derive(Debug, Clone)]
pub struct Disassembler {
    pub class: InstructionClass,
    pub table: Vec<InstructionEntry>,
    pub program_memory_size: u32,
    pub config_words: AddrRange,
    pub id_locations: AddrRange,
    pub sfr_names: Vec<SfrName>,
    pub status_reg: u16,
    pub pclath_reg: u16,
    pub bsr_reg: u16,
    /// Strict mode: rewrite `RETLW` sequences to `dt` pseudo-ops
    /// (`spec.md` §4.8).
    pub strict: bool,
}

impl Disassembler {
    pub fn new(table: Vec<InstructionEntry>, descriptor: &ProcessorDescriptor, strict: bool) -> Self {
        Disassembler {
            class: descriptor.class,
            table,
            program_memory_size: descriptor.program_memory_size,
            config_words: descriptor.config_words,
            id_locations: descriptor.id_locations,
            sfr_names: Vec::new(),
            status_reg: 0x03,
            pclath_reg: 0x0A,
            bsr_reg: 0x08,
            strict,
        }
    }

    pub fn with_sfr_names(mut self, names: Vec<SfrName>) -> Self {
        self.sfr_names = names;
        self
    }

    fn in_special_range(&self, addr: u32) -> bool {
        self.config_words.contains(addr) || self.id_locations.contains(addr)
    }

    /// The address one past the last byte any pass needs to visit. Config
    /// words and id locations live outside the ordinary program-memory
    /// range on most families (`spec.md` §3), so the scan has to cover
    /// whichever of the three extends furthest.
    fn scan_end(&self) -> u32 {
        self.program_memory_size.max(self.config_words.end).max(self.id_locations.end)
    }

    /// Pass 1 (`spec.md` §4.1 "Labelling pass" prerequisite): walk the
    /// image once, marking every instruction's second word so later passes
    /// never try to decode mid-instruction.
    pub fn mark_second_words(&self, mem: &mut MemoryMap) {
        let mut addr = 0u32;
        while addr < self.scan_end() {
            if !mem.is_used(addr) || self.in_special_range(addr) {
                addr += 2;
                continue;
            }
            match decode(&self.table, mem, self.class, addr) {
                Some(decoded) => {
                    if decoded.byte_len == 4 {
                        mem.set_second_word(addr + 2);
                    }
                    addr += decoded.byte_len.max(2);
                }
                None => addr += 2,
            }
        }
    }

    /// Byte address a branch/call instruction at `addr` targets, or
    /// `None` if `icode` is not a branch. PIC14's 11-bit `CALL`/`GOTO`
    /// only carries the low bits of the target instruction address; the
    /// high (page) bits are taken from the current instruction's own page,
    /// matching how the disassembler (lacking the assembler's `PAGESEL`
    /// bookkeeping) must assume the runtime `PCLATH` has not changed since
    /// entering this page.
    fn branch_target(&self, decoded: &Decoded, addr: u32) -> Option<u32> {
        let shift = self.class.org_to_byte_shift();
        let insn_addr = addr >> shift;
        match decoded.icode {
            Icode::Call | Icode::Goto if decoded.byte_len == 4 => {
                let low = *decoded.operands.values.first()? as u32;
                Some((low << shift) as u32)
            }
            Icode::Call | Icode::Goto => {
                let low = *decoded.operands.values.first()? as u32;
                let page = self.class.page_from_insn_addr(insn_addr);
                let dest_insn = (page << self.class.page_shift()) | low;
                Some(dest_insn << shift)
            }
            Icode::Bra | Icode::Rcall => {
                let disp = *decoded.operands.values.first()?;
                let pc_after = addr as i64 + decoded.byte_len as i64;
                Some((pc_after + disp * 2) as u32)
            }
            _ => None,
        }
    }

    /// Pass 2 (`spec.md` §4.1 "Labelling pass"): mark each branch source's
    /// destination byte, tagging the source with `W_ADDR_T_BRANCH_SRC` and
    /// the destination with `W_ADDR_T_FUNC` (`CALL`/`RCALL`) or
    /// `W_ADDR_T_LABEL` (`GOTO`/`BRA`), only for destinations within
    /// program memory whose second-word bit is clear.
    pub fn mark_branches(&self, mem: &mut MemoryMap) {
        let mut addr = 0u32;
        while addr < self.scan_end() {
            if mem.is_second_word(addr) || !mem.is_used(addr) || self.in_special_range(addr) {
                addr += 2;
                continue;
            }
            let Some(decoded) = decode(&self.table, mem, self.class, addr) else {
                addr += 2;
                continue;
            };
            if let Some(dest) = self.branch_target(&decoded, addr) {
                if dest < self.program_memory_size && !mem.is_second_word(dest) {
                    mem.set_addr_type(addr, AddrType::BranchSrc);
                    let dest_type = match decoded.icode {
                        Icode::Call | Icode::Rcall => AddrType::FuncEntry,
                        _ => AddrType::Label,
                    };
                    mem.set_addr_type(dest, dest_type);
                }
            }
            addr += decoded.byte_len.max(2);
        }
    }

    fn label_for(&self, mem: &MemoryMap, dest: u32) -> String {
        match mem.addr_type(dest) {
            AddrType::FuncEntry => format!("sub_{dest:x}"),
            _ => format!("label_{dest:x}"),
        }
    }

    /// Refine a raw file-register operand into its SFR name when the bank
    /// it resolves in is unambiguous (`spec.md` §4.1): a bank-independent
    /// (common-RAM) SFR is always nameable; a banked one is nameable only
    /// when `state`'s bank bits covering this address are all valid.
    fn refine_file_operand(&self, f: i64, state: &RegisterState) -> String {
        let addr = f as u16;
        let bank_known = state.bank_valid == 0xFF;
        let bank = state.bank as u32;
        for sfr in &self.sfr_names {
            if sfr.addr != addr {
                continue;
            }
            match sfr.bank {
                None => return sfr.name.to_string(),
                Some(b) if bank_known && b == bank => return sfr.name.to_string(),
                _ => continue,
            }
        }
        format!("0x{addr:02x}")
    }

    fn format_operands(&self, decoded: &Decoded, state: &RegisterState) -> String {
        match decoded.icode {
            Icode::Movwf | Icode::Clrf | Icode::Movf | Icode::Addwf => {
                let f = decoded.operands.values[0];
                let rest: Vec<String> = decoded.operands.values[1..].iter().map(|v| format!("{v}")).collect();
                let mut parts = vec![self.refine_file_operand(f, state)];
                parts.extend(rest);
                parts.join(", ")
            }
            Icode::Bcf | Icode::Bsf | Icode::Btg => {
                let f = decoded.operands.values[0];
                let b = decoded.operands.values.get(1).copied().unwrap_or(0);
                format!("{}, {}", self.refine_file_operand(f, state), b)
            }
            _ => decoded
                .operands
                .values
                .iter()
                .map(|v| format!("0x{v:x}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Pass 3: print every instruction in the image. Addresses inside the
    /// processor's config-word or id-location ranges are always shown as
    /// `dw`/`db` regardless of what they decode to (`spec.md` §4.8).
    pub fn print_all(&self, mem: &MemoryMap) -> Vec<PrintedLine> {
        let mut lines = Vec::new();
        let mut addr = 0u32;
        let mut state = RegisterState::unknown();
        while addr < self.scan_end() {
            if mem.is_second_word(addr) {
                addr += 2;
                continue;
            }
            if !mem.is_used(addr) {
                addr += 2;
                continue;
            }
            if self.in_special_range(addr) {
                let (word, _) = mem.get_le16(addr);
                lines.push(PrintedLine {
                    address: addr,
                    text: format!("dw 0x{word:04x}"),
                });
                addr += 2;
                continue;
            }

            // A label or a call/goto target invalidates what we know about
            // register state: another flow path may reach here with
            // different contents (`spec.md` §4.1).
            if matches!(mem.addr_type(addr), AddrType::Label | AddrType::FuncEntry) {
                state = RegisterState::unknown();
            }

            match decode(&self.table, mem, self.class, addr) {
                Some(decoded) => {
                    let text = if self.strict && decoded.icode == Icode::Retlw {
                        let k = decoded.operands.values.first().copied().unwrap_or(0);
                        format!("dt 0x{k:02x}")
                    } else if mem.addr_type(addr) == AddrType::BranchSrc {
                        match self.branch_target(&decoded, addr) {
                            Some(dest) if dest < self.program_memory_size && !mem.is_second_word(dest) => {
                                format!("{} {}", decoded.mnemonic, self.label_for(mem, dest))
                            }
                            _ => format!("{} {}", decoded.mnemonic, self.format_operands(&decoded, &state)),
                        }
                    } else {
                        let ops = self.format_operands(&decoded, &state);
                        if ops.is_empty() {
                            decoded.mnemonic.to_string()
                        } else {
                            format!("{} {}", decoded.mnemonic, ops)
                        }
                    };
                    state.apply(decoded.icode, &decoded.operands, self.status_reg, self.pclath_reg, self.bsr_reg);
                    lines.push(PrintedLine { address: addr, text });
                    addr += decoded.byte_len;
                }
                None => {
                    let (word, _) = mem.get_le16(addr);
                    lines.push(PrintedLine {
                        address: addr,
                        text: format!("dw 0x{word:04x}"),
                    });
                    addr += 2;
                }
            }
        }
        lines
    }

    /// Run all three passes and return the printed listing, a convenience
    /// entry point matching the control flow `spec.md` §4.8 describes.
    pub fn disassemble(&self, mem: &mut MemoryMap) -> Vec<PrintedLine> {
        self.mark_second_words(mem);
        self.mark_branches(mem);
        self.print_all(mem)
    }
}

/// Build a lookup from byte address to printed line, for tests and
/// embedders that want random access rather than the ordered listing.
pub fn index_by_address(lines: &[PrintedLine]) -> HashMap<u32, &str> {
    lines.iter().map(|l| (l.address, l.text.as_str())).collect()
}
