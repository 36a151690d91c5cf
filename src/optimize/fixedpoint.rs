//! The experimental fixed-point peephole pass (`spec.md` §4.6): a
//! whole-section dataflow analysis of redundant `PAGESEL`/`BANKSEL`
//! instructions, grounded on `gputils/libgputils/gpcoffopt.c`'s
//! `gp_coffopt_remove_unnecessary_pagesel_experimental` and its
//! `_pagesel_check_state` propagation step.
//!
//! Unlike [`super::classical`]'s local 4-slot pattern matching, this pass
//! builds one abstract-state node per bank/page-relevant relocation and
//! per control-flow-crossing instruction, then iterates a propagation
//! step to a fixed point before removing anything. The original C tracks
//! this convergence with a `changed` flag that one code path (the state
//! update inside a `PAGESEL` node's own case) forgets to set, so a
//! PAGESEL whose predecessor state changes on a later iteration can be
//! left un-reconsidered. This port always sets `changed` on every state
//! update, selector or not, so convergence is exact.

use std::collections::{HashMap, HashSet};

use crate::object::{Object, RelocType};
use crate::processor::InstructionClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Page,
    Bank,
}

impl Axis {
    fn is_selector(self, kind: RelocType) -> bool {
        match self {
            Axis::Page => kind.is_pagesel(),
            Axis::Bank => kind.is_banksel(),
        }
    }

    fn value_of(self, class: InstructionClass, target_byte: u32) -> u32 {
        match self {
            Axis::Page => class.page_from_insn_addr(target_byte >> class.org_to_byte_shift()),
            Axis::Bank => class.bank_from_addr(target_byte),
        }
    }
}

fn is_crossing(kind: RelocType) -> bool {
    matches!(
        kind,
        RelocType::Call | RelocType::Rcall | RelocType::Goto | RelocType::Goto2 | RelocType::Bra | RelocType::CondBra
    )
}

struct Node {
    offset: u32,
    len: u32,
    kind: RelocType,
    target_byte: u32,
}

fn merge(values: &[Option<u32>]) -> Option<u32> {
    let mut iter = values.iter().copied();
    let first = iter.next()??;
    if iter.all(|v| v == Some(first)) {
        Some(first)
    } else {
        None
    }
}

/// Collect the nodes this axis's dataflow cares about (its own selector
/// plus every control-flow-crossing relocation, which both propagate
/// state through and can be the source edge of a join) and the join map:
/// for every offset that some crossing relocation targets inside this
/// section, the indices of the nodes whose exit state feeds that join.
fn build_nodes(object: &Object, section_index: usize, class: InstructionClass, axis: Axis) -> (Vec<Node>, HashMap<u32, Vec<usize>>) {
    let section_addr = object.sections[section_index].address;
    let mut relocs = object.sections[section_index].relocations.clone();
    relocs.sort_by_key(|r| r.address);

    let nodes: Vec<Node> = relocs
        .iter()
        .filter(|r| axis.is_selector(r.kind) || is_crossing(r.kind))
        .map(|r| {
            let sym = &object.symbols[r.symbol as usize];
            let target_byte = (sym.value as i64 + r.offset as i64) as u32;
            Node {
                offset: r.address,
                len: super::classical::reloc_len(r.kind, class),
                kind: r.kind,
                target_byte,
            }
        })
        .collect();

    let mut joins: HashMap<u32, Vec<usize>> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        if !is_crossing(node.kind) {
            continue;
        }
        if node.target_byte < section_addr {
            continue;
        }
        let local = node.target_byte - section_addr;
        joins.entry(local).or_default().push(i);
    }
    (nodes, joins)
}

fn converge(nodes: &[Node], joins: &HashMap<u32, Vec<usize>>, class: InstructionClass, axis: Axis, entry_state: Option<u32>) -> Vec<Option<u32>> {
    let mut state_out: Vec<Option<u32>> = vec![None; nodes.len()];
    loop {
        let mut changed = false;
        let mut prev = entry_state;
        for (i, node) in nodes.iter().enumerate() {
            let mut incoming = vec![prev];
            if let Some(sources) = joins.get(&node.offset) {
                incoming.extend(sources.iter().map(|&s| state_out[s]));
            }
            let state_in = merge(&incoming);
            let new_out = if axis.is_selector(node.kind) {
                Some(axis.value_of(class, node.target_byte))
            } else if matches!(node.kind, RelocType::Call | RelocType::Rcall) {
                // A call may return with the callee having changed the
                // register this axis tracks; nothing downstream can trust
                // its pre-call value.
                None
            } else {
                state_in
            };
            if state_out[i] != new_out {
                state_out[i] = new_out;
                changed = true;
            }
            prev = new_out;
        }
        if !changed {
            return state_out;
        }
    }
}

fn removable_offsets(
    object: &Object,
    section_index: usize,
    class: InstructionClass,
    axis: Axis,
    entry_state: Option<u32>,
    protected_offsets: &HashSet<u32>,
) -> Vec<(u32, u32)> {
    let (nodes, joins) = build_nodes(object, section_index, class, axis);
    let state_out = converge(&nodes, &joins, class, axis, entry_state);

    let mut removable = Vec::new();
    let mut prev = entry_state;
    for (i, node) in nodes.iter().enumerate() {
        let mut incoming = vec![prev];
        if let Some(sources) = joins.get(&node.offset) {
            incoming.extend(sources.iter().map(|&s| state_out[s]));
        }
        let state_in = merge(&incoming);
        if axis.is_selector(node.kind) && !protected_offsets.contains(&node.offset) {
            let desired = axis.value_of(class, node.target_byte);
            if state_in == Some(desired) {
                removable.push((node.offset, node.len));
            }
        }
        prev = state_out[i];
    }
    removable
}

fn remove_all(object: &mut Object, section_index: usize, mut removable: Vec<(u32, u32)>) -> usize {
    // Remove from the highest offset down so earlier offsets in the list
    // stay valid as later ones shift the section's bytes.
    removable.sort_by(|a, b| b.0.cmp(&a.0));
    for (offset, len) in &removable {
        super::remove_instruction(object, section_index, *offset, *len);
    }
    removable.len()
}

/// Remove every `PAGESEL` whose predecessor state (the union of
/// fall-through and every linked branch's exit state) already equals the
/// page it would select. `current_page` is the page this section's code
/// is assumed to start executing in (`spec.md` §4.6: "Section entry state
/// is its page").
pub fn remove_unnecessary_pagesel(
    object: &mut Object,
    section_index: usize,
    class: InstructionClass,
    current_page: u32,
    protected_offsets: &HashSet<u32>,
) -> usize {
    let removable = removable_offsets(object, section_index, class, Axis::Page, Some(current_page), protected_offsets);
    remove_all(object, section_index, removable)
}

/// Same analysis for `BANKSEL`/`MOVLB`/`IBANKSEL`, keyed on the bank axis.
pub fn remove_unnecessary_banksel(
    object: &mut Object,
    section_index: usize,
    class: InstructionClass,
    current_bank: u32,
    protected_offsets: &HashSet<u32>,
) -> usize {
    let removable = removable_offsets(object, section_index, class, Axis::Bank, Some(current_bank), protected_offsets);
    remove_all(object, section_index, removable)
}
