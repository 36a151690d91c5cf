//! Symbol resolution and archive pull-in (`spec.md` §4.4).
//!
//! Grounded on `gputils/gplink/gplink.c`'s `_scan_archive`/`_scan_index`/
//! `_count_missing` functions and the three tables `state.symbol.
//! extern_global`/`local`/`missing` it maintains while objects and
//! archives join the link.

use std::collections::{HashMap, HashSet};

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::object::{Object, StorageClass};
use crate::symtab::SymbolTable;

/// A pointer at a symbol owned by one of [`Linker::objects`]: arena-index
/// style (`spec.md` §9), never a reference, so objects can be appended
/// without invalidating earlier lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolRef {
    pub object_index: usize,
    pub symbol_index: u32,
}

/// Missing-symbol reporting level (`spec.md` §4.4): 0 silent, 1 warning, 2
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrictLevel {
    Silent,
    Warn,
    Error,
}

/// The linker's symbol-resolution state: the three tables of `spec.md`
/// §4.4 plus the arena of objects they index into.
#[derive(Debug, Default)]
pub struct Linker {
    pub objects: Vec<Object>,
    pub extern_global: SymbolTable<SymbolRef>,
    pub local: SymbolTable<SymbolRef>,
    pub missing: SymbolTable<()>,
}

impl Linker {
    pub fn new() -> Self {
        Linker::default()
    }

    /// Join one object to the link: its defined exported symbols go into
    /// `extern_global` (resolving any matching `missing` entry); its
    /// `STAT` symbols go into `local`, qualified by object name since two
    /// objects may each define a same-named static; relocations that
    /// still reference an undefined `EXT` symbol seed `missing`.
    pub fn add_object(&mut self, object: Object) -> usize {
        let idx = self.objects.len();
        for (si, sym) in object.symbols.iter().enumerate() {
            match sym.class {
                StorageClass::Ext if sym.section.is_some() => {
                    self.extern_global.insert(
                        sym.name.clone(),
                        SymbolRef {
                            object_index: idx,
                            symbol_index: si as u32,
                        },
                    );
                    self.missing.remove(&sym.name);
                }
                StorageClass::Stat => {
                    self.local.insert(
                        format!("{}:{}", object.name, sym.name),
                        SymbolRef {
                            object_index: idx,
                            symbol_index: si as u32,
                        },
                    );
                }
                _ => {}
            }
        }
        for section in &object.sections {
            for reloc in &section.relocations {
                let sym = &object.symbols[reloc.symbol as usize];
                if sym.class == StorageClass::Ext
                    && sym.section.is_none()
                    && !self.extern_global.contains(&sym.name)
                {
                    self.missing.insert(sym.name.clone(), ());
                }
            }
        }
        self.objects.push(object);
        idx
    }

    /// Remove a linker-synthesized symbol name (`_cinit`, `_stack`,
    /// `_stack_end`) from `missing` before allocation runs, so their
    /// references do not spuriously fail resolution (`spec.md` §4.5).
    pub fn seed_synthesized(&mut self, name: &str) {
        self.missing.remove(name);
    }

    /// Add a linker-synthesized symbol to `extern_global` after allocation
    /// (`spec.md` §4.5): it did not come from any object, so it carries no
    /// [`SymbolRef`]; callers that need its value look it up via
    /// `object_index`/`symbol_index` elsewhere (the synthetic section's own
    /// symbol).
    pub fn add_synthesized(&mut self, name: &str, object_index: usize, symbol_index: u32) {
        self.extern_global.insert(
            name.to_string(),
            SymbolRef {
                object_index,
                symbol_index,
            },
        );
    }

    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    /// Archive pull-in (`spec.md` §4.4): for each archive, repeatedly scan
    /// `missing` against the archive's symbol index, materializing and
    /// joining matching members until a full pass adds nothing, then move
    /// to the next archive. `parse_member` turns one member's raw bytes
    /// into an [`Object`] (the caller's `object::wire::read`, decoupled
    /// here so this module does not hard-code a wire version); `exported_symbols`
    /// extracts a member's exported names for building a missing symbol
    /// index when an archive lacks one.
    pub fn pull_in_archives(
        &mut self,
        archives: &mut [(String, Archive)],
        strict: StrictLevel,
        mut parse_member: impl FnMut(&[u8]) -> Result<Object>,
    ) -> Result<()> {
        for (name, archive) in archives.iter_mut() {
            if archive.index.is_none() {
                log::warn!("\"{name}\" is missing symbol index.");
                let mut index = HashMap::new();
                for (i, member) in archive.members.iter().enumerate() {
                    if let Ok(object) = parse_member(&member.data) {
                        for sym in &object.symbols {
                            if sym.class == StorageClass::Ext && sym.section.is_some() {
                                index.entry(sym.name.clone()).or_insert(i);
                            }
                        }
                    }
                }
                archive.index = Some(index);
            }

            loop {
                let missing_names: Vec<String> = self.missing.names().map(str::to_string).collect();
                let mut modified = false;
                let mut pulled_this_pass: HashSet<usize> = HashSet::new();
                for mname in missing_names {
                    // Re-check: an earlier member pulled in this pass may
                    // already have defined this symbol (a single member can
                    // export more than one name we were waiting on).
                    if !self.missing.contains(&mname) {
                        continue;
                    }
                    let Some(&member_idx) = archive.index.as_ref().unwrap().get(&mname) else {
                        continue;
                    };
                    if !pulled_this_pass.insert(member_idx) {
                        continue;
                    }
                    let bytes = archive.members[member_idx].data.clone();
                    let object = parse_member(&bytes)?;
                    self.add_object(object);
                    modified = true;
                }
                if !modified {
                    break;
                }
            }
        }

        if self.missing_count() > 0 {
            let names: Vec<String> = self.missing.names().map(str::to_string).collect();
            match strict {
                StrictLevel::Silent => {}
                StrictLevel::Warn => {
                    for name in &names {
                        log::warn!("symbol \"{name}\" is undefined.");
                    }
                }
                StrictLevel::Error => {
                    return Err(Error::link_error(
                        crate::error::codes::WARN_MISSING_SYMBOL,
                        format!("undefined symbols: {}", names.join(", ")),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{RelocType, Relocation, Section, SectionFlags, Symbol};
    use crate::processor::InstructionClass;

    fn undefined_ext(name: &str) -> Symbol {
        Symbol::new(name, 0, StorageClass::Ext)
    }

    fn defined_ext(name: &str, section: u32) -> Symbol {
        let mut s = Symbol::new(name, 0, StorageClass::Ext);
        s.section = Some(section);
        s.section_number = 1;
        s
    }

    fn object_referencing(name: &str, target: &str) -> Object {
        let mut obj = Object::new(name, InstructionClass::Pic14, "pic14");
        let sym = obj.add_symbol(undefined_ext(target));
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        section.relocations.push(Relocation {
            address: 0,
            symbol: sym,
            offset: 0,
            kind: RelocType::Call,
        });
        obj.add_section(section);
        obj
    }

    fn object_defining(name: &str, defines: &str, also_refs: Option<&str>) -> Object {
        let mut obj = Object::new(name, InstructionClass::Pic14, "pic14");
        let section_sym_idx = obj.add_symbol(defined_ext(defines, 0));
        let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
        if let Some(other) = also_refs {
            let sym = obj.add_symbol(undefined_ext(other));
            section.relocations.push(Relocation {
                address: 0,
                symbol: sym,
                offset: 0,
                kind: RelocType::Call,
            });
        }
        obj.add_section(section);
        let _ = section_sym_idx;
        obj
    }

    #[test]
    fn two_file_link_resolves_missing() {
        let mut linker = Linker::new();
        linker.add_object(object_referencing("b.o", "foo"));
        assert_eq!(linker.missing_count(), 1);
        linker.add_object(object_defining("a.o", "foo", None));
        assert_eq!(linker.missing_count(), 0);
        assert!(linker.extern_global.contains("foo"));
    }

    #[test]
    fn archive_pull_in_chains_through_missing() {
        let mut linker = Linker::new();
        linker.add_object(object_referencing("main.o", "bar"));
        assert_eq!(linker.missing_count(), 1);

        let mut archive = Archive::new();
        let mut m = object_defining("m.o", "bar", Some("baz"));
        let mut n = object_defining("n.o", "baz", None);
        archive.add_member("m.o", crate::object::wire::write(&mut m).unwrap());
        archive.add_member("n.o", crate::object::wire::write(&mut n).unwrap());

        let mut archives = vec![("libx.a".to_string(), archive)];
        linker
            .pull_in_archives(&mut archives, StrictLevel::Error, |data| crate::object::wire::read(data))
            .unwrap();

        assert_eq!(linker.missing_count(), 0);
        assert_eq!(linker.objects.len(), 3);
        assert!(linker.objects.iter().any(|o| o.name == "m.o"));
        assert!(linker.objects.iter().any(|o| o.name == "n.o"));
    }

    #[test]
    fn member_exporting_two_missing_symbols_is_pulled_in_once() {
        fn object_referencing_both(name: &str, a: &str, b: &str) -> Object {
            let mut obj = Object::new(name, InstructionClass::Pic14, "pic14");
            let mut section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
            for target in [a, b] {
                let sym = obj.add_symbol(undefined_ext(target));
                section.relocations.push(Relocation {
                    address: 0,
                    symbol: sym,
                    offset: 0,
                    kind: RelocType::Call,
                });
            }
            obj.add_section(section);
            obj
        }

        fn libc_defining_both(defines_a: &str, defines_b: &str) -> Object {
            let mut obj = Object::new("libc.o", InstructionClass::Pic14, "pic14");
            obj.add_symbol(defined_ext(defines_a, 0));
            obj.add_symbol(defined_ext(defines_b, 0));
            let section = Section::new(".text", SectionFlags::TEXT.union(SectionFlags::ROM_AREA));
            obj.add_section(section);
            obj
        }

        let mut linker = Linker::new();
        linker.add_object(object_referencing_both("main.o", "malloc", "free"));
        assert_eq!(linker.missing_count(), 2);

        let mut archive = Archive::new();
        let mut libc = libc_defining_both("malloc", "free");
        archive.add_member("libc.o", crate::object::wire::write(&mut libc).unwrap());

        let mut archives = vec![("libc.a".to_string(), archive)];
        linker
            .pull_in_archives(&mut archives, StrictLevel::Error, |data| crate::object::wire::read(data))
            .unwrap();

        assert_eq!(linker.missing_count(), 0);
        // The member must be joined exactly once, not once per exported
        // symbol it happened to satisfy in the same pass.
        assert_eq!(linker.objects.iter().filter(|o| o.name == "libc.o").count(), 1);
        assert_eq!(linker.objects.len(), 2);
    }

    #[test]
    fn strict_error_on_unresolved() {
        let mut linker = Linker::new();
        linker.add_object(object_referencing("b.o", "nowhere"));
        let mut archives: Vec<(String, Archive)> = vec![];
        let result = linker.pull_in_archives(&mut archives, StrictLevel::Error, |data| crate::object::wire::read(data));
        assert!(result.is_err());
    }
}
