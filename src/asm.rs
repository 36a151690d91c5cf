//! The two-pass assembler driver (`spec.md` §4.7).
//!
//! Grounded on `gputils/gpasm/gpasm.c`'s `assemble()`: pass one seeds a
//! builtin directive/opcode table and the label-defining symbol table
//! without emitting any code; pass two resets the instruction pointer,
//! rebuilds the command-line defines table, and emits words and
//! relocations into the active section. The lexer/parser that drives
//! these calls is an external collaborator (`spec.md` §1 non-goals); this
//! module is the contract it calls into, exercised directly by this
//! crate's tests the way `gpasm.c`'s `assemble()` drives `yyparse()`.

use crate::codec::{Encoded, RelocRequestKind};
use crate::object::{Object, ObjectFlags, RelocType, Relocation, Section, SectionFlags, StorageClass, Symbol};
use crate::processor::InstructionClass;
use crate::symtab::TableStack;

/// `spec.md` §4.7 "Relocation-mode": whether branches to external symbols
/// emit relocations (`Relocatable`) or are resolved immediately and set
/// the object's `F_ABSOLUTE` flag (`Absolute`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Absolute,
    Relocatable,
}

/// Whether a `stTop`/`stGlobal` entry is a label (survives into pass two)
/// or a transient variable (`gpasm.c`'s `delete_variable_symbols`, called
/// between pass one and pass two, clears these).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Label,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSymbol {
    pub value: i64,
    pub kind: SymbolKind,
}

/// A captured macro body, recorded verbatim in pass one and expanded (by
/// simple textual parameter substitution) when pass two re-encounters the
/// invocation (`spec.md` §4.7 "capture bodies verbatim without
/// expansion").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    pub params: Vec<String>,
    pub body: Vec<String>,
}

/// A captured `while` loop body, keyed by its position in the source
/// rather than by name (while loops are anonymous).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhileDef {
    pub condition: String,
    pub body: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub errors: u32,
    pub warnings: u32,
}

/// Exit code convention of `spec.md` §4.7: `(errors > 0) ? FAILURE :
/// SUCCESS`.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// The assembler's two-pass driver state (`spec.md` §4.7, §5 "`state`
/// (assembler)"): an explicit, per-invocation context rather than the
/// global `state` struct the source uses (`spec.md` §9 "Global mutable
/// state").
#[derive(Debug)]
pub struct AssemblerDriver {
    pub class: InstructionClass,
    pub mode: Mode,
    pub radix: u32,
    pub extended_mode: bool,
    pub pass: u8,
    pub byte_addr: u32,
    pub object: Object,
    pub current_section: usize,
    /// `stTop`/`stGlobal`: label and variable definitions, reset between
    /// passes (variables only).
    pub globals: TableStack<DriverSymbol>,
    /// `stDefines`: command-line `-D` defines, saved so pass two can
    /// rebuild a fresh copy without pass-one pollution.
    pub command_line_defines: Vec<(String, i64)>,
    pub defines: TableStack<DriverSymbol>,
    pub macros: std::collections::HashMap<String, MacroDef>,
    pub while_depth: u32,
    pub cblock: i64,
    pub cblock_defined: bool,
    pub found_config: bool,
    pub found_devid: bool,
    pub found_idlocs: bool,
    pub found_end: bool,
    pub counts: Counts,
}

impl AssemblerDriver {
    /// Build a driver for a fresh assembly invocation and seed pass one:
    /// an empty `stTop`/`stGlobal`, `stDefines` from the command-line
    /// copy, and the case-insensitive builtin table is the caller's
    /// opcode/directive catalog (external collaborator), not modeled
    /// here.
    pub fn new(
        object_name: impl Into<String>,
        class: InstructionClass,
        processor_name: impl Into<String>,
        mode: Mode,
        command_line_defines: Vec<(String, i64)>,
    ) -> Self {
        let mut defines = TableStack::new();
        defines.push(false);
        for (name, value) in &command_line_defines {
            defines.insert_top(
                name.clone(),
                DriverSymbol {
                    value: *value,
                    kind: SymbolKind::Variable,
                },
            );
        }
        let mut globals = TableStack::new();
        globals.push(false);

        let mut object = Object::new(object_name, class, processor_name);
        object.is_new = true;

        AssemblerDriver {
            class,
            mode,
            radix: 16,
            extended_mode: false,
            pass: 1,
            byte_addr: 0,
            object,
            current_section: usize::MAX,
            globals,
            command_line_defines,
            defines,
            macros: std::collections::HashMap::new(),
            while_depth: 0,
            cblock: 0,
            cblock_defined: false,
            found_config: false,
            found_devid: false,
            found_idlocs: false,
            found_end: false,
            counts: Counts::default(),
        }
    }

    /// Pass one: record a label assignment. Labels survive into pass two;
    /// pass two re-derives the same values by re-running the source, so
    /// pass one's only job is to make forward references resolvable.
    pub fn pass1_define_label(&mut self, name: impl Into<String>, value: i64) {
        self.globals.insert_top(
            name.into(),
            DriverSymbol {
                value,
                kind: SymbolKind::Label,
            },
        );
    }

    pub fn pass1_define_variable(&mut self, name: impl Into<String>, value: i64) {
        self.globals.insert_top(
            name.into(),
            DriverSymbol {
                value,
                kind: SymbolKind::Variable,
            },
        );
    }

    /// Pass one: capture a macro body verbatim (`spec.md` §4.7).
    pub fn pass1_define_macro(&mut self, name: impl Into<String>, params: Vec<String>, body: Vec<String>) {
        self.macros.insert(name.into(), MacroDef { params, body });
    }

    /// Expand `name`'s captured body, substituting `args` positionally for
    /// its parameters, one-for-one textual replacement
    /// (`spec.md` §4.7 "expanded in place").
    pub fn expand_macro(&self, name: &str, args: &[String]) -> Option<Vec<String>> {
        let def = self.macros.get(name)?;
        Some(
            def.body
                .iter()
                .map(|tok| match def.params.iter().position(|p| p == tok) {
                    Some(i) => args.get(i).cloned().unwrap_or_default(),
                    None => tok.clone(),
                })
                .collect(),
        )
    }

    /// End pass one and set up pass two (`spec.md` §4.7 "Pass 2"):
    /// rebuild `stDefines` from the saved command-line copy, clear
    /// variables (but not labels) from `stTop`/`stGlobal`, reset the
    /// instruction pointer and per-pass found-flags.
    pub fn begin_pass2(&mut self) {
        self.pass = 2;
        self.byte_addr = 0;

        let mut defines = TableStack::new();
        defines.push(false);
        for (name, value) in &self.command_line_defines {
            defines.insert_top(
                name.clone(),
                DriverSymbol {
                    value: *value,
                    kind: SymbolKind::Variable,
                },
            );
        }
        self.defines = defines;

        if let Some(top) = self.globals.top() {
            let labels: Vec<(String, DriverSymbol)> = top
                .iter()
                .filter(|e| e.value.kind == SymbolKind::Label)
                .map(|e| (e.name.clone(), e.value))
                .collect();
            let mut fresh = crate::symtab::SymbolTable::new(top.is_case_insensitive());
            for (name, value) in labels {
                fresh.insert(name, value);
            }
            if let Some(slot) = self.globals.top_mut() {
                *slot = fresh;
            }
        }

        self.found_config = false;
        self.found_devid = false;
        self.found_idlocs = false;
        self.found_end = false;
        self.cblock = 0;
        self.cblock_defined = false;
    }

    /// Start (or switch to) the named section, creating it if this is its
    /// first mention.
    pub fn select_section(&mut self, name: &str, flags: SectionFlags) -> usize {
        if let Some(i) = self.object.sections.iter().position(|s| s.name == name) {
            self.current_section = i;
            return i;
        }
        let section = Section::new(name, flags);
        let i = self.object.add_section(section) as usize;
        self.current_section = i;
        i
    }

    fn current_section_mut(&mut self) -> &mut Section {
        &mut self.object.sections[self.current_section]
    }

    fn map_reloc_kind(kind: RelocRequestKind) -> RelocType {
        match kind {
            RelocRequestKind::Call => RelocType::Call,
            RelocRequestKind::Goto => RelocType::Goto,
            RelocRequestKind::Goto2 => RelocType::Goto2,
            RelocRequestKind::Bra => RelocType::Bra,
            RelocRequestKind::F => RelocType::F,
        }
    }

    /// Emit one already-encoded instruction into the active section at
    /// the current instruction pointer, advancing it by the instruction's
    /// byte length.
    ///
    /// In [`Mode::Relocatable`], every relocation request the encoder
    /// produced is recorded against `target_symbol` (`spec.md` §4.7: "if
    /// `MODE_RELOCATABLE`, branches to external symbols emit
    /// relocations"). In [`Mode::Absolute`] the caller has already
    /// resolved operands to final values, so no relocation is recorded
    /// (`spec.md` §4.7: "if `MODE_ABSOLUTE`, branches resolve immediately").
    pub fn emit_instruction(&mut self, encoded: &Encoded, target_symbol: Option<u32>) -> crate::error::Result<()> {
        let start = self.byte_addr;
        let section_name = self.current_section_mut().name.clone();
        for (i, &word) in encoded.words.iter().enumerate() {
            self.current_section_mut()
                .data
                .put_le16(start + (i as u32) * 2, word, Some(&section_name), None);
        }
        if matches!(self.mode, Mode::Relocatable) {
            if let Some(sym) = target_symbol {
                for req in &encoded.relocs {
                    let addr = start + req.byte_offset_in_words * 2;
                    self.object.add_relocation(
                        self.current_section as u32,
                        Relocation {
                            address: addr,
                            symbol: sym,
                            offset: 0,
                            kind: Self::map_reloc_kind(req.kind),
                        },
                    )?;
                }
            }
        }
        self.byte_addr += (encoded.words.len() as u32) * 2;
        let section = self.current_section_mut();
        section.size = section.size.max(self.byte_addr);
        Ok(())
    }

    /// Record a raw data byte (e.g. a `db`/`dw`/`dt` directive) at the
    /// current instruction pointer, advancing it by one byte.
    pub fn emit_byte(&mut self, value: u8) {
        let addr = self.byte_addr;
        let section_name = self.current_section_mut().name.clone();
        self.current_section_mut().data.put(addr, value, Some(&section_name), None);
        self.byte_addr += 1;
        let section = self.current_section_mut();
        section.size = section.size.max(self.byte_addr);
    }

    pub fn report_error(&mut self) {
        self.counts.errors += 1;
    }

    pub fn report_warning(&mut self) {
        self.counts.warnings += 1;
    }

    /// Terminate the assembly (`spec.md` §4.7): patch object flags,
    /// return the process exit code. Hex/listing/symbol-table emission
    /// and closing output sinks are external-collaborator concerns
    /// (`spec.md` §1 non-goals); this is the core decision the embedder
    /// acts on.
    pub fn finish(&mut self) -> i32 {
        match self.mode {
            Mode::Absolute => self.object.flags = self.object.flags.union(ObjectFlags::ABSOLUTE),
            Mode::Relocatable => {}
        }
        if self.extended_mode {
            self.object.flags = self.object.flags.union(ObjectFlags::EXTENDED18);
        }
        if self.counts.errors > 0 {
            EXIT_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }

    /// Define (or look up) the section-defining symbol for section
    /// `section_index`, matching `spec.md` §3 "Section"'s "backing
    /// `symbol`".
    pub fn define_section_symbol(&mut self, section_index: usize) -> u32 {
        if let Some(sym) = self.object.sections[section_index].symbol {
            return sym;
        }
        let name = self.object.sections[section_index].name.clone();
        let sym = self.object.add_symbol(Symbol::new(name, 0, StorageClass::Section));
        self.object.sections[section_index].symbol = Some(sym);
        sym
    }
}
