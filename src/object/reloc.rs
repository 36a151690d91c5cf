//! Relocation types (`spec.md` §3 "Relocation").

/// The tagged relocation type. Each variant's wire value is assigned by
/// [`RelocType::wire_value`]; the groupings mirror `spec.md` §3's
/// lettered list (a)-(g).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocType {
    // (a) absolute branches
    Call,
    Goto,
    Goto2,
    Rcall,
    // (b) relative branches
    Bra,
    CondBra,
    // (c) bank-selection primitives
    Banksel,
    Movlb,
    Ibanksel,
    // (d) page-selection primitives
    PagselWreg,
    PagselBits,
    PagselMovlp,
    Pagsel,
    // (e) arithmetic relocs
    Low,
    High,
    Upper,
    // (f) operand relocs
    F,
    Tris,
    Tris3Bit,
    Movlr,
    Ff1,
    Ff2,
    Lfsr1,
    Lfsr2,
    Access,
    P,
    // (g) section-size relocs
    ScnszLow,
    ScnszHigh,
    ScnszUpper,
    ScnendLow,
    ScnendHigh,
    ScnendUpper,
}

impl RelocType {
    /// The 16-bit wire encoding for `r_type`.
    pub fn wire_value(self) -> u16 {
        use RelocType::*;
        match self {
            Call => 1,
            Goto => 2,
            Goto2 => 3,
            Rcall => 4,
            Bra => 5,
            CondBra => 6,
            Banksel => 7,
            Movlb => 8,
            Ibanksel => 9,
            PagselWreg => 10,
            PagselBits => 11,
            PagselMovlp => 12,
            Pagsel => 13,
            Low => 14,
            High => 15,
            Upper => 16,
            F => 17,
            Tris => 18,
            Tris3Bit => 19,
            Movlr => 20,
            Ff1 => 21,
            Ff2 => 22,
            Lfsr1 => 23,
            Lfsr2 => 24,
            Access => 25,
            P => 26,
            ScnszLow => 27,
            ScnszHigh => 28,
            ScnszUpper => 29,
            ScnendLow => 30,
            ScnendHigh => 31,
            ScnendUpper => 32,
        }
    }

    pub fn from_wire(value: u16) -> Option<RelocType> {
        use RelocType::*;
        Some(match value {
            1 => Call,
            2 => Goto,
            3 => Goto2,
            4 => Rcall,
            5 => Bra,
            6 => CondBra,
            7 => Banksel,
            8 => Movlb,
            9 => Ibanksel,
            10 => PagselWreg,
            11 => PagselBits,
            12 => PagselMovlp,
            13 => Pagsel,
            14 => Low,
            15 => High,
            16 => Upper,
            17 => F,
            18 => Tris,
            19 => Tris3Bit,
            20 => Movlr,
            21 => Ff1,
            22 => Ff2,
            23 => Lfsr1,
            24 => Lfsr2,
            25 => Access,
            26 => P,
            27 => ScnszLow,
            28 => ScnszHigh,
            29 => ScnszUpper,
            30 => ScnendLow,
            31 => ScnendHigh,
            32 => ScnendUpper,
            _ => return None,
        })
    }

    /// Whether this relocation is a bank-selection primitive the peephole
    /// optimizer may remove (`spec.md` §4.6).
    pub fn is_banksel(self) -> bool {
        matches!(self, RelocType::Banksel | RelocType::Movlb | RelocType::Ibanksel)
    }

    /// Whether this relocation is a page-selection primitive.
    pub fn is_pagesel(self) -> bool {
        matches!(
            self,
            RelocType::PagselWreg | RelocType::PagselBits | RelocType::PagselMovlp | RelocType::Pagsel
        )
    }

    /// Whether this relocation is an absolute call/goto target.
    pub fn is_abs_branch(self) -> bool {
        matches!(self, RelocType::Call | RelocType::Goto | RelocType::Goto2 | RelocType::Rcall)
    }
}

/// A relocation entry (`spec.md` §3): owning section is implicit (the
/// relocation lives in that section's `relocations` list); everything else
/// is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Byte offset within the owning section.
    pub address: u32,
    /// Index into the owning object's symbol table.
    pub symbol: u32,
    pub offset: i16,
    pub kind: RelocType,
}

pub const RELOC_SIZ: usize = 12;
