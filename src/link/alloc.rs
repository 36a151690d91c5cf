//! The section allocator (`spec.md` §4.5).
//!
//! Three phases per memory region, grounded on `gputils/gplink/gplink.c`'s
//! `_process_script_memories`/`_link_sections` pass order: absolute
//! sections are checked in place, script-assigned sections are placed into
//! their named region in order, and everything else is placed first-fit
//! into any region whose kind accepts it.

use crate::error::{codes, Error, Result};
use crate::link::script::{LinkerScript, RegionKind};
use crate::object::{Section, SectionFlags};

fn region_accepts(kind: RegionKind, flags: SectionFlags) -> bool {
    match kind {
        RegionKind::Rom => flags.intersects(SectionFlags::TEXT.union(SectionFlags::DATA_ROM)),
        RegionKind::Ram => flags.intersects(
            SectionFlags::BSS
                .union(SectionFlags::OVERLAY)
                .union(SectionFlags::ACCESS)
                .union(SectionFlags::SHARED),
        ),
    }
}

/// Occupied byte ranges within one region, kept sorted by start so a
/// first-fit scan is a single linear walk.
#[derive(Debug, Default)]
struct Occupied(Vec<(u32, u32)>);

impl Occupied {
    fn overlaps(&self, start: u32, len: u32) -> bool {
        let end = start.saturating_add(len);
        self.0.iter().any(|&(s, e)| start < e && s < end)
    }

    fn insert(&mut self, start: u32, len: u32) {
        let end = start.saturating_add(len);
        let pos = self.0.partition_point(|&(s, _)| s < start);
        self.0.insert(pos, (start, end));
    }

    /// First gap of at least `len` bytes within `[region_start,
    /// region_end)`, walking occupied ranges in order.
    fn first_fit(&self, region_start: u32, region_end: u32, len: u32) -> Option<u32> {
        let mut cursor = region_start;
        for &(s, e) in &self.0 {
            if s >= cursor && s.saturating_sub(cursor) >= len {
                return Some(cursor);
            }
            if e > cursor {
                cursor = e;
            }
        }
        if region_end.saturating_sub(cursor) >= len {
            Some(cursor)
        } else {
            None
        }
    }
}

/// Allocate every section in `sections` into a region of `script`,
/// mutating each section's `address` in place. Sections flagged `ABS` are
/// validated but never moved (`spec.md` §3, §4.5).
///
/// Order matters: `sections` is processed once for the absolute phase,
/// once for script-assigned sections (in the order they appear in
/// `sections`, matching `spec.md`'s "placed into their regions in order"),
/// and once for everything left over.
pub fn allocate(sections: &mut [Section], script: &LinkerScript) -> Result<()> {
    let mut occupied: Vec<Occupied> = script.regions.iter().map(|_| Occupied::default()).collect();

    // Phase 1: absolute sections.
    for section in sections.iter() {
        if !section.is_absolute() {
            continue;
        }
        for (ri, region) in script.regions.iter().enumerate() {
            if region.contains_range(section.address, section.size) {
                if occupied[ri].overlaps(section.address, section.size) {
                    return Err(Error::link_error(
                        codes::ERR_SECTION_OVERLAP,
                        format!("absolute section {:?} overlaps another absolute section", section.name),
                    ));
                }
                occupied[ri].insert(section.address, section.size);
            }
        }
    }

    // Phase 2: script-assigned sections, in encounter order.
    for i in 0..sections.len() {
        if sections[i].is_absolute() {
            continue;
        }
        let Some(region) = script.region_for_section(&sections[i].name) else {
            continue;
        };
        let ri = script.regions.iter().position(|r| r.name == region.name).unwrap();
        if !region_accepts(region.kind, sections[i].flags) {
            return Err(Error::link_error(
                codes::ERR_SECTION_OVERFLOW,
                format!("section {:?} is not legal in region {:?}", sections[i].name, region.name),
            ));
        }
        let Some(addr) = occupied[ri].first_fit(region.start, region.end, sections[i].size) else {
            return Err(Error::link_error(
                codes::ERR_SECTION_OVERFLOW,
                format!("section {:?} does not fit in region {:?}", sections[i].name, region.name),
            ));
        };
        occupied[ri].insert(addr, sections[i].size);
        sections[i].address = addr;
    }

    // Phase 3: unassigned sections, first-fit into any legal region.
    for i in 0..sections.len() {
        if sections[i].is_absolute() || script.region_for_section(&sections[i].name).is_some() {
            continue;
        }
        let mut placed = false;
        for (ri, region) in script.regions.iter().enumerate() {
            if !region_accepts(region.kind, sections[i].flags) {
                continue;
            }
            if let Some(addr) = occupied[ri].first_fit(region.start, region.end, sections[i].size) {
                occupied[ri].insert(addr, sections[i].size);
                sections[i].address = addr;
                placed = true;
                break;
            }
        }
        if !placed {
            return Err(Error::link_error(
                codes::ERR_SECTION_OVERFLOW,
                format!("no region fits unassigned section {:?}", sections[i].name),
            ));
        }
    }

    Ok(())
}
