//! Hex image output (`spec.md` §6 "Hex output").
//!
//! Three Intel-Hex-derived variants, selected by name (case-insensitive):
//! `inhx8m` (byte-addressed, 16-bit address field, wraps at 64 KiB — the
//! "64K bytes ... upper limit on inhx8m files" noted in
//! `gputils/libgputils/gpmemory.c`), `inhx16` (word-addressed: the address
//! field counts 16-bit program words rather than bytes), and `inhx32`
//! (byte-addressed with Intel's extended-linear-address record so images
//! larger than 64 KiB round-trip). `DOS newlines` selects CRLF vs LF.

use crate::memmap::MemoryMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexFormat {
    Inhx8M,
    Inhx16,
    Inhx32,
}

impl HexFormat {
    pub fn from_name(name: &str) -> Option<HexFormat> {
        match name.to_ascii_lowercase().as_str() {
            "inhx8m" => Some(HexFormat::Inhx8M),
            "inhx16" => Some(HexFormat::Inhx16),
            "inhx32" => Some(HexFormat::Inhx32),
            _ => None,
        }
    }
}

const MAX_RECORD_BYTES: usize = 16;

fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
    (0u32.wrapping_sub(sum) & 0xFF) as u8
}

fn data_record(addr16: u16, data: &[u8]) -> String {
    record(data.len() as u8, addr16, 0x00, data)
}

fn extended_linear_addr_record(upper16: u16) -> String {
    record(2, 0, 0x04, &upper16.to_be_bytes())
}

fn eof_record() -> String {
    record(0, 0, 0x01, &[])
}

fn record(count: u8, addr16: u16, rec_type: u8, data: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(4 + data.len());
    bytes.push(count);
    bytes.extend_from_slice(&addr16.to_be_bytes());
    bytes.push(rec_type);
    bytes.extend_from_slice(data);
    let cksum = checksum(&bytes);
    let mut s = String::with_capacity(1 + bytes.len() * 2 + 2);
    s.push(':');
    for b in &bytes {
        s.push_str(&format!("{b:02X}"));
    }
    s.push_str(&format!("{cksum:02X}"));
    s
}

/// Contiguous runs of used bytes, each split into chunks of at most
/// `MAX_RECORD_BYTES`.
fn used_runs(mem: &MemoryMap) -> Vec<(u32, Vec<u8>)> {
    let addrs = mem.used_addrs();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < addrs.len() {
        let start = addrs[i];
        let mut bytes = vec![mem.get(start).0];
        let mut j = i + 1;
        while j < addrs.len() && addrs[j] == addrs[j - 1] + 1 && bytes.len() < MAX_RECORD_BYTES {
            bytes.push(mem.get(addrs[j]).0);
            j += 1;
        }
        runs.push((start, bytes));
        i = j;
    }
    runs
}

/// Render `mem` as a hex listing in `format`, terminated by an EOF record.
/// Lines are separated by CRLF if `dos_newlines`, otherwise LF.
pub fn write(mem: &MemoryMap, format: HexFormat, dos_newlines: bool) -> String {
    let newline = if dos_newlines { "\r\n" } else { "\n" };
    let mut lines = Vec::new();
    let mut last_upper16: Option<u16> = None;

    for (start, data) in used_runs(mem) {
        match format {
            HexFormat::Inhx8M => {
                lines.push(data_record((start & 0xFFFF) as u16, &data));
            }
            HexFormat::Inhx16 => {
                let word_addr = start / 2;
                lines.push(data_record((word_addr & 0xFFFF) as u16, &data));
            }
            HexFormat::Inhx32 => {
                let upper16 = (start >> 16) as u16;
                if last_upper16 != Some(upper16) {
                    lines.push(extended_linear_addr_record(upper16));
                    last_upper16 = Some(upper16);
                }
                lines.push(data_record((start & 0xFFFF) as u16, &data));
            }
        }
    }
    lines.push(eof_record());
    let mut out = lines.join(newline);
    out.push_str(newline);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexError(pub String);

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hex parse error: {}", self.0)
    }
}

impl std::error::Error for HexError {}

fn parse_hex_byte(s: &str) -> Result<u8, HexError> {
    u8::from_str_radix(s, 16).map_err(|_| HexError(format!("bad hex byte {s:?}")))
}

/// Parse a hex listing produced by [`write`] back into a `MemoryMap`.
pub fn read(text: &str, format: HexFormat) -> Result<MemoryMap, HexError> {
    let mut mem = MemoryMap::new();
    let mut upper16: u32 = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line = line
            .strip_prefix(':')
            .ok_or_else(|| HexError(format!("missing ':' in line {line:?}")))?;
        if line.len() < 8 || line.len() % 2 != 0 {
            return Err(HexError(format!("malformed record {line:?}")));
        }
        let mut raw = Vec::with_capacity(line.len() / 2);
        for chunk in line.as_bytes().chunks(2) {
            let s = std::str::from_utf8(chunk).unwrap();
            raw.push(parse_hex_byte(s)?);
        }
        let (body, cksum) = raw.split_at(raw.len() - 1);
        if checksum(body) != cksum[0] {
            return Err(HexError("checksum mismatch".to_string()));
        }
        let count = body[0] as usize;
        let addr16 = u16::from_be_bytes([body[1], body[2]]);
        let rec_type = body[3];
        let data = &body[4..];
        if data.len() != count {
            return Err(HexError("record length mismatch".to_string()));
        }
        match rec_type {
            0x00 => {
                let base = match format {
                    HexFormat::Inhx8M => addr16 as u32,
                    HexFormat::Inhx16 => (addr16 as u32) * 2,
                    HexFormat::Inhx32 => (upper16 << 16) | addr16 as u32,
                };
                for (i, &b) in data.iter().enumerate() {
                    mem.put(base + i as u32, b, None, None);
                }
            }
            0x01 => break,
            0x04 => {
                upper16 = u16::from_be_bytes([data[0], data[1]]) as u32;
            }
            other => return Err(HexError(format!("unsupported record type {other:#04x}"))),
        }
    }
    Ok(mem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inhx32_round_trips_1kib_image() {
        let mut mem = MemoryMap::new();
        let mut seed: u32 = 0x2463_1a7f;
        for addr in 0..1024u32 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            mem.put(addr, (seed >> 16) as u8, None, None);
        }
        let text = write(&mem, HexFormat::Inhx32, false);
        let back = read(&text, HexFormat::Inhx32).unwrap();
        for addr in 0..1024u32 {
            assert_eq!(mem.get(addr).0, back.get(addr).0);
            assert_eq!(mem.is_used(addr), back.is_used(addr));
        }
    }

    #[test]
    fn inhx32_crosses_64k_boundary() {
        let mut mem = MemoryMap::new();
        mem.put(0xFFFE, 0xAA, None, None);
        mem.put(0x1_0002, 0xBB, None, None);
        let text = write(&mem, HexFormat::Inhx32, false);
        let back = read(&text, HexFormat::Inhx32).unwrap();
        assert_eq!(back.get(0xFFFE).0, 0xAA);
        assert_eq!(back.get(0x1_0002).0, 0xBB);
    }

    #[test]
    fn dos_newlines_use_crlf() {
        let mut mem = MemoryMap::new();
        mem.put(0, 1, None, None);
        let text = write(&mem, HexFormat::Inhx8M, true);
        assert!(text.contains("\r\n"));
    }

    #[test]
    fn inhx16_addresses_are_word_counted() {
        let mut mem = MemoryMap::new();
        mem.put(4, 0x12, None, None);
        mem.put(5, 0x34, None, None);
        let text = write(&mem, HexFormat::Inhx16, false);
        // word address 2 -> 0x0002
        assert!(text.lines().next().unwrap().contains("020002"));
        let back = read(&text, HexFormat::Inhx16).unwrap();
        assert_eq!(back.get(4).0, 0x12);
        assert_eq!(back.get(5).0, 0x34);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let bad = ":0100000000FF\n";
        assert!(read(bad, HexFormat::Inhx8M).is_err());
    }

    #[test]
    fn format_lookup_is_case_insensitive() {
        assert_eq!(HexFormat::from_name("INHX32"), Some(HexFormat::Inhx32));
        assert_eq!(HexFormat::from_name("bogus"), None);
    }
}
