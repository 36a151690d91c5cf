//! The archive model (`spec.md` §3 "Archive", §6 "Archive file").
//!
//! An archive is a concatenation of `(name header, size, bytes)` member
//! tuples, grounded on `gputils/libgputils/gparchive.c`. A distinguished
//! member name carries a symbol-name → member-index table so the linker
//! (`spec.md` §4.4) can decide whether to pull a member in without reading
//! every member's symbol table up front.

use std::collections::HashMap;

use crate::error::{codes, Error, Result};
use crate::pod::{Bytes, ByteWriter};

/// The reserved member name that, when present, holds the archive's
/// symbol index instead of an object.
pub const SYMBOL_INDEX_MEMBER_NAME: &str = "__.SYMDEF";

const MEMBER_NAME_LEN: usize = 16;
const MEMBER_HDR_SIZ: usize = MEMBER_NAME_LEN + 4;

/// One member of an archive: a name and its raw (object-file) bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub data: Vec<u8>,
}

/// A collection of member objects with an optional symbol-name → member
/// index (`spec.md` §3 "Archive").
#[derive(Debug, Clone, Default)]
pub struct Archive {
    pub members: Vec<Member>,
    /// Symbol name -> index into `members`, present once built or read
    /// from a member named [`SYMBOL_INDEX_MEMBER_NAME`].
    pub index: Option<HashMap<String, usize>>,
}

impl Archive {
    pub fn new() -> Self {
        Archive::default()
    }

    pub fn add_member(&mut self, name: impl Into<String>, data: Vec<u8>) -> usize {
        self.members.push(Member {
            name: name.into(),
            data,
        });
        self.members.len() - 1
    }

    pub fn member_named(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Build the symbol index from each member's exported symbol names, as
    /// `gp_archive_build_symbol_table` does when an archive lacks one.
    /// `exported_symbols` must return the same names for a given member's
    /// bytes that `object::wire::read` followed by a scan for
    /// `StorageClass::Ext` symbols would produce; decoupled here so this
    /// module does not need to depend on the object reader succeeding for
    /// every member up front.
    pub fn build_index<F>(&mut self, mut exported_symbols: F)
    where
        F: FnMut(&Member) -> Vec<String>,
    {
        let mut index = HashMap::new();
        for (i, member) in self.members.iter().enumerate() {
            for name in exported_symbols(member) {
                index.entry(name).or_insert(i);
            }
        }
        self.index = Some(index);
    }

    /// Invariant check (`spec.md` §3): if an index exists, every exported
    /// symbol of every member must be present in it.
    pub fn check_index_complete<F>(&self, mut exported_symbols: F) -> Result<()>
    where
        F: FnMut(&Member) -> Vec<String>,
    {
        let Some(index) = &self.index else {
            return Ok(());
        };
        for member in &self.members {
            for name in exported_symbols(member) {
                if !index.contains_key(&name) {
                    return Err(Error::internal(format!(
                        "archive symbol index missing exported symbol {name} from member {}",
                        member.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Write the archive wire format: each member as a fixed 16-byte,
    /// NUL-padded name, a `u32` byte length, then the raw bytes.
    pub fn write(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        for member in &self.members {
            let mut name_bytes = [0u8; MEMBER_NAME_LEN];
            let src = member.name.as_bytes();
            let n = src.len().min(MEMBER_NAME_LEN);
            name_bytes[..n].copy_from_slice(&src[..n]);
            w.bytes(&name_bytes);
            w.u32(member.data.len() as u32);
            w.bytes(&member.data);
        }
        w.into_vec()
    }

    /// Read an archive written by [`Archive::write`]. Detects a symbol
    /// index by the distinguished member name (`spec.md` §6).
    pub fn read(data: &[u8]) -> Result<Archive> {
        let mut bytes = Bytes(data);
        let mut archive = Archive::new();
        while !bytes.is_empty() {
            if bytes.len() < MEMBER_HDR_SIZ {
                return Err(Error::source_error(
                    codes::ERR_BAD_OBJECT,
                    "archive member header truncated",
                ));
            }
            let name_bytes = bytes
                .read_bytes(MEMBER_NAME_LEN)
                .map_err(|_| Error::source_error(codes::ERR_BAD_OBJECT, "archive member name truncated"))?;
            let name_end = name_bytes.0.iter().position(|&b| b == 0).unwrap_or(name_bytes.0.len());
            let name = String::from_utf8_lossy(&name_bytes.0[..name_end]).into_owned();
            let len = bytes
                .read_u32()
                .map_err(|_| Error::source_error(codes::ERR_BAD_OBJECT, "archive member length truncated"))?;
            let data = bytes
                .read_vec(len as usize)
                .map_err(|_| Error::source_error(codes::ERR_BAD_OBJECT, "archive member data truncated"))?;
            archive.members.push(Member { name, data });
        }
        if let Some(pos) = archive.members.iter().position(|m| m.name == SYMBOL_INDEX_MEMBER_NAME) {
            let index_member = archive.members.remove(pos);
            archive.index = Some(parse_symbol_index(&index_member.data)?);
        }
        Ok(archive)
    }
}

/// Symbol index member layout: `u32` count, then that many `(u32
/// member-index, u32 name-length, name bytes)` tuples.
fn parse_symbol_index(data: &[u8]) -> Result<HashMap<String, usize>> {
    let mut bytes = Bytes(data);
    let count = bytes
        .read_u32()
        .map_err(|_| Error::source_error(codes::ERR_BAD_OBJECT, "archive symbol index truncated"))?;
    let mut index = HashMap::new();
    for _ in 0..count {
        let member_idx = bytes
            .read_u32()
            .map_err(|_| Error::source_error(codes::ERR_BAD_OBJECT, "archive symbol index entry truncated"))?;
        let name_len = bytes
            .read_u32()
            .map_err(|_| Error::source_error(codes::ERR_BAD_OBJECT, "archive symbol index name truncated"))?;
        let name_bytes = bytes
            .read_vec(name_len as usize)
            .map_err(|_| Error::source_error(codes::ERR_BAD_OBJECT, "archive symbol index name truncated"))?;
        let name = String::from_utf8_lossy(&name_bytes).into_owned();
        index.insert(name, member_idx as usize);
    }
    Ok(index)
}

pub fn write_symbol_index(index: &HashMap<String, usize>) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.u32(index.len() as u32);
    for (name, &member_idx) in index {
        w.u32(member_idx as u32);
        w.u32(name.len() as u32);
        w.bytes(name.as_bytes());
    }
    w.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_members() {
        let mut a = Archive::new();
        a.add_member("m.o", vec![1, 2, 3, 4]);
        a.add_member("n.o", vec![5, 6]);
        let bytes = a.write();
        let back = Archive::read(&bytes).unwrap();
        assert_eq!(back.members.len(), 2);
        assert_eq!(back.members[0].name, "m.o");
        assert_eq!(back.members[0].data, vec![1, 2, 3, 4]);
        assert_eq!(back.members[1].name, "n.o");
    }

    #[test]
    fn build_index_maps_exported_names() {
        let mut a = Archive::new();
        a.add_member("m.o", vec![]);
        a.add_member("n.o", vec![]);
        a.build_index(|m| match m.name.as_str() {
            "m.o" => vec!["bar".to_string()],
            "n.o" => vec!["baz".to_string()],
            _ => vec![],
        });
        let index = a.index.as_ref().unwrap();
        assert_eq!(index.get("bar"), Some(&0));
        assert_eq!(index.get("baz"), Some(&1));
    }

    #[test]
    fn truncated_archive_errors() {
        let data = [0u8; 4];
        assert!(Archive::read(&data).is_err());
    }

    #[test]
    fn index_member_round_trips_through_wire() {
        let mut index = HashMap::new();
        index.insert("foo".to_string(), 0usize);
        let encoded = write_symbol_index(&index);
        let decoded = parse_symbol_index(&encoded).unwrap();
        assert_eq!(decoded, index);
    }
}
