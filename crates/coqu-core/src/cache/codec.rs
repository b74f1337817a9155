//! Binary codec for cache entries.
//!
//! Envelope layout, fixed across versions:
//!
//! ```text
//! magic "COQU"            4 bytes
//! codec version           u16 LE
//! tool version            u32 LE length + UTF-8 bytes
//! meta record             u32 LE length + JSON
//! index record            u32 LE length + JSON
//! ast record (optional)   u32 LE length + JSON
//! ```
//!
//! The JSON payloads keep every record self-describing (field names
//! travel with the data), so entries written by an incompatible tool
//! version are rejected cleanly instead of misread. Readers validate the
//! magic and codec version; any mismatch is a cache miss, never an error.

use serde::{Deserialize, Serialize};

use crate::error::{CoquError, Result};
use crate::index::StructuralIndex;
use crate::parse::AstNode;
use crate::source::SourceFormat;

/// Magic bytes opening every cache file.
pub const MAGIC: [u8; 4] = *b"COQU";

/// Current codec version.
pub const CODEC_VERSION: u16 = 1;

/// Entry metadata, serialized as the header record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub source_path: std::path::PathBuf,
    pub source_hash: String,
    pub lines: u32,
    /// RFC 3339 timestamp of when the entry was written.
    pub cached_at: String,
    pub format: SourceFormat,
}

/// A complete cache entry: metadata, index, optional AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub meta: CacheMeta,
    pub index: StructuralIndex,
    pub ast: Option<AstNode>,
}

/// Encode an entry into the envelope format.
pub fn encode(entry: &CacheEntry, tool_version: &str) -> Result<Vec<u8>> {
    let meta = serde_json::to_vec(&entry.meta).map_err(to_cache_err)?;
    let index = serde_json::to_vec(&entry.index).map_err(to_cache_err)?;

    let mut out = Vec::with_capacity(meta.len() + index.len() + 64);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&CODEC_VERSION.to_le_bytes());
    write_section(&mut out, tool_version.as_bytes());
    write_section(&mut out, &meta);
    write_section(&mut out, &index);
    if let Some(ast) = &entry.ast {
        let ast_bytes = serde_json::to_vec(ast).map_err(to_cache_err)?;
        write_section(&mut out, &ast_bytes);
    }
    Ok(out)
}

/// Decode an envelope. `None` means the bytes are not a readable entry of
/// the current codec version; callers treat that as a miss.
pub fn decode(bytes: &[u8]) -> Option<CacheEntry> {
    let mut cursor = 0usize;

    if bytes.get(..4)? != MAGIC {
        tracing::debug!("cache entry rejected: bad magic");
        return None;
    }
    cursor += 4;

    let version = u16::from_le_bytes(bytes.get(cursor..cursor + 2)?.try_into().ok()?);
    cursor += 2;
    if version != CODEC_VERSION {
        tracing::debug!(version, expected = CODEC_VERSION, "cache entry rejected: codec version");
        return None;
    }

    let _tool_version = read_section(bytes, &mut cursor)?;
    let meta_bytes = read_section(bytes, &mut cursor)?;
    let index_bytes = read_section(bytes, &mut cursor)?;

    let meta: CacheMeta = serde_json::from_slice(meta_bytes).ok()?;
    let index: StructuralIndex = serde_json::from_slice(index_bytes).ok()?;

    let ast = if cursor < bytes.len() {
        let ast_bytes = read_section(bytes, &mut cursor)?;
        Some(serde_json::from_slice::<AstNode>(ast_bytes).ok()?)
    } else {
        None
    };

    Some(CacheEntry { meta, index, ast })
}

fn write_section(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

fn read_section<'a>(bytes: &'a [u8], cursor: &mut usize) -> Option<&'a [u8]> {
    let len = u32::from_le_bytes(bytes.get(*cursor..*cursor + 4)?.try_into().ok()?) as usize;
    *cursor += 4;
    let payload = bytes.get(*cursor..*cursor + len)?;
    *cursor += len;
    Some(payload)
}

fn to_cache_err(err: serde_json::Error) -> CoquError {
    CoquError::Cache {
        message: format!("serialization: {err}"),
    }
}
