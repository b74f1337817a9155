//! Source file reading and decoding.
//!
//! Sources decode as UTF-8 first, falling back to Latin-1. EBCDIC inputs
//! are a declared future extension and are not attempted. Embedded NUL
//! bytes mark a file as binary and fail the load with the offending byte
//! offset.

use std::path::{Path, PathBuf};

use coqu_lang_core::normalize_line_endings;
use sha2::{Digest, Sha256};

use crate::error::{CoquError, Result};

/// Decoded source text with identity metadata.
#[derive(Debug, Clone)]
pub struct SourceText {
    /// Canonical path the text was read from.
    pub path: PathBuf,
    /// Decoded text with normalized line endings.
    pub text: String,
    /// SHA-256 of the raw bytes, hex-encoded. This is the program identity
    /// and the cache key.
    pub hash: String,
    /// Number of lines in the decoded text.
    pub line_count: u32,
}

/// Reads and decodes source files.
#[derive(Debug, Default)]
pub struct SourceReader;

impl SourceReader {
    /// Read and decode a source file.
    pub fn read(path: &Path) -> Result<SourceText> {
        let bytes = std::fs::read(path).map_err(|source| CoquError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(path, &bytes)
    }

    /// Decode raw bytes as a source file.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<SourceText> {
        let hash = format!("{:x}", Sha256::digest(bytes));

        if let Some(offset) = bytes.iter().position(|&b| b == 0) {
            return Err(CoquError::Decoding {
                path: path.to_path_buf(),
                offset,
            });
        }

        let decoded = match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => decode_latin1(bytes),
        };
        let text = normalize_line_endings(&decoded);
        let line_count = text.lines().count() as u32;

        Ok(SourceText {
            path: path.to_path_buf(),
            text,
            hash,
            line_count,
        })
    }
}

/// Decode Latin-1 bytes. Total: every byte maps to a code point.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
