//! Shared primitives for the coqu analysis engine.
//!
//! This crate provides the foundational building blocks the engine crates
//! share:
//!
//! - **Source location tracking**: [`FileId`], [`SrcPos`], [`LineSpan`], [`TextSpan`]
//! - **Diagnostics**: [`Diagnostic`], [`Severity`]
//! - **Text preparation**: [`normalize_line_endings`]
//!
//! # Design Principles
//!
//! - **No required dependencies**: this crate contains only plain Rust
//!   types; `serde` derives sit behind an opt-in feature. Engine crates add
//!   `miette`/`thiserror` on top for rich error rendering.
//! - **Line-first**: COBOL tooling reports positions as 1-based lines and
//!   columns of the *original* source, so spans here are line-oriented
//!   rather than byte-oriented.

mod diagnostic;
mod preprocess;
mod span;

pub use diagnostic::{Diagnostic, Severity};
pub use preprocess::normalize_line_endings;
pub use span::{FileId, LineSpan, SrcPos, TextSpan};
