//! coqu-core — COBOL source analysis engine.
//!
//! The engine behind the coqu query tool. It answers structural and
//! semantic questions about large, undocumented COBOL programs without
//! requiring a full compile:
//!
//! - **Source reading & normalization**: encoding detection, sequence /
//!   Panvalet layout stripping with original line numbers preserved
//! - **Preprocessing**: COPY (with REPLACING), REPLACE, EXEC SQL/CICS
//!   pass-through, and an origin map from expanded lines back to input
//! - **Structural indexing**: a regex-driven skeleton (divisions,
//!   sections, paragraphs, data items, copybooks, EXEC blocks, comments)
//!   fast enough for multi-million-line sources
//! - **Parsing**: a tolerant grammar frontend producing a tagged-variant
//!   AST on demand
//! - **Chunk analysis**: PERFORM/CALL/GO TO/MOVE edge extraction from a
//!   paragraph or section slice
//! - **Caching**: a content-addressed on-disk store keyed by SHA-256 of
//!   the source bytes
//! - **Workspace & queries**: a program registry and the read-only query
//!   surface the interactive shell drives
//!
//! The interactive loop, command-line parsing, and output formatting are
//! external collaborators; they consume the [`workspace::Workspace`] and
//! [`query::QueryEngine`] APIs.

pub mod analyze;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod parse;
pub mod preprocess;
pub mod query;
pub mod source;
pub mod workspace;

pub use analyze::{ChunkAnalyzer, ChunkReference, RefKind};
pub use cache::{CacheEntry, CacheManager, CacheMeta, CacheStats};
pub use config::{parse_size, state_dir, Config, ParseMode};
pub use error::{CoquError, Result};
pub use index::{
    Comment, CommentClass, CopyDirective, DataItem, Division, DivisionName, ExecBlock, ExecKind,
    Paragraph, Section, StatementEntry, StorageKind, StructuralIndex, StructuralIndexer,
};
pub use parse::{AstNode, NodeKind, ParseOptions, ParsedAst, ParserFrontend};
pub use preprocess::{
    apply_replacements, CopybookDep, CopybookResolver, Expansion, Origin, OriginMap, Preprocessor,
    Replacement,
};
pub use query::{ParsedCommand, QueryEngine, QueryItem, QueryResult};
pub use source::{detect_format, normalize, NormalizedSource, SourceFormat, SourceReader, SourceText};
pub use workspace::{LoadOptions, Phase, Program, ProgramSummary, Workspace, WorkspaceStats};
