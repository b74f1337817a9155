//! Workspace registry: loaded programs, copybook roots, load pipeline.
//!
//! `load` runs Source Reader → Format Normalizer → hash → cache probe; on
//! a miss it continues Preprocessor → Structural Indexer → cache write.
//! Full parsing is deferred until a query forces it, unless the load asks
//! for it or configuration says otherwise.
//!
//! Long loads are cancellable at two safe points (after format detection
//! and after indexing); a cancelled load leaves no cache entry and no
//! program behind. A read-only [`Phase`] indicator replaces progress
//! callbacks; the external UI may poll it.

mod program;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use chrono::Utc;
use coqu_lang_core::Diagnostic;
use regex::Regex;
use walkdir::WalkDir;

pub use program::{Program, ProgramSummary};

use crate::cache::{CacheEntry, CacheManager, CacheMeta};
use crate::config::{Config, ParseMode};
use crate::error::{CoquError, Result};
use crate::index::{StructuralIndex, StructuralIndexer};
use crate::parse::{ParseOptions, ParsedAst, ParserFrontend};
use crate::preprocess::{CopybookResolver, Expansion, Preprocessor};
use crate::source::{normalize, SourceReader};

/// COBOL source extensions accepted by directory loads.
const COBOL_EXTENSIONS: [&str; 4] = ["cbl", "cob", "CBL", "COB"];

/// What the workspace is currently doing. Poll-only; never a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle = 0,
    Loading = 1,
    Indexing = 2,
    Caching = 3,
}

/// Options for a single load operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Run the full parser at load time.
    pub full: bool,
    /// Skip the cache read (the write still happens).
    pub bypass_cache: bool,
    /// Cancellation deadline, checked at the safe points.
    pub deadline: Option<Instant>,
}

/// Aggregate workspace statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceStats {
    pub program_count: usize,
    pub total_lines: u64,
    pub cached_loads: usize,
    pub copybook_roots: usize,
}

/// Owns every loaded [`Program`] plus the copybook search roots.
#[derive(Debug)]
pub struct Workspace {
    config: Config,
    programs: Vec<Program>,
    resolver: CopybookResolver,
    cache: CacheManager,
    frontend: ParserFrontend,
    phase: AtomicU8,
}

impl Workspace {
    /// Create a workspace from resolved configuration.
    pub fn new(config: Config) -> Result<Self> {
        let cache = CacheManager::new(config.cache_dir.clone())?;
        let resolver = CopybookResolver::new(config.copybook_paths.clone());
        let frontend = ParserFrontend::new(ParseOptions {
            max_diagnostics: 100,
            memory_limit: config.memory_limit,
        });
        Ok(Self {
            config,
            programs: Vec::new(),
            resolver,
            cache,
            frontend,
            phase: AtomicU8::new(Phase::Idle as u8),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Switch parse mode at runtime (`/set parse-mode ...`).
    pub fn set_parse_mode(&mut self, mode: ParseMode) {
        self.config.parse_mode = mode;
    }

    /// Toggle debug mode at runtime (`/set debug ...`).
    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    /// Current pipeline phase.
    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Relaxed) {
            1 => Phase::Loading,
            2 => Phase::Indexing,
            3 => Phase::Caching,
            _ => Phase::Idle,
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    /// Load a program with default options.
    pub fn load(&mut self, path: &Path) -> Result<&Program> {
        self.load_with(path, LoadOptions::default())
    }

    /// Load a program.
    pub fn load_with(&mut self, path: &Path, opts: LoadOptions) -> Result<&Program> {
        let slot = self.load_into_slot(path, opts);
        self.set_phase(Phase::Idle);
        match slot {
            Ok(i) => Ok(&self.programs[i]),
            Err(err) => Err(err),
        }
    }

    fn load_into_slot(&mut self, path: &Path, opts: LoadOptions) -> Result<usize> {
        self.set_phase(Phase::Loading);

        let canonical = path
            .canonicalize()
            .map_err(|source| CoquError::FileAccess {
                path: path.to_path_buf(),
                source,
            })?;

        let source = SourceReader::read(&canonical)?;
        let existing = self.programs.iter().position(|p| p.path == canonical);

        // Unchanged file already loaded: nothing to do.
        if let Some(i) = existing {
            if self.programs[i].source_hash == source.hash && !opts.bypass_cache {
                return Ok(i);
            }
        }

        let normalized = normalize(&source.text);
        check_deadline(&opts)?;

        let mut from_cache = false;
        let mut warnings: Vec<Diagnostic> = Vec::new();
        let mut expansion: Option<Expansion> = None;
        let mut parse_time_ms = 0.0;

        let (index, mut ast) = if !opts.bypass_cache {
            match self.cache.get(&source.hash) {
                Some(entry) => {
                    from_cache = true;
                    tracing::debug!(hash = %source.hash, "load served from cache");
                    let ast = entry.ast.map(|root| ParsedAst {
                        root,
                        diagnostics: Vec::new(),
                        degraded: false,
                    });
                    (entry.index, ast)
                }
                None => self.build_index(&normalized, &opts, &mut warnings, &mut expansion, &mut parse_time_ms)?,
            }
        } else {
            self.build_index(&normalized, &opts, &mut warnings, &mut expansion, &mut parse_time_ms)?
        };

        if !from_cache {
            self.set_phase(Phase::Caching);
            let entry = CacheEntry {
                meta: CacheMeta {
                    source_path: canonical.clone(),
                    source_hash: source.hash.clone(),
                    lines: normalized.line_count(),
                    cached_at: Utc::now().to_rfc3339(),
                    format: normalized.format,
                },
                index: index.clone(),
                ast: ast.as_ref().map(|a| a.root.clone()),
            };
            if let Err(err) = self.cache.put(&source.hash, &entry) {
                // Cache trouble degrades to "rebuild next time".
                tracing::warn!(error = %err, "cache write failed");
            }
        } else if opts.full && ast.is_none() && self.config.parse_mode != ParseMode::IndexOnly {
            let expanded = self.ensure_expansion_for(&normalized);
            ast = Some(self.frontend.parse_full(&expanded.lines));
            expansion = Some(expanded);
        }

        let name = match existing {
            Some(i) => self.programs[i].name.clone(),
            None => self.unique_name(&canonical),
        };

        for warning in &warnings {
            tracing::warn!(program = %name, "{warning}");
        }

        let program = Program {
            name,
            path: canonical,
            source_hash: source.hash,
            format: normalized.format,
            normalized,
            index,
            expansion,
            ast,
            warnings,
            loaded_at: Utc::now(),
            from_cache,
            parse_time_ms,
        };

        // Atomic swap: the fully built program replaces the old slot.
        match existing {
            Some(i) => {
                self.programs[i] = program;
                Ok(i)
            }
            None => {
                self.programs.push(program);
                Ok(self.programs.len() - 1)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn build_index(
        &mut self,
        normalized: &crate::source::NormalizedSource,
        opts: &LoadOptions,
        warnings: &mut Vec<Diagnostic>,
        expansion_out: &mut Option<Expansion>,
        parse_time_ms: &mut f64,
    ) -> Result<(StructuralIndex, Option<ParsedAst>)> {
        self.set_phase(Phase::Indexing);
        let started = Instant::now();

        let expansion = Preprocessor::new(&self.resolver).expand(normalized);
        let mut index = StructuralIndexer::index(normalized);
        merge_copy_resolution(&mut index, &expansion);
        warnings.extend(expansion.warnings.iter().cloned());

        check_deadline(opts)?;

        let want_full = match self.config.parse_mode {
            ParseMode::Full => true,
            ParseMode::IndexOnly => false,
            ParseMode::Auto => opts.full,
        };
        let ast = want_full.then(|| self.frontend.parse_full(&expansion.lines));

        *parse_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        *expansion_out = Some(expansion);
        Ok((index, ast))
    }

    fn ensure_expansion_for(&self, normalized: &crate::source::NormalizedSource) -> Expansion {
        Preprocessor::new(&self.resolver).expand(normalized)
    }

    /// Load every file matching a glob pattern. Returns the names loaded;
    /// individual failures are logged and skipped.
    pub fn load_glob(&mut self, pattern: &str) -> Result<Vec<String>> {
        let (base, file_re, recursive) = split_glob(pattern)?;
        let mut loaded = Vec::new();

        let walker = if recursive {
            WalkDir::new(&base)
        } else {
            WalkDir::new(&base).max_depth(1)
        };
        let mut paths: Vec<PathBuf> = walker
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| file_re.is_match(n))
            })
            .collect();
        paths.sort();

        for path in paths {
            match self.load(&path) {
                Ok(program) => loaded.push(program.name.clone()),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "load skipped"),
            }
        }
        Ok(loaded)
    }

    /// Load all COBOL sources in a directory.
    pub fn load_dir(&mut self, dir: &Path, recursive: bool) -> Result<Vec<String>> {
        if !dir.is_dir() {
            return Err(CoquError::FileAccess {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }
        let walker = if recursive {
            WalkDir::new(dir)
        } else {
            WalkDir::new(dir).max_depth(1)
        };
        let mut paths: Vec<PathBuf> = walker
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| COBOL_EXTENSIONS.contains(&e))
            })
            .collect();
        paths.sort();

        let mut loaded = Vec::new();
        for path in paths {
            match self.load(&path) {
                Ok(program) => loaded.push(program.name.clone()),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "load skipped"),
            }
        }
        Ok(loaded)
    }

    /// Remove a program. The cache entry is retained.
    pub fn unload(&mut self, name: &str) -> bool {
        let before = self.programs.len();
        self.programs.retain(|p| !p.name.eq_ignore_ascii_case(name));
        self.programs.len() < before
    }

    /// Remove every program. Returns how many were unloaded.
    pub fn unload_all(&mut self) -> usize {
        let count = self.programs.len();
        self.programs.clear();
        count
    }

    /// Reload one program from disk, bypassing the cache read. The old
    /// program stays queryable until the replacement is fully built.
    pub fn reload(&mut self, name: &str) -> Result<&Program> {
        let path = self
            .get(name)
            .map(|p| p.path.clone())
            .ok_or_else(|| CoquError::Usage(format!("program '{name}' not loaded")))?;
        self.load_with(
            &path,
            LoadOptions {
                bypass_cache: true,
                ..Default::default()
            },
        )
    }

    /// Reload every loaded program. Returns how many were reloaded.
    pub fn reload_all(&mut self) -> Result<usize> {
        let paths: Vec<PathBuf> = self.programs.iter().map(|p| p.path.clone()).collect();
        let mut count = 0;
        for path in paths {
            self.load_with(
                &path,
                LoadOptions {
                    bypass_cache: true,
                    ..Default::default()
                },
            )?;
            count += 1;
        }
        Ok(count)
    }

    /// Look up a program by workspace name, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// All loaded programs, in load order.
    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    /// Summaries for the `/list` surface.
    pub fn list(&self) -> Vec<ProgramSummary> {
        self.programs.iter().map(Program::summary).collect()
    }

    /// Append a copybook search root.
    pub fn add_copypath(&mut self, path: PathBuf) {
        self.resolver.add_path(path);
    }

    /// Remove all copybook search roots.
    pub fn clear_copypaths(&mut self) {
        self.resolver.clear_paths();
    }

    /// The ordered copybook search roots.
    pub fn copypaths(&self) -> &[PathBuf] {
        self.resolver.search_paths()
    }

    /// The copybook resolver (used by dependency queries).
    pub fn resolver(&self) -> &CopybookResolver {
        &self.resolver
    }

    /// The cache manager (used by `/cache` operations).
    pub fn cache_mut(&mut self) -> &mut CacheManager {
        &mut self.cache
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> WorkspaceStats {
        WorkspaceStats {
            program_count: self.programs.len(),
            total_lines: self.programs.iter().map(|p| p.lines() as u64).sum(),
            cached_loads: self.programs.iter().filter(|p| p.from_cache).count(),
            copybook_roots: self.resolver.search_paths().len(),
        }
    }

    /// Make sure a program has an AST, honoring the configured parse mode.
    /// Returns whether an AST is available afterwards.
    pub fn ensure_ast(&mut self, name: &str) -> Result<bool> {
        if self.config.parse_mode == ParseMode::IndexOnly {
            return Ok(false);
        }
        let Some(i) = self
            .programs
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
        else {
            return Err(CoquError::Usage(format!("program '{name}' not loaded")));
        };
        if self.programs[i].ast.is_some() {
            return Ok(true);
        }

        let expansion = match self.programs[i].expansion.take() {
            Some(e) => e,
            None => self.ensure_expansion_for(&self.programs[i].normalized),
        };
        let parsed = self.frontend.parse_full(&expansion.lines);

        // Refresh the cache entry so the AST survives the session.
        let program = &self.programs[i];
        let entry = CacheEntry {
            meta: CacheMeta {
                source_path: program.path.clone(),
                source_hash: program.source_hash.clone(),
                lines: program.lines(),
                cached_at: Utc::now().to_rfc3339(),
                format: program.format,
            },
            index: program.index.clone(),
            ast: Some(parsed.root.clone()),
        };
        let hash = program.source_hash.clone();
        if let Err(err) = self.cache.put(&hash, &entry) {
            tracing::warn!(error = %err, "cache refresh failed");
        }

        self.programs[i].expansion = Some(expansion);
        self.programs[i].ast = Some(parsed);
        Ok(true)
    }

    /// Call graph across all loaded programs: PROGRAM-ID → called targets.
    pub fn call_graph(&self) -> std::collections::BTreeMap<String, Vec<String>> {
        use crate::analyze::{ChunkAnalyzer, RefKind};

        let mut graph = std::collections::BTreeMap::new();
        for program in &self.programs {
            let mut targets: Vec<String> = Vec::new();
            if let Some(span) = program.procedure_span() {
                let chunk = program.body(span);
                for edge in ChunkAnalyzer::analyze(&chunk, span.start) {
                    if matches!(edge.kind, RefKind::CallLiteral | RefKind::CallIdentifier)
                        && !targets.contains(&edge.target)
                    {
                        targets.push(edge.target);
                    }
                }
            }
            targets.sort();
            graph.insert(program.program_id().to_string(), targets);
        }
        graph
    }

    /// Programs and paragraphs that CALL the given target.
    pub fn find_callers(&self, target: &str) -> Vec<(String, String, u32)> {
        use crate::analyze::{ChunkAnalyzer, RefKind};

        let mut callers = Vec::new();
        for program in &self.programs {
            for paragraph in &program.index.paragraphs {
                let chunk = program.paragraph_chunk(paragraph);
                for edge in ChunkAnalyzer::analyze(&chunk, paragraph.span.start) {
                    if matches!(edge.kind, RefKind::CallLiteral | RefKind::CallIdentifier)
                        && edge.target.eq_ignore_ascii_case(target)
                    {
                        callers.push((program.name.clone(), paragraph.name.clone(), edge.line));
                    }
                }
            }
        }
        callers
    }

    /// Uppercased file stem, uniquified with `-2`, `-3`, … on collisions.
    fn unique_name(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("PROGRAM")
            .to_uppercase();
        if self.get(&stem).is_none() {
            return stem;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{stem}-{n}");
            if self.get(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}

fn check_deadline(opts: &LoadOptions) -> Result<()> {
    if opts.deadline.is_some_and(|d| Instant::now() >= d) {
        return Err(CoquError::Interrupted);
    }
    Ok(())
}

/// Copy resolution status from the preprocessor into the index records.
fn merge_copy_resolution(index: &mut StructuralIndex, expansion: &Expansion) {
    for directive in &mut index.copy_directives {
        if let Some(resolved) = expansion
            .copies
            .iter()
            .find(|c| c.line == directive.line && c.name == directive.name)
        {
            directive.resolved = resolved.resolved;
            directive.resolved_path = resolved.resolved_path.clone();
        }
    }
}

/// Split a glob pattern into (base directory, file-name regex, recursive).
fn split_glob(pattern: &str) -> Result<(PathBuf, Regex, bool)> {
    let path = Path::new(pattern);
    let recursive = pattern.contains("**");

    let (base, file_part) = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            let clean: PathBuf = parent
                .components()
                .take_while(|c| !c.as_os_str().to_string_lossy().contains(['*', '?']))
                .collect();
            let file = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("*");
            (
                if clean.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    clean
                },
                file.to_string(),
            )
        }
        _ => (PathBuf::from("."), pattern.to_string()),
    };

    let mut regex = String::from("^");
    for c in file_part.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');

    let file_re = Regex::new(&regex)
        .map_err(|e| CoquError::Usage(format!("invalid glob pattern '{pattern}': {e}")))?;
    Ok((base, file_re, recursive))
}
