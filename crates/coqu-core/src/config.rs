//! Engine configuration.
//!
//! Configuration flows through an explicit [`Config`] value handed to the
//! workspace; there is no process-wide mutable state inside the engine.
//! Values come from three layers, later layers winning:
//!
//! 1. built-in defaults,
//! 2. a TOML configuration file (`COQU_CONFIG`, or `config.toml` under the
//!    state directory),
//! 3. environment overrides (`COQU_COPYLIB`, `COQU_DEBUG`).
//!
//! The state directory defaults to `~/.coqu` and is overridden by
//! `COQU_HOME`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CoquError, Result};

/// How much parsing a `load` performs up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseMode {
    /// Index on load; full parse deferred until a query forces it.
    #[default]
    Auto,
    /// Full parse at load time.
    Full,
    /// Never run the full parser, even for `--exact` queries.
    IndexOnly,
}

/// Resolved engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parse mode applied by `load`.
    pub parse_mode: ParseMode,
    /// Advisory memory ceiling in bytes, honored by full parsing only.
    pub memory_limit: Option<u64>,
    /// Debug mode: diagnostics render with full token context.
    pub debug: bool,
    /// Ordered copybook search roots from configuration.
    pub copybook_paths: Vec<PathBuf>,
    /// Cache directory.
    pub cache_dir: PathBuf,
    /// Cache quota in bytes; 0 means unlimited.
    pub cache_max_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        let state = default_state_dir();
        Self {
            parse_mode: ParseMode::Auto,
            memory_limit: None,
            debug: false,
            copybook_paths: Vec::new(),
            cache_dir: state.join("cache"),
            cache_max_size: 0,
        }
    }
}

/// On-disk TOML shape. All fields optional; unknown tables tolerated so the
/// REPL sections (`[repl]`) pass through without the core knowing them.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    general: GeneralSection,
    #[serde(default)]
    copybooks: CopybookSection,
    #[serde(default)]
    cache: CacheSection,
}

#[derive(Debug, Default, Deserialize)]
struct GeneralSection {
    parse_mode: Option<ParseMode>,
    memory_limit: Option<String>,
    debug: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CopybookSection {
    paths: Option<Vec<PathBuf>>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheSection {
    directory: Option<PathBuf>,
    max_size: Option<String>,
}

impl Config {
    /// Load configuration: defaults, then file, then environment.
    ///
    /// `explicit` wins over `COQU_CONFIG`, which wins over
    /// `<state>/config.toml`. A missing file is not an error; an unreadable
    /// or malformed file is.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let state = state_dir();
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("COQU_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| state.join("config.toml"));

        let mut config = if candidate.is_file() {
            Self::from_file(&candidate)?
        } else {
            let mut c = Config::default();
            c.cache_dir = state.join("cache");
            c
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CoquError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|e| CoquError::Usage(format!("invalid configuration: {e}")))?;

        let mut config = Config::default();
        if let Some(mode) = file.general.parse_mode {
            config.parse_mode = mode;
        }
        if let Some(limit) = file.general.memory_limit {
            config.memory_limit = Some(parse_size(&limit)?).filter(|&n| n > 0);
        }
        if let Some(debug) = file.general.debug {
            config.debug = debug;
        }
        if let Some(paths) = file.copybooks.paths {
            config.copybook_paths = paths;
        }
        if let Some(dir) = file.cache.directory {
            config.cache_dir = dir;
        }
        if let Some(size) = file.cache.max_size {
            config.cache_max_size = parse_size(&size)?;
        }
        Ok(config)
    }

    /// Apply `COQU_COPYLIB` and `COQU_DEBUG` overrides.
    fn apply_env(&mut self) {
        if let Ok(extra) = std::env::var("COQU_COPYLIB") {
            for part in extra.split([':', ';']).filter(|p| !p.is_empty()) {
                self.copybook_paths.push(PathBuf::from(part));
            }
        }
        if std::env::var("COQU_DEBUG").as_deref() == Ok("1") {
            self.debug = true;
        }
    }
}

/// The state directory: `COQU_HOME` or `~/.coqu`.
pub fn state_dir() -> PathBuf {
    std::env::var_os("COQU_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(default_state_dir)
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".coqu")
}

/// Parse a size string like `512`, `64KB`, `512MB`, or `2GB` into bytes.
pub fn parse_size(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (digits, multiplier) = if let Some(stripped) = upper.strip_suffix("GB") {
        (stripped.trim_end(), 1024 * 1024 * 1024)
    } else if let Some(stripped) = upper.strip_suffix("MB") {
        (stripped.trim_end(), 1024 * 1024)
    } else if let Some(stripped) = upper.strip_suffix("KB") {
        (stripped.trim_end(), 1024)
    } else if let Some(stripped) = upper.strip_suffix('B') {
        (stripped.trim_end(), 1)
    } else {
        (upper.as_str(), 1)
    };

    digits
        .trim()
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| CoquError::Usage(format!("invalid size: '{trimmed}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.parse_mode, ParseMode::Auto);
        assert!(!config.debug);
        assert_eq!(config.cache_max_size, 0);
        assert!(config.copybook_paths.is_empty());
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
            [general]
            parse_mode = "index-only"
            memory_limit = "512MB"
            debug = true

            [copybooks]
            paths = ["/opt/copylib", "./books"]

            [cache]
            directory = "/tmp/coqu-cache"
            max_size = "2GB"
            "#,
        )
        .unwrap();

        assert_eq!(config.parse_mode, ParseMode::IndexOnly);
        assert_eq!(config.memory_limit, Some(512 * 1024 * 1024));
        assert!(config.debug);
        assert_eq!(config.copybook_paths.len(), 2);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/coqu-cache"));
        assert_eq!(config.cache_max_size, 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_repl_section_tolerated() {
        let config = Config::from_toml(
            r#"
            [general]
            debug = false

            [repl]
            highlight = true
            history_size = 500
            "#,
        )
        .unwrap();
        assert!(!config.debug);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("64KB").unwrap(), 64 * 1024);
        assert_eq!(parse_size("512mb").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_size("2 GB").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(Config::from_toml("[general\nparse_mode = ").is_err());
    }
}
