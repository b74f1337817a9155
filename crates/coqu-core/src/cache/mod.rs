//! Content-addressed AST cache.
//!
//! One file per program, named by the SHA-256 of the raw source bytes:
//! `<hex-hash>.ast`. Writes are atomic (tmp file, fsync, rename) and
//! serialized through a `lock` file in the cache directory; readers never
//! lock and tolerate an in-progress write by seeing the old file. Cache
//! read failures degrade to a rebuild, never to a failed load.

mod codec;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use codec::{decode, encode, CacheEntry, CacheMeta, CODEC_VERSION, MAGIC};

use crate::error::{CoquError, Result};

/// Cache entry file extension.
const ENTRY_EXT: &str = "ast";

/// Aggregate cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub file_count: usize,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub saves: u64,
}

/// Writer serialization: a `lock` file held for the duration of a write.
struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join("lock");
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CoquError::cache("acquiring cache lock", e))?;
        Ok(Self { path })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Manages the on-disk cache directory.
#[derive(Debug)]
pub struct CacheManager {
    dir: PathBuf,
    tool_version: String,
    hits: u64,
    misses: u64,
    saves: u64,
}

impl CacheManager {
    /// Open (and create if needed) a cache directory.
    ///
    /// Startup sweeps crash leftovers: partial `.tmp` files and a stale
    /// `lock` from a previous process.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| CoquError::cache("creating cache directory", e))?;

        for entry in fs::read_dir(&dir).map_err(|e| CoquError::cache("reading cache directory", e))? {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            let is_tmp = path.extension().is_some_and(|e| e == "tmp");
            let is_lock = path.file_name().is_some_and(|n| n == "lock");
            if is_tmp || is_lock {
                tracing::debug!(path = %path.display(), "removing stale cache file");
                let _ = fs::remove_file(&path);
            }
        }

        Ok(Self {
            dir,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            hits: 0,
            misses: 0,
            saves: 0,
        })
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.{ENTRY_EXT}"))
    }

    /// Fetch an entry by source hash. Unreadable or version-mismatched
    /// files are misses; corrupt files are unlinked so the next `put`
    /// starts clean.
    pub fn get(&mut self, hash: &str) -> Option<CacheEntry> {
        let path = self.entry_path(hash);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.misses += 1;
                return None;
            }
        };

        match decode(&bytes) {
            Some(entry) => {
                self.hits += 1;
                Some(entry)
            }
            None => {
                self.misses += 1;
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Store an entry atomically: write `<hash>.ast.tmp`, fsync, rename.
    pub fn put(&mut self, hash: &str, entry: &CacheEntry) -> Result<()> {
        let _lock = CacheLock::acquire(&self.dir)?;

        let bytes = encode(entry, &self.tool_version)?;
        let final_path = self.entry_path(hash);
        let tmp_path = self.dir.join(format!("{hash}.{ENTRY_EXT}.tmp"));

        let mut file =
            File::create(&tmp_path).map_err(|e| CoquError::cache("creating cache tmp file", e))?;
        file.write_all(&bytes)
            .map_err(|e| CoquError::cache("writing cache entry", e))?;
        file.sync_all()
            .map_err(|e| CoquError::cache("syncing cache entry", e))?;
        drop(file);

        fs::rename(&tmp_path, &final_path)
            .map_err(|e| CoquError::cache("publishing cache entry", e))?;

        self.saves += 1;
        tracing::debug!(hash, bytes = bytes.len(), "cache entry written");
        Ok(())
    }

    /// Remove one entry. Returns true if a file was unlinked.
    pub fn delete(&mut self, hash: &str) -> bool {
        fs::remove_file(self.entry_path(hash)).is_ok()
    }

    /// Remove every entry. Returns the number of files unlinked.
    pub fn clear(&mut self) -> usize {
        let mut removed = 0;
        for (path, _, _) in self.entry_files() {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// File count and sizes plus the in-process hit/miss/save counters.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            hits: self.hits,
            misses: self.misses,
            saves: self.saves,
            ..Default::default()
        };
        for (_, len, _) in self.entry_files() {
            stats.file_count += 1;
            stats.total_bytes += len;
        }
        stats
    }

    /// Evict least-recently-used entries (by mtime) until total size is at
    /// or under `max_bytes`; equal-mtime ties evict the larger file first.
    /// `max_bytes == 0` means unlimited.
    pub fn enforce_quota(&mut self, max_bytes: u64) -> usize {
        if max_bytes == 0 {
            return 0;
        }
        let mut files = self.entry_files();
        let mut total: u64 = files.iter().map(|(_, len, _)| len).sum();
        if total <= max_bytes {
            return 0;
        }

        files.sort_by(|a, b| a.2.cmp(&b.2).then(b.1.cmp(&a.1)));

        let mut evicted = 0;
        for (path, len, _) in files {
            if total <= max_bytes {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                total -= len;
                evicted += 1;
                tracing::debug!(path = %path.display(), "evicted cache entry");
            }
        }
        evicted
    }

    /// Remove entries older than the given number of days.
    pub fn cleanup_older_than(&mut self, days: u64) -> usize {
        let cutoff = SystemTime::now() - std::time::Duration::from_secs(days * 24 * 60 * 60);
        let mut removed = 0;
        for (path, _, mtime) in self.entry_files() {
            if mtime < cutoff && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// All entry files as (path, size, mtime).
    fn entry_files(&self) -> Vec<(PathBuf, u64, SystemTime)> {
        let Ok(read) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read.flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_none_or(|e| e != ENTRY_EXT) {
                    return None;
                }
                let meta = entry.metadata().ok()?;
                let mtime = meta.modified().ok()?;
                Some((path, meta.len(), mtime))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StructuralIndexer;
    use crate::source::normalize;
    use std::fs::FileTimes;
    use std::time::Duration;

    fn entry_for(text: &str) -> CacheEntry {
        let normalized = normalize(text);
        CacheEntry {
            meta: CacheMeta {
                source_path: "x.cbl".into(),
                source_hash: "h".into(),
                lines: normalized.line_count(),
                cached_at: "2025-06-01T00:00:00Z".into(),
                format: normalized.format,
            },
            index: StructuralIndexer::index(&normalized),
            ast: None,
        }
    }

    fn manager() -> (tempfile::TempDir, CacheManager) {
        let tmp = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(tmp.path().join("cache")).unwrap();
        (tmp, manager)
    }

    #[test]
    fn test_put_get_round_trip() {
        let (_tmp, mut cache) = manager();
        let entry = entry_for("       IDENTIFICATION DIVISION.\n");

        cache.put("deadbeef", &entry).unwrap();
        let back = cache.get("deadbeef").unwrap();
        assert_eq!(entry, back);

        let stats = cache.stats();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.saves, 1);
    }

    #[test]
    fn test_miss_on_absent_hash() {
        let (_tmp, mut cache) = manager();
        assert!(cache.get("0000").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_corrupt_entry_is_miss_and_unlinked() {
        let (_tmp, mut cache) = manager();
        let path = cache.entry_path("bad");
        fs::write(&path, b"not an entry").unwrap();

        assert!(cache.get("bad").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_tmp_and_lock_swept_at_startup() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("cache");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("abc.ast.tmp"), b"partial").unwrap();
        fs::write(dir.join("lock"), b"").unwrap();

        let _cache = CacheManager::new(dir.clone()).unwrap();
        assert!(!dir.join("abc.ast.tmp").exists());
        assert!(!dir.join("lock").exists());
    }

    #[test]
    fn test_no_tmp_left_after_put() {
        let (_tmp, mut cache) = manager();
        cache.put("aa", &entry_for("       DATA DIVISION.\n")).unwrap();
        let leftovers: Vec<_> = fs::read_dir(cache.dir())
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let (_tmp, mut cache) = manager();
        cache.put("one", &entry_for("       DATA DIVISION.\n")).unwrap();
        cache.put("two", &entry_for("       DATA DIVISION.\n")).unwrap();

        assert!(cache.delete("one"));
        assert!(!cache.delete("one"));
        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.stats().file_count, 0);
    }

    fn age_entry(cache: &CacheManager, hash: &str, age_secs: u64) {
        let path = cache.entry_path(hash);
        let file = OpenOptions::new().append(true).open(&path).unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_times(FileTimes::new().set_modified(when)).unwrap();
    }

    #[test]
    fn test_quota_evicts_lru_first() {
        let (_tmp, mut cache) = manager();
        let entry = entry_for("       DATA DIVISION.\n");
        cache.put("old", &entry).unwrap();
        cache.put("mid", &entry).unwrap();
        cache.put("new", &entry).unwrap();
        age_entry(&cache, "old", 3000);
        age_entry(&cache, "mid", 2000);
        age_entry(&cache, "new", 1000);

        let entry_size = fs::metadata(cache.entry_path("old")).unwrap().len();
        // Quota for exactly two entries: the oldest must go.
        let evicted = cache.enforce_quota(entry_size * 2);
        assert_eq!(evicted, 1);
        assert!(cache.get("old").is_none());
        assert!(cache.get("mid").is_some());
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn test_quota_zero_is_unlimited() {
        let (_tmp, mut cache) = manager();
        cache.put("keep", &entry_for("       DATA DIVISION.\n")).unwrap();
        assert_eq!(cache.enforce_quota(0), 0);
        assert!(cache.get("keep").is_some());
    }

    #[test]
    fn test_cleanup_older_than() {
        let (_tmp, mut cache) = manager();
        let entry = entry_for("       DATA DIVISION.\n");
        cache.put("ancient", &entry).unwrap();
        cache.put("recent", &entry).unwrap();
        age_entry(&cache, "ancient", 40 * 24 * 60 * 60);

        assert_eq!(cache.cleanup_older_than(30), 1);
        assert!(cache.get("ancient").is_none());
        assert!(cache.get("recent").is_some());
    }
}
