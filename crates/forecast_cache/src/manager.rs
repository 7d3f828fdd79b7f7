//! Cache service: metadata index, expiry, and LRU eviction.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Timelike, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use common::{Error, Result};

use crate::entry::{CacheEntry, CacheStats, SourceKind};
use crate::METADATA_FILE;

type Index = BTreeMap<String, CacheEntry>;

/// Tracks forecast files under one directory.
///
/// Every mutation rewrites the whole metadata file while the index lock is
/// held, so concurrent loaders never interleave partial writes.
#[derive(Debug)]
pub struct CacheManager {
    dir: PathBuf,
    metadata_path: PathBuf,
    entries: Mutex<Index>,
}

impl CacheManager {
    /// Create the directory if needed, load the index, then backfill any
    /// recognisable file the index does not know about.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let metadata_path = dir.join(METADATA_FILE);

        let entries = load_index(&metadata_path);
        if !entries.is_empty() {
            info!("Loaded cache metadata: {} files tracked", entries.len());
        }

        let manager = Self {
            dir,
            metadata_path,
            entries: Mutex::new(entries),
        };
        manager.backfill_untracked()?;
        Ok(manager)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic location for one forecast hour.
    pub fn cache_path(
        &self,
        kind: SourceKind,
        cycle_time: DateTime<Utc>,
        forecast_hour: u32,
    ) -> PathBuf {
        self.dir.join(kind.filename(cycle_time, forecast_hour))
    }

    /// True when the file for this hour exists on disk.
    pub fn is_cached(&self, kind: SourceKind, cycle_time: DateTime<Utc>, forecast_hour: u32) -> bool {
        self.cache_path(kind, cycle_time, forecast_hour).is_file()
    }

    /// Record a freshly downloaded file. Errors if the file is missing.
    pub fn register_file(
        &self,
        kind: SourceKind,
        cycle_time: DateTime<Utc>,
        forecast_hour: u32,
    ) -> Result<CacheEntry> {
        let filename = kind.filename(cycle_time, forecast_hour);
        let path = self.dir.join(&filename);
        let meta = fs::metadata(&path)
            .map_err(|e| Error::Cache(format!("cannot register {}: {}", filename, e)))?;

        let entry = CacheEntry {
            filename: filename.clone(),
            source_type: kind,
            cycle_date: cycle_time.format("%Y%m%d").to_string(),
            cycle_hour: cycle_time.hour(),
            forecast_hour,
            size_bytes: meta.len(),
            created_time: created_time(&meta),
            last_accessed: Utc::now(),
        };

        let mut entries = self.entries.lock();
        entries.insert(filename, entry.clone());
        self.save(&entries);
        Ok(entry)
    }

    /// Bump `last_accessed` for LRU ordering. Returns false if untracked.
    pub fn update_access_time(&self, filename: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(filename) {
            Some(entry) => {
                entry.last_accessed = Utc::now();
                self.save(&entries);
                true
            }
            None => false,
        }
    }

    /// Delete every entry created more than `days` ago. Returns how many
    /// files were actually deleted.
    ///
    /// An entry leaves the index even when its file could not be removed.
    pub fn enforce_expiry(&self, days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(days);
        let mut entries = self.entries.lock();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.created_time < cutoff)
            .map(|(name, _)| name.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut deleted = 0;
        for name in &expired {
            if self.remove_file(name, "expired") {
                deleted += 1;
            }
            entries.remove(name);
        }
        self.save(&entries);

        if deleted > 0 {
            info!("Cleaned up {} expired cache files", deleted);
        }
        deleted
    }

    /// Evict least-recently-accessed entries until the tracked total fits
    /// in `max_bytes`, or a single entry remains. Returns files deleted.
    pub fn enforce_size_limit(&self, max_bytes: u64) -> usize {
        let mut entries = self.entries.lock();
        let mut total: u64 = entries.values().map(|e| e.size_bytes).sum();
        if total <= max_bytes {
            return 0;
        }

        let mut by_access: Vec<(String, DateTime<Utc>, u64)> = entries
            .iter()
            .map(|(name, e)| (name.clone(), e.last_accessed, e.size_bytes))
            .collect();
        by_access.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut deleted = 0;
        for (name, _, size) in by_access {
            if total <= max_bytes || entries.len() <= 1 {
                break;
            }
            if self.remove_file(&name, "LRU evicted") {
                deleted += 1;
            }
            entries.remove(&name);
            total = total.saturating_sub(size);
        }
        self.save(&entries);

        info!(
            "Evicted {} files; cache now {} bytes (limit {})",
            deleted, total, max_bytes
        );
        deleted
    }

    /// Counts and sizes by source type.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let mut stats = CacheStats {
            total_files: entries.len(),
            ..CacheStats::default()
        };
        for entry in entries.values() {
            stats.total_size_bytes += entry.size_bytes;
            match entry.source_type {
                SourceKind::Wind => {
                    stats.wind_files += 1;
                    stats.wind_size_bytes += entry.size_bytes;
                }
                SourceKind::Current => {
                    stats.current_files += 1;
                    stats.current_size_bytes += entry.size_bytes;
                }
            }
        }
        stats
    }

    /// Snapshot of one tracked entry.
    pub fn entry(&self, filename: &str) -> Option<CacheEntry> {
        self.entries.lock().get(filename).cloned()
    }

    /// Snapshot of every tracked entry, ordered by filename.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.entries.lock().values().cloned().collect()
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn backfill_untracked(&self) -> Result<()> {
        let mut entries = self.entries.lock();
        let mut added = 0;

        for dirent in fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            if entries.contains_key(&name) {
                continue;
            }
            let Some(parsed) = SourceKind::parse_filename(&name) else {
                continue;
            };
            let meta = match dirent.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let last_accessed = meta
                .accessed()
                .or_else(|_| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.insert(
                name.clone(),
                CacheEntry {
                    filename: name,
                    source_type: parsed.source_type,
                    cycle_date: parsed.cycle_date,
                    cycle_hour: parsed.cycle_hour,
                    forecast_hour: parsed.forecast_hour,
                    size_bytes: meta.len(),
                    created_time: created_time(&meta),
                    last_accessed,
                },
            );
            added += 1;
        }

        if added > 0 {
            info!("Added {} untracked files to cache metadata", added);
            self.save(&entries);
        }
        Ok(())
    }

    /// Returns true only when a file existed and was removed.
    fn remove_file(&self, filename: &str, reason: &str) -> bool {
        let path = self.dir.join(filename);
        if !path.exists() {
            return false;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("{} cache file: {}", reason, filename);
                true
            }
            Err(e) => {
                warn!("Could not delete {}: {}", filename, e);
                false
            }
        }
    }

    /// Wholesale rewrite via a temp sibling. Failures are logged only.
    fn save(&self, entries: &Index) {
        let json = match serde_json::to_string_pretty(entries) {
            Ok(j) => j,
            Err(e) => {
                warn!("Could not serialise cache metadata: {}", e);
                return;
            }
        };
        let tmp = self.metadata_path.with_extension("json.tmp");
        let result = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, &self.metadata_path));
        if let Err(e) = result {
            warn!("Could not save cache metadata: {}", e);
        }
    }
}

fn load_index(path: &Path) -> Index {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Index::new(),
        Err(e) => {
            warn!("Could not read cache metadata: {}", e);
            return Index::new();
        }
    };
    match serde_json::from_str::<Index>(&raw) {
        Ok(mut entries) => {
            for (name, entry) in entries.iter_mut() {
                entry.filename = name.clone();
            }
            entries
        }
        Err(e) => {
            warn!("Could not parse cache metadata, starting empty: {}", e);
            Index::new()
        }
    }
}

fn created_time(meta: &fs::Metadata) -> DateTime<Utc> {
    meta.created()
        .or_else(|_| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::now()))
}
