//! # Disk Cache
//!
//! This module implements the persistent tier. Every entry is stored as the
//! codec-encoded image (`<digest>.img`) plus a JSON sidecar (`<digest>.meta`)
//! holding its size and last access stamp. An in-memory index rebuilt on open
//! drives LRU eviction against the configured byte budget.
//!
//! Any I/O failure marks the tier degraded; from then on it behaves like
//! [`NoopCache`](super::NoopCache).

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, info, warn};

use super::CacheTier;
use crate::cache::types::{DiskCacheConfig, DiskEntryMeta};
use crate::codec::ImageCodec;
use crate::error::{CacheError, CacheResult};
use crate::image::Image;
use crate::request::RequestKey;

const DATA_EXTENSION: &str = "img";
const META_EXTENSION: &str = "meta";
const TEMP_EXTENSION: &str = "tmp";
const PROBE_FILE: &str = ".probe";

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    size: u64,
    last_accessed: u64,
}

#[derive(Debug, Default)]
struct DiskIndex {
    entries: HashMap<String, IndexEntry>,
    total_size: u64,
    /// Last handed out access stamp
    clock: u64,
}

impl DiskIndex {
    /// Strictly increasing stamp that tracks wall-clock milliseconds.
    fn stamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.clock = now.max(self.clock + 1);
        self.clock
    }

    fn insert(&mut self, digest: String, entry: IndexEntry) {
        if let Some(old) = self.entries.insert(digest, entry) {
            self.total_size -= old.size;
        }
        self.total_size += entry.size;
        self.clock = self.clock.max(entry.last_accessed);
    }

    fn remove(&mut self, digest: &str) -> Option<IndexEntry> {
        let removed = self.entries.remove(digest)?;
        self.total_size -= removed.size;
        Some(removed)
    }

    /// Drop least recently used entries until the budget holds.
    fn evict_until(&mut self, max_size: u64) -> Vec<String> {
        if self.total_size <= max_size {
            return Vec::new();
        }

        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(digest, e)| (e.last_accessed, digest.clone()))
            .collect();
        by_age.sort_unstable();

        let mut victims = Vec::new();
        for (_, digest) in by_age {
            if self.total_size <= max_size {
                break;
            }
            self.remove(&digest);
            victims.push(digest);
        }
        victims
    }
}

pub struct DiskCache {
    dir: PathBuf,
    max_size: u64,
    codec: Arc<dyn ImageCodec>,
    index: Mutex<DiskIndex>,
    degraded: AtomicBool,
}

impl DiskCache {
    /// Open (or create) the cache directory and rebuild the index from disk.
    ///
    /// Fails if the directory cannot be created, is not writable, or cannot
    /// be scanned.
    pub async fn open(config: &DiskCacheConfig, codec: Arc<dyn ImageCodec>) -> CacheResult<Self> {
        let dir = config.path.clone();
        fs::create_dir_all(&dir).await?;

        // Catch read-only locations before the first put does.
        let probe = dir.join(PROBE_FILE);
        fs::write(&probe, b"probe").await?;
        fs::remove_file(&probe).await?;

        let cache = Self {
            dir,
            max_size: config.max_size,
            codec,
            index: Mutex::new(DiskIndex::default()),
            degraded: AtomicBool::new(false),
        };
        cache.rebuild_index().await?;

        let victims = cache.index.lock().evict_until(cache.max_size);
        cache.delete_entries(&victims).await;

        info!(
            dir = ?cache.dir,
            entries = cache.entry_count(),
            size = cache.size_bytes(),
            max_size = cache.max_size,
            "Disk cache opened"
        );
        Ok(cache)
    }

    pub fn entry_count(&self) -> usize {
        self.index.lock().entries.len()
    }

    pub fn size_bytes(&self) -> u64 {
        self.index.lock().total_size
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{digest}.{DATA_EXTENSION}"))
    }

    fn meta_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{digest}.{META_EXTENSION}"))
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(TEMP_EXTENSION);
        PathBuf::from(name)
    }

    fn degrade(&self, err: &io::Error) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(dir = ?self.dir, error = %err, "Disk cache failed, disabling it");
        }
    }

    /// Scan the directory: index entries with valid metadata, remove leftovers
    /// from interrupted writes and orphans.
    async fn rebuild_index(&self) -> CacheResult<()> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut metas = Vec::new();
        let mut data_files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
                path.extension().and_then(|e| e.to_str()),
            ) else {
                continue;
            };
            match ext {
                TEMP_EXTENSION => {
                    let _ = fs::remove_file(&path).await;
                }
                META_EXTENSION => metas.push((stem, path)),
                DATA_EXTENSION => data_files.push(stem),
                _ => {}
            }
        }

        let mut index = DiskIndex::default();
        for (digest, meta_path) in metas {
            let meta = match fs::read(&meta_path).await {
                Ok(bytes) => serde_json::from_slice::<DiskEntryMeta>(&bytes).ok(),
                Err(_) => None,
            };
            match meta {
                Some(meta) if data_files.contains(&digest) => index.insert(
                    digest,
                    IndexEntry {
                        size: meta.size,
                        last_accessed: meta.last_accessed,
                    },
                ),
                _ => {
                    debug!(path = ?meta_path, "Dropping unreadable cache entry");
                    let _ = fs::remove_file(&meta_path).await;
                    let _ = fs::remove_file(self.data_path(&digest)).await;
                }
            }
        }

        for digest in data_files {
            if !index.entries.contains_key(&digest) {
                let _ = fs::remove_file(self.data_path(&digest)).await;
            }
        }

        *self.index.lock() = index;
        Ok(())
    }

    async fn delete_entries(&self, digests: &[String]) {
        for digest in digests {
            for path in [self.data_path(digest), self.meta_path(digest)] {
                match fs::remove_file(&path).await {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => {
                        warn!(path = ?path, error = %e, "Failed to remove cache file");
                    }
                    _ => {}
                }
            }
            debug!(digest = %digest, "Evicted disk cache entry");
        }
    }

    async fn write_meta(&self, digest: &str, meta: &DiskEntryMeta) -> io::Result<()> {
        let path = self.meta_path(digest);
        let temp = Self::temp_path(&path);
        let json = serde_json::to_vec(meta).map_err(io::Error::other)?;
        fs::write(&temp, &json).await?;
        fs::rename(&temp, &path).await
    }

    fn meta_for(key: &RequestKey, size: u64, last_accessed: u64) -> DiskEntryMeta {
        DiskEntryMeta {
            source: key.source().to_string(),
            transformation: key.transformation().map(str::to_string),
            size,
            last_accessed,
        }
    }
}

#[async_trait]
impl CacheTier for DiskCache {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn get(&self, key: &RequestKey) -> CacheResult<Option<Arc<Image>>> {
        if self.is_degraded() {
            return Ok(None);
        }

        let digest = key.digest();
        if !self.index.lock().entries.contains_key(&digest) {
            return Ok(None);
        }

        let data = match fs::read(self.data_path(&digest)).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Removed behind our back
                self.index.lock().remove(&digest);
                let _ = fs::remove_file(self.meta_path(&digest)).await;
                return Ok(None);
            }
            Err(e) => {
                self.degrade(&e);
                return Err(e.into());
            }
        };

        let codec = self.codec.clone();
        let decoded = tokio::task::spawn_blocking(move || codec.decode(&data)).await?;
        let image = match decoded {
            Ok(image) => image,
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt disk cache entry, removing it");
                self.index.lock().remove(&digest);
                self.delete_entries(std::slice::from_ref(&digest)).await;
                return Err(e.into());
            }
        };

        let touched = {
            let mut index = self.index.lock();
            let stamp = index.stamp();
            index.entries.get_mut(&digest).map(|entry| {
                entry.last_accessed = stamp;
                *entry
            })
        };
        if let Some(entry) = touched {
            let meta = Self::meta_for(key, entry.size, entry.last_accessed);
            if let Err(e) = self.write_meta(&digest, &meta).await {
                warn!(key = %key, error = %e, "Failed to persist access time");
            }
        }

        debug!(key = %key, "Disk cache hit");
        Ok(Some(Arc::new(image)))
    }

    async fn put(&self, key: &RequestKey, image: Arc<Image>) -> CacheResult<()> {
        if self.is_degraded() {
            return Ok(());
        }

        let codec = self.codec.clone();
        let encoded = tokio::task::spawn_blocking(move || codec.encode(&image)).await??;
        let size = encoded.len() as u64;
        if size > self.max_size {
            debug!(key = %key, size, max_size = self.max_size, "Entry too large for disk cache, skipping");
            return Ok(());
        }

        let digest = key.digest();
        let data_path = self.data_path(&digest);
        let temp_data = Self::temp_path(&data_path);

        let stamp = self.index.lock().stamp();
        let meta = Self::meta_for(key, size, stamp);

        // Write to a temporary file then rename so readers never see partial data
        let written = async {
            fs::write(&temp_data, &encoded).await?;
            fs::rename(&temp_data, &data_path).await?;
            self.write_meta(&digest, &meta).await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_data).await;
            let _ = fs::remove_file(&data_path).await;
            self.degrade(&e);
            return Err(e.into());
        }

        let victims = {
            let mut index = self.index.lock();
            index.insert(
                digest,
                IndexEntry {
                    size,
                    last_accessed: stamp,
                },
            );
            index.evict_until(self.max_size)
        };
        self.delete_entries(&victims).await;

        debug!(key = %key, size, "Stored entry in disk cache");
        Ok(())
    }

    async fn remove(&self, key: &RequestKey) -> CacheResult<()> {
        let digest = key.digest();
        if self.index.lock().remove(&digest).is_some() {
            self.delete_entries(std::slice::from_ref(&digest)).await;
        }
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        let digests: Vec<String> = {
            let mut index = self.index.lock();
            let digests = index.entries.keys().cloned().collect();
            *index = DiskIndex {
                clock: index.clock,
                ..DiskIndex::default()
            };
            digests
        };
        self.delete_entries(&digests).await;
        debug!(count = digests.len(), "Cleared disk cache entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCodec;

    fn key(name: &str) -> RequestKey {
        RequestKey::new(name, None)
    }

    fn image(len: usize, fill: u8) -> Arc<Image> {
        Arc::new(Image::new(len as u32, 1, vec![fill; len]))
    }

    async fn open(dir: &Path, max_size: u64) -> DiskCache {
        DiskCache::open(&DiskCacheConfig::new(dir, max_size), Arc::new(MockCodec::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1024).await;
        let k = key("a.png");

        cache.put(&k, image(10, 7)).await.unwrap();

        let hit = cache.get(&k).await.unwrap().expect("entry should be stored");
        assert_eq!(*hit, *image(10, 7));
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.size_bytes(), 10);
        assert!(cache.data_path(&k.digest()).exists());
        assert!(cache.meta_path(&k.digest()).exists());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("persist.png");
        {
            let cache = open(dir.path(), 1024).await;
            cache.put(&k, image(12, 3)).await.unwrap();
        }

        let reopened = open(dir.path(), 1024).await;
        assert_eq!(reopened.entry_count(), 1);
        let hit = reopened.get(&k).await.unwrap().expect("entry should persist");
        assert_eq!(hit.width(), 12);
    }

    #[tokio::test]
    async fn test_lru_eviction_by_access_recency() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 30).await;
        let (k1, k2, k3) = (key("k1"), key("k2"), key("k3"));

        cache.put(&k1, image(10, 1)).await.unwrap();
        cache.put(&k2, image(10, 2)).await.unwrap();
        cache.put(&k3, image(10, 3)).await.unwrap();

        // Refresh k1 so k2 is the oldest
        assert!(cache.get(&k1).await.unwrap().is_some());

        cache.put(&key("k4"), image(10, 4)).await.unwrap();

        assert!(cache.get(&k2).await.unwrap().is_none());
        assert!(cache.get(&k1).await.unwrap().is_some());
        assert!(cache.get(&k3).await.unwrap().is_some());
        assert!(cache.size_bytes() <= 30);
        assert!(!cache.data_path(&k2.digest()).exists());
    }

    #[tokio::test]
    async fn test_reopen_trims_to_smaller_budget() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = open(dir.path(), 100).await;
            cache.put(&key("old"), image(10, 1)).await.unwrap();
            cache.put(&key("new"), image(10, 2)).await.unwrap();
        }

        let cache = open(dir.path(), 10).await;
        assert_eq!(cache.entry_count(), 1);
        assert!(cache.get(&key("new")).await.unwrap().is_some());
        assert!(cache.get(&key("old")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rebuild_discards_orphans_and_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("abc.img"), b"orphan").await.unwrap();
        tokio::fs::write(dir.path().join("def.meta"), b"{not json").await.unwrap();
        tokio::fs::write(dir.path().join("ghi.img.tmp"), b"partial").await.unwrap();

        let cache = open(dir.path(), 1024).await;
        assert_eq!(cache.entry_count(), 0);
        assert!(!dir.path().join("abc.img").exists());
        assert!(!dir.path().join("def.meta").exists());
        assert!(!dir.path().join("ghi.img.tmp").exists());
    }

    #[tokio::test]
    async fn test_open_fails_on_invalid_location() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        tokio::fs::write(&file, b"x").await.unwrap();

        let result = DiskCache::open(
            &DiskCacheConfig::new(file.join("cache"), 1024),
            Arc::new(MockCodec::new()),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_data_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1024).await;
        let k = key("vanishing");
        cache.put(&k, image(5, 1)).await.unwrap();

        tokio::fs::remove_file(cache.data_path(&k.digest())).await.unwrap();

        assert!(cache.get(&k).await.unwrap().is_none());
        assert_eq!(cache.entry_count(), 0);
        assert!(!cache.is_degraded());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1024).await;
        let (k1, k2) = (key("k1"), key("k2"));
        cache.put(&k1, image(4, 1)).await.unwrap();
        cache.put(&k2, image(4, 2)).await.unwrap();

        cache.remove(&k1).await.unwrap();
        assert!(cache.get(&k1).await.unwrap().is_none());
        assert_eq!(cache.entry_count(), 1);

        cache.clear().await.unwrap();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.size_bytes(), 0);
        assert!(cache.get(&k2).await.unwrap().is_none());
    }

    #[test]
    fn test_stamps_are_strictly_increasing() {
        let mut index = DiskIndex::default();
        let a = index.stamp();
        let b = index.stamp();
        let c = index.stamp();
        assert!(a < b && b < c);
    }
}
