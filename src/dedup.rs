//! Content-hash duplicate engine (stage 3): size-bucket pre-filter, then
//! streaming-hash grouping within buckets with more than one member.
//!
//! Grounded in `jl1nie-gpth-rs`'s `dedup` module shape; SHA-256 chosen over
//! MD5 since the retrieval pack's manifests lean SHA-256 and either is
//! acceptable for this purpose.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::config::Configuration;
use crate::model::MediaEntity;

const DEFAULT_CACHE_CAPACITY: usize = 10_000;
const FAST_HASH_BYTES: u64 = 2 * 1024 * 1024;
/// Digest reserved for over-size files when `enforce_max_file_size` is set,
/// so they never accidentally collide with a real file's content hash.
const OVERSIZE_SENTINEL: &str = "__oversize__";
/// Digest reserved for files whose read failed; routes them to a
/// never-merged "unprocessable" group, one per path.
const UNREADABLE_PREFIX: &str = "__unreadable__";

#[derive(Hash, Eq, PartialEq, Clone)]
struct CacheKey {
    path: PathBuf,
    size: u64,
    mtime_ms: i64,
}

/// LRU cache mapping `(path, size, mtime)` to a previously computed digest,
/// so re-running the pipeline over an unchanged tree skips re-hashing.
pub struct HashCache {
    inner: Mutex<LruCache<CacheKey, String>>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        HashCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: CacheKey, digest: String) {
        self.inner.lock().unwrap().put(key, digest);
    }
}

impl Default for HashCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the two-pass merge over `entities`, returning the reduced
/// collection and the number of entities removed by merging.
pub fn merge_duplicates(
    entities: Vec<MediaEntity>,
    config: &Configuration,
    cache: &HashCache,
) -> anyhow::Result<(Vec<MediaEntity>, u64)> {
    let original_count = entities.len();

    // Pass 1: bucket by primary file size.
    let mut buckets: HashMap<u64, Vec<MediaEntity>> = HashMap::new();
    for entity in entities {
        let size = entity.primary_file.size;
        buckets.entry(size).or_default().push(entity);
    }

    let mut merged = Vec::new();
    for (size, bucket) in buckets {
        if bucket.len() == 1 {
            merged.extend(bucket);
            continue;
        }
        merged.extend(hash_and_merge(bucket, size, config, cache));
    }

    let removed = original_count.saturating_sub(merged.len()) as u64;
    Ok((merged, removed))
}

/// Pass 2: within a size bucket of more than one entity, hash every
/// primary file and merge entities whose `"<size>_<digest>"` key collides.
fn hash_and_merge(
    bucket: Vec<MediaEntity>,
    size: u64,
    config: &Configuration,
    cache: &HashCache,
) -> Vec<MediaEntity> {
    let mut groups: HashMap<String, MediaEntity> = HashMap::new();
    let mut unprocessable = Vec::new();

    for entity in bucket {
        let path = entity.primary_file.source_path.clone();
        let digest = match digest_for(&path, size, config, cache) {
            Ok(d) => d,
            Err(_) => {
                unprocessable.push(entity);
                continue;
            }
        };

        if digest.starts_with(UNREADABLE_PREFIX) || digest == OVERSIZE_SENTINEL {
            unprocessable.push(entity);
            continue;
        }

        let key = format!("{size}_{digest}");
        match groups.remove(&key) {
            Some(mut existing) => {
                existing.merge(entity);
                groups.insert(key, existing);
            }
            None => {
                groups.insert(key, entity);
            }
        }
    }

    let mut result: Vec<MediaEntity> = groups.into_values().collect();
    result.extend(unprocessable);
    result
}

/// Computes (or recalls from cache) the content digest for `path`.
fn digest_for(
    path: &Path,
    size: u64,
    config: &Configuration,
    cache: &HashCache,
) -> anyhow::Result<String> {
    if config.enforce_max_file_size && size > config.max_file_size {
        return Ok(OVERSIZE_SENTINEL.to_string());
    }

    let mtime_ms = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let key = CacheKey {
        path: path.to_path_buf(),
        size,
        mtime_ms,
    };
    if let Some(digest) = cache.get(&key) {
        return Ok(digest);
    }

    let digest = if config.fast_hash {
        match fast_hash(path) {
            Ok(d) => d,
            Err(_) => full_hash(path)?,
        }
    } else {
        full_hash(path)?
    };

    cache.put(key, digest.clone());
    Ok(digest)
}

/// Full streaming SHA-256 over the entire file.
fn full_hash(path: &Path) -> anyhow::Result<String> {
    let mut file = File::open(path).map_err(|e| {
        anyhow::anyhow!("{UNREADABLE_PREFIX}{}: {e}", path.display())
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hashes only the first `FAST_HASH_BYTES` of the file. Opt-in and
/// collision-risky; callers fall back to `full_hash` on any error.
fn fast_hash(path: &Path) -> anyhow::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut remaining = FAST_HASH_BYTES;
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hex::encode(hasher.finalize()))
}
