//! Time-bound local key-value cache for endpoint payloads and user settings.
//!
//! Caching is best-effort by contract: every storage failure degrades to a
//! cache miss (reads) or a dropped write (writes) and is logged, never
//! raised. The data path must not depend on the cache working.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::StorageError;

/// Prefix for dataset entries. Settings live outside this namespace, so
/// `clear_all` and quota cleanup never touch them.
pub const DATA_PREFIX: &str = "hydrant.cache.";
/// Storage key for user settings.
pub const SETTINGS_KEY: &str = "hydrant.settings";

const DEFAULT_TTL_HOURS: u32 = 24;

/// User preferences. Mutated only through [`CacheStore::save_settings`];
/// always readable with defaults when unset or corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_ttl_hours")]
    pub cache_duration_hours: u32,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_accent")]
    pub accent_color: String,
}

fn default_ttl_hours() -> u32 {
    DEFAULT_TTL_HOURS
}

fn default_theme() -> String {
    String::from("system")
}

fn default_accent() -> String {
    String::from("#0077c8")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_duration_hours: default_ttl_hours(),
            theme: default_theme(),
            accent_color: default_accent(),
        }
    }
}

impl Settings {
    /// Validity window in milliseconds. A stored zero is treated as one hour
    /// rather than disabling the cache by accident.
    pub fn ttl_ms(&self) -> i64 {
        i64::from(self.cache_duration_hours.max(1)) * 3_600_000
    }
}

/// Diagnostic snapshot of the data namespace. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_bytes: usize,
    pub oldest_timestamp_ms: Option<i64>,
    pub newest_timestamp_ms: Option<i64>,
    pub ttl_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    payload: Value,
    stored_at_ms: i64,
}

/// Synchronous origin-scoped key-value backend. Size-limited in real
/// deployments, which is why writes are fallible with a quota error.
pub trait Storage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory backend. The optional byte quota exists so quota-pressure
/// eviction has something to push against in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn size_with(map: &HashMap<String, String>, key: &str, value: &str) -> usize {
        map.iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum::<usize>()
            + key.len()
            + value.len()
    }

    /// A poisoned lock surfaces as a storage failure, which the cache layer
    /// already degrades to a miss or a dropped write.
    fn guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.map
            .lock()
            .map_err(|_| StorageError::Unavailable(String::from("storage mutex poisoned")))
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.guard()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.guard()?;
        if let Some(quota) = self.quota_bytes {
            if Self::size_with(&map, key, value) > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        map.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.guard()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.guard()?.keys().cloned().collect())
    }
}

/// File-backed backend: the whole namespace is one JSON document, loaded and
/// rewritten per operation. Mirrors an origin-scoped web store closely
/// enough for a CLI process.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota_bytes: None,
        }
    }

    pub fn with_quota(path: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            path: path.into(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| StorageError::Corrupt(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn save(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        let text = serde_json::to_string(map).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        if let Some(quota) = self.quota_bytes {
            if text.len() as u64 > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.load()?;
        map.insert(key.to_owned(), value.to_owned());
        self.save(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.save(&map)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.load()?.keys().cloned().collect())
    }
}

/// TTL-checked cache over a [`Storage`] backend.
///
/// Validity is computed against the *current* settings TTL at read time, so
/// shrinking the TTL retroactively invalidates older entries.
#[derive(Clone)]
pub struct CacheStore {
    storage: Arc<dyn Storage>,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Returns the payload for `key` if present and not expired. Expired
    /// entries are evicted lazily here.
    pub fn get(&self, key: &str) -> Option<Value> {
        let full_key = data_key(key);
        let raw = match self.storage.read(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key, error = %e, "corrupt cache entry; evicting");
                let _ = self.storage.remove(&full_key);
                return None;
            }
        };

        let ttl_ms = self.get_settings().ttl_ms();
        if now_ms() - entry.stored_at_ms <= ttl_ms {
            Some(entry.payload)
        } else {
            let _ = self.storage.remove(&full_key);
            None
        }
    }

    /// Writes `value` under `key` with the current timestamp. On quota
    /// pressure: one cleanup pass (expired entries first, then oldest-first
    /// data entries), one write retry, then give up with a warning.
    pub fn set(&self, key: &str, value: &Value) {
        let entry = CacheEntry {
            payload: value.clone(),
            stored_at_ms: now_ms(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "cache entry not serializable; skipping write");
                return;
            }
        };

        let full_key = data_key(key);
        match self.storage.write(&full_key, &raw) {
            Ok(()) => {}
            Err(StorageError::QuotaExceeded) => {
                debug!(key, "cache quota exceeded; running cleanup pass");
                self.evict_for_space();
                if let Err(e) = self.storage.write(&full_key, &raw) {
                    warn!(key, error = %e, "cache write dropped after cleanup retry");
                }
            }
            Err(e) => warn!(key, error = %e, "cache write dropped"),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.storage.remove(&data_key(key)) {
            debug!(key, error = %e, "cache removal failed");
        }
    }

    /// Removes every dataset entry. Settings live in a separate namespace
    /// and survive.
    pub fn clear_all(&self) {
        for key in self.data_keys() {
            let _ = self.storage.remove(&key);
        }
    }

    pub fn get_settings(&self) -> Settings {
        match self.storage.read(SETTINGS_KEY) {
            // Malformed stored JSON is "absent", not an error.
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Settings::default(),
            Err(e) => {
                debug!(error = %e, "settings read failed; using defaults");
                Settings::default()
            }
        }
    }

    pub fn save_settings(&self, settings: &Settings) {
        let raw = match serde_json::to_string(settings) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "settings not serializable; keeping previous values");
                return;
            }
        };
        if let Err(e) = self.storage.write(SETTINGS_KEY, &raw) {
            warn!(error = %e, "settings write dropped");
        }
    }

    /// Diagnostic snapshot; does not mutate state (expired entries are
    /// counted, not evicted).
    pub fn get_stats(&self) -> CacheStats {
        let mut entry_count = 0;
        let mut total_size_bytes = 0;
        let mut oldest: Option<i64> = None;
        let mut newest: Option<i64> = None;

        for key in self.data_keys() {
            if let Ok(Some(raw)) = self.storage.read(&key) {
                entry_count += 1;
                total_size_bytes += raw.len();
                if let Ok(entry) = serde_json::from_str::<CacheEntry>(&raw) {
                    oldest = Some(oldest.map_or(entry.stored_at_ms, |o| o.min(entry.stored_at_ms)));
                    newest = Some(newest.map_or(entry.stored_at_ms, |n| n.max(entry.stored_at_ms)));
                }
            }
        }

        CacheStats {
            entry_count,
            total_size_bytes,
            oldest_timestamp_ms: oldest,
            newest_timestamp_ms: newest,
            ttl_hours: self.get_settings().cache_duration_hours,
        }
    }

    /// Most recent write stamp across the data namespace, if any.
    pub fn newest_timestamp_ms(&self) -> Option<i64> {
        self.get_stats().newest_timestamp_ms
    }

    fn data_keys(&self) -> Vec<String> {
        match self.storage.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|key| key.starts_with(DATA_PREFIX))
                .collect(),
            Err(e) => {
                debug!(error = %e, "cache key listing failed");
                Vec::new()
            }
        }
    }

    /// Single cleanup pass under quota pressure: drop expired entries, then
    /// the oldest half of what remains. Settings are exempt.
    fn evict_for_space(&self) {
        let ttl_ms = self.get_settings().ttl_ms();
        let now = now_ms();
        let mut live: Vec<(String, i64)> = Vec::new();

        for key in self.data_keys() {
            match self.storage.read(&key) {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
                    Ok(entry) if now - entry.stored_at_ms > ttl_ms => {
                        let _ = self.storage.remove(&key);
                    }
                    Ok(entry) => live.push((key, entry.stored_at_ms)),
                    // Unreadable entries free space too.
                    Err(_) => {
                        let _ = self.storage.remove(&key);
                    }
                },
                _ => {}
            }
        }

        live.sort_by_key(|(_, stored_at)| *stored_at);
        let to_drop = (live.len() / 2).max(usize::from(!live.is_empty()));
        for (key, _) in live.into_iter().take(to_drop) {
            let _ = self.storage.remove(&key);
        }
    }
}

fn data_key(key: &str) -> String {
    format!("{DATA_PREFIX}{key}")
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn aged_entry(payload: Value, age_ms: i64) -> String {
        serde_json::to_string(&CacheEntry {
            payload,
            stored_at_ms: now_ms() - age_ms,
        })
        .expect("entry serializes")
    }

    #[test]
    fn get_returns_fresh_entries_and_misses_absent_keys() {
        let cache = CacheStore::in_memory();
        assert!(cache.get("dam-status").is_none());

        cache.set("dam-status", &json!([{"name": "Kouris"}]));
        assert_eq!(cache.get("dam-status"), Some(json!([{"name": "Kouris"}])));
        assert!(cache.has("dam-status"));
    }

    #[test]
    fn ttl_change_retroactively_invalidates_entries() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheStore::new(storage.clone());

        // Two hours old: valid under the default 24h TTL.
        storage
            .write(
                &data_key("dam-status"),
                &aged_entry(json!([1, 2, 3]), 2 * 3_600_000),
            )
            .expect("write succeeds");
        assert!(cache.get("dam-status").is_some());

        cache.save_settings(&Settings {
            cache_duration_hours: 1,
            ..Settings::default()
        });
        assert!(cache.get("dam-status").is_none(), "1h TTL must expire a 2h entry");
    }

    #[test]
    fn expired_entries_are_evicted_lazily_on_read() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheStore::new(storage.clone());

        storage
            .write(&data_key("outages"), &aged_entry(json!([]), 25 * 3_600_000))
            .expect("write succeeds");

        assert!(cache.get("outages").is_none());
        assert_eq!(
            storage.read(&data_key("outages")).expect("read works"),
            None,
            "expired entry should be removed, not just skipped"
        );
    }

    #[test]
    fn quota_pressure_evicts_once_and_retries_the_write() {
        let storage = Arc::new(MemoryStorage::with_quota(600));
        let cache = CacheStore::new(storage.clone());

        // Stale filler that the cleanup pass will reclaim.
        storage
            .write(&data_key("old-a"), &aged_entry(json!("x".repeat(200)), 30 * 3_600_000))
            .expect("write succeeds");
        storage
            .write(&data_key("old-b"), &aged_entry(json!("y".repeat(200)), 30 * 3_600_000))
            .expect("write succeeds");

        cache.set("dam-status", &json!("z".repeat(300)));
        assert!(cache.get("dam-status").is_some(), "retry after cleanup must land");
    }

    #[test]
    fn failed_retry_degrades_silently() {
        // Quota too small for the value even after cleanup.
        let storage = Arc::new(MemoryStorage::with_quota(10));
        let cache = CacheStore::new(storage);

        cache.set("dam-status", &json!("far too large for ten bytes"));
        assert!(cache.get("dam-status").is_none());
    }

    #[test]
    fn clear_all_is_idempotent_and_spares_settings() {
        let cache = CacheStore::in_memory();
        cache.set("dam-status", &json!([1]));
        cache.set("outages", &json!([2]));
        cache.save_settings(&Settings {
            theme: String::from("dark"),
            ..Settings::default()
        });

        cache.clear_all();
        assert_eq!(cache.get_stats().entry_count, 0);
        assert_eq!(cache.get_settings().theme, "dark");

        cache.clear_all();
        assert_eq!(cache.get_stats().entry_count, 0);
        assert_eq!(cache.get_settings().theme, "dark");
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .write(SETTINGS_KEY, "{not json at all")
            .expect("write succeeds");

        let cache = CacheStore::new(storage);
        assert_eq!(cache.get_settings(), Settings::default());
    }

    #[test]
    fn an_unavailable_backend_degrades_to_misses_and_noops() {
        struct DeadStorage;

        impl Storage for DeadStorage {
            fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
                Err(StorageError::Unavailable(String::from("backend gone")))
            }
            fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
                Err(StorageError::Unavailable(String::from("backend gone")))
            }
            fn remove(&self, _key: &str) -> Result<(), StorageError> {
                Err(StorageError::Unavailable(String::from("backend gone")))
            }
            fn keys(&self) -> Result<Vec<String>, StorageError> {
                Err(StorageError::Unavailable(String::from("backend gone")))
            }
        }

        let cache = CacheStore::new(Arc::new(DeadStorage));
        cache.set("dam-status", &json!([1]));
        assert!(cache.get("dam-status").is_none());
        assert_eq!(cache.get_settings(), Settings::default());
        assert_eq!(cache.get_stats().entry_count, 0);
        cache.clear_all();
    }

    #[test]
    fn stats_reflect_entries_without_mutating() {
        let cache = CacheStore::in_memory();
        cache.set("dam-status", &json!([1]));
        cache.set("outages", &json!([2]));

        let stats = cache.get_stats();
        assert_eq!(stats.entry_count, 2);
        assert!(stats.total_size_bytes > 0);
        assert!(stats.oldest_timestamp_ms.is_some());
        assert_eq!(stats.ttl_hours, 24);
        assert_eq!(cache.get_stats().entry_count, 2);
    }

    #[test]
    fn file_storage_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");

        {
            let cache = CacheStore::new(Arc::new(FileStorage::new(&path)));
            cache.set("tariffs", &json!([{"category": "domestic"}]));
        }

        let reopened = CacheStore::new(Arc::new(FileStorage::new(&path)));
        assert_eq!(
            reopened.get("tariffs"),
            Some(json!([{"category": "domestic"}]))
        );
    }
}
