//! Transient copy of in-progress wizard state, used for crash recovery.
//!
//! The snapshot is two JSON documents stored under per-event keys, mirroring
//! the wizard's two maps. It is only ever a hint: anything unreadable is
//! reported as corrupt and the caller falls back to the durable store.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::SessionKey;
use crate::traits::LocalCache;

/// Guest counts of the enabled sessions.
pub type SessionConfig = BTreeMap<SessionKey, u32>;

/// Chosen item names per session.
pub type MenuSelections = BTreeMap<SessionKey, BTreeSet<String>>;

/// Both wizard maps as last written by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub config: SessionConfig,
    pub selections: MenuSelections,
}

/// Outcome of reading a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLoad {
    Missing,
    Loaded(CacheSnapshot),
    Corrupt(String),
}

/// Percent-encode `name` for use as a single file name component.
///
/// ASCII letters, digits, `-` and `_` are kept; every other byte becomes
/// `%XX`. Distinct names always map to distinct file names.
pub fn encode_file_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

pub fn config_key(event_id: &str) -> String {
    format!("menu_config_{event_id}")
}

pub fn selections_key(event_id: &str) -> String {
    format!("menu_sels_{event_id}")
}

/// Read the snapshot for an event. Both halves must be present.
pub fn load_snapshot<C: LocalCache + ?Sized>(cache: &C, event_id: &str) -> CacheLoad {
    let read_both = || -> Result<Option<(String, String)>> {
        let config = cache.read(&config_key(event_id))?;
        let selections = cache.read(&selections_key(event_id))?;
        Ok(config.zip(selections))
    };

    let (config, selections) = match read_both() {
        Ok(Some(raw)) => raw,
        Ok(None) => return CacheLoad::Missing,
        Err(e) => return CacheLoad::Corrupt(format!("{e:#}")),
    };

    let config = match serde_json::from_str::<SessionConfig>(&config) {
        Ok(config) => config,
        Err(e) => return CacheLoad::Corrupt(format!("session config: {e}")),
    };
    let selections = match serde_json::from_str::<MenuSelections>(&selections) {
        Ok(selections) => selections,
        Err(e) => return CacheLoad::Corrupt(format!("menu selections: {e}")),
    };

    CacheLoad::Loaded(CacheSnapshot { config, selections })
}

pub fn save_snapshot<C: LocalCache + ?Sized>(
    cache: &C,
    event_id: &str,
    snapshot: &CacheSnapshot,
) -> Result<()> {
    let config =
        serde_json::to_string(&snapshot.config).context("Failed to encode session config")?;
    let selections =
        serde_json::to_string(&snapshot.selections).context("Failed to encode menu selections")?;
    cache.write(&config_key(event_id), &config)?;
    cache.write(&selections_key(event_id), &selections)?;
    Ok(())
}

pub fn clear_snapshot<C: LocalCache + ?Sized>(cache: &C, event_id: &str) -> Result<()> {
    cache.remove(&config_key(event_id))?;
    cache.remove(&selections_key(event_id))?;
    Ok(())
}

// ==================== File-backed cache ====================

/// Cache storing one small JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<user cache dir>/catering-quotes`, or `./.catering-cache` when the
    /// platform has no cache directory.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .map(|dir| dir.join("catering-quotes"))
            .unwrap_or_else(|| PathBuf::from(".catering-cache"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_name(key)))
    }
}

impl LocalCache for FileCache {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read cache file {}", path.display()))
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {}", self.dir.display()))?;
        let path = self.path_for(key);
        fs::write(&path, value)
            .with_context(|| format!("Failed to write cache file {}", path.display()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove cache file {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::traits::MemoryCache;

    fn snapshot() -> CacheSnapshot {
        let lunch = SessionKey::new(0, "lunch");
        let dinner = SessionKey::new(1, "dinner");

        let mut config = SessionConfig::new();
        config.insert(lunch.clone(), 50);
        config.insert(dinner.clone(), 0);

        let mut selections = MenuSelections::new();
        selections.insert(lunch, BTreeSet::from(["Dal".to_string(), "Naan".to_string()]));
        selections.insert(dinner, BTreeSet::new());

        CacheSnapshot { config, selections }
    }

    #[test]
    fn test_keys_are_namespaced_per_event() {
        assert_eq!(config_key("abc"), "menu_config_abc");
        assert_eq!(selections_key("abc"), "menu_sels_abc");
    }

    #[test]
    fn test_save_then_load() {
        let cache = MemoryCache::new();
        save_snapshot(&cache, "e1", &snapshot()).unwrap();

        assert_eq!(load_snapshot(&cache, "e1"), CacheLoad::Loaded(snapshot()));
        assert_eq!(load_snapshot(&cache, "e2"), CacheLoad::Missing);
    }

    #[test]
    fn test_snapshot_json_uses_textual_keys() {
        let cache = MemoryCache::new();
        save_snapshot(&cache, "e1", &snapshot()).unwrap();

        let raw = cache.read("menu_config_e1").unwrap().unwrap();
        assert_eq!(raw, r#"{"0_lunch":50,"1_dinner":0}"#);
        let raw = cache.read("menu_sels_e1").unwrap().unwrap();
        assert_eq!(raw, r#"{"0_lunch":["Dal","Naan"],"1_dinner":[]}"#);
    }

    #[test]
    fn test_half_snapshot_is_missing() {
        let cache = MemoryCache::new();
        cache.write("menu_config_e1", r#"{"0_lunch":5}"#).unwrap();
        assert_eq!(load_snapshot(&cache, "e1"), CacheLoad::Missing);
    }

    #[test]
    fn test_malformed_json_is_corrupt() {
        let cache = MemoryCache::new();
        cache.write("menu_config_e1", "{not json").unwrap();
        cache.write("menu_sels_e1", "{}").unwrap();
        assert!(matches!(load_snapshot(&cache, "e1"), CacheLoad::Corrupt(_)));
    }

    #[test]
    fn test_malformed_key_is_corrupt() {
        let cache = MemoryCache::new();
        cache.write("menu_config_e1", r#"{"lunch":5}"#).unwrap();
        cache.write("menu_sels_e1", "{}").unwrap();
        assert!(matches!(load_snapshot(&cache, "e1"), CacheLoad::Corrupt(_)));
    }

    #[test]
    fn test_negative_pax_is_corrupt() {
        let cache = MemoryCache::new();
        cache.write("menu_config_e1", r#"{"0_lunch":-5}"#).unwrap();
        cache.write("menu_sels_e1", "{}").unwrap();
        assert!(matches!(load_snapshot(&cache, "e1"), CacheLoad::Corrupt(_)));
    }

    #[test]
    fn test_clear_removes_both_halves() {
        let cache = MemoryCache::new();
        save_snapshot(&cache, "e1", &snapshot()).unwrap();
        save_snapshot(&cache, "e2", &snapshot()).unwrap();

        clear_snapshot(&cache, "e1").unwrap();
        assert_eq!(load_snapshot(&cache, "e1"), CacheLoad::Missing);
        assert_eq!(cache.len(), 2);
    }

    // ==================== FileCache Tests ====================

    #[test]
    fn test_file_cache_round_trip() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested"));

        assert_eq!(cache.read("k").unwrap(), None);
        cache.write("k", "value").unwrap();
        assert_eq!(cache.read("k").unwrap().as_deref(), Some("value"));

        cache.remove("k").unwrap();
        assert_eq!(cache.read("k").unwrap(), None);
        cache.remove("k").unwrap();
    }

    #[test]
    fn test_encode_file_name() {
        assert_eq!(encode_file_name("menu_config_evt-1"), "menu_config_evt-1");
        assert_eq!(encode_file_name("evt/1"), "evt%2F1");
        assert_eq!(encode_file_name("../x"), "%2E%2E%2Fx");
        assert_eq!(encode_file_name("50%"), "50%25");
        assert_eq!(encode_file_name("é"), "%C3%A9");
    }

    #[test]
    fn test_file_cache_keeps_keys_inside_dir() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        cache.write("menu_config_../../etc", "x").unwrap();
        assert!(dir.path().join("menu_config_%2E%2E%2F%2E%2E%2Fetc.json").exists());
    }

    #[test]
    fn test_file_cache_isolates_similar_event_ids() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        let mut other = CacheSnapshot::default();
        other.config.insert(SessionKey::new(0, "lunch"), 77);
        save_snapshot(&cache, "evt/1", &other).unwrap();

        assert_eq!(load_snapshot(&cache, "evt_1"), CacheLoad::Missing);
        save_snapshot(&cache, "evt_1", &snapshot()).unwrap();
        assert_eq!(load_snapshot(&cache, "evt/1"), CacheLoad::Loaded(other));
        assert_eq!(load_snapshot(&cache, "evt_1"), CacheLoad::Loaded(snapshot()));
    }

    #[test]
    fn test_file_cache_holds_snapshots() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        save_snapshot(&cache, "evt-1", &snapshot()).unwrap();
        assert_eq!(load_snapshot(&cache, "evt-1"), CacheLoad::Loaded(snapshot()));

        clear_snapshot(&cache, "evt-1").unwrap();
        assert_eq!(load_snapshot(&cache, "evt-1"), CacheLoad::Missing);
    }
}
