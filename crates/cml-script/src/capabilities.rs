//! Host callables injected into policy scripts.
//!
//! Nothing is registered globally. An executor carries a [`Capabilities`]
//! set and registers each capability into the fresh interpreter built for a
//! pass, so shared handles such as a cache client are passed in explicitly.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::UNIX_EPOCH;

use cml_core::CapabilityToggles;
use rhai::{Array, Dynamic, Engine, INT};
use sha2::{Digest, Sha256};

/// A group of host functions a policy script may call.
pub trait HostCapability: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Register the functions into a per-pass interpreter.
    fn register(&self, engine: &mut Engine);
}

/// Filesystem probes: `file_mtime`, `file_is_regular`, `file_is_dir`, `dir_files`.
///
/// Paths are used as given by the script.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemCapability;

impl HostCapability for FilesystemCapability {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn register(&self, engine: &mut Engine) {
        engine.register_fn("file_mtime", |path: &str| -> Dynamic {
            std::fs::metadata(path)
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|d| Dynamic::from(d.as_secs() as INT))
                .unwrap_or(Dynamic::UNIT)
        });

        engine.register_fn("file_is_regular", |path: &str| -> bool {
            std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
        });

        engine.register_fn("file_is_dir", |path: &str| -> bool {
            std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
        });

        // Unit when the directory cannot be read.
        engine.register_fn("dir_files", |path: &str| -> Dynamic {
            match std::fs::read_dir(path) {
                Ok(entries) => {
                    let names: Array = entries
                        .filter_map(Result::ok)
                        .map(|entry| Dynamic::from(entry.file_name().to_string_lossy().into_owned()))
                        .collect();
                    Dynamic::from_array(names)
                }
                Err(_) => Dynamic::UNIT,
            }
        });
    }
}

/// `hash(data)`: lowercase hex SHA-256 of a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashCapability;

impl HashCapability {
    /// Hex digest of the data.
    pub fn digest(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize().to_vec())
    }
}

impl HostCapability for HashCapability {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn register(&self, engine: &mut Engine) {
        engine.register_fn("hash", |data: &str| -> String { Self::digest(data) });
    }
}

/// A shared key-value cache owned outside the engine.
///
/// Implementations handle their own synchronization.
pub trait SharedCache: Send + Sync {
    /// Look up a string value.
    fn get(&self, key: &str) -> Option<String>;

    /// Look up a value stored as a decimal integer.
    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.trim().parse().ok()
    }

    /// Check whether a key is present.
    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// `cache_get(key)`, `cache_get_int(key)` and `cache_exists(key)` backed by a
/// [`SharedCache`].
#[derive(Clone)]
pub struct SharedCacheCapability {
    cache: Arc<dyn SharedCache>,
}

impl SharedCacheCapability {
    /// Wrap a shared cache handle.
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self { cache }
    }
}

impl fmt::Debug for SharedCacheCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCacheCapability").finish_non_exhaustive()
    }
}

impl HostCapability for SharedCacheCapability {
    fn name(&self) -> &'static str {
        "shared_cache"
    }

    fn register(&self, engine: &mut Engine) {
        let cache = Arc::clone(&self.cache);
        engine.register_fn("cache_get", move |key: &str| -> Dynamic {
            cache.get(key).map(Dynamic::from).unwrap_or(Dynamic::UNIT)
        });

        // Unit when the key is absent or not an integer.
        let cache = Arc::clone(&self.cache);
        engine.register_fn("cache_get_int", move |key: &str| -> Dynamic {
            cache
                .get_int(key)
                .map(|v| Dynamic::from(v as INT))
                .unwrap_or(Dynamic::UNIT)
        });

        let cache = Arc::clone(&self.cache);
        engine.register_fn("cache_exists", move |key: &str| -> bool { cache.exists(key) });
    }
}

/// In-memory shared cache (for development/testing).
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value.into());
        }
    }

    /// Remove a value.
    pub fn delete(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

impl SharedCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

/// The capability set an executor registers into every pass.
#[derive(Clone, Default)]
pub struct Capabilities {
    entries: Vec<Arc<dyn HostCapability>>,
}

impl Capabilities {
    /// An empty set: scripts only get the interpreter's own utilities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the set described by configuration toggles.
    pub fn from_toggles(toggles: &CapabilityToggles) -> Self {
        let mut caps = Self::new();
        if toggles.filesystem {
            caps = caps.with_filesystem();
        }
        if toggles.hash {
            caps = caps.with_hash();
        }
        caps
    }

    /// Add the filesystem probes.
    pub fn with_filesystem(self) -> Self {
        self.with(FilesystemCapability)
    }

    /// Add the hash function.
    pub fn with_hash(self) -> Self {
        self.with(HashCapability)
    }

    /// Add the shared cache lookups.
    pub fn with_shared_cache(self, cache: Arc<dyn SharedCache>) -> Self {
        self.with(SharedCacheCapability::new(cache))
    }

    /// Add any capability.
    pub fn with(mut self, capability: impl HostCapability + 'static) -> Self {
        self.entries.push(Arc::new(capability));
        self
    }

    /// Names of the registered capabilities.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|c| c.name()).collect()
    }

    /// Register every capability into an interpreter.
    pub fn register_all(&self, engine: &mut Engine) {
        for capability in &self.entries {
            capability.register(engine);
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("entries", &self.names())
            .finish()
    }
}
