//! Operator preferences with auto-persistence.
//!
//! The whole record is re-saved through the storage backend on every
//! mutation, and persisted fields are merged over the hard-coded defaults on
//! load. The OBS password is stored in clear text.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::store::{Store, Subscription};

/// Persisted operator preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// OBS WebSocket host
    #[serde(default = "default_host")]
    pub host: String,

    /// OBS WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,

    /// OBS WebSocket password (optional)
    #[serde(default)]
    pub password: Option<String>,

    /// Scenes eligible for automatic cycling
    #[serde(default)]
    pub included_scenes: HashSet<String>,

    /// Time between automatic scene changes (ms)
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4455
}

fn default_cycle_interval() -> u64 {
    10_000
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            included_scenes: HashSet::new(),
            cycle_interval_ms: default_cycle_interval(),
        }
    }
}

/// Where the serialized preferences record lives.
pub trait StorageBackend: Send + Sync {
    /// Read the stored record, or `None` if nothing was persisted yet.
    fn load(&self) -> Result<Option<String>>;

    /// Replace the stored record.
    fn save(&self, payload: &str) -> Result<()>;
}

/// JSON file in the platform config directory.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Backend at the default per-user location.
    pub fn at_default_path() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("dev", "scene-cycler", "scene-cycler")
            .context("Failed to determine preferences directory")?;

        Ok(Self::new(proj_dirs.config_dir().join("preferences.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let payload = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read preferences file: {:?}", self.path))?;

        Ok(Some(payload))
    }

    fn save(&self, payload: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create preferences directory: {:?}", parent))?;
        }

        std::fs::write(&self.path, payload)
            .with_context(|| format!("Failed to write preferences file: {:?}", self.path))?;

        Ok(())
    }
}

/// Subscribable preferences store that persists on every change.
#[derive(Clone)]
pub struct PrefsStore {
    store: Store<Preferences>,
    _saver: Arc<Subscription>,
}

impl PrefsStore {
    /// Load preferences through the given backend, merging any persisted
    /// fields over the defaults, and start persisting changes back to it.
    pub fn load(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let prefs = match backend.load()? {
            Some(payload) => {
                serde_json::from_str(&payload).context("Failed to parse preferences")?
            }
            None => Preferences::default(),
        };

        let store = Store::new(prefs);
        let saver = store.subscribe(move |prefs: &Preferences| {
            let payload = match serde_json::to_string_pretty(prefs) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to serialize preferences: {}", e);
                    return;
                }
            };
            if let Err(e) = backend.save(&payload) {
                warn!("Failed to persist preferences: {:#}", e);
            }
        });

        Ok(Self {
            store,
            _saver: Arc::new(saver),
        })
    }

    /// Get a snapshot of the current preferences.
    pub fn get(&self) -> Preferences {
        self.store.get()
    }

    /// Register a listener for preference changes.
    pub fn subscribe<F: Fn(&Preferences) + Send + 'static>(&self, listener: F) -> Subscription {
        self.store.subscribe(listener)
    }

    /// Mark a scene as eligible for cycling. Already-included scenes stay
    /// included once.
    pub fn include_scene(&self, scene: &str) {
        self.store.update(|prefs| {
            prefs.included_scenes.insert(scene.to_string());
        });
    }

    /// Remove a scene from the cycling rotation. Unknown names are a no-op.
    pub fn exclude_scene(&self, scene: &str) {
        self.store.update(|prefs| {
            prefs.included_scenes.remove(scene);
        });
    }

    pub fn set_cycle_interval(&self, interval_ms: u64) {
        self.store.update(|prefs| {
            prefs.cycle_interval_ms = interval_ms;
        });
    }

    pub fn set_connection(&self, host: &str, port: u16, password: Option<String>) {
        self.store.update(|prefs| {
            prefs.host = host.to_string();
            prefs.port = port;
            prefs.password = password;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MemoryBackend {
        data: Mutex<Option<String>>,
        saves: AtomicUsize,
    }

    impl MemoryBackend {
        fn new(data: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                data: Mutex::new(data.map(str::to_string)),
                saves: AtomicUsize::new(0),
            })
        }

        fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    impl StorageBackend for MemoryBackend {
        fn load(&self) -> Result<Option<String>> {
            Ok(self.data.lock().unwrap().clone())
        }

        fn save(&self, payload: &str) -> Result<()> {
            *self.data.lock().unwrap() = Some(payload.to_string());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_defaults_when_nothing_persisted() {
        let prefs = PrefsStore::load(MemoryBackend::new(None)).unwrap();

        let snapshot = prefs.get();
        assert_eq!(snapshot.host, "localhost");
        assert_eq!(snapshot.port, 4455);
        assert_eq!(snapshot.password, None);
        assert!(snapshot.included_scenes.is_empty());
        assert_eq!(snapshot.cycle_interval_ms, 10_000);
    }

    #[test]
    fn test_persisted_fields_merge_over_defaults() {
        let backend = MemoryBackend::new(Some(r#"{"cycle_interval_ms": 5000}"#));
        let prefs = PrefsStore::load(backend).unwrap();

        let snapshot = prefs.get();
        assert_eq!(snapshot.cycle_interval_ms, 5000);
        assert_eq!(snapshot.host, "localhost");
        assert_eq!(snapshot.port, 4455);
    }

    #[test]
    fn test_include_scene_is_idempotent() {
        let prefs = PrefsStore::load(MemoryBackend::new(None)).unwrap();

        prefs.include_scene("Intro");
        prefs.include_scene("Intro");

        let included = prefs.get().included_scenes;
        assert_eq!(included.len(), 1);
        assert!(included.contains("Intro"));
    }

    #[test]
    fn test_exclude_absent_scene_is_a_noop() {
        let prefs = PrefsStore::load(MemoryBackend::new(None)).unwrap();
        prefs.include_scene("Intro");

        prefs.exclude_scene("Outro");
        assert_eq!(prefs.get().included_scenes.len(), 1);

        prefs.exclude_scene("Intro");
        assert!(prefs.get().included_scenes.is_empty());
    }

    #[test]
    fn test_every_mutation_persists_the_whole_record() {
        let backend = MemoryBackend::new(None);
        let prefs = PrefsStore::load(backend.clone()).unwrap();

        // Loading writes the merged record back once.
        let initial_saves = backend.save_count();
        assert!(initial_saves >= 1);

        prefs.include_scene("Intro");
        prefs.set_cycle_interval(2500);
        prefs.set_connection("studio.local", 4460, Some("hunter2".to_string()));
        assert_eq!(backend.save_count(), initial_saves + 3);

        let stored = backend.load().unwrap().unwrap();
        let parsed: Preferences = serde_json::from_str(&stored).unwrap();
        assert!(parsed.included_scenes.contains("Intro"));
        assert_eq!(parsed.cycle_interval_ms, 2500);
        assert_eq!(parsed.host, "studio.local");
        assert_eq!(parsed.port, 4460);
        assert_eq!(parsed.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_json_file_backend_round_trip() {
        let path = std::env::temp_dir()
            .join("scene-cycler-test")
            .join(format!("prefs-{}.json", std::process::id()));
        let backend = JsonFileBackend::new(path.clone());

        assert!(backend.load().unwrap().is_none());

        backend.save(r#"{"port": 4460}"#).unwrap();
        assert_eq!(backend.load().unwrap().as_deref(), Some(r#"{"port": 4460}"#));

        let _ = std::fs::remove_file(&path);
    }
}
