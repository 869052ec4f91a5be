//! Persisted operator settings

use crate::errors::{ConsoleError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Key the settings are stored under.
pub const SETTINGS_KEY: &str = "adminConsoleSettings";

pub const MIN_REFRESH_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

const fn default_auto_refresh() -> bool {
    true
}

const fn default_refresh_interval_ms() -> u64 {
    30_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_refresh: default_auto_refresh(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl Settings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    fn normalized(mut self) -> Self {
        self.refresh_interval_ms = self.refresh_interval_ms.max(MIN_REFRESH_INTERVAL_MS);
        self
    }
}

/// Durable string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Key-value pairs kept as one JSON object in a file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        // an unreadable file is replaced rather than blocking every save
        let mut values = self.read_all().unwrap_or_else(|e| {
            warn!("Replacing unreadable store {}: {}", self.path.display(), e);
            BTreeMap::new()
        });
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| ConsoleError::Settings("memory store poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| ConsoleError::Settings("memory store poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Owns the current settings. Loaded once at startup; every change is
/// written through to the backend and broadcast to subscribers.
pub struct SettingsStore {
    backend: Box<dyn KeyValueStore>,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    pub fn load(backend: impl KeyValueStore + 'static) -> Result<Self> {
        let settings = match backend.get(SETTINGS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Settings>(&raw) {
                Ok(settings) => settings.normalized(),
                Err(e) => {
                    warn!("Stored settings are unreadable, using defaults: {}", e);
                    Settings::default()
                }
            },
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!("Settings store is unreadable, using defaults: {}", e);
                Settings::default()
            }
        };

        info!(
            "Loaded settings: auto refresh {}, interval {}ms",
            settings.auto_refresh, settings.refresh_interval_ms
        );

        let (tx, _) = watch::channel(settings);
        Ok(Self {
            backend: Box::new(backend),
            tx,
        })
    }

    pub fn current(&self) -> Settings {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Apply `change`, persist, and notify subscribers. A change that leaves
    /// the settings as they were is not written or broadcast.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let current = self.current();
        let mut next = current;
        change(&mut next);
        let next = next.normalized();

        if next == current {
            return Ok(current);
        }

        self.backend
            .set(SETTINGS_KEY, &serde_json::to_string(&next)?)?;
        self.tx.send_replace(next);
        debug!("Settings updated: {:?}", next);
        Ok(next)
    }

    pub fn set_auto_refresh(&self, enabled: bool) -> Result<Settings> {
        self.update(|s| s.auto_refresh = enabled)
    }

    pub fn set_refresh_interval(&self, interval: Duration) -> Result<Settings> {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.update(|s| s.refresh_interval_ms = ms)
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("current", &self.current())
            .finish()
    }
}
