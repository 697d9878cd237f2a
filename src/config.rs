//! Configuration document and change notification.
//!
//! The kernel reads a JSON document whose path is given by
//! [`CONFIG_PATH_ENV`]. Besides typed lookups it supports per-key change
//! subscriptions, a file watcher that re-reads the document when it is
//! modified, and a scan of the plugin directory for loadable libraries.

use std::collections::HashMap;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::ConfigError;

/// Environment variable holding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "MICROKERNEL_CONFIG_PATH";

pub type ConfigChangedCallback = Box<dyn Fn(&Value) + Send + Sync>;

/// A manager shared with its file watcher.
pub type SharedConfig = Arc<Mutex<ConfigManager>>;

/// Typed view of the whole document. Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub plugins: PluginSettings,
    pub kernel: KernelSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Directory scanned (recursively) for component libraries.
    pub directory: PathBuf,
    /// Load every library found in `directory` at startup.
    pub autoload: bool,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plugins"),
            autoload: false,
        }
    }
}

/// Sizing of the bus. Fixed for the life of the kernel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    /// Worker threads, one per core. Defaults to the cores available.
    pub workers: usize,
    /// Slots per component queue. Must be a power of two.
    pub queue_capacity: usize,
    /// Queues reserved in the arena up front.
    pub max_components: usize,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            workers: crate::Core::affinity::available_cores(),
            queue_capacity: 1024,
            max_components: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Loaded configuration plus its change subscribers.
pub struct ConfigManager {
    path: Option<PathBuf>,
    config: Value,
    last_modified: Option<SystemTime>,
    subscribers: Mutex<HashMap<String, Vec<ConfigChangedCallback>>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            path: None,
            config: Value::Object(Default::default()),
            last_modified: None,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Read and parse the document at `path`, replacing the current one.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ConfigError::MissingPath);
        }

        let config = read_document(path)?;
        for (key, value) in config.as_object().into_iter().flatten() {
            debug!(%key, %value, "config entry");
        }

        self.last_modified = modified_time(path);
        self.path = Some(path.to_path_buf());
        self.config = config;
        info!(path = %path.display(), "configuration loaded");
        Ok(())
    }

    /// Look up `key` and convert it to `T`, falling back to `default` when the
    /// key is missing or holds a value of another type.
    ///
    /// Keys may be dotted (`"plugins.autoload"`) to reach nested objects; an
    /// exact top-level match wins over the nested interpretation.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(value) = lookup(&self.config, key) else {
            return default;
        };
        match T::deserialize(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(%key, error = %e, "type mismatch in config, using default");
                default
            }
        }
    }

    /// Call `callback` with the new value whenever `key` changes.
    pub fn watch_for_changes<F>(&self, key: impl Into<String>, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .entry(key.into())
            .or_default()
            .push(Box::new(callback));
    }

    /// Re-read the file if its modification time moved forward and notify the
    /// subscribers of every watched key whose value changed.
    ///
    /// Returns whether a new document was applied. A file that fails to parse
    /// is logged and leaves the current document in place.
    pub fn check_for_updates(&mut self) -> Result<bool, ConfigError> {
        let Some(path) = self.path.clone() else {
            return Err(ConfigError::MissingPath);
        };
        if !path.exists() {
            return Ok(false);
        }

        let current = modified_time(&path);
        let newer = match (current, self.last_modified) {
            (Some(current), Some(last)) => current > last,
            (Some(_), None) => true,
            _ => false,
        };
        if !newer {
            return Ok(false);
        }

        let config = match read_document(&path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "error updating config");
                return Ok(false);
            }
        };

        let changed: Vec<(String, Value)> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .keys()
                .filter_map(|key| {
                    let new = lookup(&config, key)?;
                    (lookup(&self.config, key) != Some(new)).then(|| (key.clone(), new.clone()))
                })
                .collect()
        };

        self.config = config;
        self.last_modified = current;
        info!(path = %path.display(), changed = changed.len(), "configuration updated");

        for (key, value) in &changed {
            self.notify_subscribers(key, value);
        }
        Ok(true)
    }

    /// Reload `config` whenever its file is modified.
    ///
    /// Watches the file's directory and runs [`ConfigManager::check_for_updates`]
    /// on the watcher thread, with the manager locked, for every modify or
    /// create event naming the file. Change callbacks therefore must not lock
    /// `config` themselves. Watching stops when the returned watcher is dropped.
    pub fn watch_file(config: &SharedConfig) -> Result<RecommendedWatcher, ConfigError> {
        let path = config.lock().path.clone().ok_or(ConfigError::MissingPath)?;
        let file_name = path.file_name().map(|name| name.to_os_string());
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let shared = Arc::clone(config);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    if !event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref())
                    {
                        return;
                    }
                    debug!(paths = ?event.paths, "configuration file changed");
                    if let Err(e) = shared.lock().check_for_updates() {
                        error!(error = %e, "config reload failed");
                    }
                }
                Err(e) => error!(error = %e, "file watcher error"),
            }
        })?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "watching configuration file");
        Ok(watcher)
    }

    /// Replace the document and notify every watched key present in it.
    pub fn update_config(&mut self, config: Value) {
        self.config = config;
        let present: Vec<(String, Value)> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .keys()
                .filter_map(|key| lookup(&self.config, key).map(|v| (key.clone(), v.clone())))
                .collect()
        };
        for (key, value) in &present {
            self.notify_subscribers(key, value);
        }
    }

    fn notify_subscribers(&self, key: &str, value: &Value) {
        let subscribers = self.subscribers.lock();
        let Some(callbacks) = subscribers.get(key) else {
            return;
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                error!(%key, "config change callback panicked");
            }
        }
    }

    /// Every file under `directory` (recursively) with the platform's
    /// dynamic-library extension, sorted by path.
    pub fn plugin_files(directory: impl AsRef<Path>) -> Vec<PathBuf> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            warn!(path = %directory.display(), "plugin directory not found or not a directory");
            return Vec::new();
        }

        info!(path = %directory.display(), "scanning for plugins");
        let mut files = Vec::new();
        let mut pending = vec![directory.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    error!(path = %dir.display(), error = %e, "filesystem error while scanning plugins");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.is_file()
                    && path.extension().and_then(|e| e.to_str())
                        == Some(std::env::consts::DLL_EXTENSION)
                {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }

    /// Typed snapshot of the current document.
    pub fn kernel_config(&self) -> Result<KernelConfig, ConfigError> {
        Ok(KernelConfig::deserialize(&self.config)?)
    }

    /// The raw document.
    pub fn json(&self) -> &Value {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn lookup<'a>(config: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = config.get(key) {
        return Some(value);
    }
    let pointer = format!("/{}", key.replace('.', "/"));
    config.pointer(&pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn manager(config: Value) -> ConfigManager {
        let mut manager = ConfigManager::new();
        manager.update_config(config);
        manager
    }

    #[test]
    fn typed_lookup_with_defaults() {
        let m = manager(json!({
            "plugins": { "autoload": true, "directory": "mods" },
            "name": "bus",
            "logging.level": "debug"
        }));
        assert!(m.get("plugins.autoload", false));
        assert_eq!(m.get("plugins.directory", String::new()), "mods");
        assert_eq!(m.get("logging.level", String::new()), "debug");
        assert_eq!(m.get("missing", 7u32), 7);
        // type mismatch falls back
        assert_eq!(m.get("name", 3i64), 3);
    }

    #[test]
    fn update_notifies_watched_keys() {
        let mut m = ConfigManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        m.watch_for_changes("logging.level", move |v| {
            assert_eq!(v, &json!("trace"));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        m.update_config(json!({ "logging": { "level": "trace" } }));
        m.update_config(json!({ "other": 1 }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_does_not_stop_others() {
        let mut m = ConfigManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        m.watch_for_changes("k", |_| panic!("boom"));
        m.watch_for_changes("k", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        m.update_config(json!({ "k": 1 }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn kernel_config_defaults_fill_gaps() {
        let m = manager(json!({ "kernel": { "queue_capacity": 256 } }));
        let config = m.kernel_config().unwrap();
        assert_eq!(config.kernel.queue_capacity, 256);
        assert_eq!(config.kernel.max_components, 64);
        assert!(config.kernel.workers >= 1);
        assert!(!config.plugins.autoload);
        assert_eq!(config.plugins.directory, PathBuf::from("plugins"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn empty_path_is_missing() {
        let mut m = ConfigManager::new();
        assert!(matches!(m.load(""), Err(ConfigError::MissingPath)));
        assert!(matches!(m.check_for_updates(), Err(ConfigError::MissingPath)));
        let shared: SharedConfig = Arc::new(Mutex::new(m));
        assert!(matches!(
            ConfigManager::watch_file(&shared),
            Err(ConfigError::MissingPath)
        ));
    }
}
