use microkernel::config::{ConfigManager, SharedConfig};
use microkernel::error::ConfigError;
use parking_lot::Mutex;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "microkernel-{name}-{}-{}",
        std::process::id(),
        fastrand::u64(..)
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn load_reads_typed_settings() {
    let dir = scratch_dir("load");
    let path = dir.join("config.json");
    fs::write(
        &path,
        json!({
            "plugins": { "directory": "/opt/bus/plugins", "autoload": true },
            "kernel": { "workers": 2, "queue_capacity": 512 }
        })
        .to_string(),
    )
    .unwrap();

    let mut manager = ConfigManager::new();
    manager.load(&path).unwrap();
    let config = manager.kernel_config().unwrap();
    assert!(config.plugins.autoload);
    assert_eq!(config.plugins.directory, PathBuf::from("/opt/bus/plugins"));
    assert_eq!(config.kernel.workers, 2);
    assert_eq!(config.kernel.queue_capacity, 512);
    assert_eq!(config.kernel.max_components, 64);
    assert_eq!(manager.get("kernel.workers", 0usize), 2);
    assert_eq!(manager.path(), Some(path.as_path()));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn malformed_document_is_parse_error() {
    let dir = scratch_dir("malformed");
    let path = dir.join("config.json");
    fs::write(&path, "{ not json").unwrap();

    let mut manager = ConfigManager::new();
    assert!(matches!(manager.load(&path), Err(ConfigError::Parse { .. })));
    assert!(matches!(
        manager.load(dir.join("absent.json")),
        Err(ConfigError::Io { .. })
    ));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn reload_notifies_changed_keys_only() {
    let dir = scratch_dir("reload");
    let path = dir.join("config.json");
    fs::write(&path, json!({ "logging": { "level": "info" }, "x": 1 }).to_string()).unwrap();

    let mut manager = ConfigManager::new();
    manager.load(&path).unwrap();
    let level_hits = Arc::new(AtomicUsize::new(0));
    let x_hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = level_hits.clone();
        manager.watch_for_changes("logging.level", move |v| {
            assert_eq!(v, &json!("debug"));
            hits.fetch_add(1, Ordering::SeqCst);
        });
        let hits = x_hits.clone();
        manager.watch_for_changes("x", move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Unchanged mtime: nothing to do.
    assert!(!manager.check_for_updates().unwrap());

    fs::write(&path, json!({ "logging": { "level": "debug" }, "x": 1 }).to_string()).unwrap();
    let later = SystemTime::now() + Duration::from_secs(5);
    fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();

    assert!(manager.check_for_updates().unwrap());
    assert_eq!(level_hits.load(Ordering::SeqCst), 1);
    assert_eq!(x_hits.load(Ordering::SeqCst), 0);
    assert_eq!(manager.get("logging.level", String::new()), "debug");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn watcher_reloads_edited_file() {
    let dir = scratch_dir("watch");
    let path = dir.join("config.json");
    let sibling = dir.join("other.json");
    fs::write(&path, json!({ "logging": { "level": "info" } }).to_string()).unwrap();

    let mut manager = ConfigManager::new();
    manager.load(&path).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = hits.clone();
    manager.watch_for_changes("logging.level", move |v| {
        assert_eq!(v, &json!("trace"));
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let shared: SharedConfig = Arc::new(Mutex::new(manager));
    let watcher = ConfigManager::watch_file(&shared).unwrap();

    // Files next to the config are ignored.
    fs::write(&sibling, b"{}").unwrap();

    fs::write(&path, json!({ "logging": { "level": "trace" } }).to_string()).unwrap();
    fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while hits.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        shared.lock().get("logging.level", String::new()),
        "trace"
    );

    drop(watcher);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn plugin_scan_is_recursive_and_filtered() {
    let dir = scratch_dir("plugins");
    let ext = std::env::consts::DLL_EXTENSION;
    fs::create_dir_all(dir.join("nested/deeper")).unwrap();
    for file in [
        format!("a.{ext}"),
        format!("nested/b.{ext}"),
        format!("nested/deeper/c.{ext}"),
        "readme.txt".to_string(),
        "nested/config.json".to_string(),
    ] {
        fs::write(dir.join(file), b"").unwrap();
    }

    let found = ConfigManager::plugin_files(&dir);
    let expected = vec![
        dir.join(format!("a.{ext}")),
        dir.join(format!("nested/b.{ext}")),
        dir.join(format!("nested/deeper/c.{ext}")),
    ];
    assert_eq!(found, expected);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_plugin_directory_yields_nothing() {
    let dir = std::env::temp_dir().join("microkernel-no-such-plugin-dir");
    assert!(ConfigManager::plugin_files(dir).is_empty());
}
