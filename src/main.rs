use std::process::ExitCode;
use std::sync::Arc;

use microkernel::config::{ConfigManager, CONFIG_PATH_ENV};
use microkernel::{Kernel, ShutdownMode};
use parking_lot::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .compact()
        .init();
}

fn main() -> ExitCode {
    let Some(path) = std::env::var_os(CONFIG_PATH_ENV) else {
        init_tracing("info");
        info!("{CONFIG_PATH_ENV} not set, nothing to run");
        return ExitCode::SUCCESS;
    };

    let mut config = ConfigManager::new();
    let loaded = config.load(&path).and_then(|()| config.kernel_config());
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            init_tracing("info");
            error!(error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings.logging.level);

    config.watch_for_changes("logging.level", |level| {
        info!(%level, "logging level changed, restart to apply");
    });
    let config = Arc::new(Mutex::new(config));
    let _watcher = match ConfigManager::watch_file(&config) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "config changes will not be picked up");
            None
        }
    };

    let mut kernel = match Kernel::new(settings.kernel.clone()) {
        Ok(kernel) => kernel,
        Err(e) => {
            error!(error = %e, "cannot create kernel");
            return ExitCode::FAILURE;
        }
    };

    if settings.plugins.autoload {
        let files = ConfigManager::plugin_files(&settings.plugins.directory);
        let report = kernel.load_components(&files);
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            components = report.components(),
            "plugin autoload finished"
        );
    }

    let running = match kernel.start() {
        Ok(running) => running,
        Err(e) => {
            error!(error = %e, "cannot start kernel");
            return ExitCode::FAILURE;
        }
    };

    let stop = running.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || stop.stop()) {
        warn!(error = %e, "cannot install signal handler");
    }

    let stats = running.wait(ShutdownMode::Drain);
    let messages: u64 = stats.iter().map(|s| s.messages).sum();
    info!(messages, "shutdown complete");
    ExitCode::SUCCESS
}
