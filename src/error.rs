//! Error types for the message bus.
//!
//! Hot-path failures ([`PublishError`]) are plain values returned to the
//! caller, never panics. Load-time failures ([`LoadError`]) are reported per
//! library and leave the running set of components untouched.

use std::io;
use std::path::PathBuf;

use crate::Bus::component::ComponentId;

/// Failure to map a component library or to attach it to the kernel.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The dynamic loader could not map the library.
    #[error("cannot load library {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// The library is mapped but does not export the requested symbol.
    #[error("cannot resolve symbol `{symbol}` in {path}: {reason}")]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        reason: String,
    },

    /// The library was built against an incompatible kernel interface.
    #[error("incompatible plugin {path}: expected {expected}, found {found}")]
    AbiMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// The path cannot be handed to the dynamic loader (interior NUL byte).
    #[error("invalid library path {0}")]
    InvalidPath(PathBuf),

    /// A standalone plugin factory returned a null instance.
    #[error("plugin factory in {path} returned no instance")]
    CreateFailed { path: PathBuf },
}

/// Failure to enqueue a message on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The sender id is zero or was never issued by this kernel.
    #[error("invalid sender id {sender_id}")]
    InvalidSender { sender_id: ComponentId },

    /// The sender's queue is full. Retry, drop, or escalate.
    #[error("queue full for sender {sender_id}")]
    CapacityExceeded { sender_id: ComponentId },
}

/// Registration, sizing and start-up failures of the kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A component must subscribe to at least one message type.
    #[error("component `{name}` registered without any message types")]
    NoSubscriptions { name: String },

    /// Every queue slot reserved in the arena is already taken.
    #[error("component limit reached ({limit})")]
    ComponentLimit { limit: usize },

    /// More workers were requested than there are cores to pin them to.
    #[error("{requested} workers requested but only {available} cores are available")]
    TooManyWorkers { requested: usize, available: usize },

    #[error("worker pool must have at least one worker")]
    NoWorkers,

    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    /// The arena could not be reserved or is exhausted.
    #[error("arena allocation failed: {0}")]
    Arena(#[from] io::Error),

    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration document failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration path set")]
    MissingPath,

    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("cannot watch config file: {0}")]
    Watch(#[from] notify::Error),
}

/// Message construction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("payload too large ({len} > {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_error_display() {
        let err = PublishError::CapacityExceeded { sender_id: 3 };
        assert_eq!(err.to_string(), "queue full for sender 3");
        let err = PublishError::InvalidSender { sender_id: 0 };
        assert_eq!(err.to_string(), "invalid sender id 0");
    }

    #[test]
    fn arena_error_converts_from_io() {
        let io_err = io::Error::new(io::ErrorKind::OutOfMemory, "arena exhausted");
        let err: KernelError = io_err.into();
        assert!(matches!(err, KernelError::Arena(_)));
        assert!(err.to_string().contains("arena exhausted"));
    }
}
