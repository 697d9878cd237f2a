//! Run plugins outside the bus.
//!
//! A standalone plugin library exports `createPlugin` and `destroyPlugin`
//! (see [`export_standalone_plugin!`]). [`PluginHost`] loads such libraries,
//! executes each instance and, when dropped, destroys every instance before
//! unmapping its library. Both symbols use the Rust calling convention, so
//! host and plugin must be built by the same compiler.

use std::path::Path;
use std::ptr::NonNull;

use tracing::{debug, info};

use crate::error::LoadError;
use crate::Core::dylib::Library;

pub const CREATE_SYMBOL: &str = "createPlugin";
pub const DESTROY_SYMBOL: &str = "destroyPlugin";

/// A plugin that runs once, on demand, without the bus.
pub trait StandalonePlugin {
    fn name(&self) -> &str;

    fn execute(&mut self);
}

pub type CreatePluginFn = fn() -> *mut dyn StandalonePlugin;
pub type DestroyPluginFn = unsafe fn(*mut dyn StandalonePlugin);

/// Emit `createPlugin`/`destroyPlugin` for a type with a `Default` impl.
#[macro_export]
macro_rules! export_standalone_plugin {
    ($plugin:ty) => {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub fn createPlugin() -> *mut dyn $crate::harness::StandalonePlugin {
            let plugin: Box<dyn $crate::harness::StandalonePlugin> =
                Box::new(<$plugin as Default>::default());
            Box::into_raw(plugin)
        }

        /// # Safety
        /// `plugin` must come from `createPlugin` of this library.
        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe fn destroyPlugin(plugin: *mut dyn $crate::harness::StandalonePlugin) {
            if !plugin.is_null() {
                drop(Box::from_raw(plugin));
            }
        }
    };
}

struct HostedPlugin {
    instance: NonNull<dyn StandalonePlugin>,
    destroy: DestroyPluginFn,
    // Unmapped only after `destroy` has run.
    library: Library,
}

/// Owns standalone plugin instances and the libraries they came from.
#[derive(Default)]
pub struct PluginHost {
    plugins: Vec<HostedPlugin>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the library at `path` and create its plugin instance.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        let library = Library::open(path)?;

        // Safety: both symbols are emitted by `export_standalone_plugin!`
        // with exactly these signatures.
        let (create, destroy) = unsafe {
            let create = library.symbol(CREATE_SYMBOL)?;
            let destroy = library.symbol(DESTROY_SYMBOL)?;
            (
                std::mem::transmute::<*mut std::ffi::c_void, CreatePluginFn>(create.as_ptr()),
                std::mem::transmute::<*mut std::ffi::c_void, DestroyPluginFn>(destroy.as_ptr()),
            )
        };

        let instance = NonNull::new(create()).ok_or_else(|| LoadError::CreateFailed {
            path: path.to_path_buf(),
        })?;

        let name = unsafe { instance.as_ref() }.name().to_string();
        info!(%name, path = %path.display(), "standalone plugin loaded");
        self.plugins.push(HostedPlugin {
            instance,
            destroy,
            library,
        });
        Ok(())
    }

    /// Execute every loaded plugin once, in load order. Returns how many ran.
    pub fn run_all(&mut self) -> usize {
        for plugin in &mut self.plugins {
            let instance = unsafe { plugin.instance.as_mut() };
            debug!(name = instance.name(), "executing plugin");
            instance.execute();
        }
        self.plugins.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins
            .iter()
            .map(|p| unsafe { p.instance.as_ref() }.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        for plugin in self.plugins.drain(..) {
            // Safety: the instance came from this library's `createPlugin`.
            unsafe { (plugin.destroy)(plugin.instance.as_ptr()) };
            debug!(path = %plugin.library.path().display(), "standalone plugin destroyed");
            drop(plugin.library);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Core::dylib::SYSTEM_LIBRARY;

    #[test]
    fn library_without_factory_is_refused() {
        let mut host = PluginHost::new();
        let err = host.load(SYSTEM_LIBRARY).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingSymbol { symbol: CREATE_SYMBOL, .. }
        ));
        assert!(host.is_empty());
        assert_eq!(host.run_all(), 0);
    }

    #[test]
    fn missing_file_is_open_error() {
        let mut host = PluginHost::new();
        assert!(matches!(
            host.load("/nonexistent/standalone.so"),
            Err(LoadError::Open { .. })
        ));
    }
}
