//! Dynamic component loading.
//!
//! A component library exports one symbol, [`ENTRY_SYMBOL`], holding a
//! [`PluginDeclaration`]. The loader checks the declaration's version tags
//! before calling its `register` function with the live kernel, so a library
//! built against another kernel interface is refused instead of being called
//! through a mismatched function pointer. Use [`export_plugin!`] to emit it.
//!
//! ```rust,ignore
//! use microkernel::{export_plugin, Kernel};
//!
//! fn register(kernel: &mut Kernel) {
//!     kernel.register(MyComponent::default(), &[1, 2]).ok();
//! }
//!
//! export_plugin!(register);
//! ```

use std::path::{Path, PathBuf};

use tracing::{error, info};

use super::kernel::Kernel;
use crate::error::LoadError;
use crate::Core::dylib::Library;

/// Bumped whenever the layout of [`PluginDeclaration`] or [`Kernel`] changes
/// in a way that breaks already-built libraries.
pub const ABI_VERSION: u32 = 1;

/// Version of the kernel crate a library was built against.
pub const KERNEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Symbol every component library must export.
pub const ENTRY_SYMBOL: &str = "register_plugin";

/// The exported entry point of a component library.
#[repr(C)]
pub struct PluginDeclaration {
    /// Read first; nothing else is trusted unless it equals [`ABI_VERSION`].
    pub abi_version: u32,
    pub kernel_version: &'static str,
    /// Registers the library's components with the kernel.
    pub register: fn(&mut Kernel),
}

/// Emit the [`PluginDeclaration`] for a component library.
#[macro_export]
macro_rules! export_plugin {
    ($register:expr) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static register_plugin: $crate::Bus::loader::PluginDeclaration =
            $crate::Bus::loader::PluginDeclaration {
                abi_version: $crate::Bus::loader::ABI_VERSION,
                kernel_version: $crate::Bus::loader::KERNEL_VERSION,
                register: $register,
            };
    };
}

/// Outcome of loading a batch of libraries.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Libraries that registered, with how many components each added.
    pub loaded: Vec<(PathBuf, usize)>,
    pub failed: Vec<(PathBuf, LoadError)>,
}

impl LoadReport {
    pub fn components(&self) -> usize {
        self.loaded.iter().map(|(_, n)| n).sum()
    }
}

impl Kernel {
    /// Map `path`, validate its declaration and let it register itself.
    ///
    /// Returns the number of components the library registered. On failure
    /// the library is unmapped and the kernel is unchanged. A library that
    /// loaded successfully stays mapped for the life of the process.
    pub fn load_component(&mut self, path: impl AsRef<Path>) -> Result<usize, LoadError> {
        let path = path.as_ref();
        let library = Library::open(path)?;

        // Safety: the symbol is only dereferenced as a `PluginDeclaration`
        // after its leading version word has been checked.
        let declaration = unsafe {
            let address = library.symbol(ENTRY_SYMBOL)?;
            &*address.as_ptr().cast::<PluginDeclaration>()
        };

        check_declaration(path, declaration)?;

        let before = self.component_count();
        (declaration.register)(self);
        let registered = self.component_count() - before;

        self.retain_library(library.retain());
        info!(path = %path.display(), components = registered, "component library loaded");
        Ok(registered)
    }

    /// Load every path in turn. A failure is logged and does not stop the
    /// remaining loads.
    pub fn load_components<I, P>(&mut self, paths: I) -> LoadReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = LoadReport::default();
        for path in paths {
            let path = path.as_ref();
            match self.load_component(path) {
                Ok(count) => report.loaded.push((path.to_path_buf(), count)),
                Err(e) => {
                    error!(error = %e, "cannot load component");
                    report.failed.push((path.to_path_buf(), e));
                }
            }
        }
        report
    }
}

/// Refuse a declaration built against another ABI or kernel version. The
/// ABI number is compared first, since the rest of the layout depends on it.
fn check_declaration(path: &Path, declaration: &PluginDeclaration) -> Result<(), LoadError> {
    if declaration.abi_version != ABI_VERSION {
        return Err(LoadError::AbiMismatch {
            path: path.to_path_buf(),
            expected: format!("abi {ABI_VERSION}"),
            found: format!("abi {}", declaration.abi_version),
        });
    }
    if declaration.kernel_version != KERNEL_VERSION {
        return Err(LoadError::AbiMismatch {
            path: path.to_path_buf(),
            expected: format!("kernel {KERNEL_VERSION}"),
            found: format!("kernel {}", declaration.kernel_version),
        });
    }
    Ok(())
}
