// Thin wrapper over the platform dynamic loader (dlopen/dlsym/dlclose)

use std::ffi::{c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::error::LoadError;

/// A mapped shared library. Dropping it unmaps the library.
///
/// Use [`Library::retain`] once code from the library may be referenced by
/// live objects; a retained library is never unmapped.
pub struct Library {
    handle: NonNull<c_void>,
    path: PathBuf,
}

/// A library that stays mapped for the rest of the process lifetime.
#[derive(Debug, Clone)]
pub struct RetainedLibrary {
    path: PathBuf,
    handle: usize,
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    /// Map the library at `path`, resolving all its symbols immediately.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| LoadError::InvalidPath(path.to_path_buf()))?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        match NonNull::new(handle) {
            Some(handle) => Ok(Self {
                handle,
                path: path.to_path_buf(),
            }),
            None => Err(LoadError::Open {
                path: path.to_path_buf(),
                reason: last_error(),
            }),
        }
    }

    /// Resolve `symbol` to its address.
    ///
    /// # Safety
    /// The caller must cast the address to the symbol's true type.
    pub unsafe fn symbol(&self, symbol: &'static str) -> Result<NonNull<c_void>, LoadError> {
        let missing = |reason: String| LoadError::MissingSymbol {
            path: self.path.clone(),
            symbol,
            reason,
        };
        let c_symbol = CString::new(symbol).map_err(|e| missing(e.to_string()))?;

        // Clear any stale error so a null result can be told apart
        libc::dlerror();
        let address = libc::dlsym(self.handle.as_ptr(), c_symbol.as_ptr());
        NonNull::new(address).ok_or_else(|| missing(last_error()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the library mapped forever.
    pub fn retain(self) -> RetainedLibrary {
        let library = std::mem::ManuallyDrop::new(self);
        RetainedLibrary {
            path: library.path.clone(),
            handle: library.handle.as_ptr() as usize,
        }
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("path", &self.path)
            .field("handle", &format_args!("{:p}", self.handle))
            .finish()
    }
}

impl RetainedLibrary {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self) -> usize {
        self.handle
    }
}

fn last_error() -> String {
    unsafe {
        let err = libc::dlerror();
        if err.is_null() {
            "unknown dynamic loader error".to_string()
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        }
    }
}

/// File name of the C library, which exists everywhere and is a handy
/// library that exports none of the plugin symbols.
#[cfg(test)]
pub(crate) const SYSTEM_LIBRARY: &str = if cfg!(target_os = "macos") {
    "/usr/lib/libSystem.B.dylib"
} else {
    "libc.so.6"
};
